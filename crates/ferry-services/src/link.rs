//! Link — one framed connection shared by concurrent chunk senders.
//!
//! All traffic for a session goes through a single `tokio::sync::Mutex`. A
//! round trip holds the lock from the first byte of the request until the
//! reply has been read, so two senders can never interleave frames or read
//! each other's acknowledgements.
//!
//! A timed-out round trip leaves its reply owed: the peer will still answer,
//! just late. The link counts owed replies and skips that many frames before
//! handing the next one to a caller.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use ferry_core::frame::{FrameError, FramedConnection};

/// Outcome of one request/reply exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Frame(Bytes),
    TimedOut,
}

pub struct Link<S> {
    inner: Mutex<Inner<S>>,
}

struct Inner<S> {
    conn: FramedConnection<S>,
    owed: usize,
}

impl<S> Link<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::from_framed(FramedConnection::new(stream))
    }

    pub fn with_max_frame_size(stream: S, max_frame_size: usize) -> Self {
        Self::from_framed(FramedConnection::with_max_frame_size(stream, max_frame_size))
    }

    pub fn from_framed(conn: FramedConnection<S>) -> Self {
        Self {
            inner: Mutex::new(Inner { conn, owed: 0 }),
        }
    }

    /// Write one frame.
    pub async fn send(&self, payload: &[u8]) -> Result<(), FrameError> {
        self.inner.lock().await.conn.write_frame(payload).await
    }

    /// Write several frames back to back without releasing the lock.
    pub async fn send_all(&self, frames: &[Bytes]) -> Result<(), FrameError> {
        let mut inner = self.inner.lock().await;
        for frame in frames {
            inner.conn.write_frame(frame).await?;
        }
        Ok(())
    }

    /// Next frame from the peer, after skipping owed late replies.
    /// `None` means the peer closed the connection on a frame boundary.
    pub async fn recv(&self) -> Result<Option<Bytes>, FrameError> {
        self.inner.lock().await.next_reply().await
    }

    /// Like [`recv`](Self::recv), but end-of-stream is an error: the peer
    /// left in the middle of an exchange.
    pub async fn recv_expected(&self, what: &'static str) -> Result<Bytes, FrameError> {
        match self.recv().await? {
            Some(frame) => Ok(frame),
            None => Err(closed(what)),
        }
    }

    /// Send `payload` and wait up to `timeout` for the reply.
    ///
    /// On timeout the reply is recorded as owed and `Reply::TimedOut` is
    /// returned; the connection stays usable.
    pub async fn round_trip(&self, payload: &[u8], timeout: Duration) -> Result<Reply, FrameError> {
        let mut inner = self.inner.lock().await;
        inner.conn.write_frame(payload).await?;

        match tokio::time::timeout(timeout, inner.next_reply()).await {
            Ok(Ok(Some(frame))) => Ok(Reply::Frame(frame)),
            Ok(Ok(None)) => Err(closed("acknowledgement")),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                inner.owed += 1;
                tracing::debug!(owed = inner.owed, "reply timed out, now owed");
                Ok(Reply::TimedOut)
            }
        }
    }

    /// Replies still expected from timed-out round trips.
    #[cfg(test)]
    pub(crate) async fn owed(&self) -> usize {
        self.inner.lock().await.owed
    }
}

impl<S> Inner<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn next_reply(&mut self) -> Result<Option<Bytes>, FrameError> {
        while self.owed > 0 {
            match self.conn.read_frame().await? {
                Some(stale) => {
                    self.owed -= 1;
                    tracing::debug!(len = stale.len(), owed = self.owed, "discarded late reply");
                }
                None => return Ok(None),
            }
        }
        self.conn.read_frame().await
    }
}

fn closed(what: &str) -> FrameError {
    FrameError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("connection closed while waiting for {what}"),
    ))
}
