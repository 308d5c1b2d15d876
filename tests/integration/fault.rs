use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use ferry_core::chunk::{self, Decoded};
use ferry_core::frame::LENGTH_PREFIX;

// ── CorruptingStream — frame-aware fault injection ─────────────────────────

/// Wraps a stream and damages outgoing chunk frames in transit.
///
/// Outgoing bytes are re-framed; a data chunk whose index matches the target
/// gets the last payload byte flipped, so the receiver's checksum fails.
/// Reads pass straight through. `corruptions()` reports how many frames
/// were damaged.
pub struct CorruptingStream<S> {
    inner: S,
    incoming: BytesMut,
    outgoing: BytesMut,
    target: u64,
    remaining: usize,
    corrupted: Arc<AtomicUsize>,
}

impl<S> CorruptingStream<S> {
    /// Corrupt the first `times` transmissions of chunk `target`.
    pub fn new(inner: S, target: u64, times: usize) -> Self {
        Self {
            inner,
            incoming: BytesMut::new(),
            outgoing: BytesMut::new(),
            target,
            remaining: times,
            corrupted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Corrupt every transmission of chunk `target`.
    pub fn always(inner: S, target: u64) -> Self {
        Self::new(inner, target, usize::MAX)
    }

    pub fn corruptions(&self) -> Arc<AtomicUsize> {
        self.corrupted.clone()
    }

    /// Move every complete frame from `incoming` to `outgoing`.
    fn split_frames(&mut self) {
        loop {
            if self.incoming.len() < LENGTH_PREFIX {
                return;
            }
            let len = u32::from_be_bytes([
                self.incoming[0],
                self.incoming[1],
                self.incoming[2],
                self.incoming[3],
            ]) as usize;
            if self.incoming.len() < LENGTH_PREFIX + len {
                return;
            }

            let mut frame = self.incoming.split_to(LENGTH_PREFIX + len);
            if self.should_corrupt(&frame[LENGTH_PREFIX..]) {
                let last = frame.len() - 1;
                frame[last] ^= 0xFF;
            }
            self.outgoing.extend_from_slice(&frame);
        }
    }

    fn should_corrupt(&mut self, payload: &[u8]) -> bool {
        if self.remaining == 0 {
            return false;
        }
        match chunk::decode(Bytes::copy_from_slice(payload)) {
            Decoded::Verified(c) if !c.is_terminal() && c.index == self.target => {
                self.remaining -= 1;
                self.corrupted.fetch_add(1, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }
}

impl<S: AsyncWrite + Unpin> CorruptingStream<S> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.outgoing.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.outgoing))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.outgoing.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CorruptingStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CorruptingStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        this.incoming.extend_from_slice(buf);
        this.split_frames();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

// ── Self-checks ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_corrupts_only_the_target_chunk() {
    use ferry_core::frame::FramedConnection;

    let (a, b) = tokio::io::duplex(64 * 1024);
    let wrapper = CorruptingStream::new(a, 1, 1);
    let count = wrapper.corruptions();
    let mut tx = FramedConnection::new(wrapper);
    let mut rx = FramedConnection::new(b);

    for index in [0u64, 1, 1, 2] {
        tx.write_frame(&chunk::encode(index, b"some payload bytes")).await.unwrap();
    }
    tx.write_frame(b"u").await.unwrap();

    let mut verdicts = Vec::new();
    for _ in 0..4 {
        let frame = rx.read_frame().await.unwrap().unwrap();
        verdicts.push(matches!(chunk::decode(frame), Decoded::Verified(_)));
    }
    assert_eq!(verdicts, vec![true, false, true, true]);
    assert_eq!(&rx.read_frame().await.unwrap().unwrap()[..], b"u");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
