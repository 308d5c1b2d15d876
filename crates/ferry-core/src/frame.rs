//! Frame codec — length-prefixed framing over one stream connection.
//!
//! ```text
//! +-------------------+-----------------------------+
//! | length (u32, BE)  | payload (length bytes)      |
//! +-------------------+-----------------------------+
//! ```
//!
//! A frame is the atomic wire unit. A payload is never handed out until every
//! declared byte has arrived. A stream that closes between the first header
//! byte and the last payload byte is a framing error, not end-of-stream: the
//! byte stream is desynchronized and nothing after it can be trusted.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Default upper bound on a single frame payload (64 MiB).
/// A declared length above the bound is rejected before allocating.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const INITIAL_BUFFER: usize = 8 * 1024;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying connection failed.
    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),

    /// The connection closed part-way through a frame.
    #[error("stream closed mid-frame after {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },

    #[error("frame length {0} exceeds maximum {1}")]
    TooLarge(usize, usize),
}

impl FrameError {
    /// True for connection-level failures, false for layout violations.
    pub fn is_transport(&self) -> bool {
        matches!(self, FrameError::Io(_))
    }
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max {
        return Err(FrameError::TooLarge(payload.len(), max));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| FrameError::TooLarge(payload.len(), u32::MAX as usize))?;

    writer.write_all(&len.to_be_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

// ── FramedConnection ──────────────────────────────────────────────────────────

/// A stream connection with a frame-aware read buffer.
///
/// `read_frame` is cancel-safe: bytes already pulled off the stream stay in
/// the buffer when the future is dropped, so a timed-out read resumes on the
/// same frame boundary next time.
#[derive(Debug)]
pub struct FramedConnection<S> {
    stream: S,
    buffer: BytesMut,
    max_frame_size: usize,
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_size(stream, MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(stream: S, max_frame_size: usize) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER),
            max_frame_size,
        }
    }

    /// Read the next complete frame.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(self.truncated());
            }
        }
    }

    /// Write one frame and flush it.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        write_frame(&mut self.stream, payload, self.max_frame_size).await
    }

    /// Split one frame off the front of the buffer if it is complete.
    fn parse_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buffer.len() < LENGTH_PREFIX {
            return Ok(None);
        }
        let len = self.declared_len();
        if len > self.max_frame_size {
            return Err(FrameError::TooLarge(len, self.max_frame_size));
        }

        let total = LENGTH_PREFIX + len;
        if self.buffer.len() < total {
            self.buffer.reserve(total - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(LENGTH_PREFIX);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    fn declared_len(&self) -> usize {
        let b = &self.buffer;
        u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
    }

    fn truncated(&self) -> FrameError {
        let expected = if self.buffer.len() >= LENGTH_PREFIX {
            LENGTH_PREFIX + self.declared_len()
        } else {
            LENGTH_PREFIX
        };
        FrameError::Truncated {
            expected,
            received: self.buffer.len(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
