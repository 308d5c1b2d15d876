//! Transfer engine — moves one file across a link as acknowledged chunks.
//!
//! Send side: the source is read in windows of `chunk_size` bytes. Each data
//! chunk gets its own sender task; a semaphore caps how many exist at once and
//! reading waits for a free slot. A sender owns the link for a full round
//! trip, retries up to `max_attempts`, and reports through the observer.
//! Once every data sender has finished, the terminal chunk goes out through
//! the same path and the receiver's status frame is read.
//!
//! Receive side: a single loop verifies chunks as they arrive, answers ACK or
//! NAK, and buffers payloads by index until the terminal chunk. The file is
//! written once, in index order, and the outcome is sent back as a status
//! frame.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use bytes::Bytes;
use ferry_core::chunk::{self, Chunk, Decoded, Reassembly, DEFAULT_CHUNK_SIZE};
use ferry_core::config::TransferConfig;
use ferry_core::frame::{FrameError, MAX_FRAME_SIZE};
use ferry_core::message::{Acknowledgement, TransferStatus, WireError, ACK, NAK};
use ferry_core::retry::{AttemptFailure, Next, RoundTrip, DEFAULT_MAX_ATTEMPTS};

use crate::link::{Link, Reply};
use crate::observer::TransferObserver;
use crate::storage::{write_atomic, StorageError};

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub workers: usize,
    pub max_attempts: u8,
    pub ack_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 4,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ack_timeout: Duration::from_secs(10),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl From<&TransferConfig> for TransferSettings {
    fn from(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            workers: config.workers,
            max_attempts: config.max_attempts,
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            max_frame_size: config.max_frame_size,
        }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub name: String,
    pub bytes: u64,
    /// Data chunks, terminal excluded.
    pub chunks: u64,
    /// Sender: attempts beyond the first. Receiver: chunks answered with NAK.
    pub retries: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transport failure: {0}")]
    Transport(#[source] std::io::Error),

    #[error("framing error: {0}")]
    Framing(#[source] FrameError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("chunks {failed:?} failed after every attempt")]
    RetryExhausted { failed: Vec<u64> },

    #[error("receiver did not store the file: {0:?}")]
    Incomplete(TransferStatus),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("refused by peer: {0}")]
    Refused(String),
}

impl TransferError {
    /// Fatal errors leave the connection unusable; the rest end only the
    /// current transfer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::Transport(_) | TransferError::Framing(_) | TransferError::Protocol(_)
        )
    }
}

impl From<FrameError> for TransferError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(io) => TransferError::Transport(io),
            other => TransferError::Framing(other),
        }
    }
}

impl From<WireError> for TransferError {
    fn from(e: WireError) -> Self {
        TransferError::Protocol(e.to_string())
    }
}

// ── Send ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ChunkOutcome {
    index: u64,
    acked: bool,
    attempts: u8,
}

/// Stream `size` bytes from `source` to the peer as chunks.
///
/// The receiver must already have accepted the transfer. Returns once the
/// receiver has reported its status.
pub async fn send_file<S, R>(
    link: &Arc<Link<S>>,
    name: &str,
    source: R,
    size: u64,
    settings: &TransferSettings,
    observer: &Arc<dyn TransferObserver>,
) -> Result<TransferReport, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin,
{
    let result = send_chunks(link, name, source, size, settings, observer).await;
    finish(observer.as_ref(), name, &result);
    result
}

async fn send_chunks<S, R>(
    link: &Arc<Link<S>>,
    name: &str,
    mut source: R,
    size: u64,
    settings: &TransferSettings,
    observer: &Arc<dyn TransferObserver>,
) -> Result<TransferReport, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin,
{
    let chunk_size = settings.chunk_size.max(1);
    let pool = Arc::new(Semaphore::new(settings.workers.max(1)));
    let mut senders = JoinSet::new();

    let mut count = 0u64;
    let mut sent = 0u64;
    let mut read_error = None;

    while sent < size {
        let permit = pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::Protocol("worker pool closed".into()))?;

        let limit = (size - sent).min(chunk_size as u64) as usize;
        let payload = match read_window(&mut source, limit).await {
            Ok(p) if p.is_empty() => break,
            Ok(p) => p,
            Err(e) => {
                // Finish the exchange so the peer leaves its receive loop.
                tracing::warn!(name, error = %e, offset = sent, "source read failed");
                read_error = Some(e);
                break;
            }
        };
        sent += payload.len() as u64;

        let chunk = Chunk::new(count, payload);
        let link = link.clone();
        let observer = observer.clone();
        let (attempts, timeout) = (settings.max_attempts, settings.ack_timeout);
        senders.spawn(async move {
            let _permit = permit;
            send_chunk(&link, chunk, attempts, timeout, observer.as_ref()).await
        });
        count += 1;
    }

    let mut failed = Vec::new();
    let mut retries = 0u64;
    let mut fatal = None;
    while let Some(joined) = senders.join_next().await {
        match joined {
            Ok(Ok(outcome)) => {
                retries += u64::from(outcome.attempts.saturating_sub(1));
                if !outcome.acked {
                    failed.push(outcome.index);
                }
            }
            Ok(Err(e)) => {
                fatal.get_or_insert(e);
            }
            Err(e) => {
                fatal.get_or_insert(TransferError::Protocol(format!("chunk sender aborted: {e}")));
            }
        }
    }
    if let Some(e) = fatal {
        return Err(e);
    }
    failed.sort_unstable();

    let terminal = send_chunk(
        link,
        Chunk::terminal(count),
        settings.max_attempts,
        settings.ack_timeout,
        observer.as_ref(),
    )
    .await?;
    if !terminal.acked {
        return Err(TransferError::Protocol(format!(
            "terminal chunk not acknowledged after {} attempts",
            terminal.attempts
        )));
    }

    let status = TransferStatus::decode(link.recv_expected("transfer status").await?)?;

    if let Some(e) = read_error {
        return Err(TransferError::Storage(e.into()));
    }
    if !failed.is_empty() {
        return Err(TransferError::RetryExhausted { failed });
    }
    if !status.is_stored() {
        return Err(TransferError::Incomplete(status));
    }

    Ok(TransferReport {
        name: name.to_string(),
        bytes: sent,
        chunks: count,
        retries,
    })
}

/// One chunk's round trips, up to `max_attempts`.
async fn send_chunk<S>(
    link: &Link<S>,
    chunk: Chunk,
    max_attempts: u8,
    ack_timeout: Duration,
    observer: &dyn TransferObserver,
) -> Result<ChunkOutcome, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let index = chunk.index;
    let frame = chunk.encode();
    let mut rt = RoundTrip::new(max_attempts);

    while let Some(attempt) = rt.begin_attempt() {
        observer.chunk_attempt(index, attempt);

        let failure = match link.round_trip(&frame, ack_timeout).await {
            Ok(Reply::Frame(reply)) => match Acknowledgement::parse(reply) {
                Acknowledgement::Ack => {
                    rt.acknowledged();
                    observer.chunk_acked(index, attempt);
                    return Ok(ChunkOutcome {
                        index,
                        acked: true,
                        attempts: attempt,
                    });
                }
                Acknowledgement::Nak => AttemptFailure::Nacked,
                Acknowledgement::Unexpected(other) => AttemptFailure::UnexpectedReply(other.to_vec()),
            },
            Ok(Reply::TimedOut) => AttemptFailure::TimedOut,
            Err(e) => {
                observer.chunk_rejected(index, attempt, &AttemptFailure::Transport(e.to_string()));
                return Err(e.into());
            }
        };

        observer.chunk_rejected(index, attempt, &failure);
        if rt.attempt_failed() == Next::GiveUp {
            observer.chunk_failed(index, rt.attempts());
        }
    }

    Ok(ChunkOutcome {
        index,
        acked: false,
        attempts: rt.attempts(),
    })
}

/// Read up to `limit` bytes, stopping early only at end of input.
async fn read_window<R>(source: &mut R, limit: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; limit];
    let mut filled = 0;
    while filled < limit {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

// ── Receive ───────────────────────────────────────────────────────────────────

/// Receive chunks until the terminal, then write them to `dest`.
///
/// The sender must already have been told to start. `expected_size` is the
/// size announced for the transfer; a different byte total is reported back
/// as a size mismatch and nothing is written.
pub async fn receive_file<S>(
    link: &Link<S>,
    name: &str,
    expected_size: u64,
    dest: &Path,
    observer: &dyn TransferObserver,
) -> Result<TransferReport, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = receive_chunks(link, name, expected_size, dest, observer).await;
    finish(observer, name, &result);
    result
}

async fn receive_chunks<S>(
    link: &Link<S>,
    name: &str,
    expected_size: u64,
    dest: &Path,
    observer: &dyn TransferObserver,
) -> Result<TransferReport, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut received = Reassembly::new();
    let mut corrupted = 0u64;
    // Byte total once the sender has gone past `expected_size`. From then on
    // payloads are counted, not buffered.
    let mut overflow: Option<u64> = None;

    let count = loop {
        let frame = link.recv_expected("chunk").await?;
        match chunk::decode(frame) {
            Decoded::Verified(c) if c.is_terminal() => {
                link.send(ACK).await?;
                break c.index;
            }
            Decoded::Verified(c) => {
                observer.chunk_received(c.index, &c.checksum, c.payload.len());
                link.send(ACK).await?;
                let len = c.payload.len() as u64;
                if let Some(total) = overflow.as_mut() {
                    *total += len;
                } else if received.bytes_after(c.index, len) > expected_size {
                    tracing::warn!(name, expected_size, index = c.index, "sender exceeded announced size");
                    overflow = Some(received.bytes() + len);
                    received = Reassembly::new();
                } else {
                    received.insert(c.index, c.payload);
                }
            }
            Decoded::Corrupted { index } => {
                corrupted += 1;
                observer.chunk_corrupted(index);
                link.send(NAK).await?;
            }
        }
    };

    let stray = received.truncate(count);
    if !stray.is_empty() {
        tracing::warn!(name, ?stray, "discarding chunks past the terminal index");
    }

    let actual = overflow.unwrap_or_else(|| received.bytes());
    let mut storage_error = None;
    let status = match received.into_ordered(count) {
        _ if overflow.is_some() => TransferStatus::SizeMismatch {
            expected: expected_size,
            actual,
        },
        Err(missing) => TransferStatus::Missing(missing),
        Ok(_) if actual != expected_size => TransferStatus::SizeMismatch {
            expected: expected_size,
            actual,
        },
        Ok(chunks) => match write_atomic(dest, &chunks).await {
            Ok(()) => TransferStatus::Stored,
            Err(e) => {
                let status = TransferStatus::StorageFailed(e.to_string());
                storage_error = Some(e);
                status
            }
        },
    };

    link.send(&status.encode()).await?;

    match (status, storage_error) {
        (_, Some(e)) => Err(TransferError::Storage(e)),
        (TransferStatus::Stored, None) => Ok(TransferReport {
            name: name.to_string(),
            bytes: actual,
            chunks: count,
            retries: corrupted,
        }),
        (other, None) => Err(TransferError::Incomplete(other)),
    }
}

fn finish(observer: &dyn TransferObserver, name: &str, result: &Result<TransferReport, TransferError>) {
    match result {
        Ok(report) => observer.transfer_finished(name, Ok(report)),
        Err(e) => observer.transfer_finished(name, Err(e.to_string().as_str())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
