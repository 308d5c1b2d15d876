//! Transfer observer — how chunk-level progress is reported.
//!
//! The engine calls these hooks and never logs retry decisions itself. The
//! default implementation writes `tracing` events; tests inject their own to
//! count attempts.

use ferry_core::checksum::Checksum;
use ferry_core::retry::AttemptFailure;

use crate::transfer::TransferReport;

pub trait TransferObserver: Send + Sync {
    /// Sender: attempt `attempt` (1-based) of chunk `index` is going out.
    fn chunk_attempt(&self, _index: u64, _attempt: u8) {}

    /// Sender: the receiver acknowledged chunk `index`.
    fn chunk_acked(&self, _index: u64, _attempt: u8) {}

    /// Sender: one attempt did not end in an acknowledgement.
    fn chunk_rejected(&self, _index: u64, _attempt: u8, _failure: &AttemptFailure) {}

    /// Sender: chunk `index` used up its attempts.
    fn chunk_failed(&self, _index: u64, _attempts: u8) {}

    /// Receiver: chunk `index` verified and buffered.
    fn chunk_received(&self, _index: u64, _checksum: &Checksum, _len: usize) {}

    /// Receiver: a chunk failed verification and was answered with NAK.
    fn chunk_corrupted(&self, _index: Option<u64>) {}

    /// Either side: the transfer reached a final outcome.
    fn transfer_finished(&self, _name: &str, _result: Result<&TransferReport, &str>) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn chunk_attempt(&self, index: u64, attempt: u8) {
        tracing::trace!(index, attempt, "sending chunk");
    }

    fn chunk_acked(&self, index: u64, attempt: u8) {
        tracing::debug!(index, attempt, "chunk acknowledged");
    }

    fn chunk_rejected(&self, index: u64, attempt: u8, failure: &AttemptFailure) {
        tracing::warn!(index, attempt, reason = %failure, "chunk attempt failed");
    }

    fn chunk_failed(&self, index: u64, attempts: u8) {
        tracing::error!(index, attempts, "chunk failed, giving up");
    }

    fn chunk_received(&self, index: u64, checksum: &Checksum, len: usize) {
        tracing::trace!(index, len, checksum = hex::encode(&checksum[..8]), "chunk verified");
    }

    fn chunk_corrupted(&self, index: Option<u64>) {
        tracing::warn!(?index, "chunk failed verification, sent NAK");
    }

    fn transfer_finished(&self, name: &str, result: Result<&TransferReport, &str>) {
        match result {
            Ok(report) => tracing::info!(
                name,
                bytes = report.bytes,
                chunks = report.chunks,
                retries = report.retries,
                "transfer complete"
            ),
            Err(reason) => tracing::warn!(name, reason, "transfer failed"),
        }
    }
}
