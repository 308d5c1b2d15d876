//! Command dispatcher — the server side of one session.
//!
//! ```text
//! WaitCommand ──u──▶ Uploading   ──┐
//!             ──d──▶ Downloading ──┤
//!             ──r──▶ Listing     ──┼──▶ WaitCommand
//!             ──x──▶ Deleting    ──┘
//! ```
//!
//! Commands run strictly one after another. End-of-stream or an unknown tag
//! while waiting for a command ends the session cleanly; end-of-stream
//! anywhere else is a transport error. A command that fails without
//! breaking the connection is logged and the session moves on.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use ferry_core::message::{decode_name, decode_size, CommandTag, ListHeader, OpenReply, ERR, OK};
use ferry_services::storage::{Storage, StorageError};
use ferry_services::transfer::{receive_file, send_file, TransferError, TransferSettings};
use ferry_services::{Link, TransferObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    WaitCommand,
    Uploading,
    Downloading,
    Listing,
    Deleting,
}

/// Totals for one finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub commands: u64,
    pub failed: u64,
}

pub struct Dispatcher<S> {
    link: Arc<Link<S>>,
    peer: String,
    storage: Arc<Storage>,
    settings: TransferSettings,
    observer: Arc<dyn TransferObserver>,
    state: SessionState,
}

impl<S> Dispatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        storage: Arc<Storage>,
        settings: TransferSettings,
        observer: Arc<dyn TransferObserver>,
    ) -> Self {
        Self {
            link: Arc::new(Link::with_max_frame_size(stream, settings.max_frame_size)),
            peer: peer.into(),
            storage,
            settings,
            observer,
            state: SessionState::WaitCommand,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve commands until the peer leaves or the connection breaks.
    pub async fn run(mut self) -> Result<SessionSummary, TransferError> {
        let mut summary = SessionSummary::default();

        loop {
            self.state = SessionState::WaitCommand;

            let Some(frame) = self.link.recv().await? else {
                tracing::info!(peer = %self.peer, "peer closed session");
                return Ok(summary);
            };
            let tag = match CommandTag::from_frame(&frame) {
                Ok(tag) => tag,
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "unrecognized command, closing session");
                    return Ok(summary);
                }
            };

            summary.commands += 1;
            tracing::debug!(peer = %self.peer, command = tag.name(), "command received");

            let result = match tag {
                CommandTag::Upload => {
                    self.state = SessionState::Uploading;
                    self.upload().await
                }
                CommandTag::Download => {
                    self.state = SessionState::Downloading;
                    self.download().await
                }
                CommandTag::List => {
                    self.state = SessionState::Listing;
                    self.list().await
                }
                CommandTag::Delete => {
                    self.state = SessionState::Deleting;
                    self.delete().await
                }
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    tracing::warn!(peer = %self.peer, command = tag.name(), error = %e, "session aborted");
                    return Err(e);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(peer = %self.peer, command = tag.name(), error = %e, "command failed");
                }
            }
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    async fn upload(&self) -> Result<(), TransferError> {
        let name = self.link.recv_expected("file name").await?;
        let size = decode_size(&self.link.recv_expected("file size").await?)?;

        let (name, path) = match self.target(&name) {
            Ok(target) => target,
            Err(reason) => return self.refuse(reason).await,
        };

        self.link.send(&OpenReply::Accepted { size }.encode()).await?;
        tracing::info!(peer = %self.peer, name = %name, size, "upload started");
        receive_file(&self.link, &name, size, &path, self.observer.as_ref()).await?;
        Ok(())
    }

    async fn download(&self) -> Result<(), TransferError> {
        let name = self.link.recv_expected("file name").await?;
        let name = match decode_name(&name) {
            Ok(n) => n,
            Err(e) => return self.refuse(e.to_string()).await,
        };

        let (file, size) = match self.storage.open(&name).await {
            Ok(opened) => opened,
            Err(e) => return self.refuse(e.to_string()).await,
        };

        self.link.send(&OpenReply::Accepted { size }.encode()).await?;
        tracing::info!(peer = %self.peer, name = %name, size, "download started");
        send_file(&self.link, &name, file, size, &self.settings, &self.observer).await?;
        Ok(())
    }

    async fn list(&self) -> Result<(), TransferError> {
        let entries = match self.storage.list().await {
            Ok(entries) => entries,
            Err(e) => {
                self.link.send(&ListHeader::Failed.encode()).await?;
                return Err(e.into());
            }
        };

        let mut frames = Vec::with_capacity(entries.len() + 1);
        frames.push(ListHeader::Count(entries.len() as u32).encode());
        frames.extend(entries.iter().map(|e| e.encode()));
        self.link.send_all(&frames).await?;

        tracing::debug!(peer = %self.peer, count = entries.len(), "listed files");
        Ok(())
    }

    async fn delete(&self) -> Result<(), TransferError> {
        let name = self.link.recv_expected("file name").await?;
        let result = match decode_name(&name) {
            Ok(name) => self.storage.delete(&name).await,
            Err(e) => Err(StorageError::InvalidName(e.to_string())),
        };

        match result {
            Ok(()) => {
                self.link.send(OK).await?;
                tracing::info!(peer = %self.peer, name = %String::from_utf8_lossy(&name), "deleted");
                Ok(())
            }
            Err(e) => {
                self.link.send(ERR).await?;
                Err(e.into())
            }
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn target(&self, name: &[u8]) -> Result<(String, PathBuf), String> {
        let name = decode_name(name).map_err(|e| e.to_string())?;
        let path = self.storage.resolve(&name).map_err(|e| e.to_string())?;
        Ok((name, path))
    }

    async fn refuse(&self, reason: String) -> Result<(), TransferError> {
        self.link.send(&OpenReply::Refused(reason.clone()).encode()).await?;
        Err(TransferError::Refused(reason))
    }
}
