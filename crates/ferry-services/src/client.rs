//! Client session — the caller side of upload, download, list and delete.
//!
//! One client wraps one connection. Commands run one at a time (`&mut self`)
//! and a failed transfer leaves the session usable; only transport and
//! framing errors end it.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

use ferry_core::message::{Command, FileEntry, ListHeader, OpenReply, ERR, OK};

use crate::link::Link;
use crate::observer::{TracingObserver, TransferObserver};
use crate::storage::StorageError;
use crate::transfer::{receive_file, send_file, TransferError, TransferReport, TransferSettings};

/// Upper bound on the list buffer reserved before any entry has arrived.
const LIST_PREALLOC: u32 = 1024;

pub struct Client<S> {
    link: Arc<Link<S>>,
    settings: TransferSettings,
    observer: Arc<dyn TransferObserver>,
}

impl Client<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs, settings: TransferSettings) -> Result<Self, TransferError> {
        let stream = TcpStream::connect(addr).await.map_err(TransferError::Transport)?;
        stream.set_nodelay(true).map_err(TransferError::Transport)?;
        Ok(Self::new(stream, settings))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, settings: TransferSettings) -> Self {
        Self {
            link: Arc::new(Link::with_max_frame_size(stream, settings.max_frame_size)),
            settings,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Send the local file at `local` and store it remotely as `remote`.
    pub async fn upload(&mut self, local: &Path, remote: &str) -> Result<TransferReport, TransferError> {
        let file = tokio::fs::File::open(local).await.map_err(StorageError::from)?;
        let size = file.metadata().await.map_err(StorageError::from)?.len();

        let command = Command::Upload {
            name: remote.to_string(),
            size,
        };
        self.link.send_all(&command.frames()).await?;

        match OpenReply::decode(self.link.recv_expected("open reply").await?)? {
            OpenReply::Accepted { size: echoed } if echoed == size => {}
            OpenReply::Accepted { size: echoed } => {
                return Err(TransferError::Protocol(format!(
                    "server accepted {echoed} bytes, announced {size}"
                )))
            }
            OpenReply::Refused(reason) => return Err(TransferError::Refused(reason)),
        }

        tracing::info!(remote, size, "upload accepted");
        send_file(&self.link, remote, file, size, &self.settings, &self.observer).await
    }

    /// Fetch `remote` and write it to `local`.
    pub async fn download(&mut self, remote: &str, local: &Path) -> Result<TransferReport, TransferError> {
        let command = Command::Download {
            name: remote.to_string(),
        };
        self.link.send_all(&command.frames()).await?;

        let size = match OpenReply::decode(self.link.recv_expected("open reply").await?)? {
            OpenReply::Accepted { size } => size,
            OpenReply::Refused(reason) => return Err(TransferError::Refused(reason)),
        };

        tracing::info!(remote, size, "download accepted");
        receive_file(&self.link, remote, size, local, self.observer.as_ref()).await
    }

    pub async fn list(&mut self) -> Result<Vec<FileEntry>, TransferError> {
        self.link.send_all(&Command::List.frames()).await?;

        let count = match ListHeader::decode(&self.link.recv_expected("list header").await?)? {
            ListHeader::Count(n) => n,
            ListHeader::Failed => return Err(TransferError::Refused("server could not list files".into())),
        };

        // The count is the peer's claim; grow as entries actually arrive.
        let mut entries = Vec::with_capacity(count.min(LIST_PREALLOC) as usize);
        for _ in 0..count {
            entries.push(FileEntry::decode(self.link.recv_expected("list entry").await?)?);
        }
        Ok(entries)
    }

    pub async fn delete(&mut self, name: &str) -> Result<(), TransferError> {
        let command = Command::Delete {
            name: name.to_string(),
        };
        self.link.send_all(&command.frames()).await?;

        let reply = self.link.recv_expected("delete reply").await?;
        match &reply[..] {
            OK => Ok(()),
            ERR => Err(TransferError::Refused(format!("could not delete {name}"))),
            other => Err(TransferError::Protocol(format!(
                "unexpected delete reply ({} bytes)",
                other.len()
            ))),
        }
    }
}
