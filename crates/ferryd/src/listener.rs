//! Connection manager — accepts TCP connections and gives each one its own
//! dispatcher task.
//!
//! Sessions share nothing but the storage root. The number of live sessions
//! is kept in an atomic counter and reported to a [`ConnectionObserver`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::broadcast;

use ferry_services::{Storage, TracingObserver, TransferObserver, TransferSettings};

use crate::dispatch::Dispatcher;

pub trait ConnectionObserver: Send + Sync {
    fn connection_opened(&self, peer: SocketAddr, active: usize);
    fn connection_closed(&self, peer: SocketAddr, active: usize);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConnectionObserver;

impl ConnectionObserver for TracingConnectionObserver {
    fn connection_opened(&self, peer: SocketAddr, active: usize) {
        tracing::info!(%peer, active, "connection opened");
    }

    fn connection_closed(&self, peer: SocketAddr, active: usize) {
        tracing::info!(%peer, active, "connection closed");
    }
}

/// Read-only handle on the live session count.
#[derive(Debug, Clone)]
pub struct ActiveConnections(Arc<AtomicUsize>);

impl ActiveConnections {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// Counts one session for as long as it is alive.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    observer: Arc<dyn ConnectionObserver>,
    peer: SocketAddr,
}

impl ActiveGuard {
    fn open(active: Arc<AtomicUsize>, observer: Arc<dyn ConnectionObserver>, peer: SocketAddr) -> Self {
        let now = active.fetch_add(1, Ordering::AcqRel) + 1;
        observer.connection_opened(peer, now);
        Self {
            active,
            observer,
            peer,
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::AcqRel) - 1;
        self.observer.connection_closed(self.peer, now);
    }
}

pub struct ConnectionManager {
    listener: TcpListener,
    storage: Arc<Storage>,
    settings: TransferSettings,
    transfer_observer: Arc<dyn TransferObserver>,
    connection_observer: Arc<dyn ConnectionObserver>,
    active: Arc<AtomicUsize>,
    shutdown: broadcast::Receiver<()>,
}

impl ConnectionManager {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        storage: Storage,
        settings: TransferSettings,
        shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            storage: Arc::new(storage),
            settings,
            transfer_observer: Arc::new(TracingObserver),
            connection_observer: Arc::new(TracingConnectionObserver),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown,
        })
    }

    pub fn with_transfer_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.transfer_observer = observer;
        self
    }

    pub fn with_connection_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.connection_observer = observer;
        self
    }

    /// The bound address; useful after binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn active_connections(&self) -> ActiveConnections {
        ActiveConnections(self.active.clone())
    }

    /// Accept until shutdown. Sessions already running are left to finish.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("connection manager shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "set_nodelay failed");
                    }

                    let guard = ActiveGuard::open(self.active.clone(), self.connection_observer.clone(), peer);
                    let dispatcher = Dispatcher::new(
                        stream,
                        peer.to_string(),
                        self.storage.clone(),
                        self.settings.clone(),
                        self.transfer_observer.clone(),
                    );

                    tokio::spawn(async move {
                        let _guard = guard;
                        match dispatcher.run().await {
                            Ok(summary) => tracing::info!(
                                %peer,
                                commands = summary.commands,
                                failed = summary.failed,
                                "session finished"
                            ),
                            Err(e) => tracing::warn!(%peer, error = %e, "session ended with error"),
                        }
                    });
                }
            }
        }
    }
}
