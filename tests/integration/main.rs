//! Ferry integration test harness.
//!
//! Every test starts its own daemon in-process on 127.0.0.1:0 with a fresh
//! storage root, and talks to it over real TCP loopback:
//!
//!   cargo test --test integration
//!
//! Nothing is shared between tests; each server shuts down when its
//! `TestServer` is dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use ferry_core::retry::AttemptFailure;
use ferry_services::{Client, Storage, TransferObserver, TransferSettings};
use ferryd::{ActiveConnections, ConnectionManager};

mod fault;
mod files;
mod sessions;

// ── Observer ──────────────────────────────────────────────────────────────────

/// Records every chunk attempt so tests can count retries exactly.
#[derive(Default)]
pub struct RecordingObserver {
    attempts: Mutex<HashMap<u64, u8>>,
    rejections: Mutex<Vec<(u64, AttemptFailure)>>,
}

impl RecordingObserver {
    /// Highest attempt number seen for `index` (0 if never sent).
    pub fn attempts_for(&self, index: u64) -> u8 {
        self.attempts.lock().unwrap().get(&index).copied().unwrap_or(0)
    }

    pub fn rejections(&self) -> Vec<(u64, AttemptFailure)> {
        self.rejections.lock().unwrap().clone()
    }
}

impl TransferObserver for RecordingObserver {
    fn chunk_attempt(&self, index: u64, attempt: u8) {
        let mut attempts = self.attempts.lock().unwrap();
        let seen = attempts.entry(index).or_default();
        *seen = (*seen).max(attempt);
    }

    fn chunk_rejected(&self, index: u64, _attempt: u8, failure: &AttemptFailure) {
        self.rejections.lock().unwrap().push((index, failure.clone()));
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct TestServer {
    pub addr: SocketAddr,
    pub root: TempDir,
    pub observer: Arc<RecordingObserver>,
    pub active: ActiveConnections,
    shutdown: broadcast::Sender<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(TransferSettings::default()).await
    }

    pub async fn start_with(settings: TransferSettings) -> Self {
        let root = tempfile::tempdir().unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let (shutdown, _) = broadcast::channel(1);

        let manager = ConnectionManager::bind(
            "127.0.0.1:0",
            Storage::new(root.path()),
            settings,
            shutdown.subscribe(),
        )
        .await
        .unwrap()
        .with_transfer_observer(observer.clone());

        let addr = manager.local_addr().unwrap();
        let active = manager.active_connections();
        tokio::spawn(manager.run());

        Self {
            addr,
            root,
            observer,
            active,
            shutdown,
        }
    }

    pub async fn client(&self) -> Client<TcpStream> {
        Client::connect(self.addr, client_settings()).await.unwrap()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn stored(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path(name)).ok()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub const MIB: usize = 1024 * 1024;

pub fn client_settings() -> TransferSettings {
    TransferSettings {
        ack_timeout: Duration::from_secs(10),
        ..TransferSettings::default()
    }
}

/// Deterministic, non-repeating-per-chunk test bytes.
pub fn sample(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64).wrapping_mul(2_654_435_761) >> 13) as u8 ^ seed)
        .collect()
}

/// Write `data` to `dir/name` and return the path.
pub fn local_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
