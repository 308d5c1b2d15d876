//! ferryd — the file-transfer daemon: per-connection command dispatch and the
//! TCP accept loop that feeds it.

pub mod dispatch;
pub mod listener;

pub use dispatch::{Dispatcher, SessionState, SessionSummary};
pub use listener::{ActiveConnections, ConnectionManager, ConnectionObserver, TracingConnectionObserver};
