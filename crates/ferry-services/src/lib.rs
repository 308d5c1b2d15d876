//! ferry-services — the transfer engine and everything it drives: the shared
//! connection link, server-side storage, observers and the client session.

pub mod client;
pub mod link;
pub mod observer;
pub mod storage;
pub mod transfer;

pub use client::Client;
pub use link::{Link, Reply};
pub use observer::{TracingObserver, TransferObserver};
pub use storage::{Storage, StorageError};
pub use transfer::{receive_file, send_file, TransferError, TransferReport, TransferSettings};
