//! ferry-core — framing, chunk codec, wire messages and retry bookkeeping.
//! All other Ferry crates depend on this one.

pub mod checksum;
pub mod chunk;
pub mod config;
pub mod frame;
pub mod message;
pub mod retry;

pub use chunk::{Chunk, Decoded};
pub use config::FerryConfig;
pub use frame::{FrameError, FramedConnection};
pub use message::{Command, CommandTag, FileEntry, OpenReply, TransferStatus, WireError};
