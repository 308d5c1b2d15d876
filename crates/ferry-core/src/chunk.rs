//! Chunk codec — indexed, checksummed slices of a file.
//!
//! A chunk frame payload is a fixed 40-byte header followed by the data:
//!
//! ```text
//! +----------------------+------------------+------------------+
//! | checksum (32 bytes)  | index (u64, BE)  | payload          |
//! +----------------------+------------------+------------------+
//! ```
//!
//! Fields are split by position, never by searching for a delimiter, so the
//! payload may contain any bytes at all. An empty payload is the terminal
//! chunk; its index is the number of data chunks that precede it.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::checksum::{checksum, verify, Checksum};

/// Default window the sender reads a file in (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Size of the fixed chunk header.
pub const HEADER_LEN: usize = 40;

// ── Header ────────────────────────────────────────────────────────────────────

/// Fixed-layout chunk header. Every field is byte-aligned, so the struct has
/// no padding and maps directly onto the wire.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ChunkHeader {
    /// BLAKE3 digest of the payload bytes.
    pub checksum: [u8; 32],
    /// Position of the chunk in the file, starting at 0.
    pub index: U64<BigEndian>,
}

assert_eq_size!(ChunkHeader, [u8; HEADER_LEN]);

// ── Chunk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u64,
    pub checksum: Checksum,
    pub payload: Bytes,
}

impl Chunk {
    /// Build a chunk, computing the checksum of `payload`.
    pub fn new(index: u64, payload: Bytes) -> Self {
        Self {
            index,
            checksum: checksum(&payload),
            payload,
        }
    }

    /// The end-of-data sentinel that follows `count` data chunks.
    pub fn terminal(count: u64) -> Self {
        Self::new(count, Bytes::new())
    }

    pub fn is_terminal(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn encode(&self) -> Bytes {
        encode_with_checksum(&self.checksum, self.index, &self.payload)
    }
}

// ── Encode / decode ───────────────────────────────────────────────────────────

/// Encode a chunk frame payload, computing the checksum.
pub fn encode(index: u64, payload: &[u8]) -> Bytes {
    encode_with_checksum(&checksum(payload), index, payload)
}

/// Encode a chunk frame payload with a precomputed checksum.
pub fn encode_with_checksum(checksum: &Checksum, index: u64, payload: &[u8]) -> Bytes {
    let header = ChunkHeader {
        checksum: *checksum,
        index: U64::new(index),
    };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Result of decoding a chunk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The checksum matched; the payload may be trusted.
    Verified(Chunk),
    /// The payload did not match its checksum, or the frame was too short to
    /// carry a header. `index` is the claimed index when one could be read.
    Corrupted { index: Option<u64> },
}

/// Split a chunk frame by its fixed-width fields and verify the payload.
pub fn decode(frame: Bytes) -> Decoded {
    let header = match ChunkHeader::read_from_prefix(&frame[..]) {
        Some(h) => h,
        None => return Decoded::Corrupted { index: None },
    };
    let index = header.index.get();
    let payload = frame.slice(HEADER_LEN..);

    if !verify(&payload, &header.checksum) {
        return Decoded::Corrupted { index: Some(index) };
    }

    Decoded::Verified(Chunk {
        index,
        checksum: header.checksum,
        payload,
    })
}

// ── Reassembly ────────────────────────────────────────────────────────────────

/// Verified payloads collected for one transfer, keyed by index.
///
/// Arrival order is irrelevant: materialization always walks indices in
/// ascending order.
#[derive(Debug, Default)]
pub struct Reassembly {
    chunks: BTreeMap<u64, Bytes>,
    bytes: u64,
}

impl Reassembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a verified payload. A repeated index replaces the earlier copy.
    pub fn insert(&mut self, index: u64, payload: Bytes) {
        self.bytes += payload.len() as u64;
        if let Some(old) = self.chunks.insert(index, payload) {
            self.bytes -= old.len() as u64;
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total buffered payload bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// What `bytes()` would be after inserting `len` bytes at `index`.
    pub fn bytes_after(&self, index: u64, len: u64) -> u64 {
        let replaced = self.chunks.get(&index).map_or(0, |old| old.len() as u64);
        self.bytes - replaced + len
    }

    /// Indices in 0..count that have no verified payload.
    pub fn missing(&self, count: u64) -> Vec<u64> {
        (0..count).filter(|i| !self.chunks.contains_key(i)).collect()
    }

    /// Drop payloads at or beyond `count`; they cannot belong to the file.
    /// Returns the dropped indices.
    pub fn truncate(&mut self, count: u64) -> Vec<u64> {
        let extra = self.chunks.split_off(&count);
        for payload in extra.values() {
            self.bytes -= payload.len() as u64;
        }
        extra.into_keys().collect()
    }

    /// Payloads in index order, or the missing indices if 0..count is incomplete.
    pub fn into_ordered(mut self, count: u64) -> Result<Vec<Bytes>, Vec<u64>> {
        let missing = self.missing(count);
        if !missing.is_empty() {
            return Err(missing);
        }
        self.truncate(count);
        Ok(self.chunks.into_values().collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
