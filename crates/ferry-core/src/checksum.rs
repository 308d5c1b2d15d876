//! Chunk checksums.
//!
//! Every chunk carries the BLAKE3 digest of its raw payload bytes. The digest
//! is always computed over the payload exactly as it travels, never over an
//! encoded form of it.

/// Width of a chunk checksum on the wire.
pub const CHECKSUM_LEN: usize = 32;

/// A 32-byte BLAKE3 digest.
pub type Checksum = [u8; CHECKSUM_LEN];

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn checksum(data: &[u8]) -> Checksum {
    *blake3::hash(data).as_bytes()
}

/// True if `expected` is the digest of `data`.
///
/// Comparison goes through `blake3::Hash`, which compares in constant time.
pub fn verify(data: &[u8], expected: &Checksum) -> bool {
    blake3::hash(data) == blake3::Hash::from(*expected)
}
