//! Command and reply messages.
//!
//! Every message is one frame. Integers are big-endian and every variable
//! field is length-prefixed or runs to the end of its frame; nothing is
//! parsed by searching for a delimiter.
//!
//! ```text
//! command tag   1 byte            'u' upload  'd' download  'r' list  'x' delete
//! name          utf-8 bytes       (whole frame)
//! size          u64
//! ack           "ACK" | "NAK"
//! open reply    0x00 u64 size  |  0x01 reason
//! status        0x00  |  0x01 u32 n, n × u64  |  0x02 u64 u64  |  0x03 reason
//! list header   u32 count  |  "ERR"
//! list entry    u16 name_len, name, u64 size
//! delete reply  "OK" | "ERR"
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

// ── Tokens ────────────────────────────────────────────────────────────────────

/// Positive acknowledgement of a verified chunk.
pub const ACK: &[u8] = b"ACK";
/// Negative acknowledgement — the chunk failed verification.
pub const NAK: &[u8] = b"NAK";
/// Delete succeeded.
pub const OK: &[u8] = b"OK";
/// Delete or list failed.
pub const ERR: &[u8] = b"ERR";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a message frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown command tag: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("{what} frame has wrong length {len}")]
    BadLength { what: &'static str, len: usize },

    #[error("{0} is not valid utf-8")]
    InvalidUtf8(&'static str),

    #[error("unknown {what} code: 0x{code:02x}")]
    UnknownCode { what: &'static str, code: u8 },

    #[error("truncated {0}")]
    Truncated(&'static str),
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Command tag, sent alone in a 1-byte frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandTag {
    Upload = b'u',
    Download = b'd',
    List = b'r',
    Delete = b'x',
}

impl CommandTag {
    /// Parse a whole tag frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self, WireError> {
        match frame {
            [tag] => Self::try_from(*tag),
            _ => Err(WireError::BadLength {
                what: "command tag",
                len: frame.len(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandTag::Upload => "upload",
            CommandTag::Download => "download",
            CommandTag::List => "list",
            CommandTag::Delete => "delete",
        }
    }
}

impl TryFrom<u8> for CommandTag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'u' => Ok(CommandTag::Upload),
            b'd' => Ok(CommandTag::Download),
            b'r' => Ok(CommandTag::List),
            b'x' => Ok(CommandTag::Delete),
            other => Err(WireError::UnknownCommand(other)),
        }
    }
}

impl From<CommandTag> for u8 {
    fn from(tag: CommandTag) -> u8 {
        tag as u8
    }
}

/// A fully-read command with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload { name: String, size: u64 },
    Download { name: String },
    List,
    Delete { name: String },
}

impl Command {
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::Upload { .. } => CommandTag::Upload,
            Command::Download { .. } => CommandTag::Download,
            Command::List => CommandTag::List,
            Command::Delete { .. } => CommandTag::Delete,
        }
    }

    /// The frames that announce this command, in send order.
    pub fn frames(&self) -> Vec<Bytes> {
        let mut frames = vec![Bytes::copy_from_slice(&[u8::from(self.tag())])];
        match self {
            Command::Upload { name, size } => {
                frames.push(Bytes::copy_from_slice(name.as_bytes()));
                frames.push(Bytes::copy_from_slice(&encode_size(*size)));
            }
            Command::Download { name } | Command::Delete { name } => {
                frames.push(Bytes::copy_from_slice(name.as_bytes()));
            }
            Command::List => {}
        }
        frames
    }
}

pub fn decode_name(frame: &[u8]) -> Result<String, WireError> {
    String::from_utf8(frame.to_vec()).map_err(|_| WireError::InvalidUtf8("name"))
}

pub fn encode_size(size: u64) -> [u8; 8] {
    size.to_be_bytes()
}

pub fn decode_size(frame: &[u8]) -> Result<u64, WireError> {
    let bytes: [u8; 8] = frame.try_into().map_err(|_| WireError::BadLength {
        what: "size",
        len: frame.len(),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

// ── Acknowledgements ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    Ack,
    Nak,
    Unexpected(Bytes),
}

impl Acknowledgement {
    pub fn parse(frame: Bytes) -> Self {
        match &frame[..] {
            ACK => Acknowledgement::Ack,
            NAK => Acknowledgement::Nak,
            _ => Acknowledgement::Unexpected(frame),
        }
    }
}

// ── Open reply ────────────────────────────────────────────────────────────────

/// Server answer to an upload or download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenReply {
    /// Go ahead. For uploads this echoes the announced size; for downloads
    /// it is the size of the file about to be streamed.
    Accepted { size: u64 },
    Refused(String),
}

impl OpenReply {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            OpenReply::Accepted { size } => {
                buf.put_u8(0x00);
                buf.put_u64(*size);
            }
            OpenReply::Refused(reason) => {
                buf.put_u8(0x01);
                buf.put_slice(reason.as_bytes());
            }
        }
        buf.freeze()
    }

    pub fn decode(mut frame: Bytes) -> Result<Self, WireError> {
        if frame.is_empty() {
            return Err(WireError::Truncated("open reply"));
        }
        match frame.get_u8() {
            0x00 => {
                let size = decode_size(&frame)?;
                Ok(OpenReply::Accepted { size })
            }
            0x01 => Ok(OpenReply::Refused(lossy(&frame))),
            code => Err(WireError::UnknownCode {
                what: "open reply",
                code,
            }),
        }
    }
}

// ── Transfer status ───────────────────────────────────────────────────────────

/// Sent by the receiving side once the terminal chunk has been acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Every chunk verified and the file was written.
    Stored,
    /// These indices never arrived intact; nothing was written.
    Missing(Vec<u64>),
    /// All chunks arrived but the byte total differs from the announced size.
    SizeMismatch { expected: u64, actual: u64 },
    /// The chunks were complete but the file could not be written.
    StorageFailed(String),
}

impl TransferStatus {
    pub fn is_stored(&self) -> bool {
        matches!(self, TransferStatus::Stored)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            TransferStatus::Stored => buf.put_u8(0x00),
            TransferStatus::Missing(indices) => {
                buf.put_u8(0x01);
                buf.put_u32(indices.len() as u32);
                for index in indices {
                    buf.put_u64(*index);
                }
            }
            TransferStatus::SizeMismatch { expected, actual } => {
                buf.put_u8(0x02);
                buf.put_u64(*expected);
                buf.put_u64(*actual);
            }
            TransferStatus::StorageFailed(reason) => {
                buf.put_u8(0x03);
                buf.put_slice(reason.as_bytes());
            }
        }
        buf.freeze()
    }

    pub fn decode(mut frame: Bytes) -> Result<Self, WireError> {
        if frame.is_empty() {
            return Err(WireError::Truncated("transfer status"));
        }
        match frame.get_u8() {
            0x00 => Ok(TransferStatus::Stored),
            0x01 => {
                if frame.remaining() < 4 {
                    return Err(WireError::Truncated("missing list"));
                }
                let n = frame.get_u32() as usize;
                if frame.remaining() != n * 8 {
                    return Err(WireError::BadLength {
                        what: "missing list",
                        len: frame.remaining(),
                    });
                }
                Ok(TransferStatus::Missing(
                    (0..n).map(|_| frame.get_u64()).collect(),
                ))
            }
            0x02 => {
                if frame.remaining() != 16 {
                    return Err(WireError::BadLength {
                        what: "size mismatch",
                        len: frame.remaining(),
                    });
                }
                Ok(TransferStatus::SizeMismatch {
                    expected: frame.get_u64(),
                    actual: frame.get_u64(),
                })
            }
            0x03 => Ok(TransferStatus::StorageFailed(lossy(&frame))),
            code => Err(WireError::UnknownCode {
                what: "transfer status",
                code,
            }),
        }
    }
}

// ── List ──────────────────────────────────────────────────────────────────────

/// One stored file as reported by List.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

impl FileEntry {
    pub fn encode(&self) -> Bytes {
        let name = self.name.as_bytes();
        let mut buf = BytesMut::with_capacity(2 + name.len() + 8);
        buf.put_u16(name.len() as u16);
        buf.put_slice(name);
        buf.put_u64(self.size);
        buf.freeze()
    }

    pub fn decode(mut frame: Bytes) -> Result<Self, WireError> {
        if frame.remaining() < 2 {
            return Err(WireError::Truncated("list entry"));
        }
        let name_len = frame.get_u16() as usize;
        if frame.remaining() != name_len + 8 {
            return Err(WireError::BadLength {
                what: "list entry",
                len: frame.remaining(),
            });
        }
        let name = frame.split_to(name_len);
        let name = String::from_utf8(name.to_vec()).map_err(|_| WireError::InvalidUtf8("list entry name"))?;
        Ok(FileEntry {
            name,
            size: frame.get_u64(),
        })
    }
}

/// First frame of a list reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListHeader {
    Count(u32),
    Failed,
}

impl ListHeader {
    pub fn encode(&self) -> Bytes {
        match self {
            ListHeader::Count(n) => Bytes::copy_from_slice(&n.to_be_bytes()),
            ListHeader::Failed => Bytes::from_static(ERR),
        }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        if frame == ERR {
            return Ok(ListHeader::Failed);
        }
        let bytes: [u8; 4] = frame.try_into().map_err(|_| WireError::BadLength {
            what: "list header",
            len: frame.len(),
        })?;
        Ok(ListHeader::Count(u32::from_be_bytes(bytes)))
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
