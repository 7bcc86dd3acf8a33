//! On-wire layout of a ULog stream.
//!
//! A log starts with a 16-byte file header (7 magic bytes, a version byte
//! and a 64-bit start timestamp), optionally followed by a flag-bits
//! message. Every message after the file header shares a 3-byte header:
//!
//! ```text
//! ┌──────────────────┬─────────────────┬──────────────────────────┐
//! │ msg_size (u16 LE)│ msg_type (u8)   │ body (msg_size bytes)    │
//! └──────────────────┴─────────────────┴──────────────────────────┘
//! ```
//!
//! `msg_size` counts the body only, excluding the 3 header bytes.
//! `msg_type` is an ASCII code; see [`MessageType`].

/// First seven bytes of every ULog file.
pub const FILE_MAGIC: [u8; 7] = [b'U', b'L', b'o', b'g', 0x01, 0x12, 0x35];

/// File format version stored in the eighth byte of the header.
pub const FILE_VERSION: u8 = 1;

/// Length of the file header: magic (7) + version (1) + timestamp (8).
pub const FILE_HEADER_LEN: usize = 16;

/// Length of the common per-message header: `msg_size:u16` + `msg_type:u8`.
pub const MSG_HEADER_LEN: usize = 3;

/// Body length of a flag-bits message: 8 compat flags, 8 incompat flags,
/// 3 appended-data offsets of 8 bytes each.
pub const FLAG_BITS_BODY_LEN: usize = 40;

/// Number of appended-data offsets carried by the flag-bits message.
pub const APPENDED_OFFSETS_COUNT: usize = 3;

/// Compat flag (byte 0): the log may contain default-parameter messages.
pub const COMPAT_FLAG0_DEFAULT_PARAMETERS: u8 = 1 << 0;

/// Incompat flag (byte 0): data appended after the regular log region.
/// This is the only incompat bit a reader tolerates.
pub const INCOMPAT_FLAG0_DATA_APPENDED: u8 = 1 << 0;

/// Magic byte sequence forming the body of a sync message.
pub const SYNC_MAGIC: [u8; 8] = [0x2F, 0x73, 0x13, 0x20, 0x25, 0x0C, 0xBB, 0x12];

/// Messages larger than this are considered implausible while scanning for
/// a resynchronization point after corruption.
pub const MAX_PLAUSIBLE_MSG_SIZE: u16 = 10_000;

/// ASCII type codes of all ULog messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// `B` — flag bits (directly after the file header)
    FlagBits = b'B',
    /// `F` — message format definition
    Format = b'F',
    /// `I` — key/value info
    Info = b'I',
    /// `M` — multi-part info
    InfoMultiple = b'M',
    /// `P` — parameter
    Parameter = b'P',
    /// `Q` — parameter default value
    ParameterDefault = b'Q',
    /// `A` — subscribe a message format to a message id
    AddLoggedMessage = b'A',
    /// `R` — unsubscribe (ignored)
    RemoveLoggedMessage = b'R',
    /// `D` — data sample
    Data = b'D',
    /// `L` — logged text message
    Logging = b'L',
    /// `C` — logged text message with tag
    LoggingTagged = b'C',
    /// `S` — synchronization marker
    Sync = b'S',
    /// `O` — dropout marker
    Dropout = b'O',
}

impl MessageType {
    /// Map a wire byte to a message type. `None` for unknown codes.
    pub fn from_byte(byte: u8) -> Option<MessageType> {
        match byte {
            b'B' => Some(MessageType::FlagBits),
            b'F' => Some(MessageType::Format),
            b'I' => Some(MessageType::Info),
            b'M' => Some(MessageType::InfoMultiple),
            b'P' => Some(MessageType::Parameter),
            b'Q' => Some(MessageType::ParameterDefault),
            b'A' => Some(MessageType::AddLoggedMessage),
            b'R' => Some(MessageType::RemoveLoggedMessage),
            b'D' => Some(MessageType::Data),
            b'L' => Some(MessageType::Logging),
            b'C' => Some(MessageType::LoggingTagged),
            b'S' => Some(MessageType::Sync),
            b'O' => Some(MessageType::Dropout),
            _ => None,
        }
    }

    /// The wire byte for this message type.
    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// Read the `(msg_size, msg_type)` pair from the front of `bytes`.
///
/// Callers must have checked that at least [`MSG_HEADER_LEN`] bytes are
/// available.
pub(crate) fn read_message_header(bytes: &[u8]) -> (u16, u8) {
    (u16::from_le_bytes([bytes[0], bytes[1]]), bytes[2])
}

/// Encode the 3-byte common message header.
pub(crate) fn message_header(msg_size: u16, msg_type: MessageType) -> [u8; MSG_HEADER_LEN] {
    let size = msg_size.to_le_bytes();
    [size[0], size[1], msg_type.byte()]
}
