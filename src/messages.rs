//! Typed in-memory representations of every ULog message kind.
//!
//! Each type decodes from the raw body bytes of its wire message
//! (`from_wire`) and serializes itself to a [`ByteSink`] (`serialize`),
//! emitting the 3-byte common header followed by the body. Decoding
//! validates minimum lengths and internal consistency; any violation is a
//! recoverable [`UlogError::Parse`] that makes the streaming reader drop
//! the message and resynchronize.

use std::collections::HashMap;

use crate::error::{Result, UlogError};
use crate::field::Field;
use crate::value::Value;
use crate::wire::{
    message_header, MessageType, APPENDED_OFFSETS_COUNT, COMPAT_FLAG0_DEFAULT_PARAMETERS,
    FILE_HEADER_LEN, FILE_MAGIC, FILE_VERSION, FLAG_BITS_BODY_LEN, SYNC_MAGIC,
};
use crate::writer::ByteSink;

fn check_min_size(len: usize, min: usize) -> Result<()> {
    if len < min {
        return Err(UlogError::parse("message too short"));
    }
    Ok(())
}

fn wire_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn wire_u64(bytes: &[u8], offset: usize) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| UlogError::parse("message too short"))?;
    Ok(u64::from_le_bytes(raw))
}

fn body_size(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| UlogError::parse("message too long"))
}

fn key_size(len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| UlogError::parse("message key too long"))
}

// ============================================================================
// File header and flag bits
// ============================================================================

/// The optional flag-bits message directly following the file magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagBits {
    /// Compatible feature flags; unknown bits may be ignored.
    pub compat_flags: [u8; 8],
    /// Incompatible feature flags; any unknown set bit makes the log
    /// unreadable.
    pub incompat_flags: [u8; 8],
    /// File offsets of appended-data regions (0 = unused).
    pub appended_offsets: [u64; APPENDED_OFFSETS_COUNT],
}

impl FlagBits {
    pub(crate) fn from_wire(body: &[u8]) -> Result<FlagBits> {
        check_min_size(body.len(), FLAG_BITS_BODY_LEN)?;
        let mut flags = FlagBits::default();
        flags.compat_flags.copy_from_slice(&body[..8]);
        flags.incompat_flags.copy_from_slice(&body[8..16]);
        for (index, offset) in flags.appended_offsets.iter_mut().enumerate() {
            *offset = wire_u64(body, 16 + index * 8)?;
        }
        Ok(flags)
    }
}

/// The 16-byte file header opening every log, plus the optional flag-bits
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    version: u8,
    timestamp_us: u64,
    flag_bits: Option<FlagBits>,
}

impl FileHeader {
    /// A header for a new log starting at `timestamp_us` (microseconds).
    /// Sets the default-parameters compat flag when requested.
    pub fn new(timestamp_us: u64, has_default_parameters: bool) -> FileHeader {
        let mut flag_bits = FlagBits::default();
        if has_default_parameters {
            flag_bits.compat_flags[0] |= COMPAT_FLAG0_DEFAULT_PARAMETERS;
        }
        FileHeader {
            version: FILE_VERSION,
            timestamp_us,
            flag_bits: Some(flag_bits),
        }
    }

    pub(crate) fn from_wire(version: u8, timestamp_us: u64, flag_bits: Option<FlagBits>) -> Self {
        FileHeader {
            version,
            timestamp_us,
            flag_bits,
        }
    }

    /// Format version byte from the magic.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Logging start timestamp in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// The flag-bits message, when the log carries one.
    pub fn flag_bits(&self) -> Option<&FlagBits> {
        self.flag_bits.as_ref()
    }

    /// Write the file header (and flag bits, when present) to the sink.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        let mut header = [0u8; FILE_HEADER_LEN];
        header[..7].copy_from_slice(&FILE_MAGIC);
        header[7] = self.version;
        header[8..].copy_from_slice(&self.timestamp_us.to_le_bytes());
        sink.write_bytes(&header);

        if let Some(flags) = &self.flag_bits {
            sink.write_bytes(&message_header(
                FLAG_BITS_BODY_LEN as u16,
                MessageType::FlagBits,
            ));
            let mut body = [0u8; FLAG_BITS_BODY_LEN];
            body[..8].copy_from_slice(&flags.compat_flags);
            body[8..16].copy_from_slice(&flags.incompat_flags);
            for (index, offset) in flags.appended_offsets.iter().enumerate() {
                body[16 + index * 8..24 + index * 8].copy_from_slice(&offset.to_le_bytes());
            }
            sink.write_bytes(&body);
        }
        Ok(())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader::new(0, false)
    }
}

// ============================================================================
// Message format
// ============================================================================

/// A named record definition: an ordered sequence of fields plus a by-name
/// index.
///
/// Formats are parsed in the log header, where fields of nested type may
/// reference formats that have not been seen yet. The registry resolves all
/// formats (offsets, sizes, nested links) once the header is complete.
#[derive(Debug, Clone)]
pub struct MessageFormat {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl PartialEq for MessageFormat {
    /// Formats are equal when the name and the ordered field sequence match.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields
    }
}

impl MessageFormat {
    /// Build a format from a name and ordered fields.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> MessageFormat {
        let mut index = HashMap::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            index.entry(field.name().to_string()).or_insert(position);
        }
        MessageFormat {
            name: name.into(),
            fields,
            index,
        }
    }

    /// Decode from the wire text form `<name>:<field0>;<field1>;…;`.
    pub(crate) fn from_wire(body: &[u8]) -> Result<MessageFormat> {
        let text = std::str::from_utf8(body)
            .map_err(|_| UlogError::parse("message format is not valid UTF-8"))?;
        let colon = text
            .find(':')
            .ok_or_else(|| UlogError::parse("invalid message format (no ':')"))?;
        let name = &text[..colon];

        let mut fields = Vec::new();
        let mut remainder = &text[colon + 1..];
        while !remainder.is_empty() {
            let semicolon = remainder
                .find(';')
                .ok_or_else(|| UlogError::parse("invalid message format (no ';')"))?;
            let field = Field::parse(remainder[..semicolon].as_bytes())?;
            if fields.iter().any(|f: &Field| f.name() == field.name()) {
                return Err(UlogError::parse(format!(
                    "duplicate field '{}' in message format '{name}'",
                    field.name()
                )));
            }
            fields.push(field);
            remainder = &remainder[semicolon + 1..];
        }
        Ok(MessageFormat::new(name, fields))
    }

    pub(crate) fn from_resolved_fields(name: String, fields: Vec<Field>) -> MessageFormat {
        MessageFormat::new(name, fields)
    }

    /// The format name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.index
            .get(name)
            .map(|&position| &self.fields[position])
            .ok_or_else(|| UlogError::access(format!("field not found: {name}")))
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name()).collect()
    }

    /// True once every field is resolved.
    pub fn is_resolved(&self) -> bool {
        self.fields.iter().all(|f| f.is_resolved())
    }

    /// Total record size in bytes: the sum of all field sizes. Defined only
    /// once the format is resolved.
    pub fn size_bytes(&self) -> Result<usize> {
        self.fields.iter().map(|f| f.size_bytes()).sum()
    }

    /// Write the format definition to the sink.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        let mut text = format!("{}:", self.name);
        for field in &self.fields {
            text.push_str(&field.encode());
            text.push(';');
        }
        sink.write_bytes(&message_header(
            body_size(text.len())?,
            MessageType::Format,
        ));
        sink.write_bytes(text.as_bytes());
        Ok(())
    }
}

// ============================================================================
// Info and parameters
// ============================================================================

/// A key/value info message. The key is a full field definition (so the
/// value is typed, possibly by a nested format); the value is raw bytes.
///
/// Multi-part infos (`M` messages) stitch long values together: the first
/// part starts a chunk, continued parts append to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageInfo {
    field: Field,
    value: Vec<u8>,
    continued: bool,
    is_multi: bool,
}

/// Parameter messages share the wire shape and in-memory form of info
/// messages.
pub type Parameter = MessageInfo;

impl MessageInfo {
    /// An info from an explicit field definition and raw value bytes.
    pub fn new(field: Field, value: Vec<u8>) -> MessageInfo {
        MessageInfo {
            field,
            value,
            continued: false,
            is_multi: false,
        }
    }

    /// A multi-part info chunk.
    pub fn new_multi(field: Field, value: Vec<u8>, continued: bool) -> MessageInfo {
        MessageInfo {
            field,
            value,
            continued,
            is_multi: true,
        }
    }

    /// A string-valued info (`char[len] key`).
    pub fn with_string(key: &str, value: &str) -> MessageInfo {
        MessageInfo::new(
            Field::new_array("char", key, value.len()),
            value.as_bytes().to_vec(),
        )
    }

    /// An `int32_t`-valued info.
    pub fn with_i32(key: &str, value: i32) -> MessageInfo {
        MessageInfo::new(Field::new("int32_t", key), value.to_le_bytes().to_vec())
    }

    /// A `float`-valued info.
    pub fn with_f32(key: &str, value: f32) -> MessageInfo {
        MessageInfo::new(Field::new("float", key), value.to_le_bytes().to_vec())
    }

    pub(crate) fn from_wire(body: &[u8], is_multi: bool) -> Result<MessageInfo> {
        if is_multi {
            check_min_size(body.len(), 3)?;
            let continued = body[0] != 0;
            let key_len = body[1] as usize;
            if key_len > body.len() - 2 {
                return Err(UlogError::parse("info key too long"));
            }
            let field = Field::parse(&body[2..2 + key_len])?;
            Ok(MessageInfo {
                field,
                value: body[2 + key_len..].to_vec(),
                continued,
                is_multi: true,
            })
        } else {
            check_min_size(body.len(), 2)?;
            let key_len = body[0] as usize;
            if key_len > body.len() - 1 {
                return Err(UlogError::parse("info key too long"));
            }
            let field = Field::parse(&body[1..1 + key_len])?;
            Ok(MessageInfo {
                field,
                value: body[1 + key_len..].to_vec(),
                continued: false,
                is_multi: false,
            })
        }
    }

    /// The key field.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Mutable access to the key field (resolution rewrites it in place).
    pub fn field_mut(&mut self) -> &mut Field {
        &mut self.field
    }

    /// The raw value bytes.
    pub fn value_raw(&self) -> &[u8] {
        &self.value
    }

    /// A typed view of the value. Requires the key field to be resolved.
    pub fn value(&self) -> Value<'_> {
        Value::new(&self.field, &self.value)
    }

    /// True for a continued multi-part chunk.
    pub fn is_continued(&self) -> bool {
        self.continued
    }

    /// True for multi-part infos.
    pub fn is_multi(&self) -> bool {
        self.is_multi
    }

    /// Write to the sink. `msg_type` selects between [`MessageType::Info`]
    /// and [`MessageType::Parameter`] for single-part messages; multi-part
    /// messages always use the multi info code.
    pub fn serialize(&self, sink: &mut dyn ByteSink, msg_type: MessageType) -> Result<()> {
        let key = self.field.encode();
        if self.is_multi {
            let size = body_size(key.len() + self.value.len() + 2)?;
            sink.write_bytes(&message_header(size, MessageType::InfoMultiple));
            sink.write_bytes(&[self.continued as u8, key_size(key.len())?]);
        } else {
            let size = body_size(key.len() + self.value.len() + 1)?;
            sink.write_bytes(&message_header(size, msg_type));
            sink.write_bytes(&[key_size(key.len())?]);
        }
        sink.write_bytes(key.as_bytes());
        sink.write_bytes(&self.value);
        Ok(())
    }
}

/// Bit in [`ParameterDefault::default_types`]: system-wide default.
pub const DEFAULT_TYPE_SYSTEM: u8 = 1 << 0;
/// Bit in [`ParameterDefault::default_types`]: default for the current
/// configuration.
pub const DEFAULT_TYPE_CURRENT_SETUP: u8 = 1 << 1;

/// A default value for a parameter, with a bitset describing which default
/// kinds it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefault {
    field: Field,
    value: Vec<u8>,
    default_types: u8,
}

impl ParameterDefault {
    /// Build from an explicit field, value bytes and default-type bitset.
    pub fn new(field: Field, value: Vec<u8>, default_types: u8) -> ParameterDefault {
        ParameterDefault {
            field,
            value,
            default_types,
        }
    }

    pub(crate) fn from_wire(body: &[u8]) -> Result<ParameterDefault> {
        check_min_size(body.len(), 3)?;
        let default_types = body[0];
        let key_len = body[1] as usize;
        if key_len > body.len() - 2 {
            return Err(UlogError::parse("parameter key too long"));
        }
        let field = Field::parse(&body[2..2 + key_len])?;
        Ok(ParameterDefault {
            field,
            value: body[2 + key_len..].to_vec(),
            default_types,
        })
    }

    /// The key field.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Mutable access to the key field.
    pub fn field_mut(&mut self) -> &mut Field {
        &mut self.field
    }

    /// The raw value bytes.
    pub fn value_raw(&self) -> &[u8] {
        &self.value
    }

    /// A typed view of the value.
    pub fn value(&self) -> Value<'_> {
        Value::new(&self.field, &self.value)
    }

    /// Which default kinds this value covers (see [`DEFAULT_TYPE_SYSTEM`],
    /// [`DEFAULT_TYPE_CURRENT_SETUP`]).
    pub fn default_types(&self) -> u8 {
        self.default_types
    }

    /// Write to the sink.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        let key = self.field.encode();
        let size = body_size(key.len() + self.value.len() + 2)?;
        sink.write_bytes(&message_header(size, MessageType::ParameterDefault));
        sink.write_bytes(&[self.default_types, key_size(key.len())?]);
        sink.write_bytes(key.as_bytes());
        sink.write_bytes(&self.value);
        Ok(())
    }
}

// ============================================================================
// Subscriptions, data, logging
// ============================================================================

/// Binds a wire message id to a named message format (and an instance index
/// for topics logged multiple times).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLoggedMessage {
    multi_id: u8,
    msg_id: u16,
    message_name: String,
}

impl AddLoggedMessage {
    /// Build a subscription message.
    pub fn new(multi_id: u8, msg_id: u16, message_name: impl Into<String>) -> AddLoggedMessage {
        AddLoggedMessage {
            multi_id,
            msg_id,
            message_name: message_name.into(),
        }
    }

    pub(crate) fn from_wire(body: &[u8]) -> Result<AddLoggedMessage> {
        check_min_size(body.len(), 4)?;
        let message_name = std::str::from_utf8(&body[3..])
            .map_err(|_| UlogError::parse("message name is not valid UTF-8"))?;
        Ok(AddLoggedMessage {
            multi_id: body[0],
            msg_id: wire_u16(body, 1),
            message_name: message_name.to_string(),
        })
    }

    /// Instance index among same-named subscriptions.
    pub fn multi_id(&self) -> u8 {
        self.multi_id
    }

    /// Wire message id carried by data samples.
    pub fn msg_id(&self) -> u16 {
        self.msg_id
    }

    /// Name of the subscribed message format.
    pub fn message_name(&self) -> &str {
        &self.message_name
    }

    /// Write to the sink.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        let size = body_size(self.message_name.len() + 3)?;
        sink.write_bytes(&message_header(size, MessageType::AddLoggedMessage));
        sink.write_bytes(&[self.multi_id]);
        sink.write_bytes(&self.msg_id.to_le_bytes());
        sink.write_bytes(self.message_name.as_bytes());
        Ok(())
    }
}

/// Log levels of text messages, encoded as ASCII digits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// `'0'`
    Emergency = b'0',
    /// `'1'`
    Alert = b'1',
    /// `'2'`
    Critical = b'2',
    /// `'3'`
    Error = b'3',
    /// `'4'`
    Warning = b'4',
    /// `'5'`
    Notice = b'5',
    /// `'6'`
    Info = b'6',
    /// `'7'`
    Debug = b'7',
}

impl LogLevel {
    /// Decode a wire byte; out-of-range values fold to `Debug`.
    pub fn from_byte(byte: u8) -> LogLevel {
        match byte {
            b'0' => LogLevel::Emergency,
            b'1' => LogLevel::Alert,
            b'2' => LogLevel::Critical,
            b'3' => LogLevel::Error,
            b'4' => LogLevel::Warning,
            b'5' => LogLevel::Notice,
            b'6' => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    /// The wire byte.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Human-readable level name.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Emergency => "Emergency",
            LogLevel::Alert => "Alert",
            LogLevel::Critical => "Critical",
            LogLevel::Error => "Error",
            LogLevel::Warning => "Warning",
            LogLevel::Notice => "Notice",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
        }
    }
}

/// A logged text message, optionally tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logging {
    level: LogLevel,
    tag: Option<u16>,
    timestamp_us: u64,
    message: String,
}

impl Logging {
    /// An untagged text message.
    pub fn new(level: LogLevel, message: impl Into<String>, timestamp_us: u64) -> Logging {
        Logging {
            level,
            tag: None,
            timestamp_us,
            message: message.into(),
        }
    }

    /// A tagged text message.
    pub fn new_tagged(
        level: LogLevel,
        tag: u16,
        message: impl Into<String>,
        timestamp_us: u64,
    ) -> Logging {
        Logging {
            level,
            tag: Some(tag),
            timestamp_us,
            message: message.into(),
        }
    }

    pub(crate) fn from_wire(body: &[u8], is_tagged: bool) -> Result<Logging> {
        if is_tagged {
            check_min_size(body.len(), 12)?;
            Ok(Logging {
                level: LogLevel::from_byte(body[0]),
                tag: Some(wire_u16(body, 1)),
                timestamp_us: wire_u64(body, 3)?,
                message: String::from_utf8_lossy(&body[11..]).into_owned(),
            })
        } else {
            check_min_size(body.len(), 10)?;
            Ok(Logging {
                level: LogLevel::from_byte(body[0]),
                tag: None,
                timestamp_us: wire_u64(body, 1)?,
                message: String::from_utf8_lossy(&body[9..]).into_owned(),
            })
        }
    }

    /// The log level.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// The tag, for tagged messages.
    pub fn tag(&self) -> Option<u16> {
        self.tag
    }

    /// Timestamp in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// The message text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Write to the sink, choosing the tagged wire form when a tag is set.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        match self.tag {
            Some(tag) => {
                let size = body_size(self.message.len() + 11)?;
                sink.write_bytes(&message_header(size, MessageType::LoggingTagged));
                sink.write_bytes(&[self.level.byte()]);
                sink.write_bytes(&tag.to_le_bytes());
            }
            None => {
                let size = body_size(self.message.len() + 9)?;
                sink.write_bytes(&message_header(size, MessageType::Logging));
                sink.write_bytes(&[self.level.byte()]);
            }
        }
        sink.write_bytes(&self.timestamp_us.to_le_bytes());
        sink.write_bytes(self.message.as_bytes());
        Ok(())
    }
}

/// One raw sample of a subscription. The payload is interpreted against the
/// subscription's message format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    msg_id: u16,
    data: Vec<u8>,
}

impl Data {
    /// A sample for the subscription bound to `msg_id`.
    pub fn new(msg_id: u16, data: Vec<u8>) -> Data {
        Data { msg_id, data }
    }

    pub(crate) fn from_wire(body: &[u8]) -> Result<Data> {
        check_min_size(body.len(), 3)?;
        Ok(Data {
            msg_id: wire_u16(body, 0),
            data: body[2..].to_vec(),
        })
    }

    /// The wire message id.
    pub fn msg_id(&self) -> u16 {
        self.msg_id
    }

    /// The raw payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Write to the sink.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        let size = body_size(self.data.len() + 2)?;
        sink.write_bytes(&message_header(size, MessageType::Data));
        sink.write_bytes(&self.msg_id.to_le_bytes());
        sink.write_bytes(&self.data);
        Ok(())
    }
}

/// A dropout marker: the logger lost `duration_ms` of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dropout {
    duration_ms: u16,
}

impl Dropout {
    /// A dropout of the given duration in milliseconds.
    pub fn new(duration_ms: u16) -> Dropout {
        Dropout { duration_ms }
    }

    pub(crate) fn from_wire(body: &[u8]) -> Result<Dropout> {
        check_min_size(body.len(), 2)?;
        Ok(Dropout {
            duration_ms: wire_u16(body, 0),
        })
    }

    /// Duration of the dropout in milliseconds.
    pub fn duration_ms(&self) -> u16 {
        self.duration_ms
    }

    /// Write to the sink.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        sink.write_bytes(&message_header(2, MessageType::Dropout));
        sink.write_bytes(&self.duration_ms.to_le_bytes());
        Ok(())
    }
}

/// A synchronization marker with a fixed magic body, used to find message
/// boundaries in corrupted streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncMessage;

impl SyncMessage {
    /// A sync marker.
    pub fn new() -> SyncMessage {
        SyncMessage
    }

    pub(crate) fn from_wire(body: &[u8]) -> Result<SyncMessage> {
        check_min_size(body.len(), SYNC_MAGIC.len())?;
        if body[..SYNC_MAGIC.len()] != SYNC_MAGIC {
            return Err(UlogError::parse("invalid sync magic bytes"));
        }
        Ok(SyncMessage)
    }

    /// Write to the sink.
    pub fn serialize(&self, sink: &mut dyn ByteSink) -> Result<()> {
        sink.write_bytes(&message_header(
            SYNC_MAGIC.len() as u16,
            MessageType::Sync,
        ));
        sink.write_bytes(&SYNC_MAGIC);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialized(message: impl Fn(&mut dyn ByteSink) -> Result<()>) -> Vec<u8> {
        let mut out = Vec::new();
        message(&mut out).unwrap();
        out
    }

    #[test]
    fn file_header_round_trip() {
        let header = FileHeader::new(123_456, true);
        let bytes = serialized(|sink| header.serialize(sink));
        assert_eq!(bytes.len(), FILE_HEADER_LEN + 3 + FLAG_BITS_BODY_LEN);
        assert_eq!(&bytes[..7], &FILE_MAGIC);
        assert_eq!(bytes[7], FILE_VERSION);

        let flags = FlagBits::from_wire(&bytes[FILE_HEADER_LEN + 3..]).unwrap();
        let decoded = FileHeader::from_wire(
            bytes[7],
            u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            Some(flags),
        );
        assert_eq!(decoded, header);
    }

    #[test]
    fn format_round_trip() {
        let format = MessageFormat::new(
            "sensor_accel",
            vec![
                Field::new("uint64_t", "timestamp"),
                Field::new_array("float", "xyz", 3),
                Field::new("child_t", "child"),
            ],
        );
        let bytes = serialized(|sink| format.serialize(sink));
        assert_eq!(bytes[2], b'F');
        let decoded = MessageFormat::from_wire(&bytes[3..]).unwrap();
        assert_eq!(decoded, format);
        assert_eq!(
            std::str::from_utf8(&bytes[3..]).unwrap(),
            "sensor_accel:uint64_t timestamp;float[3] xyz;child_t child;"
        );
    }

    #[test]
    fn format_rejects_malformed() {
        assert!(MessageFormat::from_wire(b"no_colon_here").is_err());
        assert!(MessageFormat::from_wire(b"name:uint8_t a").is_err()); // missing ';'
        assert!(MessageFormat::from_wire(b"name:uint8_t a;uint8_t a;").is_err()); // dup
    }

    #[test]
    fn info_round_trip() {
        let info = MessageInfo::with_string("sys_name", "test_system");
        let bytes = serialized(|sink| info.serialize(sink, MessageType::Info));
        assert_eq!(bytes[2], b'I');
        let decoded = MessageInfo::from_wire(&bytes[3..], false).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.field().encode(), "char[11] sys_name");
    }

    #[test]
    fn info_multi_round_trip() {
        let info = MessageInfo::new_multi(
            Field::new_array("char", "notes", 5),
            b"hello".to_vec(),
            true,
        );
        let bytes = serialized(|sink| info.serialize(sink, MessageType::Info));
        assert_eq!(bytes[2], b'M');
        let decoded = MessageInfo::from_wire(&bytes[3..], true).unwrap();
        assert!(decoded.is_multi());
        assert!(decoded.is_continued());
        assert_eq!(decoded.value_raw(), b"hello");
    }

    #[test]
    fn info_rejects_oversize_key() {
        // key_len byte claims more than the body holds
        let body = [200u8, b'a', b'b'];
        assert!(MessageInfo::from_wire(&body, false).is_err());
    }

    #[test]
    fn parameter_default_round_trip() {
        let default = ParameterDefault::new(
            Field::new("float", "PARAM_A"),
            382.23f32.to_le_bytes().to_vec(),
            DEFAULT_TYPE_SYSTEM | DEFAULT_TYPE_CURRENT_SETUP,
        );
        let bytes = serialized(|sink| default.serialize(sink));
        assert_eq!(bytes[2], b'Q');
        let decoded = ParameterDefault::from_wire(&bytes[3..]).unwrap();
        assert_eq!(decoded, default);
        assert_eq!(decoded.default_types(), 0b11);
    }

    #[test]
    fn add_logged_message_round_trip() {
        let msg = AddLoggedMessage::new(2, 17, "vehicle_status");
        let bytes = serialized(|sink| msg.serialize(sink));
        assert_eq!(bytes[2], b'A');
        let decoded = AddLoggedMessage::from_wire(&bytes[3..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn logging_round_trip_and_level_fold() {
        let plain = Logging::new(LogLevel::Warning, "low battery", 42);
        let bytes = serialized(|sink| plain.serialize(sink));
        assert_eq!(bytes[2], b'L');
        assert_eq!(Logging::from_wire(&bytes[3..], false).unwrap(), plain);

        let tagged = Logging::new_tagged(LogLevel::Info, 7, "armed", 43);
        let bytes = serialized(|sink| tagged.serialize(sink));
        assert_eq!(bytes[2], b'C');
        assert_eq!(Logging::from_wire(&bytes[3..], true).unwrap(), tagged);

        // out-of-range levels fold to Debug
        let mut body = vec![b'9'];
        body.extend_from_slice(&42u64.to_le_bytes());
        body.push(b'x');
        assert_eq!(
            Logging::from_wire(&body, false).unwrap().level(),
            LogLevel::Debug
        );
    }

    #[test]
    fn logging_too_short() {
        assert!(Logging::from_wire(&[b'4'; 9], false).is_err());
        assert!(Logging::from_wire(&[b'4'; 11], true).is_err());
    }

    #[test]
    fn data_round_trip() {
        let data = Data::new(3, vec![1, 2, 3, 4]);
        let bytes = serialized(|sink| data.serialize(sink));
        assert_eq!(bytes[2], b'D');
        assert_eq!(Data::from_wire(&bytes[3..]).unwrap(), data);
    }

    #[test]
    fn dropout_round_trip() {
        let dropout = Dropout::new(250);
        let bytes = serialized(|sink| dropout.serialize(sink));
        assert_eq!(bytes[2], b'O');
        assert_eq!(Dropout::from_wire(&bytes[3..]).unwrap(), dropout);
    }

    #[test]
    fn sync_magic_is_validated() {
        let sync = SyncMessage::new();
        let bytes = serialized(|sink| sync.serialize(sink));
        assert_eq!(bytes[2], b'S');
        assert!(SyncMessage::from_wire(&bytes[3..]).is_ok());

        let mut corrupted = bytes[3..].to_vec();
        corrupted[4] ^= 0xFF;
        assert!(SyncMessage::from_wire(&corrupted).is_err());
    }

    #[test]
    fn level_names() {
        assert_eq!(LogLevel::Emergency.as_str(), "Emergency");
        assert_eq!(LogLevel::from_byte(b'3'), LogLevel::Error);
        assert_eq!(LogLevel::from_byte(0xFF), LogLevel::Debug);
    }
}
