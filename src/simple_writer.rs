//! Integrity-checking log writer.
//!
//! [`SimpleWriter`] wraps the low-level [`Writer`] and enforces the rules
//! that keep a log well-formed and its samples safely copyable from packed
//! record buffers: strict call order around header completion, name
//! patterns, a leading `uint64_t timestamp` field, natural alignment with
//! no padding between fields, and sample-size checks on every write. Any
//! violation is a synchronous [`UlogError::Usage`].
//!
//! Nested formats are supported by the reader but not by this facade.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, UlogError};
use crate::field::{BasicType, Field};
use crate::messages::{AddLoggedMessage, Data, FileHeader, Logging, LogLevel, MessageFormat, MessageInfo, Parameter};
use crate::writer::{ByteSink, Writer};

/// Pattern a format name must match in full.
pub const FORMAT_NAME_PATTERN: &str = "[a-zA-Z0-9_\\-/]+";
/// Pattern a field name must match in full.
pub const FIELD_NAME_PATTERN: &str = "[a-z0-9_]+";

static FORMAT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-zA-Z0-9_/-]+$").unwrap());
static FIELD_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-z0-9_]+$").unwrap());

/// A value writable as an info message.
pub trait InfoValue {
    /// Build the info message for `key`.
    fn into_message(self, key: &str) -> MessageInfo;
}

impl InfoValue for i32 {
    fn into_message(self, key: &str) -> MessageInfo {
        MessageInfo::with_i32(key, self)
    }
}

impl InfoValue for f32 {
    fn into_message(self, key: &str) -> MessageInfo {
        MessageInfo::with_f32(key, self)
    }
}

impl InfoValue for &str {
    fn into_message(self, key: &str) -> MessageInfo {
        MessageInfo::with_string(key, self)
    }
}

impl InfoValue for String {
    fn into_message(self, key: &str) -> MessageInfo {
        MessageInfo::with_string(key, &self)
    }
}

/// A value writable as a parameter (`int32_t` or `float`).
pub trait ParamValue {
    /// Build the parameter message for `key`.
    fn into_parameter(self, key: &str) -> Parameter;
}

impl ParamValue for i32 {
    fn into_parameter(self, key: &str) -> Parameter {
        Parameter::with_i32(key, self)
    }
}

impl ParamValue for f32 {
    fn into_parameter(self, key: &str) -> Parameter {
        Parameter::with_f32(key, self)
    }
}

/// ULog serializer that checks integrity and call order.
pub struct SimpleWriter<S: ByteSink> {
    writer: Writer<S>,
    header_complete: bool,
    /// Registered formats and their packed record sizes.
    formats: HashMap<String, usize>,
    /// Expected sample size per subscription; the message id is the index.
    subscriptions: Vec<usize>,
}

impl<S: ByteSink> SimpleWriter<S> {
    /// Create a writer and emit the file header with the given start
    /// timestamp (microseconds).
    pub fn new(sink: S, timestamp_us: u64) -> Result<SimpleWriter<S>> {
        let mut writer = Writer::new(sink)?;
        writer.file_header(&FileHeader::new(timestamp_us, false))?;
        Ok(SimpleWriter {
            writer,
            header_complete: false,
            formats: HashMap::new(),
            subscriptions: Vec::new(),
        })
    }

    /// Write a key/value info, typically versioning data in the header.
    pub fn write_info<V: InfoValue>(&mut self, key: &str, value: V) -> Result<()> {
        self.writer.message_info(&value.into_message(key))
    }

    /// Write an initial parameter value. Header phase only.
    pub fn write_parameter<V: ParamValue>(&mut self, key: &str, value: V) -> Result<()> {
        if self.header_complete {
            return Err(UlogError::usage("header already complete"));
        }
        self.writer.parameter(&value.into_parameter(key))
    }

    /// Register and write a message format definition.
    ///
    /// The first field must be a scalar `uint64_t timestamp`. Field types
    /// must be basic (no nesting through this facade), names must match
    /// [`FORMAT_NAME_PATTERN`] / [`FIELD_NAME_PATTERN`], and each field's
    /// offset must be naturally aligned to its type size, so the record
    /// needs no padding. Order fields by decreasing type size to satisfy
    /// alignment.
    pub fn write_message_format(&mut self, name: &str, fields: &[Field]) -> Result<()> {
        if self.header_complete {
            return Err(UlogError::usage("header already complete"));
        }
        let first_is_timestamp = fields.first().is_some_and(|field| {
            field.name() == "timestamp"
                && field.basic_type() == BasicType::UInt64
                && field.array_length().is_none()
        });
        if !first_is_timestamp {
            return Err(UlogError::usage(
                "first message field must be 'uint64_t timestamp'",
            ));
        }
        if self.formats.contains_key(name) {
            return Err(UlogError::usage(format!("duplicate format: {name}")));
        }
        if !FORMAT_NAME_RE.is_match(name) {
            return Err(UlogError::usage(format!(
                "invalid name: {name}, valid pattern: {FORMAT_NAME_PATTERN}"
            )));
        }
        for field in fields {
            if !FIELD_NAME_RE.is_match(field.name()) {
                return Err(UlogError::usage(format!(
                    "invalid field name: {}, valid pattern: {FIELD_NAME_PATTERN}",
                    field.name()
                )));
            }
        }
        for (position, field) in fields.iter().enumerate() {
            if fields[..position].iter().any(|f| f.name() == field.name()) {
                return Err(UlogError::usage(format!(
                    "duplicate field name: {}",
                    field.name()
                )));
            }
        }

        let mut message_size = 0usize;
        for field in fields {
            let (_, type_size) =
                BasicType::from_type_name(field.type_name()).ok_or_else(|| {
                    UlogError::usage(format!(
                        "invalid field type (nested formats are not supported): {}",
                        field.type_name()
                    ))
                })?;
            if message_size % type_size != 0 {
                return Err(UlogError::usage(format!(
                    "record requires padding, reorder fields by decreasing type size; \
                     padding before field: {}",
                    field.name()
                )));
            }
            message_size += field.array_length().unwrap_or(1).max(1) * type_size;
        }

        self.formats.insert(name.to_string(), message_size);
        self.writer
            .message_format(&MessageFormat::new(name, fields.to_vec()))
    }

    /// Complete the header. All formats, infos and initial parameters must
    /// be written before this point.
    pub fn header_complete(&mut self) -> Result<()> {
        if self.header_complete {
            return Err(UlogError::usage("header already complete"));
        }
        self.writer.header_complete();
        self.header_complete = true;
        Ok(())
    }

    /// Write a parameter change. Data phase only.
    pub fn write_parameter_change<V: ParamValue>(&mut self, key: &str, value: V) -> Result<()> {
        if !self.header_complete {
            return Err(UlogError::usage("header not yet complete"));
        }
        self.writer.parameter(&value.into_parameter(key))
    }

    /// Start a time series over a registered format and return the message
    /// id for [`SimpleWriter::write_data`].
    pub fn write_add_logged_message(&mut self, format_name: &str, multi_id: u8) -> Result<u16> {
        if !self.header_complete {
            return Err(UlogError::usage("header not yet complete"));
        }
        let msg_id = u16::try_from(self.subscriptions.len())
            .map_err(|_| UlogError::usage("too many subscriptions"))?;
        let message_size = *self
            .formats
            .get(format_name)
            .ok_or_else(|| UlogError::usage(format!("format not found: {format_name}")))?;
        self.subscriptions.push(message_size);
        self.writer
            .add_logged_message(&AddLoggedMessage::new(multi_id, msg_id, format_name))?;
        Ok(msg_id)
    }

    /// Write a logged text message.
    pub fn write_text_message(
        &mut self,
        level: LogLevel,
        message: &str,
        timestamp_us: u64,
    ) -> Result<()> {
        if !self.header_complete {
            return Err(UlogError::usage("header not yet complete"));
        }
        self.writer.logging(&Logging::new(level, message, timestamp_us))
    }

    /// Write one sample for a series started with
    /// [`SimpleWriter::write_add_logged_message`].
    ///
    /// `data` is the packed record; it may be longer than the format size
    /// (trailing struct padding), in which case the excess is trimmed.
    pub fn write_data(&mut self, msg_id: u16, data: &[u8]) -> Result<()> {
        if !self.header_complete {
            return Err(UlogError::usage("header not yet complete"));
        }
        let expected = *self
            .subscriptions
            .get(msg_id as usize)
            .ok_or_else(|| UlogError::usage(format!("invalid message id: {msg_id}")))?;
        if data.len() < expected {
            return Err(UlogError::usage(format!(
                "sample too small: {} bytes, format needs {expected}",
                data.len()
            )));
        }
        self.writer.data(&Data::new(msg_id, data[..expected].to_vec()))
    }

    /// The underlying sink.
    pub fn sink(&self) -> &S {
        self.writer.sink()
    }

    /// Consume the writer and return the sink.
    pub fn into_sink(self) -> S {
        self.writer.into_sink()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> SimpleWriter<Vec<u8>> {
        SimpleWriter::new(Vec::new(), 0).unwrap()
    }

    #[test]
    fn rejects_format_without_leading_timestamp() {
        let mut writer = writer();
        let err = writer
            .write_message_format("m", &[Field::new("int8_t", "a")])
            .unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn rejects_format_requiring_padding() {
        let mut writer = writer();
        let err = writer
            .write_message_format(
                "m",
                &[
                    Field::new("uint64_t", "timestamp"),
                    Field::new("int8_t", "a"),
                    Field::new("float", "b"),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, UlogError::Usage { .. }));
        assert!(err.to_string().contains("b"), "names the offending field");
    }

    #[test]
    fn rejects_nested_and_bad_names() {
        let mut writer = writer();
        assert!(writer
            .write_message_format(
                "m",
                &[
                    Field::new("uint64_t", "timestamp"),
                    Field::new("my_type", "a"),
                ],
            )
            .is_err());
        assert!(writer
            .write_message_format(
                "bad name!",
                &[Field::new("uint64_t", "timestamp")],
            )
            .is_err());
        assert!(writer
            .write_message_format(
                "m",
                &[
                    Field::new("uint64_t", "timestamp"),
                    Field::new("int8_t", "a/b"),
                ],
            )
            .is_err());
    }

    #[test]
    fn enforces_call_order() {
        let mut writer = writer();
        assert!(writer.write_text_message(LogLevel::Info, "x", 0).is_err());
        assert!(writer.write_add_logged_message("m", 0).is_err());

        writer
            .write_message_format("m", &[Field::new("uint64_t", "timestamp")])
            .unwrap();
        writer.write_parameter("PARAM_A", 1i32).unwrap();
        writer.header_complete().unwrap();

        assert!(writer.header_complete().is_err());
        assert!(writer.write_parameter("PARAM_B", 2i32).is_err());
        assert!(writer
            .write_message_format("n", &[Field::new("uint64_t", "timestamp")])
            .is_err());
        writer.write_parameter_change("PARAM_A", 2i32).unwrap();
    }

    #[test]
    fn data_size_is_checked_and_padding_trimmed() {
        let mut writer = writer();
        writer
            .write_message_format(
                "m",
                &[
                    Field::new("uint64_t", "timestamp"),
                    Field::new("uint8_t", "flag"),
                ],
            )
            .unwrap();
        writer.header_complete().unwrap();
        let id = writer.write_add_logged_message("m", 0).unwrap();
        assert_eq!(id, 0);

        // 9 byte record, padded to 16 by the source struct
        assert!(writer.write_data(id, &[0u8; 8]).is_err());
        let before = writer.sink().len();
        writer.write_data(id, &[0u8; 16]).unwrap();
        assert_eq!(writer.sink().len(), before + 3 + 2 + 9);

        assert!(writer.write_data(42, &[0u8; 16]).is_err());
    }

    #[test]
    fn writes_infos_of_each_kind() {
        let mut writer = writer();
        writer.write_info("sys_name", "test").unwrap();
        writer.write_info("build_id", 42i32).unwrap();
        writer.write_info("gain", 0.5f32).unwrap();
        assert!(!writer.sink().is_empty());
    }
}
