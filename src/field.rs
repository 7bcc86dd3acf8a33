//! Field definitions and nested-type resolution.
//!
//! A [`Field`] is one named member of a message format: a basic type, an
//! array of a basic type, or a reference to another [`MessageFormat`]
//! (nested). Nested references are parsed by name only; the referenced
//! format may not be known yet at parse time. A field is *resolved* once its
//! byte offset within the containing record is computed and, for nested
//! fields, the referenced format is attached. Resolution runs over the whole
//! registry when the log header is complete.

use std::sync::Arc;

use crate::error::{Result, UlogError};
use crate::messages::MessageFormat;

/// The basic types a field can have. `Nested` marks a reference to another
/// message format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    /// `int8_t`
    Int8,
    /// `uint8_t`
    UInt8,
    /// `int16_t`
    Int16,
    /// `uint16_t`
    UInt16,
    /// `int32_t`
    Int32,
    /// `uint32_t`
    UInt32,
    /// `int64_t`
    Int64,
    /// `uint64_t`
    UInt64,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `bool`
    Bool,
    /// `char` — arrays of char represent strings
    Char,
    /// A reference to another message format
    Nested,
}

impl BasicType {
    /// Look up a ULog type name, returning the type tag and the size of one
    /// element in bytes. `None` when the name is not a basic type (it is
    /// then assumed to name another message format).
    pub fn from_type_name(name: &str) -> Option<(BasicType, usize)> {
        match name {
            "int8_t" => Some((BasicType::Int8, 1)),
            "uint8_t" => Some((BasicType::UInt8, 1)),
            "int16_t" => Some((BasicType::Int16, 2)),
            "uint16_t" => Some((BasicType::UInt16, 2)),
            "int32_t" => Some((BasicType::Int32, 4)),
            "uint32_t" => Some((BasicType::UInt32, 4)),
            "int64_t" => Some((BasicType::Int64, 8)),
            "uint64_t" => Some((BasicType::UInt64, 8)),
            "float" => Some((BasicType::Float, 4)),
            "double" => Some((BasicType::Double, 8)),
            "bool" => Some((BasicType::Bool, 1)),
            "char" => Some((BasicType::Char, 1)),
            _ => None,
        }
    }
}

/// A single named, possibly-array member of a message format.
///
/// Fields also appear standalone as the key of info and parameter messages.
#[derive(Debug, Clone)]
pub struct Field {
    type_name: String,
    basic_type: BasicType,
    base_size: usize,
    array_length: Option<usize>,
    offset_in_message: Option<usize>,
    nested_format: Option<Arc<MessageFormat>>,
    name: String,
}

impl PartialEq for Field {
    /// Two fields are equal if their type name, array length and name match.
    /// Resolution state does not participate.
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.array_length == other.array_length
            && self.name == other.name
    }
}

impl Field {
    /// Construct a scalar field from a type name and a field name.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_array_length(type_name, name, None)
    }

    /// Construct an array field.
    pub fn new_array(
        type_name: impl Into<String>,
        name: impl Into<String>,
        array_length: usize,
    ) -> Self {
        Self::with_array_length(type_name, name, Some(array_length))
    }

    fn with_array_length(
        type_name: impl Into<String>,
        name: impl Into<String>,
        array_length: Option<usize>,
    ) -> Self {
        let type_name = type_name.into();
        let (basic_type, base_size) = match BasicType::from_type_name(&type_name) {
            Some((ty, size)) => (ty, size),
            None => (BasicType::Nested, 0),
        };
        Field {
            type_name,
            basic_type,
            base_size,
            array_length,
            offset_in_message: None,
            nested_format: None,
            name: name.into(),
        }
    }

    /// Parse a field from its wire text form `<type>[len] <name>` or
    /// `<type> <name>`.
    pub fn parse(encoded: &[u8]) -> Result<Field> {
        let text = std::str::from_utf8(encoded)
            .map_err(|_| UlogError::parse("field definition is not valid UTF-8"))?;
        let space = text
            .find(' ')
            .ok_or_else(|| UlogError::parse(format!("invalid field definition: '{text}'")))?;
        let (type_part, name) = (&text[..space], &text[space + 1..]);

        match type_part.find('[') {
            None => Ok(Field::new(type_part, name)),
            Some(bracket) => {
                if !type_part.ends_with(']') {
                    return Err(UlogError::parse(format!(
                        "invalid field definition (missing ']'): '{text}'"
                    )));
                }
                let len: usize = type_part[bracket + 1..type_part.len() - 1]
                    .parse()
                    .map_err(|_| {
                        UlogError::parse(format!("invalid array length in '{text}'"))
                    })?;
                Ok(Field::new_array(&type_part[..bracket], name, len))
            }
        }
    }

    /// The wire text form of this field.
    pub fn encode(&self) -> String {
        match self.array_length {
            Some(len) => format!("{}[{}] {}", self.type_name, len, self.name),
            None => format!("{} {}", self.type_name, self.name),
        }
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type name as written in the log (`uint64_t`, `float`, or the name
    /// of another message format).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The basic type tag.
    pub fn basic_type(&self) -> BasicType {
        self.basic_type
    }

    /// Array length, or `None` for a scalar field.
    pub fn array_length(&self) -> Option<usize> {
        self.array_length
    }

    /// Byte offset of this field in its containing record. `None` until the
    /// field is resolved.
    pub fn offset_in_message(&self) -> Option<usize> {
        self.offset_in_message
    }

    /// Size of one element in bytes. For nested fields this is the size of
    /// the referenced format and is 0 until resolved.
    pub fn base_size(&self) -> usize {
        self.base_size
    }

    /// Total size of this field in bytes (element size times array length).
    ///
    /// Errors if the field is not resolved yet.
    pub fn size_bytes(&self) -> Result<usize> {
        if !self.is_resolved() {
            return Err(UlogError::parse(format!(
                "unresolved type: {}",
                self.type_name
            )));
        }
        Ok(self.base_size * self.array_length.unwrap_or(1).max(1))
    }

    /// True once the offset is known and, for nested fields, the referenced
    /// format is attached.
    pub fn is_resolved(&self) -> bool {
        self.offset_in_message.is_some()
            && (self.basic_type != BasicType::Nested || self.nested_format.is_some())
    }

    /// The referenced message format of a nested field.
    ///
    /// Errors for non-nested fields and for nested fields that have not been
    /// resolved yet.
    pub fn nested_format(&self) -> Result<&Arc<MessageFormat>> {
        if self.basic_type != BasicType::Nested {
            return Err(UlogError::access(format!(
                "field '{}' is not of nested type",
                self.name
            )));
        }
        self.nested_format.as_ref().ok_or_else(|| {
            UlogError::access(format!("nested field '{}' is not resolved", self.name))
        })
    }

    /// Look up a field inside the referenced format of a nested field.
    pub fn nested_field(&self, name: &str) -> Result<&Field> {
        self.nested_format()?.field(name)
    }

    /// Resolve this field at the given offset against a registry of already
    /// resolved formats. A resolved field is left untouched.
    pub(crate) fn resolve(
        &mut self,
        formats: &std::collections::BTreeMap<String, Arc<MessageFormat>>,
        offset: usize,
    ) -> Result<()> {
        if self.is_resolved() {
            return Ok(());
        }
        self.offset_in_message = Some(offset);
        if self.basic_type != BasicType::Nested {
            return Ok(());
        }
        let format = formats.get(&self.type_name).ok_or_else(|| {
            UlogError::parse(format!("message format not found: {}", self.type_name))
        })?;
        self.base_size = format.size_bytes()?;
        self.nested_format = Some(format.clone());
        Ok(())
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset_in_message = Some(offset);
    }

    pub(crate) fn attach_nested(&mut self, format: Arc<MessageFormat>) -> Result<()> {
        self.base_size = format.size_bytes()?;
        self.nested_format = Some(format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalar() {
        let field = Field::parse(b"uint64_t timestamp").unwrap();
        assert_eq!(field.name(), "timestamp");
        assert_eq!(field.type_name(), "uint64_t");
        assert_eq!(field.basic_type(), BasicType::UInt64);
        assert_eq!(field.base_size(), 8);
        assert_eq!(field.array_length(), None);
        assert!(!field.is_resolved());
    }

    #[test]
    fn parse_array() {
        let field = Field::parse(b"float[4] debug_array").unwrap();
        assert_eq!(field.basic_type(), BasicType::Float);
        assert_eq!(field.array_length(), Some(4));
        assert_eq!(field.encode(), "float[4] debug_array");
    }

    #[test]
    fn parse_nested() {
        let field = Field::parse(b"gps_position_t gps").unwrap();
        assert_eq!(field.basic_type(), BasicType::Nested);
        assert_eq!(field.base_size(), 0);
        assert!(field.nested_format().is_err());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Field::parse(b"no_space_here").is_err());
        assert!(Field::parse(b"float[4 name").is_err());
        assert!(Field::parse(b"float[x] name").is_err());
    }

    #[test]
    fn equality_ignores_resolution() {
        let mut a = Field::new("float", "x");
        let b = Field::new("float", "x");
        a.set_offset(8);
        assert_eq!(a, b);
        assert_ne!(a, Field::new("double", "x"));
        assert_ne!(a, Field::new_array("float", "x", 2));
    }

    #[test]
    fn encode_round_trips() {
        for text in ["uint8_t flags", "char[17] name", "my_format_t child"] {
            let field = Field::parse(text.as_bytes()).unwrap();
            assert_eq!(field.encode(), text);
        }
    }

    #[test]
    fn size_requires_resolution() {
        let mut field = Field::new_array("int16_t", "samples", 5);
        assert!(field.size_bytes().is_err());
        field.set_offset(0);
        assert_eq!(field.size_bytes().unwrap(), 10);
    }
}
