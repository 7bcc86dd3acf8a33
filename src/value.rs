//! Runtime-typed access to raw sample bytes.
//!
//! A [`Value`] is a non-owning view of one field inside a backing byte
//! buffer (a data sample, or the value bytes of an info/parameter message).
//! Nothing is decoded until the value is asked for its content: either as a
//! [`NativeValue`] in exactly the type the message format declares, or cast
//! to a caller-chosen type via [`Value::cast`].
//!
//! Values borrow the backing buffer and the field metadata; they are meant
//! to be created, read and dropped on the spot.

use crate::error::{Result, UlogError};
use crate::field::{BasicType, Field};

/// A decoded value in its native wire type.
///
/// Scalars decode to the matching variant, arrays to the vector variants,
/// and char arrays to `String` (terminated at the first NUL within the
/// array). `Char` carries the raw byte.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Scalar `int8_t`
    Int8(i8),
    /// Scalar `uint8_t`
    UInt8(u8),
    /// Scalar `int16_t`
    Int16(i16),
    /// Scalar `uint16_t`
    UInt16(u16),
    /// Scalar `int32_t`
    Int32(i32),
    /// Scalar `uint32_t`
    UInt32(u32),
    /// Scalar `int64_t`
    Int64(i64),
    /// Scalar `uint64_t`
    UInt64(u64),
    /// Scalar `float`
    Float(f32),
    /// Scalar `double`
    Double(f64),
    /// Scalar `bool`
    Bool(bool),
    /// Scalar `char` (raw byte)
    Char(u8),
    /// `int8_t[]`
    Int8Array(Vec<i8>),
    /// `uint8_t[]`
    UInt8Array(Vec<u8>),
    /// `int16_t[]`
    Int16Array(Vec<i16>),
    /// `uint16_t[]`
    UInt16Array(Vec<u16>),
    /// `int32_t[]`
    Int32Array(Vec<i32>),
    /// `uint32_t[]`
    UInt32Array(Vec<u32>),
    /// `int64_t[]`
    Int64Array(Vec<i64>),
    /// `uint64_t[]`
    UInt64Array(Vec<u64>),
    /// `float[]`
    FloatArray(Vec<f32>),
    /// `double[]`
    DoubleArray(Vec<f64>),
    /// `bool[]`
    BoolArray(Vec<bool>),
    /// `char[]`, NUL-terminated within the array length
    String(String),
}

/// Conversion from a [`NativeValue`] with numeric-cast semantics.
///
/// Implemented for the twelve scalar types, `Vec<T>` of each numeric type,
/// and `String`. The rules, in order:
///
/// 1. strings only convert to strings;
/// 2. an array converts to `Vec<T>` by element-wise cast;
/// 3. an array converts to a scalar by taking its first element
///    (an empty array is an error);
/// 4. a scalar converts to `Vec<T>` as a one-element vector;
/// 5. scalars cast like `as`, with `char` treated as its unsigned byte.
pub trait CastFrom: Sized {
    /// Convert, or report an [`UlogError::Access`] when the conversion is
    /// not allowed.
    fn cast_from(native: NativeValue) -> Result<Self>;
}

fn first_element<T: Copy>(values: &[T]) -> Result<T> {
    values
        .first()
        .copied()
        .ok_or_else(|| UlogError::access("cannot convert an empty array to a scalar"))
}

fn string_mismatch<T>() -> Result<T> {
    Err(UlogError::access(
        "cannot convert between string and non-string types",
    ))
}

macro_rules! impl_cast_numeric {
    ($($target:ty),*) => {$(
        impl CastFrom for $target {
            fn cast_from(native: NativeValue) -> Result<$target> {
                match native {
                    NativeValue::Int8(v) => Ok(v as $target),
                    NativeValue::UInt8(v) => Ok(v as $target),
                    NativeValue::Int16(v) => Ok(v as $target),
                    NativeValue::UInt16(v) => Ok(v as $target),
                    NativeValue::Int32(v) => Ok(v as $target),
                    NativeValue::UInt32(v) => Ok(v as $target),
                    NativeValue::Int64(v) => Ok(v as $target),
                    NativeValue::UInt64(v) => Ok(v as $target),
                    NativeValue::Float(v) => Ok(v as $target),
                    NativeValue::Double(v) => Ok(v as $target),
                    NativeValue::Bool(v) => Ok(v as u8 as $target),
                    NativeValue::Char(v) => Ok(v as $target),
                    NativeValue::Int8Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::UInt8Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::Int16Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::UInt16Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::Int32Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::UInt32Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::Int64Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::UInt64Array(v) => Ok(first_element(&v)? as $target),
                    NativeValue::FloatArray(v) => Ok(first_element(&v)? as $target),
                    NativeValue::DoubleArray(v) => Ok(first_element(&v)? as $target),
                    NativeValue::BoolArray(v) => Ok(first_element(&v)? as u8 as $target),
                    NativeValue::String(_) => string_mismatch(),
                }
            }
        }
    )*};
}

impl_cast_numeric!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

macro_rules! impl_cast_numeric_vec {
    ($($target:ty),*) => {$(
        impl CastFrom for Vec<$target> {
            fn cast_from(native: NativeValue) -> Result<Vec<$target>> {
                match native {
                    NativeValue::Int8(v) => Ok(vec![v as $target]),
                    NativeValue::UInt8(v) => Ok(vec![v as $target]),
                    NativeValue::Int16(v) => Ok(vec![v as $target]),
                    NativeValue::UInt16(v) => Ok(vec![v as $target]),
                    NativeValue::Int32(v) => Ok(vec![v as $target]),
                    NativeValue::UInt32(v) => Ok(vec![v as $target]),
                    NativeValue::Int64(v) => Ok(vec![v as $target]),
                    NativeValue::UInt64(v) => Ok(vec![v as $target]),
                    NativeValue::Float(v) => Ok(vec![v as $target]),
                    NativeValue::Double(v) => Ok(vec![v as $target]),
                    NativeValue::Bool(v) => Ok(vec![v as u8 as $target]),
                    NativeValue::Char(v) => Ok(vec![v as $target]),
                    NativeValue::Int8Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::UInt8Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::Int16Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::UInt16Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::Int32Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::UInt32Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::Int64Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::UInt64Array(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::FloatArray(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::DoubleArray(v) => Ok(v.into_iter().map(|x| x as $target).collect()),
                    NativeValue::BoolArray(v) => {
                        Ok(v.into_iter().map(|x| x as u8 as $target).collect())
                    }
                    NativeValue::String(_) => string_mismatch(),
                }
            }
        }
    )*};
}

impl_cast_numeric_vec!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl CastFrom for bool {
    fn cast_from(native: NativeValue) -> Result<bool> {
        match native {
            NativeValue::Int8(v) => Ok(v != 0),
            NativeValue::UInt8(v) => Ok(v != 0),
            NativeValue::Int16(v) => Ok(v != 0),
            NativeValue::UInt16(v) => Ok(v != 0),
            NativeValue::Int32(v) => Ok(v != 0),
            NativeValue::UInt32(v) => Ok(v != 0),
            NativeValue::Int64(v) => Ok(v != 0),
            NativeValue::UInt64(v) => Ok(v != 0),
            NativeValue::Float(v) => Ok(v != 0.0),
            NativeValue::Double(v) => Ok(v != 0.0),
            NativeValue::Bool(v) => Ok(v),
            NativeValue::Char(v) => Ok(v != 0),
            NativeValue::Int8Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::UInt8Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::Int16Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::UInt16Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::Int32Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::UInt32Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::Int64Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::UInt64Array(v) => Ok(first_element(&v)? != 0),
            NativeValue::FloatArray(v) => Ok(first_element(&v)? != 0.0),
            NativeValue::DoubleArray(v) => Ok(first_element(&v)? != 0.0),
            NativeValue::BoolArray(v) => first_element(&v),
            NativeValue::String(_) => string_mismatch(),
        }
    }
}

impl CastFrom for Vec<bool> {
    fn cast_from(native: NativeValue) -> Result<Vec<bool>> {
        match native {
            NativeValue::BoolArray(v) => Ok(v),
            NativeValue::Int8Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::UInt8Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::Int16Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::UInt16Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::Int32Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::UInt32Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::Int64Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::UInt64Array(v) => Ok(v.into_iter().map(|x| x != 0).collect()),
            NativeValue::FloatArray(v) => Ok(v.into_iter().map(|x| x != 0.0).collect()),
            NativeValue::DoubleArray(v) => Ok(v.into_iter().map(|x| x != 0.0).collect()),
            NativeValue::String(_) => string_mismatch(),
            scalar => Ok(vec![bool::cast_from(scalar)?]),
        }
    }
}

impl CastFrom for String {
    fn cast_from(native: NativeValue) -> Result<String> {
        match native {
            NativeValue::String(s) => Ok(s),
            _ => string_mismatch(),
        }
    }
}

/// A lightweight, non-owning view decoding one field out of a backing byte
/// buffer on demand.
#[derive(Debug, Clone, Copy)]
pub struct Value<'a> {
    field: &'a Field,
    backing: &'a [u8],
    array_index: Option<usize>,
}

impl<'a> Value<'a> {
    /// View `field` inside `backing`. The field must be resolved before the
    /// value can be decoded.
    pub fn new(field: &'a Field, backing: &'a [u8]) -> Value<'a> {
        Value {
            field,
            backing,
            array_index: None,
        }
    }

    /// The field this value decodes.
    pub fn field(&self) -> &'a Field {
        self.field
    }

    fn read<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        self.backing
            .get(offset..offset + N)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| UlogError::access("value extends past the end of the sample buffer"))
    }

    /// Decode in the exact type declared by the message format.
    ///
    /// Scalars (and array elements selected with [`Value::at_index`]) decode
    /// to the scalar variants; arrays to the vector variants; char arrays to
    /// `String`. Nested fields cannot be decoded directly — navigate into
    /// them with [`Value::member`] first.
    pub fn as_native(&self) -> Result<NativeValue> {
        let offset = self.field.offset_in_message().ok_or_else(|| {
            UlogError::access(format!("field '{}' is not resolved", self.field.name()))
        })?;
        if self.array_index.is_some() && self.field.array_length().is_none() {
            return Err(UlogError::access(
                "cannot access an array element of a non-array field",
            ));
        }

        if self.field.array_length().is_none() || self.array_index.is_some() {
            // one element: a scalar field, or one selected array slot
            let base = offset + self.array_index.unwrap_or(0) * self.field.base_size();
            match self.field.basic_type() {
                BasicType::Int8 => Ok(NativeValue::Int8(i8::from_le_bytes(self.read(base)?))),
                BasicType::UInt8 => Ok(NativeValue::UInt8(u8::from_le_bytes(self.read(base)?))),
                BasicType::Int16 => Ok(NativeValue::Int16(i16::from_le_bytes(self.read(base)?))),
                BasicType::UInt16 => Ok(NativeValue::UInt16(u16::from_le_bytes(self.read(base)?))),
                BasicType::Int32 => Ok(NativeValue::Int32(i32::from_le_bytes(self.read(base)?))),
                BasicType::UInt32 => Ok(NativeValue::UInt32(u32::from_le_bytes(self.read(base)?))),
                BasicType::Int64 => Ok(NativeValue::Int64(i64::from_le_bytes(self.read(base)?))),
                BasicType::UInt64 => Ok(NativeValue::UInt64(u64::from_le_bytes(self.read(base)?))),
                BasicType::Float => Ok(NativeValue::Float(f32::from_le_bytes(self.read(base)?))),
                BasicType::Double => Ok(NativeValue::Double(f64::from_le_bytes(self.read(base)?))),
                BasicType::Bool => Ok(NativeValue::Bool(self.read::<1>(base)?[0] != 0)),
                BasicType::Char => Ok(NativeValue::Char(self.read::<1>(base)?[0])),
                BasicType::Nested => Err(UlogError::access(format!(
                    "cannot decode nested field '{}' as a basic value",
                    self.field.name()
                ))),
            }
        } else {
            let len = self.field.array_length().unwrap_or(0);
            match self.field.basic_type() {
                BasicType::Char => {
                    let bytes = self.backing.get(offset..offset + len).ok_or_else(|| {
                        UlogError::access("string extends past the end of the sample buffer")
                    })?;
                    let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
                    Ok(NativeValue::String(
                        String::from_utf8_lossy(&bytes[..end]).into_owned(),
                    ))
                }
                BasicType::Int8 => Ok(NativeValue::Int8Array(self.decode_array(offset, len)?)),
                BasicType::UInt8 => Ok(NativeValue::UInt8Array(self.decode_array(offset, len)?)),
                BasicType::Int16 => Ok(NativeValue::Int16Array(self.decode_array(offset, len)?)),
                BasicType::UInt16 => Ok(NativeValue::UInt16Array(self.decode_array(offset, len)?)),
                BasicType::Int32 => Ok(NativeValue::Int32Array(self.decode_array(offset, len)?)),
                BasicType::UInt32 => Ok(NativeValue::UInt32Array(self.decode_array(offset, len)?)),
                BasicType::Int64 => Ok(NativeValue::Int64Array(self.decode_array(offset, len)?)),
                BasicType::UInt64 => Ok(NativeValue::UInt64Array(self.decode_array(offset, len)?)),
                BasicType::Float => Ok(NativeValue::FloatArray(self.decode_array(offset, len)?)),
                BasicType::Double => Ok(NativeValue::DoubleArray(self.decode_array(offset, len)?)),
                BasicType::Bool => {
                    let bytes = self.backing.get(offset..offset + len).ok_or_else(|| {
                        UlogError::access("array extends past the end of the sample buffer")
                    })?;
                    Ok(NativeValue::BoolArray(
                        bytes.iter().map(|&b| b != 0).collect(),
                    ))
                }
                BasicType::Nested => Err(UlogError::access(format!(
                    "cannot decode nested field '{}' as a basic value",
                    self.field.name()
                ))),
            }
        }
    }

    fn decode_array<T: LeDecode>(&self, offset: usize, len: usize) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            out.push(T::decode_le(self, offset + index * T::SIZE)?);
        }
        Ok(out)
    }

    /// Cast to a caller-chosen type; see [`CastFrom`] for the rules.
    pub fn cast<T: CastFrom>(&self) -> Result<T> {
        T::cast_from(self.as_native()?)
    }

    /// Navigate into a member of a nested field, selected by a field of the
    /// nested format.
    pub fn member_field(&self, field: &'a Field) -> Result<Value<'a>> {
        if self.field.basic_type() != BasicType::Nested {
            return Err(UlogError::access(format!(
                "cannot access a member of non-nested field '{}'",
                self.field.name()
            )));
        }
        if !self.field.is_resolved() {
            return Err(UlogError::access(format!(
                "field '{}' is not resolved",
                self.field.name()
            )));
        }
        let offset = self.field.offset_in_message().ok_or_else(|| {
            UlogError::access(format!("field '{}' is not resolved", self.field.name()))
        })?;
        let sub_offset = offset + self.array_index.map_or(0, |i| i * self.field.base_size());
        let backing = self.backing.get(sub_offset..).ok_or_else(|| {
            UlogError::access("nested value extends past the end of the sample buffer")
        })?;
        Ok(Value {
            field,
            backing,
            array_index: None,
        })
    }

    /// Navigate into a member of a nested field by name.
    pub fn member(&self, name: &str) -> Result<Value<'a>> {
        let field = self.field.nested_field(name)?;
        self.member_field(field)
    }

    /// Select one element of an array field without decoding the whole
    /// array.
    pub fn at_index(&self, index: usize) -> Result<Value<'a>> {
        let len = self.field.array_length().ok_or_else(|| {
            UlogError::access(format!("field '{}' is not an array", self.field.name()))
        })?;
        if index >= len {
            return Err(UlogError::access(format!(
                "index {index} out of bounds for array of length {len}"
            )));
        }
        Ok(Value {
            field: self.field,
            backing: self.backing,
            array_index: Some(index),
        })
    }
}

/// Little-endian element decoding used by the array path.
trait LeDecode: Sized {
    /// Element size in bytes.
    const SIZE: usize;
    /// Decode one element at `offset`.
    fn decode_le(value: &Value<'_>, offset: usize) -> Result<Self>;
}

macro_rules! impl_le_decode {
    ($($ty:ty => $n:literal),*) => {$(
        impl LeDecode for $ty {
            const SIZE: usize = $n;
            fn decode_le(value: &Value<'_>, offset: usize) -> Result<$ty> {
                Ok(<$ty>::from_le_bytes(value.read(offset)?))
            }
        }
    )*};
}

impl_le_decode!(i8 => 1, u8 => 1, i16 => 2, u16 => 2, i32 => 4, u32 => 4,
                i64 => 8, u64 => 8, f32 => 4, f64 => 8);
