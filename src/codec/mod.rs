//! Value codec: column type tags, typed value representation, and the
//! per-type byte encodings used by the row store (fixed-width columns,
//! variable-length columns, and the null bitmap).
//!
//! A tagged value enum covers the whole Jet type system, with bounds-checked
//! read/write helpers (checked slicing returning `Result`, never panicking on
//! a short buffer) even though these are little-endian fixed-width fields
//! rather than varints.

pub mod datetime;
pub mod guid;
pub mod longvalue;
pub mod numeric;
pub mod text;

use crate::error::{Error, ErrorCode, Result};

pub use datetime::DateTimeValue;
pub use guid::Guid;
pub use longvalue::LongValueRef;
pub use numeric::Numeric;

/// Every column storage type this engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    Byte,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Money,
    Numeric,
    DateTime,
    ExtDateTime,
    Text,
    Memo,
    Binary,
    Ole,
    Guid,
    Complex,
}

impl ColumnType {
    /// Fixed on-disk width in bytes, or `None` for variable-length types
    /// (TEXT/MEMO/BINARY/OLE store a pointer or inline variable-length
    /// payload instead).
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::Bool => Some(0), // packed into the null bitmap, no byte storage
            ColumnType::Byte => Some(1),
            ColumnType::Int16 => Some(2),
            ColumnType::Int32 => Some(4),
            ColumnType::Int64 => Some(8),
            ColumnType::Float32 => Some(4),
            ColumnType::Float64 => Some(8),
            ColumnType::Money => Some(8),
            ColumnType::Numeric => Some(17),
            ColumnType::DateTime => Some(8),
            ColumnType::ExtDateTime => Some(8),
            ColumnType::Guid => Some(16),
            ColumnType::Complex => Some(4),
            ColumnType::Text | ColumnType::Memo | ColumnType::Binary | ColumnType::Ole => None,
        }
    }

    pub fn is_variable_length(self) -> bool {
        self.fixed_width().is_none()
    }

    /// Whether values of this type may be stored on a long-value page rather
    /// than inline, once they exceed the inline threshold.
    pub fn supports_long_value(self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Memo | ColumnType::Binary | ColumnType::Ole)
    }
}

/// A decoded column value. `Complex` carries the row key into the column's
/// secondary table rather than the values themselves — fetching those goes
/// through `crate::complex`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Money(i64),
    Numeric(Numeric),
    DateTime(DateTimeValue),
    Text(String),
    Binary(Vec<u8>),
    LongValue(LongValueRef),
    Guid(Guid),
    Complex(i32),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Byte(_) => Some(ColumnType::Byte),
            Value::Int16(_) => Some(ColumnType::Int16),
            Value::Int32(_) => Some(ColumnType::Int32),
            Value::Int64(_) => Some(ColumnType::Int64),
            Value::Float32(_) => Some(ColumnType::Float32),
            Value::Float64(_) => Some(ColumnType::Float64),
            Value::Money(_) => Some(ColumnType::Money),
            Value::Numeric(_) => Some(ColumnType::Numeric),
            Value::DateTime(_) => Some(ColumnType::DateTime),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Binary(_) => Some(ColumnType::Binary),
            Value::LongValue(_) => Some(ColumnType::Memo),
            Value::Guid(_) => Some(ColumnType::Guid),
            Value::Complex(_) => Some(ColumnType::Complex),
        }
    }
}

/// Decode a fixed-width column value out of `buf` for the given type.
/// Variable-length types (TEXT/MEMO/BINARY/OLE) are not handled here — the
/// row store reads their length-prefixed or long-value-pointer payload
/// separately before calling into [`text`]/[`longvalue`].
pub fn decode_fixed(ty: ColumnType, buf: &[u8]) -> Result<Value> {
    let width = ty.fixed_width().ok_or_else(|| {
        Error::with_message(ErrorCode::InvalidArgument, "decode_fixed called on a variable-length type")
    })?;
    if buf.len() < width {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "fixed column value truncated"));
    }
    Ok(match ty {
        ColumnType::Bool => Value::Bool(false), // real value comes from the null-bitmap bit, see row store
        ColumnType::Byte => Value::Byte(buf[0]),
        ColumnType::Int16 => Value::Int16(i16::from_le_bytes(buf[0..2].try_into().unwrap())),
        ColumnType::Int32 => Value::Int32(i32::from_le_bytes(buf[0..4].try_into().unwrap())),
        ColumnType::Int64 => Value::Int64(i64::from_le_bytes(buf[0..8].try_into().unwrap())),
        ColumnType::Float32 => Value::Float32(f32::from_le_bytes(buf[0..4].try_into().unwrap())),
        ColumnType::Float64 => Value::Float64(f64::from_le_bytes(buf[0..8].try_into().unwrap())),
        ColumnType::Money => Value::Money(i64::from_le_bytes(buf[0..8].try_into().unwrap())),
        ColumnType::Numeric => Value::Numeric(numeric::decode(&buf[0..17])?),
        ColumnType::DateTime => Value::DateTime(datetime::decode_legacy(buf)?),
        ColumnType::ExtDateTime => Value::DateTime(datetime::decode_extended(buf)?),
        ColumnType::Guid => Value::Guid(guid::decode(&buf[0..16])?),
        ColumnType::Complex => Value::Complex(i32::from_le_bytes(buf[0..4].try_into().unwrap())),
        ColumnType::Text | ColumnType::Memo | ColumnType::Binary | ColumnType::Ole => unreachable!(),
    })
}

/// Encode a fixed-width value into its on-disk byte representation.
pub fn encode_fixed(value: &Value) -> Result<Vec<u8>> {
    Ok(match value {
        Value::Bool(_) => Vec::new(),
        Value::Byte(b) => vec![*b],
        Value::Int16(v) => v.to_le_bytes().to_vec(),
        Value::Int32(v) => v.to_le_bytes().to_vec(),
        Value::Int64(v) => v.to_le_bytes().to_vec(),
        Value::Float32(v) => v.to_le_bytes().to_vec(),
        Value::Float64(v) => v.to_le_bytes().to_vec(),
        Value::Money(v) => v.to_le_bytes().to_vec(),
        Value::Numeric(n) => numeric::encode(n),
        Value::DateTime(dt) => datetime::encode_legacy(dt),
        Value::Guid(g) => guid::encode(g).to_vec(),
        Value::Complex(rowid) => rowid.to_le_bytes().to_vec(),
        other => {
            return Err(Error::with_message(
                ErrorCode::InvalidArgument,
                format!("{other:?} has no fixed-width encoding"),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_roundtrips() {
        let v = Value::Int32(-42);
        let bytes = encode_fixed(&v).unwrap();
        assert_eq!(decode_fixed(ColumnType::Int32, &bytes).unwrap(), v);
    }

    #[test]
    fn fixed_width_matches_encoded_length() {
        for ty in [ColumnType::Byte, ColumnType::Int16, ColumnType::Int32, ColumnType::Int64, ColumnType::Guid] {
            assert!(ty.fixed_width().is_some());
        }
        assert!(ColumnType::Text.fixed_width().is_none());
    }

    #[test]
    fn truncated_buffer_is_corrupt_format() {
        let err = decode_fixed(ColumnType::Int32, &[0, 1]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CorruptFormat);
    }
}
