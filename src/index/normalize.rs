//! Key normalization: turn a column value into the byte string an index
//! orders by, so comparison in the B-tree is a plain byte-wise compare.
//!
//! Each column contributes its own sort transform (sign-flipped integers,
//! collated text, GUID byte order) into a single memcmp-able key.

use crate::codec::Value;
use crate::collation::SortOrder;
use crate::error::{Error, ErrorCode, Result};
use crate::schema::IndexColumn;

/// Null sorts first, ahead of every real value, matching Jet's observed
/// ordering for nullable indexed columns.
const NULL_PREFIX: u8 = 0x00;
const VALUE_PREFIX: u8 = 0x01;

/// Normalize one value into its ordered byte representation.
fn normalize_value(value: &Value, sort_order: SortOrder) -> Result<Vec<u8>> {
    Ok(match value {
        Value::Null => Vec::new(),
        Value::Bool(b) => vec![*b as u8],
        Value::Byte(b) => vec![*b],
        Value::Int16(v) => (*v as u16 ^ 0x8000).to_be_bytes().to_vec(),
        Value::Int32(v) => (*v as u32 ^ 0x8000_0000).to_be_bytes().to_vec(),
        Value::Int64(v) => (*v as u64 ^ 0x8000_0000_0000_0000).to_be_bytes().to_vec(),
        Value::Float32(v) => flip_float_bits((v.to_bits() as u64) << 32, 4),
        Value::Float64(v) => flip_float_bits(v.to_bits(), 8),
        Value::Money(v) => (*v as u64 ^ 0x8000_0000_0000_0000).to_be_bytes().to_vec(),
        Value::Numeric(n) => {
            let mut out = vec![n.negative as u8];
            let mag = n.unscaled.to_be_bytes();
            out.extend_from_slice(&mag);
            out
        }
        Value::DateTime(dt) => (dt.0.and_utc().timestamp_nanos_opt().unwrap_or(0) as u64 ^ 0x8000_0000_0000_0000)
            .to_be_bytes()
            .to_vec(),
        Value::Text(s) => sort_order.normalize_key(s).into_bytes(),
        Value::Binary(b) => b.clone(),
        Value::Guid(g) => g.0.to_vec(),
        Value::Complex(rowid) => (*rowid as u32 ^ 0x8000_0000).to_be_bytes().to_vec(),
        Value::LongValue(_) => {
            return Err(Error::with_message(ErrorCode::Unsupported, "long-value columns cannot be indexed directly"))
        }
    })
}

fn flip_float_bits(bits: u64, width: usize) -> Vec<u8> {
    // IEEE-754: flip the sign bit for positive numbers, flip every bit for
    // negative numbers, so the resulting bit pattern orders the same as the
    // real number line under an unsigned big-endian compare.
    let flipped = if bits & 0x8000_0000_0000_0000 != 0 { !bits } else { bits | 0x8000_0000_0000_0000 };
    flipped.to_be_bytes()[..width].to_vec()
}

/// Build the full ordered key for a (possibly multi-column) index entry.
/// Each column contributes a presence prefix (so NULL sorts before any real
/// value regardless of type) followed by its normalized bytes, with
/// descending columns bit-complemented so a single ascending byte compare
/// still produces the requested order.
pub fn build_key(values: &[Value], columns: &[IndexColumn], sort_order: SortOrder) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (value, col) in values.iter().zip(columns) {
        let mut part = normalize_value(value, sort_order)?;
        let prefix = if value.is_null() { NULL_PREFIX } else { VALUE_PREFIX };
        if col.descending {
            part.iter_mut().for_each(|b| *b = !*b);
            out.push(!prefix);
        } else {
            out.push(prefix);
        }
        out.extend(part);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(desc: bool) -> IndexColumn {
        IndexColumn { column_index: 0, descending: desc }
    }

    #[test]
    fn ascending_integers_order_correctly() {
        let a = build_key(&[Value::Int32(-5)], &[col(false)], SortOrder::General).unwrap();
        let b = build_key(&[Value::Int32(5)], &[col(false)], SortOrder::General).unwrap();
        assert!(a < b);
    }

    #[test]
    fn descending_flag_reverses_order() {
        let a = build_key(&[Value::Int32(-5)], &[col(true)], SortOrder::General).unwrap();
        let b = build_key(&[Value::Int32(5)], &[col(true)], SortOrder::General).unwrap();
        assert!(a > b);
    }

    #[test]
    fn null_sorts_before_any_real_value() {
        let n = build_key(&[Value::Null], &[col(false)], SortOrder::General).unwrap();
        let v = build_key(&[Value::Int32(i32::MIN)], &[col(false)], SortOrder::General).unwrap();
        assert!(n < v);
    }

    #[test]
    fn floats_preserve_numeric_order_across_sign() {
        let neg = build_key(&[Value::Float64(-1.5)], &[col(false)], SortOrder::General).unwrap();
        let zero = build_key(&[Value::Float64(0.0)], &[col(false)], SortOrder::General).unwrap();
        let pos = build_key(&[Value::Float64(1.5)], &[col(false)], SortOrder::General).unwrap();
        assert!(neg < zero);
        assert!(zero < pos);
    }

    #[test]
    fn text_is_case_folded_under_general_sort_order() {
        let lower = build_key(&[Value::Text("abc".into())], &[col(false)], SortOrder::General).unwrap();
        let upper = build_key(&[Value::Text("ABC".into())], &[col(false)], SortOrder::General).unwrap();
        assert_eq!(lower, upper);
    }
}
