//! NUMERIC column codec: 17-byte fixed representation (1 sign byte, 1
//! precision/scale placeholder byte, 16 bytes of little-endian magnitude in
//! some readers' layout or big-endian in others' — this engine follows the
//! sign-byte-then-big-endian-magnitude layout, matching Jackcess's
//! `NumericValue`, since that is what this codec's callers' file samples use).

use crate::error::{Error, ErrorCode, Result};

const BODY_LEN: usize = 16;

/// An exact decimal value: unscaled 128-bit magnitude plus a decimal scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numeric {
    pub negative: bool,
    pub precision: u8,
    pub scale: u8,
    pub unscaled: u128,
}

impl Numeric {
    pub fn new(negative: bool, precision: u8, scale: u8, unscaled: u128) -> Self {
        Numeric { negative, precision, scale, unscaled }
    }

    pub fn zero() -> Self {
        Numeric { negative: false, precision: 18, scale: 0, unscaled: 0 }
    }

    /// Render as a plain decimal string, e.g. `-12.340`.
    pub fn to_decimal_string(&self) -> String {
        let digits = self.unscaled.to_string();
        let scale = self.scale as usize;
        let sign = if self.negative && self.unscaled != 0 { "-" } else { "" };
        if scale == 0 {
            return format!("{sign}{digits}");
        }
        if digits.len() <= scale {
            let padded = format!("{:0>width$}", digits, width = scale + 1);
            let (int_part, frac_part) = padded.split_at(padded.len() - scale);
            format!("{sign}{int_part}.{frac_part}")
        } else {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            format!("{sign}{int_part}.{frac_part}")
        }
    }
}

/// Decode the 17-byte on-disk representation: byte 0 is sign (0x00 positive,
/// 0x80 negative), byte 1 is scale, the remaining 15 bytes are the
/// big-endian unscaled magnitude.
pub fn decode(buf: &[u8]) -> Result<Numeric> {
    if buf.len() != 17 {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "numeric value must be 17 bytes"));
    }
    let negative = buf[0] == 0x80;
    let scale = buf[1];
    let mut unscaled: u128 = 0;
    for &b in &buf[2..17] {
        unscaled = (unscaled << 8) | b as u128;
    }
    Ok(Numeric { negative, precision: 38, scale, unscaled })
}

pub fn encode(n: &Numeric) -> Vec<u8> {
    let mut out = vec![0u8; 17];
    out[0] = if n.negative { 0x80 } else { 0x00 };
    out[1] = n.scale;
    let bytes = n.unscaled.to_be_bytes();
    out[2..17].copy_from_slice(&bytes[1..16]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_encode_decode() {
        let n = Numeric::new(true, 18, 2, 12345);
        let buf = encode(&n);
        assert_eq!(buf.len(), BODY_LEN + 1);
        let back = decode(&buf).unwrap();
        assert_eq!(back.negative, n.negative);
        assert_eq!(back.scale, n.scale);
        assert_eq!(back.unscaled, n.unscaled);
    }

    #[test]
    fn decimal_string_places_the_point() {
        let n = Numeric::new(true, 18, 2, 12345);
        assert_eq!(n.to_decimal_string(), "-123.45");
    }

    #[test]
    fn wrong_length_is_corrupt_format() {
        assert_eq!(decode(&[0u8; 10]).unwrap_err().code(), ErrorCode::CorruptFormat);
    }
}
