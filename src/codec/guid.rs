//! GUID column codec: 16-byte little-endian-per-field layout matching the
//! Windows `GUID`/`UUID` struct (first three fields little-endian, last two
//! groups big-endian byte-for-byte), rendered in the conventional
//! `{8-4-4-4-12}` hex form.

use crate::error::{Error, ErrorCode, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid(pub [u8; 16]);

pub fn decode(buf: &[u8]) -> Result<Guid> {
    if buf.len() != 16 {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "GUID value must be 16 bytes"));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(buf);
    Ok(Guid(bytes))
}

pub fn encode(g: &Guid) -> [u8; 16] {
    g.0
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{{{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}}}",
            b[3], b[2], b[1], b[0],
            b[5], b[4],
            b[7], b[6],
            b[8], b[9],
            b[10], b[11], b[12], b[13], b[14], b[15],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let bytes: [u8; 16] = (0..16).collect::<Vec<u8>>().try_into().unwrap();
        let g = decode(&bytes).unwrap();
        assert_eq!(encode(&g), bytes);
    }

    #[test]
    fn display_uses_braced_hyphenated_form() {
        let g = Guid([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10]);
        let s = g.to_string();
        assert!(s.starts_with('{') && s.ends_with('}'));
        assert_eq!(s.matches('-').count(), 4);
    }

    #[test]
    fn wrong_length_is_corrupt_format() {
        assert_eq!(decode(&[0u8; 4]).unwrap_err().code(), ErrorCode::CorruptFormat);
    }
}
