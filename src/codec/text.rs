//! TEXT column codec: UCS-2 storage with an optional "compressed unicode"
//! scheme (every other zero byte elided when a run of characters all fall
//! in the Latin-1 range) and a legacy single-byte charset path for pre-Jet4
//! files.
//!
//! Grounded on the overall shape of `util::bitvec.rs`'s bit-level unpacking:
//! a compact on-disk form expanded into a plain Rust value, with a
//! compressed/uncompressed tag byte the way a null bitmap has its own
//! leading layout marker.

use crate::config::LegacyCharset;
use crate::error::{Error, ErrorCode, Result};

/// Marker prefix Jet4+ writes ahead of a compressed-unicode run.
const COMPRESSION_MARKER: u8 = 0xFF;

/// Decode a Jet4+ TEXT payload (UCS-2, optionally compressed).
pub fn decode_unicode(buf: &[u8]) -> Result<String> {
    if buf.is_empty() {
        return Ok(String::new());
    }
    if buf[0] == COMPRESSION_MARKER && buf.len() >= 2 {
        return decode_compressed(&buf[1..]);
    }
    decode_ucs2(buf)
}

fn decode_ucs2(buf: &[u8]) -> Result<String> {
    if buf.len() % 2 != 0 {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "UCS-2 text has odd byte length"));
    }
    let units: Vec<u16> = buf.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units)
        .map_err(|_| Error::with_message(ErrorCode::CorruptFormat, "TEXT value is not valid UTF-16"))
}

/// Compressed unicode: a byte whose high bit is unset stands for the code
/// point `0x00XX`; `0x00` signals an escape back to two full UCS-2 bytes for
/// the remainder of the buffer.
fn decode_compressed(buf: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == 0x00 {
            return Ok(out + &decode_ucs2(&buf[i + 1..])?);
        }
        out.push(buf[i] as char);
        i += 1;
    }
    Ok(out)
}

/// Encode as uncompressed UCS-2 — the simple, always-correct path. Writers
/// that want the compressed form can post-process; every reader must accept
/// the uncompressed form regardless.
pub fn encode_unicode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode a pre-Jet4 TEXT payload using the configured legacy charset.
pub fn decode_legacy(buf: &[u8], charset: &LegacyCharset) -> Result<String> {
    match charset {
        LegacyCharset::Windows1252 => Ok(decode_windows1252(buf)),
        LegacyCharset::Named(name) => Err(Error::with_message(
            ErrorCode::Unsupported,
            format!("legacy charset {name} has no built-in decoder"),
        )),
    }
}

fn decode_windows1252(buf: &[u8]) -> String {
    buf.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ucs2_roundtrips_ascii() {
        let encoded = encode_unicode("hello");
        assert_eq!(decode_unicode(&encoded).unwrap(), "hello");
    }

    #[test]
    fn compressed_run_decodes_to_latin1_text() {
        let mut buf = vec![COMPRESSION_MARKER];
        buf.extend(b"abc");
        assert_eq!(decode_unicode(&buf).unwrap(), "abc");
    }

    #[test]
    fn odd_length_ucs2_is_corrupt_format() {
        assert_eq!(decode_ucs2(&[0x41]).unwrap_err().code(), ErrorCode::CorruptFormat);
    }
}
