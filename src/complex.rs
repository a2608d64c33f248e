//! Complex columns: multi-value, attachment, and version-history columns,
//! each backed by a hidden secondary table keyed by the owning row's
//! `Complex` pointer (see [`crate::codec::Value::Complex`]).
//!
//! Each secondary table is addressed through the ordinary row store, plus
//! `flate2` for attachment payloads that Access stores `deflate`-compressed.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::codec::Value;
use crate::error::{Error, ErrorCode, Result};
use crate::row;
use crate::schema::Table;
use crate::storage::pager::PageChannel;
use crate::types::RowId;

/// Which secondary-table shape a complex column uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexKind {
    MultiValue,
    Attachment,
    VersionHistory,
}

/// One value attached to a row through a complex column.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexValue {
    pub complex_row: RowId,
    pub payload: Value,
}

/// Every value currently attached to `owner_complex_id` in `secondary`,
/// found by a forward scan since complex secondary tables are typically
/// small relative to the owning table.
pub fn get_values(
    channel: &mut PageChannel,
    secondary: &Table,
    owner_complex_column: u16,
    owner_complex_id: i32,
    payload_column: u16,
) -> Result<Vec<ComplexValue>> {
    let mut out = Vec::new();
    let (row_count_off, free_off, slot_off) = {
        let format = channel.format();
        (format.data_row_count_offset, format.data_free_space_offset, format.data_slot_table_offset)
    };
    for pn in secondary.used_pages.iter_used() {
        let mut buf = channel.read_page(pn)?;
        let slot_count = {
            let page = row::RowPage::new(&mut buf, row_count_off, free_off, slot_off);
            page.slot_count()
        };
        for slot in 0..slot_count as u8 {
            let bytes = {
                let page = row::RowPage::new(&mut buf, row_count_off, free_off, slot_off);
                if !page.is_live(slot) || page.is_forwarded(slot) {
                    continue;
                }
                page.cell_bytes(slot)?.to_vec()
            };
            let values = row::decode_row(channel, secondary, &bytes)?;
            if let Value::Complex(id) = values[owner_complex_column as usize] {
                if id == owner_complex_id {
                    out.push(ComplexValue {
                        complex_row: RowId::new(pn, slot),
                        payload: values[payload_column as usize].clone(),
                    });
                }
            }
        }
        channel.release_buffer(buf);
    }
    Ok(out)
}

/// Append a new value to a multi-value or attachment complex column.
pub fn add_value(channel: &mut PageChannel, secondary: &mut Table, row_values: &[Value]) -> Result<RowId> {
    row::insert_row(channel, secondary, row_values)
}

pub fn update_value(channel: &mut PageChannel, secondary: &mut Table, row: RowId, row_values: &[Value]) -> Result<RowId> {
    row::update_row(channel, secondary, row, row_values)
}

pub fn delete_value(channel: &mut PageChannel, secondary: &Table, row: RowId) -> Result<()> {
    row::delete_row(channel, secondary, row)
}

/// Signature opening an attachment's `data` blob, ahead of its optional
/// `deflate` payload.
const ATTACHMENT_SIGNATURE: [u8; 4] = *b"ATC1";
/// `[signature:4][filename_length:u16][reserved:14]`.
const ATTACHMENT_HEADER_LEN: usize = 20;

/// One attachment blob: the framing this module parses ahead of the actual
/// (possibly compressed) file bytes.
pub struct AttachmentHeader {
    pub filename_length: u16,
}

/// Parse the 20-byte header framing an attachment's `data` column, if
/// present, returning it alongside the bytes that follow. Older rows
/// without the framing (bare zlib stream or raw bytes) pass through with
/// `header == None`.
pub fn parse_attachment_header(bytes: &[u8]) -> (Option<AttachmentHeader>, &[u8]) {
    if bytes.len() < ATTACHMENT_HEADER_LEN || bytes[0..4] != ATTACHMENT_SIGNATURE {
        return (None, bytes);
    }
    let filename_length = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    (Some(AttachmentHeader { filename_length }), &bytes[ATTACHMENT_HEADER_LEN..])
}

/// Decompress an attachment payload that Access stored `deflate`-compressed
/// (the common case for Office-embedded attachments), first stripping the
/// 20-byte attachment header if the bytes carry one. Returns the content
/// unchanged if it doesn't look like a zlib stream.
pub fn decompress_attachment(bytes: &[u8]) -> Result<Vec<u8>> {
    let (_, content) = parse_attachment_header(bytes);
    if content.len() < 2 || content[0] != 0x78 {
        return Ok(content.to_vec());
    }
    let mut decoder = ZlibDecoder::new(content);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::with_message(ErrorCode::CorruptFormat, format!("attachment payload failed to inflate: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zlib_bytes_pass_through_unchanged() {
        let raw = vec![1, 2, 3, 4];
        assert_eq!(decompress_attachment(&raw).unwrap(), raw);
    }

    #[test]
    fn zlib_stream_inflates() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"hello attachment").unwrap();
        let compressed = enc.finish().unwrap();
        let out = decompress_attachment(&compressed).unwrap();
        assert_eq!(out, b"hello attachment");
    }

    #[test]
    fn header_is_stripped_before_inflating() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"report.pdf contents").unwrap();
        let compressed = enc.finish().unwrap();

        let mut framed = Vec::new();
        framed.extend_from_slice(&ATTACHMENT_SIGNATURE);
        framed.extend_from_slice(&11u16.to_le_bytes());
        framed.extend_from_slice(&[0u8; 14]);
        framed.extend_from_slice(&compressed);

        let (header, content) = parse_attachment_header(&framed);
        assert_eq!(header.unwrap().filename_length, 11);
        assert_eq!(content, compressed.as_slice());
        assert_eq!(decompress_attachment(&framed).unwrap(), b"report.pdf contents");
    }

    #[test]
    fn bytes_without_the_signature_are_treated_as_unframed() {
        let raw = vec![1, 2, 3, 4, 5];
        let (header, content) = parse_attachment_header(&raw);
        assert!(header.is_none());
        assert_eq!(content, raw.as_slice());
    }
}
