//! Long-value (overflow) descriptor encoding, plus the reader/writer for
//! the `LVAL` pages a row's TEXT/MEMO/BINARY/OLE payload spills onto once it
//! no longer fits in-row.
//!
//! A row never stores the payload bytes directly for these columns: it
//! stores a 12-byte descriptor. When the payload is short enough the
//! descriptor's `kind` is `Inline` and the bytes immediately follow the
//! descriptor in the row cell; otherwise the descriptor points at a single
//! `LVAL` page or the head of a chain of them.

use crate::error::{Error, ErrorCode, Result};
use crate::storage::pager::{PageChannel, PageType};
use crate::types::{Pgno, INVALID_PGNO};

/// Discriminant byte of a descriptor's `type` field.
const INLINE_TAG: u8 = 0x80;
const SINGLE_PAGE_TAG: u8 = 0x01;
const CHAIN_TAG: u8 = 0x02;

/// Header bytes preceding the payload on a single-page `LVAL` page:
/// `[type][subtag][payload_len:u16]`.
const SINGLE_PAGE_HEADER_LEN: usize = 4;
/// Header bytes preceding the payload on a chained `LVAL` page:
/// `[type][subtag][payload_len:u16][next_page:u32]`.
const CHAIN_HEADER_LEN: usize = 8;

/// Marks a `DATA` page as holding long-value payload rather than ordinary
/// rows, at the page's reserved (second) byte.
const LVAL_SINGLE_SUBTAG: u8 = 0x01;
const LVAL_CHAIN_SUBTAG: u8 = 0x02;

/// How a long value's bytes are laid out: entirely in-row, on one overflow
/// page, or chained across several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongValueKind {
    Inline,
    SinglePage,
    Chain,
}

/// The 12-byte in-row descriptor every TEXT/MEMO/BINARY/OLE value is
/// prefixed with: `{length:u32, type:u8, page:u24, row:u8, reserved:u32}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongValueRef {
    pub length: u32,
    pub kind: LongValueKind,
    pub page: Pgno,
    pub row: u8,
}

impl LongValueRef {
    pub fn new(length: u32, kind: LongValueKind, page: Pgno, row: u8) -> Self {
        LongValueRef { length, kind, page, row }
    }

    pub const ENCODED_LEN: usize = 12;

    pub fn decode(buf: &[u8]) -> Result<LongValueRef> {
        if buf.len() != Self::ENCODED_LEN {
            return Err(Error::with_message(ErrorCode::CorruptFormat, "long-value descriptor must be 12 bytes"));
        }
        let length = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let tag = buf[4];
        let page = (buf[5] as Pgno) | ((buf[6] as Pgno) << 8) | ((buf[7] as Pgno) << 16);
        let row = buf[8];
        let kind = match tag {
            INLINE_TAG => LongValueKind::Inline,
            SINGLE_PAGE_TAG => LongValueKind::SinglePage,
            CHAIN_TAG => LongValueKind::Chain,
            other => {
                return Err(Error::with_message(
                    ErrorCode::CorruptFormat,
                    format!("unrecognized long-value descriptor type {other:#x}"),
                ))
            }
        };
        Ok(LongValueRef { length, kind, page, row })
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.length.to_le_bytes());
        out[4] = match self.kind {
            LongValueKind::Inline => INLINE_TAG,
            LongValueKind::SinglePage => SINGLE_PAGE_TAG,
            LongValueKind::Chain => CHAIN_TAG,
        };
        out[5] = (self.page & 0xFF) as u8;
        out[6] = ((self.page >> 8) & 0xFF) as u8;
        out[7] = ((self.page >> 16) & 0xFF) as u8;
        out[8] = self.row;
        out
    }
}

/// Largest payload written inline (descriptor followed by bytes in-row)
/// rather than spilled to a dedicated `LVAL` page.
pub const MAX_INLINE_LONG_VALUE: usize = 1024;

/// Write `bytes` as a long value, preferring a single `LVAL` page and only
/// chaining when the payload doesn't fit on one.
pub fn write_long_value(channel: &mut PageChannel, bytes: &[u8]) -> Result<LongValueRef> {
    let page_size = channel.format().page_size as usize;
    let single_capacity = page_size - SINGLE_PAGE_HEADER_LEN;
    if bytes.len() <= single_capacity {
        let (pn, mut buf) = channel.allocate_page(PageType::Data)?;
        buf[1] = LVAL_SINGLE_SUBTAG;
        buf[2..4].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        buf[SINGLE_PAGE_HEADER_LEN..SINGLE_PAGE_HEADER_LEN + bytes.len()].copy_from_slice(bytes);
        channel.write_page(&buf, pn)?;
        channel.release_buffer(buf);
        return Ok(LongValueRef::new(bytes.len() as u32, LongValueKind::SinglePage, pn, 0));
    }

    // Chained: write pages back-to-front so each one's `next_page` is known
    // before it's written; the last page allocated becomes the chain head.
    let chunk_capacity = page_size - CHAIN_HEADER_LEN;
    let mut next_pn = INVALID_PGNO;
    let mut head_pn = INVALID_PGNO;
    let chunks: Vec<&[u8]> = bytes.chunks(chunk_capacity).collect();
    for chunk in chunks.into_iter().rev() {
        let (pn, mut buf) = channel.allocate_page(PageType::Data)?;
        buf[1] = LVAL_CHAIN_SUBTAG;
        buf[2..4].copy_from_slice(&(chunk.len() as u16).to_le_bytes());
        buf[4..8].copy_from_slice(&next_pn.to_le_bytes());
        buf[CHAIN_HEADER_LEN..CHAIN_HEADER_LEN + chunk.len()].copy_from_slice(chunk);
        channel.write_page(&buf, pn)?;
        channel.release_buffer(buf);
        next_pn = pn;
        head_pn = pn;
    }
    Ok(LongValueRef::new(bytes.len() as u32, LongValueKind::Chain, head_pn, 0))
}

/// Read the payload a long-value descriptor points at. Panics-free on a
/// corrupt chain: an unreadable page propagates as an error rather than
/// silently truncating the value.
pub fn read_long_value(channel: &mut PageChannel, r: &LongValueRef) -> Result<Vec<u8>> {
    match r.kind {
        LongValueKind::Inline => {
            Err(Error::with_message(ErrorCode::InvalidArgument, "an inline descriptor has no backing page"))
        }
        LongValueKind::SinglePage => {
            let buf = channel.read_page(r.page)?;
            let len = u16::from_le_bytes(buf[2..4].try_into().unwrap()) as usize;
            let out = buf[SINGLE_PAGE_HEADER_LEN..SINGLE_PAGE_HEADER_LEN + len].to_vec();
            channel.release_buffer(buf);
            Ok(out)
        }
        LongValueKind::Chain => {
            let mut out = Vec::with_capacity(r.length as usize);
            let mut pn = r.page;
            loop {
                let buf = channel.read_page(pn)?;
                let len = u16::from_le_bytes(buf[2..4].try_into().unwrap()) as usize;
                let next = Pgno::from_le_bytes(buf[4..8].try_into().unwrap());
                out.extend_from_slice(&buf[CHAIN_HEADER_LEN..CHAIN_HEADER_LEN + len]);
                channel.release_buffer(buf);
                if next == INVALID_PGNO {
                    break;
                }
                pn = next;
            }
            Ok(out)
        }
    }
}

/// Release every page backing a long value, for a row delete or an update
/// that replaces the value. A no-op for an inline descriptor.
pub fn free_long_value(channel: &mut PageChannel, r: &LongValueRef) -> Result<()> {
    match r.kind {
        LongValueKind::Inline => Ok(()),
        LongValueKind::SinglePage => channel.free_page(r.page),
        LongValueKind::Chain => {
            let mut pn = r.page;
            loop {
                let buf = channel.read_page(pn)?;
                let next = Pgno::from_le_bytes(buf[4..8].try_into().unwrap());
                channel.release_buffer(buf);
                channel.free_page(pn)?;
                if next == INVALID_PGNO {
                    break;
                }
                pn = next;
            }
            Ok(())
        }
    }
}
