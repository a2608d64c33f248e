//! Row store: slotted data-page layout, row encode/decode, insert/update/
//! delete, and the forwarding-pointer indirection used when an update no
//! longer fits in its original slot.
//!
//! A classic slotted page: a cell-pointer array grows from one end of the
//! page while cell bodies grow from the other, with a tracked free-space
//! count and a defragment pass that slides live cells together. Rows are
//! addressed purely by slot number rather than by key order.

use crate::codec::longvalue::{self, LongValueKind, LongValueRef, MAX_INLINE_LONG_VALUE};
use crate::codec::{self, ColumnType, Value};
use crate::error::{Error, ErrorCode, Result};
use crate::schema::{Column, Table};
use crate::storage::pager::{Buffer, PageChannel, PageType};
use crate::types::{Pgno, RowId};
use crate::util::BitVec;

/// Slot-table entry, 2 bytes: offset into the page where the cell begins.
/// A value of `TOMBSTONE` marks a deleted row whose slot stays allocated so
/// existing `RowId`s referencing it keep resolving, just to "deleted".
const TOMBSTONE: u16 = 0xFFFF;
/// A slot pointing elsewhere entirely: the row moved to another page and
/// this slot now just forwards.
const FORWARDED_FLAG: u16 = 0x8000;

/// A single data page, giving structured access to its slot table and cell
/// bodies. Works on a borrowed [`Buffer`] so callers control when it's
/// written back through the [`PageChannel`].
pub struct RowPage<'a> {
    buf: &'a mut Buffer,
    row_count_offset: usize,
    free_space_offset: usize,
    slot_table_offset: usize,
}

impl<'a> RowPage<'a> {
    pub fn new(buf: &'a mut Buffer, row_count_offset: usize, free_space_offset: usize, slot_table_offset: usize) -> Self {
        RowPage { buf, row_count_offset, free_space_offset, slot_table_offset }
    }

    pub fn slot_count(&self) -> u16 {
        u16::from_le_bytes(self.buf[self.row_count_offset..self.row_count_offset + 2].try_into().unwrap())
    }

    fn set_slot_count(&mut self, n: u16) {
        self.buf[self.row_count_offset..self.row_count_offset + 2].copy_from_slice(&n.to_le_bytes());
    }

    pub fn free_space(&self) -> u16 {
        u16::from_le_bytes(self.buf[self.free_space_offset..self.free_space_offset + 2].try_into().unwrap())
    }

    fn set_free_space(&mut self, n: u16) {
        self.buf[self.free_space_offset..self.free_space_offset + 2].copy_from_slice(&n.to_le_bytes());
    }

    fn slot_entry_offset(&self, slot: u8) -> usize {
        self.slot_table_offset + slot as usize * 2
    }

    fn read_slot(&self, slot: u8) -> u16 {
        let off = self.slot_entry_offset(slot);
        u16::from_le_bytes(self.buf[off..off + 2].try_into().unwrap())
    }

    fn write_slot(&mut self, slot: u8, value: u16) {
        let off = self.slot_entry_offset(slot);
        self.buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn is_live(&self, slot: u8) -> bool {
        slot < self.slot_count() as u8 && self.read_slot(slot) != TOMBSTONE
    }

    pub fn is_forwarded(&self, slot: u8) -> bool {
        self.read_slot(slot) & FORWARDED_FLAG != 0 && self.read_slot(slot) != TOMBSTONE
    }

    /// Read a cell's raw bytes, following the 2-byte length prefix every
    /// cell is written with.
    pub fn cell_bytes(&self, slot: u8) -> Result<&[u8]> {
        let raw = self.read_slot(slot);
        if raw == TOMBSTONE {
            return Err(Error::with_message(ErrorCode::InvalidArgument, "slot is a tombstone"));
        }
        let offset = (raw & !FORWARDED_FLAG) as usize;
        let len = u16::from_le_bytes(self.buf[offset..offset + 2].try_into().unwrap()) as usize;
        Ok(&self.buf[offset + 2..offset + 2 + len])
    }

    /// Forwarded row: decode the `RowId` the cell body holds (page, slot).
    pub fn forwarding_target(&self, slot: u8) -> Result<RowId> {
        let bytes = self.cell_bytes(slot)?;
        if bytes.len() != 5 {
            return Err(Error::with_message(ErrorCode::CorruptFormat, "forwarding cell has wrong length"));
        }
        let page = Pgno::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(RowId::new(page, bytes[4]))
    }

    /// Allocate a new slot for a cell of `len` bytes, sliding cells together
    /// first if the page is fragmented but otherwise has room.
    fn allocate(&mut self, len: usize) -> Result<u8> {
        let needed = len + 2;
        if (self.free_space() as usize) < needed + 2 {
            return Err(Error::with_message(ErrorCode::IllegalState, "page does not have enough free space"));
        }
        self.defragment();
        let slot_count = self.slot_count();
        let cell_start = self.lowest_cell_offset();
        let new_offset = cell_start - len - 2;
        self.buf[new_offset..new_offset + 2].copy_from_slice(&(len as u16).to_le_bytes());
        self.write_slot(slot_count as u8, new_offset as u16);
        self.set_slot_count(slot_count + 1);
        self.set_free_space(self.free_space() - needed as u16 - 2);
        Ok(slot_count as u8)
    }

    fn lowest_cell_offset(&self) -> usize {
        (0..self.slot_count())
            .filter_map(|s| {
                let raw = self.read_slot(s as u8);
                (raw != TOMBSTONE).then_some((raw & !FORWARDED_FLAG) as usize)
            })
            .min()
            .unwrap_or(self.buf.len())
    }

    /// Slide every live cell together against the end of the page, removing
    /// gaps left by deletions, without changing any slot's logical content.
    fn defragment(&mut self) {
        let mut cells: Vec<(u8, Vec<u8>)> = Vec::new();
        for s in 0..self.slot_count() {
            let raw = self.read_slot(s as u8);
            if raw == TOMBSTONE {
                continue;
            }
            let offset = (raw & !FORWARDED_FLAG) as usize;
            let len = u16::from_le_bytes(self.buf[offset..offset + 2].try_into().unwrap()) as usize;
            cells.push((s as u8, self.buf[offset..offset + 2 + len].to_vec()));
        }
        let mut write_at = self.buf.len();
        for (slot, bytes) in cells {
            write_at -= bytes.len();
            self.buf[write_at..write_at + bytes.len()].copy_from_slice(&bytes);
            let forwarded = self.read_slot(slot) & FORWARDED_FLAG;
            self.write_slot(slot, write_at as u16 | forwarded);
        }
    }

    pub fn write_cell(&mut self, bytes: &[u8]) -> Result<u8> {
        let slot = self.allocate(bytes.len())?;
        let raw = self.read_slot(slot);
        let offset = (raw & !FORWARDED_FLAG) as usize;
        self.buf[offset + 2..offset + 2 + bytes.len()].copy_from_slice(bytes);
        Ok(slot)
    }

    pub fn tombstone(&mut self, slot: u8) {
        let raw = self.read_slot(slot);
        if raw != TOMBSTONE {
            let offset = (raw & !FORWARDED_FLAG) as usize;
            let len = u16::from_le_bytes(self.buf[offset..offset + 2].try_into().unwrap()) as usize;
            self.set_free_space(self.free_space() + len as u16 + 2);
        }
        self.write_slot(slot, TOMBSTONE);
    }

    pub fn mark_forwarded(&mut self, slot: u8, target: RowId) -> Result<()> {
        let mut payload = Vec::with_capacity(5);
        payload.extend_from_slice(&target.page.to_le_bytes());
        payload.push(target.slot);
        self.tombstone(slot);
        let new_slot = self.write_cell(&payload)?;
        debug_assert_eq!(new_slot, slot, "forwarding must reuse the original slot");
        let raw = self.read_slot(slot);
        self.write_slot(slot, raw | FORWARDED_FLAG);
        Ok(())
    }
}

/// Encode one row's values into its on-disk cell body: a null bitmap
/// ([`crate::util::BitVec`], bit set meaning the column is present) followed
/// by every fixed-width column's bytes in column order, followed by one
/// 12-byte long-value descriptor per variable-length column. A payload
/// short enough to keep in-row follows its descriptor directly (`kind`
/// `Inline`); anything longer is spilled to an `LVAL` page and only the
/// descriptor stays in the cell.
pub fn encode_row(channel: &mut PageChannel, table: &Table, values: &[Value]) -> Result<Vec<u8>> {
    if values.len() != table.columns.len() {
        return Err(Error::with_message(
            ErrorCode::InvalidArgument,
            "value count does not match column count",
        ));
    }
    let mut null_bitmap = BitVec::new(table.columns.len());
    for (i, (col, v)) in table.columns.iter().zip(values).enumerate() {
        let bit = match v {
            Value::Bool(b) => *b,
            other => !other.is_null(),
        };
        debug_assert!(col.column_type != ColumnType::Bool || matches!(v, Value::Bool(_) | Value::Null));
        null_bitmap.set(i, bit);
    }
    let mut out = null_bitmap.as_bytes().to_vec();
    for (col, v) in table.columns.iter().zip(values) {
        if v.is_null() || col.column_type == ColumnType::Bool {
            continue;
        }
        if col.column_type.is_variable_length() {
            continue;
        }
        out.extend(codec::encode_fixed(v)?);
    }
    for (col, v) in table.columns.iter().zip(values) {
        if !col.column_type.is_variable_length() || v.is_null() {
            continue;
        }
        let bytes = match v {
            Value::Text(s) => codec::text::encode_unicode(s),
            Value::Binary(b) => b.clone(),
            other => {
                return Err(Error::with_message(
                    ErrorCode::InvalidArgument,
                    format!("{other:?} is not a variable-length value"),
                ))
            }
        };
        let descriptor = if bytes.len() <= MAX_INLINE_LONG_VALUE {
            LongValueRef::new(bytes.len() as u32, LongValueKind::Inline, 0, 0)
        } else {
            longvalue::write_long_value(channel, &bytes)?
        };
        out.extend(descriptor.encode());
        if descriptor.kind == LongValueKind::Inline {
            out.extend(bytes);
        }
    }
    Ok(out)
}

/// Decode a row's cell body back into one [`Value`] per column, following
/// any out-of-line long-value descriptor to its backing `LVAL` page(s).
pub fn decode_row(channel: &mut PageChannel, table: &Table, cell: &[u8]) -> Result<Vec<Value>> {
    let bitmap_len = table.columns.len();
    let bitmap_bytes = bitmap_len.div_ceil(8);
    if cell.len() < bitmap_bytes {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "row cell shorter than its null bitmap"));
    }
    let null_bitmap = BitVec::from_bytes(&cell[..bitmap_bytes], bitmap_len);
    let mut cursor = bitmap_bytes;
    let mut values: Vec<Value> = table
        .columns
        .iter()
        .map(|c| if c.column_type == ColumnType::Bool { Value::Bool(false) } else { Value::Null })
        .collect();

    for (i, col) in table.columns.iter().enumerate() {
        // A BIT column has no representable NULL: Jet reuses this column's
        // bitmap bit to carry the boolean value itself (1 = true) instead
        // of a presence flag.
        if col.column_type == ColumnType::Bool {
            values[i] = Value::Bool(null_bitmap.get(i));
            continue;
        }
        if !null_bitmap.get(i) {
            continue;
        }
        if col.column_type.is_variable_length() {
            continue;
        }
        let width = col.column_type.fixed_width().unwrap();
        if cursor + width > cell.len() {
            return Err(Error::with_message(ErrorCode::CorruptFormat, "row cell truncated in fixed-width section"));
        }
        values[i] = codec::decode_fixed(col.column_type, &cell[cursor..cursor + width])?;
        cursor += width;
    }

    for (i, col) in table.columns.iter().enumerate() {
        if !null_bitmap.get(i) || !col.column_type.is_variable_length() {
            continue;
        }
        if cursor + LongValueRef::ENCODED_LEN > cell.len() {
            return Err(Error::with_message(ErrorCode::CorruptFormat, "row cell truncated before long-value descriptor"));
        }
        let descriptor = LongValueRef::decode(&cell[cursor..cursor + LongValueRef::ENCODED_LEN])?;
        cursor += LongValueRef::ENCODED_LEN;
        let payload = match descriptor.kind {
            LongValueKind::Inline => {
                let len = descriptor.length as usize;
                if cursor + len > cell.len() {
                    return Err(Error::with_message(ErrorCode::CorruptFormat, "row cell truncated in inline long-value payload"));
                }
                let p = cell[cursor..cursor + len].to_vec();
                cursor += len;
                p
            }
            LongValueKind::SinglePage | LongValueKind::Chain => longvalue::read_long_value(channel, &descriptor)?,
        };
        values[i] = match col.column_type {
            ColumnType::Text | ColumnType::Memo => Value::Text(codec::text::decode_unicode(&payload)?),
            _ => Value::Binary(payload),
        };
    }

    Ok(values)
}

/// Collect the long-value descriptors a row cell holds, without resolving
/// out-of-line payloads. Used to release `LVAL` pages on delete.
fn scan_long_value_descriptors(table: &Table, cell: &[u8]) -> Result<Vec<LongValueRef>> {
    let bitmap_len = table.columns.len();
    let bitmap_bytes = bitmap_len.div_ceil(8);
    if cell.len() < bitmap_bytes {
        return Err(Error::with_message(ErrorCode::CorruptFormat, "row cell shorter than its null bitmap"));
    }
    let null_bitmap = BitVec::from_bytes(&cell[..bitmap_bytes], bitmap_len);
    let mut cursor = bitmap_bytes;

    // Skip the fixed-width section first, mirroring decode_row's layout.
    for (i, col) in table.columns.iter().enumerate() {
        if col.column_type == ColumnType::Bool || !null_bitmap.get(i) || col.column_type.is_variable_length() {
            continue;
        }
        let width = col.column_type.fixed_width().unwrap();
        if cursor + width > cell.len() {
            return Err(Error::with_message(ErrorCode::CorruptFormat, "row cell truncated in fixed-width section"));
        }
        cursor += width;
    }

    let mut out = Vec::new();
    for (i, col) in table.columns.iter().enumerate() {
        if !null_bitmap.get(i) || !col.column_type.is_variable_length() {
            continue;
        }
        if cursor + LongValueRef::ENCODED_LEN > cell.len() {
            return Err(Error::with_message(ErrorCode::CorruptFormat, "row cell truncated before long-value descriptor"));
        }
        let descriptor = LongValueRef::decode(&cell[cursor..cursor + LongValueRef::ENCODED_LEN])?;
        cursor += LongValueRef::ENCODED_LEN;
        if descriptor.kind == LongValueKind::Inline {
            cursor += descriptor.length as usize;
        }
        out.push(descriptor);
    }
    Ok(out)
}

/// Insert `values` as a new row of `table`, placing it on the last page of
/// the table's used-pages map if room allows, or allocating a fresh data
/// page otherwise.
pub fn insert_row(channel: &mut PageChannel, table: &mut Table, values: &[Value]) -> Result<RowId> {
    let body = encode_row(channel, table, values)?;
    let format = channel.format();
    let (row_count_off, free_off, slot_off) =
        (format.data_row_count_offset, format.data_free_space_offset, format.data_slot_table_offset);

    if let Some(pn) = table.used_pages.iter_used().last() {
        let mut buf = channel.read_page(pn)?;
        let fits = {
            let page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
            page.free_space() as usize >= body.len() + 4
        };
        if fits {
            let slot = {
                let mut page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
                page.write_cell(&body)?
            };
            channel.write_page(&buf, pn)?;
            channel.release_buffer(buf);
            return Ok(RowId::new(pn, slot));
        }
        channel.release_buffer(buf);
    }

    let (pn, mut buf) = channel.allocate_page(PageType::Data)?;
    buf[0] = PageType::Data as u8;
    let page_size = channel.format().page_size as u16;
    buf[free_off..free_off + 2].copy_from_slice(&(page_size - slot_off as u16).to_le_bytes());
    buf[row_count_off..row_count_off + 2].copy_from_slice(&0u16.to_le_bytes());
    let slot = {
        let mut page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
        page.write_cell(&body)?
    };
    channel.write_page(&buf, pn)?;
    channel.release_buffer(buf);
    table.used_pages.add(pn, true)?;
    Ok(RowId::new(pn, slot))
}

/// Read the current values of `row`, following forwarding pointers left by
/// an update that no longer fit in its original slot.
pub fn read_row(channel: &mut PageChannel, table: &Table, row: RowId) -> Result<Vec<Value>> {
    let format = channel.format();
    let (row_count_off, free_off, slot_off) =
        (format.data_row_count_offset, format.data_free_space_offset, format.data_slot_table_offset);
    let mut pn = row.page;
    let mut slot = row.slot;
    for _ in 0..8 {
        let mut buf = channel.read_page(pn)?;
        let (forwarded, target) = {
            let page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
            if !page.is_live(slot) {
                return Err(Error::with_message(ErrorCode::InvalidArgument, "row does not exist"));
            }
            if page.is_forwarded(slot) {
                (true, Some(page.forwarding_target(slot)?))
            } else {
                (false, None)
            }
        };
        if forwarded {
            let target = target.unwrap();
            channel.release_buffer(buf);
            pn = target.page;
            slot = target.slot;
            continue;
        }
        let page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
        let bytes = page.cell_bytes(slot)?.to_vec();
        channel.release_buffer(buf);
        return decode_row(channel, table, &bytes);
    }
    Err(Error::with_message(ErrorCode::CorruptFormat, "forwarding chain too long"))
}

/// Delete a row, following any forwarding chain to the slot that actually
/// holds its data, releasing any `LVAL` pages its long-value columns spilled
/// to, then tombstoning both the final slot and every forwarding slot along
/// the way. The original `RowId` stays valid as an address (subsequent reads
/// report `InvalidArgument`) but the slot may not be reused by a later
/// insert on the same page.
pub fn delete_row(channel: &mut PageChannel, table: &Table, row: RowId) -> Result<()> {
    let format = channel.format();
    let (row_count_off, free_off, slot_off) =
        (format.data_row_count_offset, format.data_free_space_offset, format.data_slot_table_offset);

    let mut pn = row.page;
    let mut slot = row.slot;
    let mut forwarders: Vec<RowId> = Vec::new();
    let (final_page, final_slot, cell) = 'resolve: {
        for _ in 0..8 {
            let mut buf = channel.read_page(pn)?;
            let (forwarded, target) = {
                let page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
                if !page.is_live(slot) {
                    channel.release_buffer(buf);
                    return Err(Error::with_message(ErrorCode::InvalidArgument, "row does not exist"));
                }
                if page.is_forwarded(slot) {
                    (true, Some(page.forwarding_target(slot)?))
                } else {
                    (false, None)
                }
            };
            if forwarded {
                channel.release_buffer(buf);
                forwarders.push(RowId::new(pn, slot));
                let target = target.unwrap();
                pn = target.page;
                slot = target.slot;
                continue;
            }
            let page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
            let bytes = page.cell_bytes(slot)?.to_vec();
            channel.release_buffer(buf);
            break 'resolve (pn, slot, bytes);
        }
        return Err(Error::with_message(ErrorCode::CorruptFormat, "forwarding chain too long"));
    };

    for descriptor in scan_long_value_descriptors(table, &cell)? {
        longvalue::free_long_value(channel, &descriptor)?;
    }

    let mut buf = channel.read_page(final_page)?;
    {
        let mut page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
        page.tombstone(final_slot);
    }
    channel.write_page(&buf, final_page)?;
    channel.release_buffer(buf);

    for forwarder in forwarders {
        let mut buf = channel.read_page(forwarder.page)?;
        {
            let mut page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
            page.tombstone(forwarder.slot);
        }
        channel.write_page(&buf, forwarder.page)?;
        channel.release_buffer(buf);
    }
    Ok(())
}

/// Replace a row's values in place when the new encoding still fits in the
/// original slot's page, otherwise write the row to a new location and
/// leave a forwarding pointer behind so every existing `RowId` keeps
/// resolving.
pub fn update_row(channel: &mut PageChannel, table: &mut Table, row: RowId, values: &[Value]) -> Result<RowId> {
    let body = encode_row(channel, table, values)?;
    let format = channel.format();
    let (row_count_off, free_off, slot_off) =
        (format.data_row_count_offset, format.data_free_space_offset, format.data_slot_table_offset);

    let mut buf = channel.read_page(row.page)?;
    let old_len = {
        let page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
        page.cell_bytes(row.slot)?.len()
    };
    if body.len() <= old_len {
        {
            let mut page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
            page.tombstone(row.slot);
        }
        let reinserted_slot = {
            let mut page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
            page.write_cell(&body)?
        };
        channel.write_page(&buf, row.page)?;
        channel.release_buffer(buf);
        if reinserted_slot == row.slot {
            return Ok(row);
        }
        // Slot numbering never actually changes slot identity here since
        // `write_cell` always appends a fresh slot; leave a forwarding
        // pointer at the old slot so the original `RowId` keeps resolving.
        let mut buf2 = channel.read_page(row.page)?;
        {
            let mut page = RowPage::new(&mut buf2, row_count_off, free_off, slot_off);
            page.mark_forwarded(row.slot, RowId::new(row.page, reinserted_slot))?;
        }
        channel.write_page(&buf2, row.page)?;
        channel.release_buffer(buf2);
        return Ok(RowId::new(row.page, reinserted_slot));
    }
    channel.release_buffer(buf);

    let new_row = insert_row(channel, table, values)?;
    let mut buf = channel.read_page(row.page)?;
    {
        let mut page = RowPage::new(&mut buf, row_count_off, free_off, slot_off);
        page.mark_forwarded(row.slot, new_row)?;
    }
    channel.write_page(&buf, row.page)?;
    channel.release_buffer(buf);
    Ok(new_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FormatVersion, JetFormat};
    use crate::os::mem::MemVfs;
    use crate::storage::pager::IdentityCodec;
    use crate::storage::usage_map::UsageMap;
    use std::path::PathBuf;

    fn sample_table() -> Table {
        Table {
            name: "T".into(),
            table_def_page: 1,
            columns: vec![
                Column::new("id", ColumnType::Int32, 0),
                Column::new("name", ColumnType::Text, 1),
            ],
            indexes: Vec::new(),
            primary_key_index: None,
            used_pages: UsageMap::new_inline(0),
            append_only: false,
            next_auto_number: 1,
            mod_counter: 0,
        }
    }

    fn open_channel() -> PageChannel {
        let vfs = MemVfs::new();
        let path = PathBuf::from("/t.mdb");
        PageChannel::create(&vfs, &path, JetFormat::for_version(FormatVersion::Jet4), Box::new(IdentityCodec)).unwrap()
    }

    #[test]
    fn insert_then_read_roundtrips() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let values = vec![Value::Int32(7), Value::Text("hello".into())];
        let row = insert_row(&mut chan, &mut table, &values).unwrap();
        let back = read_row(&mut chan, &table, row).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn delete_then_read_is_invalid_argument() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let row = insert_row(&mut chan, &mut table, &[Value::Int32(1), Value::Null]).unwrap();
        delete_row(&mut chan, &table, row).unwrap();
        let err = read_row(&mut chan, &table, row).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn update_with_larger_value_forwards_to_new_location() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let row = insert_row(&mut chan, &mut table, &[Value::Int32(1), Value::Text("a".into())]).unwrap();
        let long_text = "x".repeat(2000);
        let new_row = update_row(&mut chan, &mut table, row, &[Value::Int32(1), Value::Text(long_text.clone())]).unwrap();
        let via_old = read_row(&mut chan, &table, row).unwrap();
        assert_eq!(via_old, vec![Value::Int32(1), Value::Text(long_text)]);
        assert_ne!(new_row, row);
    }

    #[test]
    fn null_values_roundtrip() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let row = insert_row(&mut chan, &mut table, &[Value::Int32(1), Value::Null]).unwrap();
        let back = read_row(&mut chan, &table, row).unwrap();
        assert_eq!(back[1], Value::Null);
    }

    #[test]
    fn short_text_roundtrips_without_an_overflow_page() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let values = vec![Value::Int32(1), Value::Text("short".into())];
        let pages_before = chan.page_count();
        let row = insert_row(&mut chan, &mut table, &values).unwrap();
        assert_eq!(chan.page_count(), pages_before + 1, "a short value must not allocate an LVAL page");
        let back = read_row(&mut chan, &table, row).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn oversized_text_spills_to_a_long_value_page_and_is_released_on_delete() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let huge = "m".repeat(3 * 1024 * 1024);
        let row = insert_row(&mut chan, &mut table, &[Value::Int32(1), Value::Text(huge.clone())]).unwrap();
        let back = read_row(&mut chan, &table, row).unwrap();
        assert_eq!(back[1], Value::Text(huge));

        let used_before = chan.free_pages().count_used();
        delete_row(&mut chan, &table, row).unwrap();
        assert!(chan.free_pages().count_used() > used_before, "deleting an out-of-line value must release its LVAL pages");
    }
}
