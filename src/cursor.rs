//! Cursor protocol: stable forward/backward iteration over a table's rows,
//! snapshotting the table's modification counter so a structural change
//! made mid-scan is detected rather than silently skipping or repeating
//! rows.
//!
//! Before-first/after-last sentinel positions, like a standard database
//! cursor. Simplified to an eagerly snapshotted row list rather than a live
//! tree walk, which this engine's single-writer model makes sufficient for
//! detecting invalidation.

use crate::error::Result;
use crate::row;
use crate::schema::Table;
use crate::storage::pager::PageChannel;
use crate::types::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(usize),
    AfterLast,
}

/// A full-table scan cursor, ordered by physical `(page, slot)` position.
/// Index-ordered scans go through [`crate::index::find_first_by_entry`] and
/// [`crate::index::entries_matching`] instead, which don't need this
/// snapshot-and-revalidate machinery since a B-tree range is re-walked live.
pub struct TableCursor {
    rows: Vec<RowId>,
    position: Position,
    snapshot_counter: u64,
}

impl TableCursor {
    /// Snapshot every live row currently in `table`, in ascending
    /// `(page, slot)` order, positioned before the first row.
    pub fn open(channel: &mut PageChannel, table: &Table) -> Result<TableCursor> {
        let rows = Self::scan_rows(channel, table)?;
        Ok(TableCursor { rows, position: Position::BeforeFirst, snapshot_counter: table.mod_counter })
    }

    fn scan_rows(channel: &mut PageChannel, table: &Table) -> Result<Vec<RowId>> {
        let mut rows = Vec::new();
        let (row_count_off, free_off, slot_off) = {
            let format = channel.format();
            (format.data_row_count_offset, format.data_free_space_offset, format.data_slot_table_offset)
        };
        for pn in table.used_pages.iter_used() {
            let mut buf = channel.read_page(pn)?;
            let slot_count = {
                let page = row::RowPage::new(&mut buf, row_count_off, free_off, slot_off);
                page.slot_count()
            };
            for slot in 0..slot_count as u8 {
                let page = row::RowPage::new(&mut buf, row_count_off, free_off, slot_off);
                if page.is_live(slot) && !page.is_forwarded(slot) {
                    rows.push(RowId::new(pn, slot));
                }
            }
            channel.release_buffer(buf);
        }
        Ok(rows)
    }

    /// Re-scan and relocate rather than fail outright when `table` was
    /// mutated since this cursor's last move: a data-page scan re-verifies
    /// the current row is still live, clamping onto `prev` if it isn't, and
    /// leaves `BeforeFirst`/`AfterLast` as they were.
    fn revalidate(&mut self, channel: &mut PageChannel, table: &Table) -> Result<()> {
        if table.mod_counter == self.snapshot_counter {
            return Ok(());
        }
        let current_id = match self.position {
            Position::At(i) => Some(self.rows[i]),
            _ => None,
        };
        let prev_id = match self.position {
            Position::At(i) if i > 0 => Some(self.rows[i - 1]),
            Position::AfterLast if !self.rows.is_empty() => Some(self.rows[self.rows.len() - 1]),
            _ => None,
        };

        let fresh_rows = Self::scan_rows(channel, table)?;
        if let Some(cur) = current_id {
            self.position = match fresh_rows.iter().position(|&r| r == cur) {
                Some(i) => Position::At(i),
                None => match prev_id.and_then(|p| fresh_rows.iter().position(|&r| r == p)) {
                    Some(i) => Position::At(i),
                    None => Position::BeforeFirst,
                },
            };
        }
        // BeforeFirst/AfterLast carry no row identity to re-locate; they
        // stay put and the next move walks the freshly scanned rows.
        self.rows = fresh_rows;
        self.snapshot_counter = table.mod_counter;
        Ok(())
    }

    pub fn before_first(&mut self) {
        self.position = Position::BeforeFirst;
    }

    pub fn after_last(&mut self) {
        self.position = Position::AfterLast;
    }

    pub fn move_next(&mut self, channel: &mut PageChannel, table: &Table) -> Result<Option<RowId>> {
        self.revalidate(channel, table)?;
        let next_idx = match self.position {
            Position::BeforeFirst => 0,
            Position::At(i) => i + 1,
            Position::AfterLast => return Ok(None),
        };
        if next_idx >= self.rows.len() {
            self.position = Position::AfterLast;
            return Ok(None);
        }
        self.position = Position::At(next_idx);
        Ok(Some(self.rows[next_idx]))
    }

    pub fn move_previous(&mut self, channel: &mut PageChannel, table: &Table) -> Result<Option<RowId>> {
        self.revalidate(channel, table)?;
        let prev_idx = match self.position {
            Position::AfterLast => {
                if self.rows.is_empty() {
                    self.position = Position::BeforeFirst;
                    return Ok(None);
                }
                self.rows.len() - 1
            }
            Position::At(0) | Position::BeforeFirst => {
                self.position = Position::BeforeFirst;
                return Ok(None);
            }
            Position::At(i) => i - 1,
        };
        self.position = Position::At(prev_idx);
        Ok(Some(self.rows[prev_idx]))
    }

    pub fn current(&self) -> Option<RowId> {
        match self.position {
            Position::At(i) => Some(self.rows[i]),
            _ => None,
        }
    }

    /// Reposition directly onto a known row id, for point lookups (e.g.
    /// resolving a row found via an index).
    pub fn find_by_rowid(&mut self, channel: &mut PageChannel, table: &Table, target: RowId) -> Result<bool> {
        self.revalidate(channel, table)?;
        match self.rows.iter().position(|&r| r == target) {
            Some(i) => {
                self.position = Position::At(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ColumnType, Value};
    use crate::format::{FormatVersion, JetFormat};
    use crate::os::mem::MemVfs;
    use crate::row::insert_row;
    use crate::schema::{Column, Table};
    use crate::storage::pager::IdentityCodec;
    use crate::storage::usage_map::UsageMap;
    use std::path::PathBuf;

    fn sample_table() -> Table {
        Table {
            name: "T".into(),
            table_def_page: 1,
            columns: vec![Column::new("id", ColumnType::Int32, 0)],
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
        let path = PathBuf::from("/c.mdb");
        PageChannel::create(&vfs, &path, JetFormat::for_version(FormatVersion::Jet4), Box::new(IdentityCodec)).unwrap()
    }

    #[test]
    fn scans_rows_in_insertion_order_on_one_page() {
        let mut chan = open_channel();
        let mut table = sample_table();
        for i in 0..5 {
            insert_row(&mut chan, &mut table, &[Value::Int32(i)]).unwrap();
        }
        let mut cursor = TableCursor::open(&mut chan, &table).unwrap();
        let mut seen = Vec::new();
        while let Some(r) = cursor.move_next(&mut chan, &table).unwrap() {
            seen.push(r);
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(cursor.move_next(&mut chan, &table).unwrap(), None);
    }

    #[test]
    fn move_previous_from_after_last_returns_last_row() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let r0 = insert_row(&mut chan, &mut table, &[Value::Int32(1)]).unwrap();
        let mut cursor = TableCursor::open(&mut chan, &table).unwrap();
        cursor.after_last();
        assert_eq!(cursor.move_previous(&mut chan, &table).unwrap(), Some(r0));
    }

    /// A mutation mid-scan must not fail the cursor: it re-validates and
    /// keeps going, resuming from where the stale position still makes
    /// sense rather than erroring out.
    #[test]
    fn cursor_survives_a_mutation_between_moves() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let r0 = insert_row(&mut chan, &mut table, &[Value::Int32(1)]).unwrap();
        let mut cursor = TableCursor::open(&mut chan, &table).unwrap();
        assert_eq!(cursor.move_next(&mut chan, &table).unwrap(), Some(r0));
        table.mod_counter += 1;
        let r1 = insert_row(&mut chan, &mut table, &[Value::Int32(2)]).unwrap();
        assert_eq!(cursor.move_next(&mut chan, &table).unwrap(), Some(r1));
        assert_eq!(cursor.move_next(&mut chan, &table).unwrap(), None);
    }

    #[test]
    fn cursor_resumes_from_prev_when_its_current_row_is_deleted() {
        let mut chan = open_channel();
        let mut table = sample_table();
        let r0 = insert_row(&mut chan, &mut table, &[Value::Int32(1)]).unwrap();
        let r1 = insert_row(&mut chan, &mut table, &[Value::Int32(2)]).unwrap();
        let mut cursor = TableCursor::open(&mut chan, &table).unwrap();
        assert_eq!(cursor.move_next(&mut chan, &table).unwrap(), Some(r0));
        assert_eq!(cursor.move_next(&mut chan, &table).unwrap(), Some(r1));

        crate::row::delete_row(&mut chan, &table, r1).unwrap();
        table.mod_counter += 1;
        // r1 (current) is gone; the cursor clamps back onto r0 (prev), so
        // the next move_next reports end-of-range rather than erroring.
        assert_eq!(cursor.move_next(&mut chan, &table).unwrap(), None);
    }
}
