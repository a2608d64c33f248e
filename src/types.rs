//! Core type aliases shared across the storage, codec, index and schema
//! layers. Kept separate from any one module since `pager`, `index` and
//! `schema` all need them alike.

use std::fmt;

/// A page number. `0` is reserved as [`INVALID_PGNO`]; real pages start at 1
/// (page 0's slot in the file is the database header page, addressed
/// separately since it never participates in a usage map).
pub type Pgno = u32;

pub const INVALID_PGNO: Pgno = 0;

/// Row identity: `(page, slot)`. Equality determines row
/// identity for the lifetime a row occupies that slot; a tombstoned slot's
/// `RowId` stays meaningful (it still "exists" as an address) even though the
/// row itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub page: Pgno,
    pub slot: u8,
}

impl RowId {
    pub const fn new(page: Pgno, slot: u8) -> Self {
        RowId { page, slot }
    }

    /// Sentinel used by cursors positioned before any real row.
    pub const FIRST: RowId = RowId::new(INVALID_PGNO, 0);
    /// Sentinel used by cursors positioned after the last real row.
    pub const LAST: RowId = RowId::new(Pgno::MAX, u8::MAX);
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_ordering_is_page_then_slot() {
        assert!(RowId::new(1, 5) < RowId::new(2, 0));
        assert!(RowId::new(1, 0) < RowId::new(1, 5));
    }

    #[test]
    fn sentinels_bound_every_real_row_id() {
        let r = RowId::new(100, 3);
        assert!(RowId::FIRST < r);
        assert!(r < RowId::LAST);
    }
}
