//! Usage maps: per-table (and global free-pages) bitmaps recording which
//! pages belong to a table, stored either inline in the table-def page
//! (small tables) or as a chain of dedicated reference pages (large
//! tables).
//!
//! Backed by [`crate::util::BitVec`]; a page set grows by linking in more
//! ranges rather than by reallocating one contiguous array.

use crate::error::{Error, ErrorCode, Result};
use crate::storage::pager::{PageChannel, PageType};
use crate::types::{Pgno, INVALID_PGNO};
use crate::util::BitVec;

/// A contiguous run of pages starting at `base`, one bit per page.
#[derive(Debug, Clone)]
struct Range {
    base: Pgno,
    bits: BitVec,
}

impl Range {
    fn covers(&self, pn: Pgno) -> bool {
        pn >= self.base && (pn - self.base) < self.bits.len() as Pgno
    }

    fn index_of(&self, pn: Pgno) -> usize {
        (pn - self.base) as usize
    }
}

/// Which on-disk representation a table's page set currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageMapVariant {
    /// Bitmap lives directly in the table-def page.
    Inline,
    /// Bitmap spans one or more dedicated reference pages.
    Reference,
}

/// Promote from inline to reference representation once a table's page set
/// grows past what fits in a table-def page. Kept generous since the map
/// itself never enforces the table-def page's actual remaining free space —
/// that's the catalog loader's job when it decides whether to promote.
const INLINE_CAPACITY_PAGES: usize = 128;

/// Header on a reference-map page: `[type][pad][chunk_bits:u16][base:u32]
/// [next_page:u32]`, body is the bitmap bytes for `[base, base+chunk_bits)`.
const REFERENCE_HEADER_LEN: usize = 12;

/// The set of pages owned by one table, index, or the free-pages list.
#[derive(Debug, Clone)]
pub struct UsageMap {
    variant: UsageMapVariant,
    ranges: Vec<Range>,
}

impl UsageMap {
    /// An empty inline map starting at `base`.
    pub fn new_inline(base: Pgno) -> Self {
        UsageMap {
            variant: UsageMapVariant::Inline,
            ranges: vec![Range { base, bits: BitVec::new(INLINE_CAPACITY_PAGES) }],
        }
    }

    /// An empty reference map with no ranges yet; ranges are added as pages
    /// are recorded far from any existing range.
    pub fn new_reference() -> Self {
        UsageMap { variant: UsageMapVariant::Reference, ranges: Vec::new() }
    }

    pub fn variant(&self) -> UsageMapVariant {
        self.variant
    }

    pub fn contains(&self, pn: Pgno) -> bool {
        self.ranges
            .iter()
            .find(|r| r.covers(pn))
            .map(|r| r.bits.get(r.index_of(pn)))
            .unwrap_or(false)
    }

    /// Record `pn` as used (`used = true`) or free (`used = false`),
    /// extending an existing range, starting a new one, or promoting from
    /// inline to reference storage when the inline capacity is exceeded.
    /// Recording an already-used page as used again is a caller bug — most
    /// callers propagate the error, but an in-place leaf rewrite that
    /// re-records a page it already owns deliberately swallows it.
    pub fn add(&mut self, pn: Pgno, used: bool) -> Result<()> {
        if used && self.contains(pn) {
            return Err(Error::with_message(
                ErrorCode::ConstraintViolation,
                format!("page {pn} is already recorded as used in this map"),
            ));
        }
        self.add_unchecked(pn, used)
    }

    fn add_unchecked(&mut self, pn: Pgno, used: bool) -> Result<()> {
        if let Some(r) = self.ranges.iter_mut().find(|r| r.covers(pn)) {
            let idx = r.index_of(pn);
            r.bits.set(idx, used);
            return Ok(());
        }
        // Try to extend the range nearest below pn, within capacity.
        if let Some(r) = self
            .ranges
            .iter_mut()
            .filter(|r| pn >= r.base)
            .max_by_key(|r| r.base)
        {
            let needed = (pn - r.base) as usize + 1;
            let cap = match self.variant {
                UsageMapVariant::Inline => INLINE_CAPACITY_PAGES,
                UsageMapVariant::Reference => needed.max(r.bits.len()),
            };
            if self.variant == UsageMapVariant::Inline && needed > cap {
                self.promote()?;
                return self.add_unchecked(pn, used);
            }
            r.bits.resize(needed.max(r.bits.len()));
            let idx = r.index_of(pn);
            r.bits.set(idx, used);
            return Ok(());
        }
        match self.variant {
            UsageMapVariant::Inline if !self.ranges.is_empty() => {
                self.promote()?;
                self.add_unchecked(pn, used)
            }
            _ => {
                let mut bits = BitVec::new(1);
                bits.set(0, used);
                self.ranges.push(Range { base: pn, bits });
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, pn: Pgno) -> Result<()> {
        self.add_unchecked(pn, false)
    }

    /// Promote an inline map to reference storage in memory, preserving
    /// every bit already recorded. Reference maps promote to themselves, a
    /// no-op. Does not itself write anything to disk — call
    /// [`UsageMap::write_reference_pages`] once the caller is ready to
    /// persist the table-def's page-pointer list.
    pub fn promote(&mut self) -> Result<()> {
        if self.variant == UsageMapVariant::Reference {
            return Ok(());
        }
        self.variant = UsageMapVariant::Reference;
        Ok(())
    }

    /// Pop an arbitrary used page out of the map, marking it free, for the
    /// page channel's free-page allocator. Returns `None` when nothing is
    /// recorded as used.
    pub fn pop_any(&mut self) -> Option<Pgno> {
        for r in &mut self.ranges {
            if let Some(idx) = r.bits.iter_ones().next() {
                r.bits.set(idx, false);
                return Some(r.base + idx as Pgno);
            }
        }
        None
    }

    pub fn count_used(&self) -> usize {
        self.ranges.iter().map(|r| r.bits.count_ones()).sum()
    }

    /// Every currently-used page, in ascending order. Used by the free-pages
    /// map to validate disjointness against a table's own used map.
    pub fn iter_used(&self) -> impl Iterator<Item = Pgno> + '_ {
        self.ranges
            .iter()
            .flat_map(|r| r.bits.iter_ones().map(move |idx| r.base + idx as Pgno))
    }

    /// Validate that no page here is also recorded used in `other` — the
    /// global free-pages map and a table's used map must never overlap.
    pub fn assert_disjoint(&self, other: &UsageMap) -> Result<()> {
        for pn in self.iter_used() {
            if other.contains(pn) {
                return Err(Error::with_message(
                    ErrorCode::CorruptFormat,
                    format!("page {pn} recorded used in two disjoint usage maps"),
                ));
            }
        }
        Ok(())
    }

    /// The `(base, bitmap bytes, bit count)` of an inline map's single
    /// range, for the catalog loader to embed directly in a table-def
    /// record. `None` for a reference map or an inline map with no range.
    pub fn inline_snapshot(&self) -> Option<(Pgno, Vec<u8>, usize)> {
        if self.variant != UsageMapVariant::Inline {
            return None;
        }
        self.ranges.first().map(|r| (r.base, r.bits.as_bytes().to_vec(), r.bits.len()))
    }

    /// Rebuild an inline map from the parts [`UsageMap::inline_snapshot`]
    /// returned.
    pub fn from_inline_bytes(base: Pgno, bytes: &[u8], bit_len: usize) -> UsageMap {
        UsageMap { variant: UsageMapVariant::Inline, ranges: vec![Range { base, bits: BitVec::from_bytes(bytes, bit_len) }] }
    }

    /// Write this map's bitmap out as a chain of reference pages (the same
    /// back-to-front allocation order as a chained long value, so each
    /// page's `next_page` is known before it's written). Returns the head
    /// page number the table-def should store, or [`INVALID_PGNO`] if the
    /// map has no ranges to persist.
    pub fn write_reference_pages(&self, channel: &mut PageChannel) -> Result<Pgno> {
        if self.ranges.is_empty() {
            return Ok(INVALID_PGNO);
        }
        let lowest = self.ranges.iter().map(|r| r.base).min().unwrap();
        let highest = self.ranges.iter().map(|r| r.base + r.bits.len() as Pgno).max().unwrap();
        let span = (highest - lowest) as usize;
        let mut flat = BitVec::new(span);
        for r in &self.ranges {
            for idx in r.bits.iter_ones() {
                flat.set((r.base + idx as Pgno - lowest) as usize, true);
            }
        }

        let page_size = channel.format().page_size as usize;
        let bytes_per_chunk = (page_size - REFERENCE_HEADER_LEN).max(1);
        let flat_bytes = flat.as_bytes();
        let chunks: Vec<&[u8]> = if flat_bytes.is_empty() { vec![&[]] } else { flat_bytes.chunks(bytes_per_chunk).collect() };

        let mut next_pn = INVALID_PGNO;
        let mut head_pn = INVALID_PGNO;
        for (i, chunk) in chunks.iter().enumerate().rev() {
            let base = lowest + (i * bytes_per_chunk * 8) as Pgno;
            let (pn, mut buf) = channel.allocate_page(PageType::UsageMap)?;
            buf[1] = 0;
            buf[2..4].copy_from_slice(&((chunk.len() * 8) as u16).to_le_bytes());
            buf[4..8].copy_from_slice(&base.to_le_bytes());
            buf[8..12].copy_from_slice(&next_pn.to_le_bytes());
            buf[REFERENCE_HEADER_LEN..REFERENCE_HEADER_LEN + chunk.len()].copy_from_slice(chunk);
            channel.write_page(&buf, pn)?;
            channel.release_buffer(buf);
            next_pn = pn;
            head_pn = pn;
        }
        Ok(head_pn)
    }

    /// Read back a reference-page chain written by
    /// [`UsageMap::write_reference_pages`]. `head == INVALID_PGNO` yields an
    /// empty reference map.
    pub fn read_reference_pages(channel: &mut PageChannel, head: Pgno) -> Result<UsageMap> {
        let mut ranges = Vec::new();
        let mut pn = head;
        while pn != INVALID_PGNO {
            let buf = channel.read_page(pn)?;
            let chunk_bits = u16::from_le_bytes(buf[2..4].try_into().unwrap()) as usize;
            let base = Pgno::from_le_bytes(buf[4..8].try_into().unwrap());
            let next = Pgno::from_le_bytes(buf[8..12].try_into().unwrap());
            let byte_len = chunk_bits.div_ceil(8);
            let bits = BitVec::from_bytes(&buf[REFERENCE_HEADER_LEN..REFERENCE_HEADER_LEN + byte_len], chunk_bits);
            channel.release_buffer(buf);
            if chunk_bits > 0 {
                ranges.push(Range { base, bits });
            }
            pn = next;
        }
        Ok(UsageMap { variant: UsageMapVariant::Reference, ranges })
    }
}

/// Forward/backward iteration over a usage map's used pages, snapshotting
/// the map's page list up front the same way [`crate::cursor::TableCursor`]
/// snapshots a table's rows — a usage map has no modification counter of
/// its own, so this cursor's owner (typically a free-space scan) is
/// responsible for re-opening it after a structural change.
pub struct UsageMapCursor {
    pages: Vec<Pgno>,
    pos: Option<usize>,
}

impl UsageMapCursor {
    pub fn new(map: &UsageMap) -> Self {
        UsageMapCursor { pages: map.iter_used().collect(), pos: None }
    }

    pub fn move_next(&mut self) -> Option<Pgno> {
        let next = match self.pos {
            None => 0,
            Some(i) => i + 1,
        };
        if next >= self.pages.len() {
            self.pos = Some(self.pages.len());
            return None;
        }
        self.pos = Some(next);
        Some(self.pages[next])
    }

    pub fn move_previous(&mut self) -> Option<Pgno> {
        let prev = match self.pos {
            None | Some(0) => return None,
            Some(i) => i - 1,
        };
        self.pos = Some(prev);
        Some(self.pages[prev])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FormatVersion, JetFormat};
    use crate::os::mem::MemVfs;
    use crate::storage::pager::IdentityCodec;
    use std::path::PathBuf;

    fn open_channel() -> PageChannel {
        let vfs = MemVfs::new();
        let path = PathBuf::from("/u.mdb");
        PageChannel::create(&vfs, &path, JetFormat::for_version(FormatVersion::Jet4), Box::new(IdentityCodec)).unwrap()
    }

    #[test]
    fn inline_map_tracks_used_pages() {
        let mut m = UsageMap::new_inline(10);
        m.add(12, true).unwrap();
        m.add(15, true).unwrap();
        assert!(m.contains(12));
        assert!(m.contains(15));
        assert!(!m.contains(13));
        assert_eq!(m.count_used(), 2);
    }

    #[test]
    fn removing_clears_bit() {
        let mut m = UsageMap::new_inline(0);
        m.add(3, true).unwrap();
        m.remove(3).unwrap();
        assert!(!m.contains(3));
    }

    #[test]
    fn promotes_past_inline_capacity() {
        let mut m = UsageMap::new_inline(0);
        m.add((INLINE_CAPACITY_PAGES as Pgno) + 50, true).unwrap();
        assert_eq!(m.variant(), UsageMapVariant::Reference);
        assert!(m.contains((INLINE_CAPACITY_PAGES as Pgno) + 50));
    }

    #[test]
    fn pop_any_returns_and_clears_a_used_page() {
        let mut m = UsageMap::new_inline(0);
        m.add(5, true).unwrap();
        let popped = m.pop_any().unwrap();
        assert_eq!(popped, 5);
        assert!(!m.contains(5));
        assert!(m.pop_any().is_none());
    }

    #[test]
    fn disjointness_check_flags_overlap() {
        let mut a = UsageMap::new_inline(0);
        let mut b = UsageMap::new_inline(0);
        a.add(7, true).unwrap();
        b.add(7, true).unwrap();
        assert!(a.assert_disjoint(&b).is_err());
    }

    #[test]
    fn adding_an_already_used_page_is_a_constraint_violation() {
        let mut m = UsageMap::new_inline(0);
        m.add(4, true).unwrap();
        let err = m.add(4, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConstraintViolation);
    }

    #[test]
    fn reference_pages_round_trip_through_a_fresh_channel() {
        let mut chan = open_channel();
        let mut m = UsageMap::new_reference();
        for pn in [3u32, 9, 40, 4000] {
            m.add(pn, true).unwrap();
        }
        let head = m.write_reference_pages(&mut chan).unwrap();
        assert_ne!(head, INVALID_PGNO);
        let back = UsageMap::read_reference_pages(&mut chan, head).unwrap();
        for pn in [3u32, 9, 40, 4000] {
            assert!(back.contains(pn));
        }
        assert_eq!(back.count_used(), 4);
    }

    #[test]
    fn reference_pages_chain_when_the_span_exceeds_one_page() {
        let mut chan = open_channel();
        let mut m = UsageMap::new_reference();
        let far_page = (chan.format().page_size as u32 - REFERENCE_HEADER_LEN as u32) * 8 * 3;
        m.add(0, true).unwrap();
        m.add(far_page, true).unwrap();
        let head = m.write_reference_pages(&mut chan).unwrap();
        let back = UsageMap::read_reference_pages(&mut chan, head).unwrap();
        assert!(back.contains(0));
        assert!(back.contains(far_page));
    }

    #[test]
    fn empty_map_writes_no_pages() {
        let mut chan = open_channel();
        let m = UsageMap::new_reference();
        assert_eq!(m.write_reference_pages(&mut chan).unwrap(), INVALID_PGNO);
    }

    #[test]
    fn inline_snapshot_round_trips_through_from_inline_bytes() {
        let mut m = UsageMap::new_inline(20);
        m.add(22, true).unwrap();
        m.add(25, true).unwrap();
        let (base, bytes, bit_len) = m.inline_snapshot().unwrap();
        let back = UsageMap::from_inline_bytes(base, &bytes, bit_len);
        assert!(back.contains(22));
        assert!(back.contains(25));
        assert_eq!(back.count_used(), 2);
    }

    #[test]
    fn cursor_walks_used_pages_forward_then_back() {
        let mut m = UsageMap::new_inline(0);
        for pn in [1u32, 2, 3] {
            m.add(pn, true).unwrap();
        }
        let mut cursor = UsageMapCursor::new(&m);
        assert_eq!(cursor.move_next(), Some(1));
        assert_eq!(cursor.move_next(), Some(2));
        assert_eq!(cursor.move_next(), Some(3));
        assert_eq!(cursor.move_next(), None);
        assert_eq!(cursor.move_previous(), Some(3));
        assert_eq!(cursor.move_previous(), Some(2));
    }
}
