//! B-tree index: leaf/intermediate page layout, insert/delete/lookup,
//! range scans, and one-hop foreign-key cascade.
//!
//! Standard split-and-push-separator-up shape: an overflowing leaf or
//! intermediate page splits and pushes a separator key into its parent,
//! growing a new root when the old one overflows. Foreign-key cascade is
//! narrowed to exactly one hop per the relationship model in
//! [`crate::schema::Relationship`].

pub mod normalize;

use crate::codec::Value;
use crate::collation::SortOrder;
use crate::error::{Error, ErrorCode, Result};
use crate::schema::{CascadeAction, Index, IndexColumn, Relationship, Schema};
use crate::storage::pager::{Buffer, PageChannel, PageType};
use crate::types::{Pgno, RowId};

const LEAF_HEADER_LEN: usize = 12; // type(1) + reserved(3) + entry_count(2) + next_leaf(4) + free_space(2)
const INTERMEDIATE_HEADER_LEN: usize = 10; // type(1) + reserved(3) + entry_count(2) + rightmost_child(4)

struct LeafEntry {
    key: Vec<u8>,
    row: RowId,
}

fn read_leaf_entries(buf: &Buffer) -> Vec<LeafEntry> {
    let count = u16::from_le_bytes(buf[4..6].try_into().unwrap()) as usize;
    let mut out = Vec::with_capacity(count);
    let mut cursor = LEAF_HEADER_LEN;
    for _ in 0..count {
        let key_len = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap()) as usize;
        cursor += 2;
        let key = buf[cursor..cursor + key_len].to_vec();
        cursor += key_len;
        let page = Pgno::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let slot = buf[cursor];
        cursor += 1;
        out.push(LeafEntry { key, row: RowId::new(page, slot) });
    }
    out
}

/// Builds the on-disk image for `entries`. When the entries don't fit in
/// `format_page_size`, the returned buffer is sized to whatever they
/// actually need instead of panicking, so callers can detect overflow by
/// comparing `buf.len()` against `format_page_size` and split.
fn write_leaf_entries(format_page_size: usize, entries: &[LeafEntry], next_leaf: Pgno) -> Buffer {
    let needed: usize = LEAF_HEADER_LEN + entries.iter().map(|e| 2 + e.key.len() + 5).sum::<usize>();
    let mut buf = vec![0u8; needed.max(format_page_size)];
    buf[0] = PageType::LeafIndexData as u8;
    buf[4..6].copy_from_slice(&(entries.len() as u16).to_le_bytes());
    buf[6..10].copy_from_slice(&next_leaf.to_le_bytes());
    let mut cursor = LEAF_HEADER_LEN;
    for e in entries {
        buf[cursor..cursor + 2].copy_from_slice(&(e.key.len() as u16).to_le_bytes());
        cursor += 2;
        buf[cursor..cursor + e.key.len()].copy_from_slice(&e.key);
        cursor += e.key.len();
        buf[cursor..cursor + 4].copy_from_slice(&e.row.page.to_le_bytes());
        cursor += 4;
        buf[cursor] = e.row.slot;
        cursor += 1;
    }
    if buf.len() > cursor {
        let free = buf.len() - cursor;
        buf[10..12].copy_from_slice(&(free.min(u16::MAX as usize) as u16).to_le_bytes());
    }
    buf
}

fn next_leaf_pgno(buf: &Buffer) -> Pgno {
    Pgno::from_le_bytes(buf[6..10].try_into().unwrap())
}

struct SeparatorEntry {
    key: Vec<u8>,
    child: Pgno,
}

fn read_intermediate(buf: &Buffer) -> (Vec<SeparatorEntry>, Pgno) {
    let count = u16::from_le_bytes(buf[4..6].try_into().unwrap()) as usize;
    let rightmost = Pgno::from_le_bytes(buf[6..10].try_into().unwrap());
    let mut out = Vec::with_capacity(count);
    let mut cursor = INTERMEDIATE_HEADER_LEN;
    for _ in 0..count {
        let key_len = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap()) as usize;
        cursor += 2;
        let key = buf[cursor..cursor + key_len].to_vec();
        cursor += key_len;
        let child = Pgno::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        out.push(SeparatorEntry { key, child });
    }
    (out, rightmost)
}

/// Same oversized-buffer-on-overflow convention as [`write_leaf_entries`].
fn write_intermediate(format_page_size: usize, entries: &[SeparatorEntry], rightmost: Pgno) -> Buffer {
    let needed: usize = INTERMEDIATE_HEADER_LEN + entries.iter().map(|e| 2 + e.key.len() + 4).sum::<usize>();
    let mut buf = vec![0u8; needed.max(format_page_size)];
    buf[0] = PageType::IntermediateIndexData as u8;
    buf[4..6].copy_from_slice(&(entries.len() as u16).to_le_bytes());
    buf[6..10].copy_from_slice(&rightmost.to_le_bytes());
    let mut cursor = INTERMEDIATE_HEADER_LEN;
    for e in entries {
        buf[cursor..cursor + 2].copy_from_slice(&(e.key.len() as u16).to_le_bytes());
        cursor += 2;
        buf[cursor..cursor + e.key.len()].copy_from_slice(&e.key);
        cursor += e.key.len();
        buf[cursor..cursor + 4].copy_from_slice(&e.child.to_le_bytes());
        cursor += 4;
    }
    buf
}

/// Descend from `root` to the leaf page that would hold `key`, recording the
/// path of intermediate pages walked for split propagation.
fn descend_to_leaf(channel: &mut PageChannel, root: Pgno, key: &[u8]) -> Result<(Vec<Pgno>, Pgno)> {
    let mut path = Vec::new();
    let mut pn = root;
    loop {
        let buf = channel.read_page(pn)?;
        match buf[0] {
            t if t == PageType::LeafIndexData as u8 => {
                channel.release_buffer(buf);
                return Ok((path, pn));
            }
            t if t == PageType::IntermediateIndexData as u8 => {
                let (entries, rightmost) = read_intermediate(&buf);
                let next = entries
                    .iter()
                    .find(|e| key < e.key.as_slice())
                    .map(|e| e.child)
                    .unwrap_or(rightmost);
                channel.release_buffer(buf);
                path.push(pn);
                pn = next;
            }
            _ => {
                channel.release_buffer(buf);
                return Err(Error::with_message(ErrorCode::CorruptFormat, "unexpected page type in index tree"));
            }
        }
    }
}

/// Insert `(key, row)` into the index rooted at `index.root_page`, updating
/// `index.root_page` in place if the root splits. When `index.ignore_nulls`
/// is set and `key_has_null` reports that at least one of the key's source
/// columns was null, no entry is written at all.
pub fn insert(channel: &mut PageChannel, index: &mut Index, key: Vec<u8>, row: RowId, key_has_null: bool) -> Result<()> {
    if index.ignore_nulls && key_has_null {
        return Ok(());
    }
    let page_size = channel.format().page_size as usize;
    let (path, leaf_pn) = descend_to_leaf(channel, index.root_page, &key)?;
    let leaf_buf = channel.read_page(leaf_pn)?;
    let mut entries = read_leaf_entries(&leaf_buf);
    let next_leaf = next_leaf_pgno(&leaf_buf);
    channel.release_buffer(leaf_buf);

    if index.unique && entries.iter().any(|e| e.key == key) {
        return Err(Error::new(ErrorCode::ConstraintViolation));
    }

    let pos = entries.partition_point(|e| e.key < key);
    entries.insert(pos, LeafEntry { key, row });

    let new_buf = write_leaf_entries(page_size, &entries, next_leaf);
    if new_buf.len() <= page_size {
        channel.write_page(&new_buf, leaf_pn)?;
        index.usage_map.add(leaf_pn, true).ok();
        return Ok(());
    }

    // Split: right half moves to a new leaf page, linked after the original.
    let mid = entries.len() / 2;
    let right = entries.split_off(mid);
    let separator_key = right[0].key.clone();
    let (right_pgno, _) = channel.allocate_page(PageType::LeafIndexData)?;
    let right_buf = write_leaf_entries(page_size, &right, next_leaf);
    channel.write_page(&right_buf, right_pgno)?;
    let left_buf = write_leaf_entries(page_size, &entries, right_pgno);
    channel.write_page(&left_buf, leaf_pn)?;
    index.usage_map.add(right_pgno, true)?;

    propagate_split(channel, index, path, leaf_pn, separator_key, right_pgno)
}

/// Insert a new separator for `right_pgno` into `path`'s deepest intermediate
/// page, splitting intermediates (and finally creating a new root) exactly
/// the same way an insert grows the tree upward when the root overflows.
fn propagate_split(
    channel: &mut PageChannel,
    index: &mut Index,
    mut path: Vec<Pgno>,
    left_child: Pgno,
    separator_key: Vec<u8>,
    right_child: Pgno,
) -> Result<()> {
    let page_size = channel.format().page_size as usize;
    let Some(parent_pn) = path.pop() else {
        // Left child was the root: create a fresh root above both children.
        let (new_root_pn, _) = channel.allocate_page(PageType::IntermediateIndexData)?;
        let buf = write_intermediate(page_size, &[SeparatorEntry { key: separator_key, child: left_child }], right_child);
        channel.write_page(&buf, new_root_pn)?;
        index.usage_map.add(new_root_pn, true)?;
        index.root_page = new_root_pn;
        return Ok(());
    };

    let buf = channel.read_page(parent_pn)?;
    let (mut entries, rightmost) = read_intermediate(&buf);
    channel.release_buffer(buf);
    let pos = entries.partition_point(|e| e.key < separator_key);
    entries.insert(pos, SeparatorEntry { key: separator_key, child: left_child });
    // left_child already appears as some child pointer in this parent (or is
    // the former rightmost); right_child becomes the new pointer at pos+1.
    if pos + 1 <= entries.len() - 1 {
        entries[pos + 1].child = right_child;
    }
    let new_rightmost = if pos == entries.len() - 1 { right_child } else { rightmost };

    let new_buf = write_intermediate(page_size, &entries, new_rightmost);
    if new_buf.len() <= page_size {
        channel.write_page(&new_buf, parent_pn)?;
        return Ok(());
    }

    let mid = entries.len() / 2;
    let right_entries = entries.split_off(mid + 1);
    let up_key = entries[mid].key.clone();
    let left_rightmost = entries[mid].child;
    entries.truncate(mid);
    let (new_parent_pn, _) = channel.allocate_page(PageType::IntermediateIndexData)?;
    let right_buf = write_intermediate(page_size, &right_entries, new_rightmost);
    channel.write_page(&right_buf, new_parent_pn)?;
    let left_buf = write_intermediate(page_size, &entries, left_rightmost);
    channel.write_page(&left_buf, parent_pn)?;
    index.usage_map.add(new_parent_pn, true)?;

    propagate_split(channel, index, path, parent_pn, up_key, new_parent_pn)
}

/// Find the first entry at or after `key`, if any, walking leaf-to-leaf
/// links when the starting leaf runs out of entries without matching.
pub fn find_first_by_entry(channel: &mut PageChannel, index: &Index, key: &[u8]) -> Result<Option<RowId>> {
    let (_, leaf_pn) = descend_to_leaf(channel, index.root_page, key)?;
    let mut pn = leaf_pn;
    loop {
        let buf = channel.read_page(pn)?;
        let entries = read_leaf_entries(&buf);
        let next = next_leaf_pgno(&buf);
        channel.release_buffer(buf);
        if let Some(e) = entries.iter().find(|e| e.key.as_slice() >= key) {
            return Ok(Some(e.row));
        }
        if next == crate::types::INVALID_PGNO {
            return Ok(None);
        }
        pn = next;
    }
}

/// Position at the first entry with key ≥ `key`, for opening a range scan
/// (as opposed to [`find_first_by_entry`], which answers a point existence
/// question). Shares `find_first_by_entry`'s leaf-to-leaf walk; kept as a
/// distinct entry point since a range scan and an existence check read
/// differently at the call site even though today they compute the same
/// thing.
pub fn find_closest_by_entry(channel: &mut PageChannel, index: &Index, key: &[u8]) -> Result<Option<RowId>> {
    find_first_by_entry(channel, index, key)
}

/// Every entry in `[low, high)`, in ascending key order.
pub fn entries_matching(channel: &mut PageChannel, index: &Index, low: &[u8], high: &[u8]) -> Result<Vec<RowId>> {
    let (_, leaf_pn) = descend_to_leaf(channel, index.root_page, low)?;
    let mut out = Vec::new();
    let mut pn = leaf_pn;
    loop {
        let buf = channel.read_page(pn)?;
        let entries = read_leaf_entries(&buf);
        let next = next_leaf_pgno(&buf);
        channel.release_buffer(buf);
        for e in &entries {
            if e.key.as_slice() >= low && e.key.as_slice() < high {
                out.push(e.row);
            } else if e.key.as_slice() >= high {
                return Ok(out);
            }
        }
        if next == crate::types::INVALID_PGNO {
            return Ok(out);
        }
        pn = next;
    }
}

/// Remove the entry for `(key, row)`. Leaf underflow is tolerated rather
/// than triggering a merge — an index with many deletions simply carries
/// some sparsely-filled leaves until the next insert fills them back in.
pub fn delete(channel: &mut PageChannel, index: &Index, key: &[u8], row: RowId) -> Result<()> {
    let (_, leaf_pn) = descend_to_leaf(channel, index.root_page, key)?;
    let buf = channel.read_page(leaf_pn)?;
    let mut entries = read_leaf_entries(&buf);
    let next_leaf = next_leaf_pgno(&buf);
    channel.release_buffer(buf);
    let before = entries.len();
    entries.retain(|e| !(e.key == key && e.row == row));
    if entries.len() == before {
        return Err(Error::with_message(ErrorCode::InvalidArgument, "index entry not found"));
    }
    let new_buf = write_leaf_entries(channel.format().page_size as usize, &entries, next_leaf);
    channel.write_page(&new_buf, leaf_pn)
}

/// Check one hop of foreign-key relationships where `table` is the
/// referencing side: for every enforced relationship, the referenced key
/// must already exist. Grounded on `executor::fkey::fk_check_insert`'s
/// parent-exists check, narrowed to a single level.
pub fn check_foreign_keys_on_insert(
    channel: &mut PageChannel,
    schema: &Schema,
    table: &str,
    values: &[Value],
    column_positions: impl Fn(&str) -> usize,
) -> Result<()> {
    for rel in schema.relationships() {
        if !rel.enforce_integrity || rel.referencing_table.to_lowercase() != table.to_lowercase() {
            continue;
        }
        let referenced = schema.require_table(&rel.referenced_table)?;
        let Some(pk) = referenced.primary_key() else { continue };
        let key_values: Vec<Value> =
            rel.referencing_columns.iter().map(|c| values[column_positions(c)].clone()).collect();
        if key_values.iter().any(Value::is_null) {
            continue; // a NULL FK column never needs a parent
        }
        let key = normalize::build_key(&key_values, &pk.columns, SortOrder::General)?;
        if find_first_by_entry(channel, pk, &key)?.is_none() {
            return Err(Error::with_message(
                ErrorCode::ConstraintViolation,
                format!("no parent row in {} for relationship {}", rel.referenced_table, rel.name),
            ));
        }
    }
    Ok(())
}

/// What to do with the set of dependent rows found on delete, decided
/// per-relationship by [`CascadeAction`].
pub enum CascadeOutcome {
    Blocked(String),
    Proceed,
}

/// Decide the cascade outcome for deleting a parent row whose relationships
/// are given in `dependents`; `has_children` reports whether any row in the
/// referencing table still points at the deleted key.
pub fn plan_delete_cascade(dependents: &[&Relationship], has_children: impl Fn(&Relationship) -> bool) -> CascadeOutcome {
    for rel in dependents {
        if !has_children(rel) {
            continue;
        }
        match rel.on_delete {
            CascadeAction::NoAction => {
                return CascadeOutcome::Blocked(format!(
                    "{} has dependent rows in {} via relationship {}",
                    rel.referenced_table, rel.referencing_table, rel.name
                ))
            }
            CascadeAction::Cascade | CascadeAction::SetNull => continue,
        }
    }
    CascadeOutcome::Proceed
}
