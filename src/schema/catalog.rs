//! Catalog persistence: the table/column/index/relationship metadata a
//! freshly opened database has no other way to recover, serialized as
//! chains of pages the same way a long value chains across `LVAL` pages
//! (see [`crate::codec::longvalue`]).
//!
//! Three chains round-trip through pointers recorded in the database
//! header, standing in for Jet's own system tables: one listing every
//! user table's own `TABLE_DEF` chain head (`MSysObjects`), one for
//! relationships (`MSysRelationships`), and one reserved for query objects
//! (`MSysQueries`) that always round-trips empty, since this engine has no
//! query layer above the storage engine to populate it with.
//!
//! A table's name lives inside its own `TABLE_DEF` record, not duplicated
//! in the `MSysObjects` directory, so the directory is just a list of page
//! pointers rather than `(name, pointer)` pairs.

use std::sync::Arc;

use crate::codec::ColumnType;
use crate::error::{Error, ErrorCode, Result};
use crate::schema::{CascadeAction, Column, Index, IndexColumn, Relationship, Schema, Table};
use crate::storage::pager::{PageChannel, PageType};
use crate::storage::usage_map::{UsageMap, UsageMapVariant};
use crate::types::{Pgno, INVALID_PGNO};

const TABLES_ROOT_OFFSET: usize = 0x18;
const RELATIONSHIPS_ROOT_OFFSET: usize = 0x1c;
const QUERIES_ROOT_OFFSET: usize = 0x20;

/// Header on a catalog chain page: `[type][pad][len:u16][next_page:u32]`,
/// identical in shape to a chained long value's header.
const CHAIN_HEADER_LEN: usize = 8;

/// The three catalog chain heads, recorded in the database header page so
/// `Database::open` can find them without a separate bootstrap record.
#[derive(Debug, Clone, Copy)]
pub struct CatalogRoot {
    pub tables: Pgno,
    pub relationships: Pgno,
    pub queries: Pgno,
}

impl CatalogRoot {
    pub fn empty() -> Self {
        CatalogRoot { tables: INVALID_PGNO, relationships: INVALID_PGNO, queries: INVALID_PGNO }
    }
}

/// Read the catalog root pointers out of the header page. A freshly
/// created database has all three zeroed, which decodes as an empty
/// catalog rather than needing a special case.
pub fn read_root(channel: &mut PageChannel) -> Result<CatalogRoot> {
    let buf = channel.read_page(0)?;
    let tables = Pgno::from_le_bytes(buf[TABLES_ROOT_OFFSET..TABLES_ROOT_OFFSET + 4].try_into().unwrap());
    let relationships =
        Pgno::from_le_bytes(buf[RELATIONSHIPS_ROOT_OFFSET..RELATIONSHIPS_ROOT_OFFSET + 4].try_into().unwrap());
    let queries = Pgno::from_le_bytes(buf[QUERIES_ROOT_OFFSET..QUERIES_ROOT_OFFSET + 4].try_into().unwrap());
    channel.release_buffer(buf);
    Ok(CatalogRoot { tables, relationships, queries })
}

pub fn write_root(channel: &mut PageChannel, root: &CatalogRoot) -> Result<()> {
    let mut buf = channel.read_page(0)?;
    buf[TABLES_ROOT_OFFSET..TABLES_ROOT_OFFSET + 4].copy_from_slice(&root.tables.to_le_bytes());
    buf[RELATIONSHIPS_ROOT_OFFSET..RELATIONSHIPS_ROOT_OFFSET + 4].copy_from_slice(&root.relationships.to_le_bytes());
    buf[QUERIES_ROOT_OFFSET..QUERIES_ROOT_OFFSET + 4].copy_from_slice(&root.queries.to_le_bytes());
    channel.write_page(&buf, 0)?;
    channel.release_buffer(buf);
    Ok(())
}

/// Serialize every table and relationship currently in `schema`, writing a
/// fresh copy of every chain. Doesn't reclaim the previous catalog's pages
/// (an open question left for a future compaction pass — see DESIGN.md).
pub fn save(channel: &mut PageChannel, schema: &Schema) -> Result<CatalogRoot> {
    let mut table_heads = Vec::new();
    for table in schema.tables() {
        let bytes = encode_table(channel, table)?;
        table_heads.push(write_chain(channel, &bytes)?);
    }
    let mut tables_blob = Vec::new();
    put_u16(&mut tables_blob, table_heads.len() as u16);
    for head in &table_heads {
        put_u32(&mut tables_blob, *head);
    }
    let tables = write_chain(channel, &tables_blob)?;

    let mut rel_blob = Vec::new();
    put_u16(&mut rel_blob, schema.relationships().len() as u16);
    for rel in schema.relationships() {
        encode_relationship(&mut rel_blob, rel);
    }
    let relationships = write_chain(channel, &rel_blob)?;

    Ok(CatalogRoot { tables, relationships, queries: INVALID_PGNO })
}

/// Rebuild a `Schema` from a previously saved `CatalogRoot`.
pub fn load(channel: &mut PageChannel, root: &CatalogRoot) -> Result<Schema> {
    let mut schema = Schema::new();
    if root.tables != INVALID_PGNO {
        let blob = read_chain(channel, root.tables)?;
        let mut r = Reader::new(&blob);
        let count = r.u16()? as usize;
        let mut heads = Vec::with_capacity(count);
        for _ in 0..count {
            heads.push(r.u32()?);
        }
        for head in heads {
            let bytes = read_chain(channel, head)?;
            schema.insert_table(decode_table(channel, &bytes, head)?);
        }
    }
    if root.relationships != INVALID_PGNO {
        let blob = read_chain(channel, root.relationships)?;
        let mut r = Reader::new(&blob);
        let count = r.u16()? as usize;
        for _ in 0..count {
            schema.add_relationship(decode_relationship(&mut r)?);
        }
    }
    Ok(schema)
}

fn write_chain(channel: &mut PageChannel, bytes: &[u8]) -> Result<Pgno> {
    if bytes.is_empty() {
        return Ok(INVALID_PGNO);
    }
    let page_size = channel.format().page_size as usize;
    let chunk_capacity = page_size - CHAIN_HEADER_LEN;
    let chunks: Vec<&[u8]> = bytes.chunks(chunk_capacity).collect();
    let mut next_pn = INVALID_PGNO;
    let mut head_pn = INVALID_PGNO;
    for chunk in chunks.into_iter().rev() {
        let (pn, mut buf) = channel.allocate_page(PageType::TableDef)?;
        buf[2..4].copy_from_slice(&(chunk.len() as u16).to_le_bytes());
        buf[4..8].copy_from_slice(&next_pn.to_le_bytes());
        buf[CHAIN_HEADER_LEN..CHAIN_HEADER_LEN + chunk.len()].copy_from_slice(chunk);
        channel.write_page(&buf, pn)?;
        channel.release_buffer(buf);
        next_pn = pn;
        head_pn = pn;
    }
    Ok(head_pn)
}

fn read_chain(channel: &mut PageChannel, head: Pgno) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut pn = head;
    while pn != INVALID_PGNO {
        let buf = channel.read_page(pn)?;
        let len = u16::from_le_bytes(buf[2..4].try_into().unwrap()) as usize;
        let next = Pgno::from_le_bytes(buf[4..8].try_into().unwrap());
        out.extend_from_slice(&buf[CHAIN_HEADER_LEN..CHAIN_HEADER_LEN + len]);
        channel.release_buffer(buf);
        pn = next;
    }
    Ok(out)
}

fn put_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}
fn put_bool(out: &mut Vec<u8>, v: bool) {
    out.push(v as u8);
}
fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn put_string(out: &mut Vec<u8>, s: &str) {
    put_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

/// A cursor over a decoded catalog blob, bounds-checked against truncation
/// the same way the row codec never trusts an on-disk length blindly.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::with_message(ErrorCode::CorruptFormat, "truncated catalog record"));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::with_message(ErrorCode::CorruptFormat, "catalog string is not valid utf-8"))
    }
}

fn column_type_tag(ty: ColumnType) -> u8 {
    match ty {
        ColumnType::Bool => 0,
        ColumnType::Byte => 1,
        ColumnType::Int16 => 2,
        ColumnType::Int32 => 3,
        ColumnType::Int64 => 4,
        ColumnType::Float32 => 5,
        ColumnType::Float64 => 6,
        ColumnType::Money => 7,
        ColumnType::Numeric => 8,
        ColumnType::DateTime => 9,
        ColumnType::ExtDateTime => 10,
        ColumnType::Text => 11,
        ColumnType::Memo => 12,
        ColumnType::Binary => 13,
        ColumnType::Ole => 14,
        ColumnType::Guid => 15,
        ColumnType::Complex => 16,
    }
}

fn column_type_from_tag(tag: u8) -> Result<ColumnType> {
    Ok(match tag {
        0 => ColumnType::Bool,
        1 => ColumnType::Byte,
        2 => ColumnType::Int16,
        3 => ColumnType::Int32,
        4 => ColumnType::Int64,
        5 => ColumnType::Float32,
        6 => ColumnType::Float64,
        7 => ColumnType::Money,
        8 => ColumnType::Numeric,
        9 => ColumnType::DateTime,
        10 => ColumnType::ExtDateTime,
        11 => ColumnType::Text,
        12 => ColumnType::Memo,
        13 => ColumnType::Binary,
        14 => ColumnType::Ole,
        15 => ColumnType::Guid,
        16 => ColumnType::Complex,
        other => return Err(Error::with_message(ErrorCode::CorruptFormat, format!("unrecognized column type tag {other}"))),
    })
}

fn cascade_tag(a: CascadeAction) -> u8 {
    match a {
        CascadeAction::NoAction => 0,
        CascadeAction::Cascade => 1,
        CascadeAction::SetNull => 2,
    }
}

fn cascade_from_tag(tag: u8) -> Result<CascadeAction> {
    Ok(match tag {
        0 => CascadeAction::NoAction,
        1 => CascadeAction::Cascade,
        2 => CascadeAction::SetNull,
        other => return Err(Error::with_message(ErrorCode::CorruptFormat, format!("unrecognized cascade action tag {other}"))),
    })
}

fn write_usage_map(channel: &mut PageChannel, map: &UsageMap) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match map.variant() {
        UsageMapVariant::Inline => {
            let (base, bytes, bit_len) = map.inline_snapshot().unwrap_or((0, Vec::new(), 0));
            put_u8(&mut out, 0);
            put_u32(&mut out, base);
            put_u16(&mut out, bit_len as u16);
            out.extend_from_slice(&bytes);
        }
        UsageMapVariant::Reference => {
            let head = map.write_reference_pages(channel)?;
            put_u8(&mut out, 1);
            put_u32(&mut out, head);
        }
    }
    Ok(out)
}

fn read_usage_map(channel: &mut PageChannel, r: &mut Reader) -> Result<UsageMap> {
    match r.u8()? {
        0 => {
            let base = r.u32()?;
            let bit_len = r.u16()? as usize;
            let bytes = r.take(bit_len.div_ceil(8))?.to_vec();
            Ok(UsageMap::from_inline_bytes(base, &bytes, bit_len))
        }
        1 => {
            let head = r.u32()?;
            UsageMap::read_reference_pages(channel, head)
        }
        other => Err(Error::with_message(ErrorCode::CorruptFormat, format!("unrecognized usage-map tag {other}"))),
    }
}

fn encode_column(out: &mut Vec<u8>, c: &Column) {
    put_string(out, &c.name);
    put_u8(out, column_type_tag(c.column_type));
    put_u16(out, c.column_index);
    put_bool(out, c.nullable);
    put_bool(out, c.length.is_some());
    put_u16(out, c.length.unwrap_or(0));
    put_bool(out, c.is_auto_number);
    put_bool(out, c.is_hyperlink);
    put_bool(out, c.is_calculated);
    put_u16(out, c.sort_order);
}

fn decode_column(r: &mut Reader) -> Result<Column> {
    let name = r.string()?;
    let column_type = column_type_from_tag(r.u8()?)?;
    let column_index = r.u16()?;
    let nullable = r.bool()?;
    let has_length = r.bool()?;
    let length_raw = r.u16()?;
    let is_auto_number = r.bool()?;
    let is_hyperlink = r.bool()?;
    let is_calculated = r.bool()?;
    let sort_order = r.u16()?;
    Ok(Column {
        name,
        column_type,
        column_index,
        nullable,
        length: has_length.then_some(length_raw),
        is_auto_number,
        is_hyperlink,
        is_calculated,
        sort_order,
    })
}

fn encode_index(channel: &mut PageChannel, out: &mut Vec<u8>, idx: &Index) -> Result<()> {
    put_string(out, &idx.name);
    put_u32(out, idx.root_page);
    put_bool(out, idx.unique);
    put_bool(out, idx.is_primary_key);
    put_bool(out, idx.ignore_nulls);
    put_u16(out, idx.columns.len() as u16);
    for c in &idx.columns {
        put_u16(out, c.column_index);
        put_bool(out, c.descending);
    }
    let map_bytes = write_usage_map(channel, &idx.usage_map)?;
    put_u16(out, map_bytes.len() as u16);
    out.extend_from_slice(&map_bytes);
    Ok(())
}

fn decode_index(channel: &mut PageChannel, r: &mut Reader) -> Result<Index> {
    let name = r.string()?;
    let root_page = r.u32()?;
    let unique = r.bool()?;
    let is_primary_key = r.bool()?;
    let ignore_nulls = r.bool()?;
    let col_count = r.u16()? as usize;
    let mut columns = Vec::with_capacity(col_count);
    for _ in 0..col_count {
        let column_index = r.u16()?;
        let descending = r.bool()?;
        columns.push(IndexColumn { column_index, descending });
    }
    let map_len = r.u16()? as usize;
    let map_bytes = r.take(map_len)?.to_vec();
    let mut map_reader = Reader::new(&map_bytes);
    let usage_map = read_usage_map(channel, &mut map_reader)?;
    Ok(Index { name, root_page, columns, unique, is_primary_key, ignore_nulls, usage_map })
}

fn encode_table(channel: &mut PageChannel, table: &Table) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    put_string(&mut out, &table.name);
    put_bool(&mut out, table.append_only);
    put_i32(&mut out, table.next_auto_number);
    put_u64(&mut out, table.mod_counter);
    let map_bytes = write_usage_map(channel, &table.used_pages)?;
    put_u16(&mut out, map_bytes.len() as u16);
    out.extend_from_slice(&map_bytes);
    put_u16(&mut out, table.columns.len() as u16);
    for c in &table.columns {
        encode_column(&mut out, c);
    }
    put_u16(&mut out, table.indexes.len() as u16);
    for idx in &table.indexes {
        encode_index(channel, &mut out, idx)?;
    }
    put_u16(&mut out, table.primary_key_index.map(|i| i as u16).unwrap_or(u16::MAX));
    Ok(out)
}

fn decode_table(channel: &mut PageChannel, bytes: &[u8], table_def_page: Pgno) -> Result<Table> {
    let mut r = Reader::new(bytes);
    let name = r.string()?;
    let append_only = r.bool()?;
    let next_auto_number = r.i32()?;
    let mod_counter = r.u64()?;
    let map_len = r.u16()? as usize;
    let map_bytes = r.take(map_len)?.to_vec();
    let mut map_reader = Reader::new(&map_bytes);
    let used_pages = read_usage_map(channel, &mut map_reader)?;
    let col_count = r.u16()? as usize;
    let mut columns = Vec::with_capacity(col_count);
    for _ in 0..col_count {
        columns.push(decode_column(&mut r)?);
    }
    let idx_count = r.u16()? as usize;
    let mut indexes = Vec::with_capacity(idx_count);
    for _ in 0..idx_count {
        indexes.push(Arc::new(decode_index(channel, &mut r)?));
    }
    let pk_raw = r.u16()?;
    let primary_key_index = if pk_raw == u16::MAX { None } else { Some(pk_raw as usize) };
    Ok(Table { name, table_def_page, columns, indexes, primary_key_index, used_pages, append_only, next_auto_number, mod_counter })
}

fn encode_relationship(out: &mut Vec<u8>, rel: &Relationship) {
    put_string(out, &rel.name);
    put_string(out, &rel.referencing_table);
    put_u16(out, rel.referencing_columns.len() as u16);
    for c in &rel.referencing_columns {
        put_string(out, c);
    }
    put_string(out, &rel.referenced_table);
    put_u16(out, rel.referenced_columns.len() as u16);
    for c in &rel.referenced_columns {
        put_string(out, c);
    }
    put_bool(out, rel.enforce_integrity);
    put_u8(out, cascade_tag(rel.on_delete));
    put_u8(out, cascade_tag(rel.on_update));
}

fn decode_relationship(r: &mut Reader) -> Result<Relationship> {
    let name = r.string()?;
    let referencing_table = r.string()?;
    let rc_count = r.u16()? as usize;
    let mut referencing_columns = Vec::with_capacity(rc_count);
    for _ in 0..rc_count {
        referencing_columns.push(r.string()?);
    }
    let referenced_table = r.string()?;
    let rf_count = r.u16()? as usize;
    let mut referenced_columns = Vec::with_capacity(rf_count);
    for _ in 0..rf_count {
        referenced_columns.push(r.string()?);
    }
    let enforce_integrity = r.bool()?;
    let on_delete = cascade_from_tag(r.u8()?)?;
    let on_update = cascade_from_tag(r.u8()?)?;
    Ok(Relationship { name, referencing_table, referencing_columns, referenced_table, referenced_columns, enforce_integrity, on_delete, on_update })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ColumnType;
    use crate::format::{FormatVersion, JetFormat};
    use crate::os::mem::MemVfs;
    use crate::storage::pager::IdentityCodec;
    use std::path::PathBuf;

    fn open_channel() -> PageChannel {
        let vfs = MemVfs::new();
        let path = PathBuf::from("/cat.mdb");
        PageChannel::create(&vfs, &path, JetFormat::for_version(FormatVersion::Jet4), Box::new(IdentityCodec)).unwrap()
    }

    fn sample_table(name: &str) -> Table {
        Table {
            name: name.into(),
            table_def_page: INVALID_PGNO,
            columns: vec![Column::new("id", ColumnType::Int32, 0), Column::new("label", ColumnType::Text, 1)],
            indexes: vec![Arc::new(Index {
                name: "PK".into(),
                root_page: 7,
                columns: vec![IndexColumn { column_index: 0, descending: false }],
                unique: true,
                is_primary_key: true,
                ignore_nulls: false,
                usage_map: UsageMap::new_inline(8),
            })],
            primary_key_index: Some(0),
            used_pages: UsageMap::new_inline(2),
            append_only: false,
            next_auto_number: 5,
            mod_counter: 3,
        }
    }

    #[test]
    fn empty_catalog_round_trips() {
        let mut chan = open_channel();
        let root = save(&mut chan, &Schema::new()).unwrap();
        let schema = load(&mut chan, &root).unwrap();
        assert!(schema.tables().next().is_none());
    }

    #[test]
    fn a_table_with_an_index_round_trips_through_save_and_load() {
        let mut chan = open_channel();
        let mut schema = Schema::new();
        schema.insert_table(sample_table("Widgets"));
        let root = save(&mut chan, &schema).unwrap();

        let loaded = load(&mut chan, &root).unwrap();
        let back = loaded.require_table("Widgets").unwrap();
        assert_eq!(back.columns.len(), 2);
        assert_eq!(back.next_auto_number, 5);
        assert_eq!(back.mod_counter, 3);
        assert_eq!(back.indexes.len(), 1);
        assert!(back.indexes[0].unique);
        assert_eq!(back.indexes[0].root_page, 7);
        assert_eq!(back.primary_key_index, Some(0));
    }

    #[test]
    fn relationships_round_trip() {
        let mut chan = open_channel();
        let mut schema = Schema::new();
        schema.add_relationship(Relationship {
            name: "FK1".into(),
            referencing_table: "Orders".into(),
            referencing_columns: vec!["CustomerId".into()],
            referenced_table: "Customers".into(),
            referenced_columns: vec!["Id".into()],
            enforce_integrity: true,
            on_delete: CascadeAction::Cascade,
            on_update: CascadeAction::NoAction,
        });
        let root = save(&mut chan, &schema).unwrap();
        let loaded = load(&mut chan, &root).unwrap();
        assert_eq!(loaded.relationships().len(), 1);
        assert_eq!(loaded.relationships()[0].referencing_table, "Orders");
        assert_eq!(loaded.relationships()[0].on_delete, CascadeAction::Cascade);
    }

    #[test]
    fn catalog_root_round_trips_through_the_header_page() {
        let mut chan = open_channel();
        let root = CatalogRoot { tables: 4, relationships: 9, queries: INVALID_PGNO };
        write_root(&mut chan, &root).unwrap();
        let back = read_root(&mut chan).unwrap();
        assert_eq!(back.tables, 4);
        assert_eq!(back.relationships, 9);
    }
}
