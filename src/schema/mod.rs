//! Catalog: table/column/index/relationship definitions, loaded from the
//! system tables and cached per open database.
//!
//! Table/index name lookup is case-insensitive via `.to_lowercase()`.
//! Tables and indexes are stored behind `Arc` so a table can list its
//! indexes and an index's foreign-key target can point back at a table
//! without an ownership cycle. Relationships are tracked as a standalone
//! list rather than nested under one table's definition, since Jet keeps
//! them outside of any one table's DDL.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::ColumnType;
use crate::error::{Error, ErrorCode, Result};
use crate::storage::usage_map::UsageMap;
use crate::types::Pgno;

pub mod catalog;

/// One column's static definition.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Storage-order position; distinct from display order (see
    /// [`crate::config::ColumnOrder`]).
    pub column_index: u16,
    pub nullable: bool,
    /// Present for TEXT/NUMERIC columns that declare a fixed size.
    pub length: Option<u16>,
    pub is_auto_number: bool,
    /// True for a hyperlink-flavoured MEMO column.
    pub is_hyperlink: bool,
    /// True for a column whose value is derived from an expression rather
    /// than stored directly.
    pub is_calculated: bool,
    /// Sort-order id used when normalizing this column's values for an
    /// index key (see [`crate::collation`]).
    pub sort_order: u16,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, column_index: u16) -> Self {
        Column {
            name: name.into(),
            column_type,
            column_index,
            nullable: true,
            length: None,
            is_auto_number: false,
            is_hyperlink: false,
            is_calculated: false,
            sort_order: 0,
        }
    }
}

/// One column position within a multi-column index key.
#[derive(Debug, Clone)]
pub struct IndexColumn {
    pub column_index: u16,
    pub descending: bool,
}

/// A B-tree index over one or more of a table's columns.
#[derive(Debug)]
pub struct Index {
    pub name: String,
    pub root_page: Pgno,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub is_primary_key: bool,
    /// When set, a row with a null in any key column gets no index entry at
    /// all rather than one that sorts before every non-null key.
    pub ignore_nulls: bool,
    /// Usage map of pages belonging to this index's own B-tree, separate
    /// from the owning table's data-page usage map.
    pub usage_map: UsageMap,
}

impl Index {
    pub fn covers(&self, column_index: u16) -> bool {
        self.columns.iter().any(|c| c.column_index == column_index)
    }
}

/// Foreign-key action on the referencing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    NoAction,
    Cascade,
    SetNull,
}

/// A relationship between two tables, enforced one hop deep (referencing a
/// relationship's own referencing table is not chased further).
#[derive(Debug, Clone)]
pub struct Relationship {
    pub name: String,
    pub referencing_table: String,
    pub referencing_columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub enforce_integrity: bool,
    pub on_delete: CascadeAction,
    pub on_update: CascadeAction,
}

/// A table's static definition: columns, indexes, and the page housing its
/// own row data.
#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub table_def_page: Pgno,
    pub columns: Vec<Column>,
    pub indexes: Vec<Arc<Index>>,
    pub primary_key_index: Option<usize>,
    /// Pages holding this table's rows.
    pub used_pages: UsageMap,
    /// Rows appended only, never updated or reused after delete (a Jet
    /// "append-only" table, commonly used for replication-tracked tables).
    pub append_only: bool,
    /// Next value an auto-number column will hand out.
    pub next_auto_number: i32,
    /// Bumped on every insert/update/delete; a cursor snapshots this at
    /// creation and rejects further movement once it no longer matches,
    /// rather than risk silently skipping or repeating rows.
    pub mod_counter: u64,
}

impl Table {
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        let lower = name.to_lowercase();
        self.columns.iter().find(|c| c.name.to_lowercase() == lower)
    }

    pub fn column(&self, index: u16) -> Option<&Column> {
        self.columns.get(index as usize)
    }

    pub fn primary_key(&self) -> Option<&Arc<Index>> {
        self.primary_key_index.and_then(|i| self.indexes.get(i))
    }

    pub fn find_index(&self, name: &str) -> Option<&Arc<Index>> {
        let lower = name.to_lowercase();
        self.indexes.iter().find(|i| i.name.to_lowercase() == lower)
    }
}

/// The full set of tables and relationships loaded from a database's
/// system tables. Table/index lookup is case-insensitive, matching Jet's
/// own identifier comparison rules.
#[derive(Debug, Default)]
pub struct Schema {
    tables: HashMap<String, Arc<Table>>,
    relationships: Vec<Relationship>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn insert_table(&mut self, table: Table) {
        self.tables.insert(table.name.to_lowercase(), Arc::new(table));
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(&name.to_lowercase()).cloned()
    }

    pub fn require_table(&self, name: &str) -> Result<Arc<Table>> {
        self.table(name)
            .ok_or_else(|| Error::with_message(ErrorCode::InvalidArgument, format!("no such table: {name}")))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.values()
    }

    pub fn remove_table(&mut self, name: &str) -> Option<Arc<Table>> {
        self.tables.remove(&name.to_lowercase())
    }

    pub fn add_relationship(&mut self, rel: Relationship) {
        self.relationships.push(rel);
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// One hop of relationships where `table` is the referenced side with
    /// referential integrity turned on — the set a delete/update on `table`
    /// must cascade or block against.
    pub fn dependents_of(&self, table: &str) -> Vec<&Relationship> {
        let lower = table.to_lowercase();
        self.relationships
            .iter()
            .filter(|r| r.enforce_integrity && r.referenced_table.to_lowercase() == lower)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table(name: &str) -> Table {
        Table {
            name: name.to_string(),
            table_def_page: 4,
            columns: vec![Column::new("id", ColumnType::Int32, 0)],
            indexes: Vec::new(),
            primary_key_index: None,
            used_pages: UsageMap::new_inline(5),
            append_only: false,
            next_auto_number: 1,
            mod_counter: 0,
        }
    }

    #[test]
    fn table_lookup_is_case_insensitive() {
        let mut schema = Schema::new();
        schema.insert_table(sample_table("Customers"));
        assert!(schema.table("customers").is_some());
        assert!(schema.table("CUSTOMERS").is_some());
    }

    #[test]
    fn dependents_of_filters_by_enforced_integrity() {
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
        schema.add_relationship(Relationship {
            name: "FK2".into(),
            referencing_table: "Notes".into(),
            referencing_columns: vec!["CustomerId".into()],
            referenced_table: "Customers".into(),
            referenced_columns: vec!["Id".into()],
            enforce_integrity: false,
            on_delete: CascadeAction::NoAction,
            on_update: CascadeAction::NoAction,
        });
        let deps = schema.dependents_of("customers");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].referencing_table, "Orders");
    }

    #[test]
    fn missing_table_is_invalid_argument() {
        let schema = Schema::new();
        let err = schema.require_table("Ghost").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
