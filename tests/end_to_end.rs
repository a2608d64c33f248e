//! End-to-end scenarios exercising the engine the way a caller would: open
//! a database, create a table's worth of state by hand (no DDL layer
//! exists above the storage engine), and drive it through the public
//! `Database` facade.

use jetstore::codec::{ColumnType, Value};
use jetstore::config::OpenOptions;
use jetstore::database::Database;
use jetstore::error::ErrorCode;
use jetstore::format::{FormatVersion, JetFormat};
use jetstore::os::mem::MemVfs;
use jetstore::schema::{Column, Table};
use jetstore::storage::pager::{IdentityCodec, PageChannel};
use jetstore::storage::usage_map::UsageMap;
use std::path::PathBuf;

fn widgets_table() -> Table {
    Table {
        name: "Widgets".into(),
        table_def_page: 1,
        columns: vec![
            Column::new("id", ColumnType::Int32, 0),
            Column::new("label", ColumnType::Text, 1),
        ],
        indexes: Vec::new(),
        primary_key_index: None,
        used_pages: UsageMap::new_inline(0),
        append_only: false,
        next_auto_number: 1,
        mod_counter: 0,
    }
}

fn open_empty_database() -> Database {
    let vfs = MemVfs::new();
    let path = PathBuf::from("/scenario.mdb");
    let format = JetFormat::for_version(FormatVersion::Jet4);
    PageChannel::create(&vfs, &path, format, Box::new(IdentityCodec)).unwrap();
    Database::open_with_vfs(&vfs, &path, OpenOptions::default()).unwrap()
}

#[test]
fn create_empty_database_then_reopen() {
    let vfs = MemVfs::new();
    let path = PathBuf::from("/fresh.mdb");
    let format = JetFormat::for_version(FormatVersion::Jet4);
    {
        let chan = PageChannel::create(&vfs, &path, format, Box::new(IdentityCodec)).unwrap();
        assert_eq!(chan.page_count(), 1);
    }
    let reopened = Database::open_with_vfs(&vfs, &path, OpenOptions::default()).unwrap();
    assert!(reopened.schema().tables().next().is_none());
}

#[test]
fn single_column_insert_and_read() {
    let mut db = open_empty_database();
    db.schema_mut().insert_table(widgets_table());
    let row = db
        .insert_row("Widgets", vec![Value::Int32(1), Value::Text("gizmo".into())])
        .unwrap();
    let back = db.read_row("Widgets", row).unwrap();
    assert_eq!(back, vec![Value::Int32(1), Value::Text("gizmo".into())]);
}

#[test]
fn case_insensitive_table_lookup_on_insert() {
    let mut db = open_empty_database();
    db.schema_mut().insert_table(widgets_table());
    let row = db
        .insert_row("WIDGETS", vec![Value::Int32(2), Value::Null])
        .unwrap();
    assert_eq!(db.read_row("widgets", row).unwrap()[0], Value::Int32(2));
}

#[test]
fn cursor_scans_every_inserted_row_once() {
    let mut db = open_empty_database();
    db.schema_mut().insert_table(widgets_table());
    for i in 0..10 {
        db.insert_row("Widgets", vec![Value::Int32(i), Value::Null]).unwrap();
    }
    let table = db.schema().require_table("Widgets").unwrap();
    let mut cursor = db.open_cursor("Widgets").unwrap();
    let mut count = 0;
    while cursor.move_next(db.channel(), &table).unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 10);
}

#[test]
fn cursor_reaches_a_row_inserted_mid_scan_exactly_once() {
    let mut db = open_empty_database();
    db.schema_mut().insert_table(widgets_table());
    for i in 0..2 {
        db.insert_row("Widgets", vec![Value::Int32(i), Value::Null]).unwrap();
    }
    let mut cursor = db.open_cursor("Widgets").unwrap();
    let table = db.schema().require_table("Widgets").unwrap();
    assert!(cursor.move_next(db.channel(), &table).unwrap().is_some());
    assert!(cursor.move_next(db.channel(), &table).unwrap().is_some());

    db.insert_row("Widgets", vec![Value::Int32(2), Value::Null]).unwrap();
    let table = db.schema().require_table("Widgets").unwrap();

    assert!(cursor.move_next(db.channel(), &table).unwrap().is_some());
    assert_eq!(cursor.move_next(db.channel(), &table).unwrap(), None);
}

#[test]
fn delete_then_read_reports_invalid_argument() {
    let mut db = open_empty_database();
    db.schema_mut().insert_table(widgets_table());
    let row = db.insert_row("Widgets", vec![Value::Int32(1), Value::Null]).unwrap();
    db.delete_row("Widgets", row).unwrap();
    let err = db.read_row("Widgets", row).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[test]
fn long_text_value_round_trips_and_releases_its_pages_on_delete() {
    let mut db = open_empty_database();
    db.schema_mut().insert_table(widgets_table());
    let long_label = "z".repeat(3 * 1024 * 1024);
    let row = db
        .insert_row("Widgets", vec![Value::Int32(1), Value::Text(long_label.clone())])
        .unwrap();
    let back = db.read_row("Widgets", row).unwrap();
    assert_eq!(back[1], Value::Text(long_label.clone()));
    assert_eq!(long_label.len(), 3 * 1024 * 1024);

    let used_before = db.channel().free_pages().count_used();
    db.delete_row("Widgets", row).unwrap();
    assert!(db.channel().free_pages().count_used() > used_before);
}

#[test]
fn real_filesystem_round_trips_through_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widgets.mdb");
    let row = {
        let mut db = Database::create(&path, FormatVersion::Jet4, OpenOptions::default()).unwrap();
        db.schema_mut().insert_table(widgets_table());
        let row = db
            .insert_row("Widgets", vec![Value::Int32(7), Value::Text("wrench".into())])
            .unwrap();
        db.flush().unwrap();
        row
    };
    let mut reopened = Database::open(&path, OpenOptions::default()).unwrap();
    reopened.schema_mut().insert_table(widgets_table());
    let back = reopened.read_row("Widgets", row).unwrap();
    assert_eq!(back, vec![Value::Int32(7), Value::Text("wrench".into())]);
}

#[test]
fn catalog_persists_tables_and_relationships_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.mdb");
    {
        let mut db = Database::create(&path, FormatVersion::Jet4, OpenOptions::default()).unwrap();
        db.schema_mut().insert_table(widgets_table());
        db.insert_row("Widgets", vec![Value::Int32(1), Value::Text("gear".into())]).unwrap();
        db.flush().unwrap();
    }

    let mut reopened = Database::open(&path, OpenOptions::default()).unwrap();
    assert_eq!(reopened.file_format(), FormatVersion::Jet4);
    assert_eq!(reopened.table_names().collect::<Vec<_>>(), vec!["Widgets"]);

    let table = reopened.schema().require_table("Widgets").unwrap();
    let mut cursor = reopened.open_cursor("Widgets").unwrap();
    let row = cursor.move_next(reopened.channel(), &table).unwrap().unwrap();
    assert_eq!(reopened.read_row("Widgets", row).unwrap()[1], Value::Text("gear".into()));
}

#[test]
fn read_only_database_rejects_mutation() {
    let vfs = MemVfs::new();
    let path = PathBuf::from("/readonly.mdb");
    let format = JetFormat::for_version(FormatVersion::Jet4);
    PageChannel::create(&vfs, &path, format, Box::new(IdentityCodec)).unwrap();
    let mut db = Database::open_with_vfs(&vfs, &path, OpenOptions::new().read_only(true)).unwrap();
    db.schema_mut().insert_table(widgets_table());
    let err = db.insert_row("Widgets", vec![Value::Int32(1), Value::Null]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IllegalState);
}
