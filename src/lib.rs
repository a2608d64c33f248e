//! Page-oriented storage engine for the Jet/Access (.mdb/.accdb) database
//! file format: page channel, row store, B-tree indexes, and catalog
//! loading, with no SQL layer above it.

#![allow(dead_code)]

pub mod codec;
pub mod collation;
pub mod config;
pub mod cursor;
pub mod database;
pub mod error;
pub mod format;
pub mod index;
pub mod log;
pub mod os;
pub mod row;
pub mod schema;
pub mod storage;
pub mod types;
pub mod util;

#[cfg(feature = "complex-columns")]
pub mod complex;

pub use config::OpenOptions;
pub use database::Database;
pub use error::{Error, ErrorCode, Result};
pub use format::FormatVersion;
pub use types::{Pgno, RowId};
