//! Explicit configuration record passed into [`crate::database::Database::open`].
//! Replaces ambient global process state with an explicit, passed-in
//! configuration record.

use chrono::FixedOffset;

/// Preference for which ordinal a table's columns iterate in when no
/// explicit order is requested. Display order is a separate permutation
/// from storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnOrder {
    /// Storage order (`column_index`).
    #[default]
    Data,
    /// UI "display" order.
    Display,
}

/// Charset used to decode TEXT columns in pre-Jet4 files that predate
/// Unicode text storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyCharset {
    Windows1252,
    Named(String),
}

impl Default for LegacyCharset {
    fn default() -> Self {
        LegacyCharset::Windows1252
    }
}

/// Environment toggles; names are illustrative, the contract is their
/// effects. One record, built once, threaded through `Database::open`
/// instead of read from ambient global/system state.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Time zone used when a DATETIME needs to be interpreted against a
    /// civil wall-clock time zone (the raw Jet value is timezone-naive).
    pub time_zone: FixedOffset,
    /// Charset for legacy (pre-Jet4) TEXT columns.
    pub legacy_charset: LegacyCharset,
    /// Default column iteration order when a caller doesn't specify one.
    pub column_order: ColumnOrder,
    /// Whether FK relationships with referential integrity enabled are
    /// enforced on insert/update/delete.
    pub enforce_foreign_keys: bool,
    /// Carried over from environments where memory-mapped file I/O is
    /// unreliable on some hosts. Rust's positioned-read/write I/O never
    /// goes through a memory-mapped path, so this toggle has no effect here;
    /// it's kept so callers porting configuration from such an environment
    /// don't need to special-case this field away.
    pub broken_nio_fallback: bool,
    /// Open for read-only access; mutating operations fail with
    /// `IllegalState`.
    pub read_only: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            time_zone: FixedOffset::east_opt(0).unwrap(),
            legacy_charset: LegacyCharset::default(),
            column_order: ColumnOrder::default(),
            enforce_foreign_keys: true,
            broken_nio_fallback: false,
            read_only: false,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_zone(mut self, tz: FixedOffset) -> Self {
        self.time_zone = tz;
        self
    }

    pub fn enforce_foreign_keys(mut self, on: bool) -> Self {
        self.enforce_foreign_keys = on;
        self
    }

    pub fn read_only(mut self, on: bool) -> Self {
        self.read_only = on;
        self
    }

    pub fn column_order(mut self, order: ColumnOrder) -> Self {
        self.column_order = order;
        self
    }

    pub fn broken_nio_fallback(mut self, on: bool) -> Self {
        self.broken_nio_fallback = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enforce_fk_and_use_utc() {
        let opts = OpenOptions::default();
        assert!(opts.enforce_foreign_keys);
        assert_eq!(opts.time_zone.utc_minus_local(), 0);
        assert!(!opts.read_only);
    }

    #[test]
    fn builder_methods_chain() {
        let opts = OpenOptions::new().enforce_foreign_keys(false).read_only(true);
        assert!(!opts.enforce_foreign_keys);
        assert!(opts.read_only);
    }
}
