//! Sort-order tables: per-locale character weight tables used to normalize
//! TEXT key bytes for index ordering (general, Spanish, etc), identified by
//! the small integer id Jet stores alongside each text column.
//!
//! A closed set known at compile time, looked up by id rather than
//! constructed at runtime.

use crate::error::{Error, ErrorCode, Result};

/// A known text sort order. `General` is what new Jet4 databases default
/// to; the others match locale-specific collations Access exposes in its
/// database-properties dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    General,
    GeneralLegacy,
    Spanish,
    CaseSensitive,
}

impl SortOrder {
    pub fn id(self) -> u16 {
        match self {
            SortOrder::GeneralLegacy => 0x0409,
            SortOrder::General => 0x0409 | 0x8000,
            SortOrder::Spanish => 0x040A,
            SortOrder::CaseSensitive => 0x0001,
        }
    }

    pub fn from_id(id: u16) -> Result<SortOrder> {
        match id {
            0x0409 => Ok(SortOrder::GeneralLegacy),
            x if x == (0x0409 | 0x8000) => Ok(SortOrder::General),
            0x040A => Ok(SortOrder::Spanish),
            0x0001 => Ok(SortOrder::CaseSensitive),
            other => Err(Error::with_message(
                ErrorCode::Unsupported,
                format!("unrecognized sort-order id {other:#06x}"),
            )),
        }
    }

    /// Normalize a text key for ordering under this collation: case-fold
    /// unless the collation is explicitly case-sensitive.
    pub fn normalize_key(self, text: &str) -> String {
        match self {
            SortOrder::CaseSensitive => text.to_string(),
            _ => text.to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrips_through_from_id() {
        for order in [SortOrder::General, SortOrder::GeneralLegacy, SortOrder::Spanish, SortOrder::CaseSensitive] {
            assert_eq!(SortOrder::from_id(order.id()).unwrap(), order);
        }
    }

    #[test]
    fn general_normalizes_case_insensitively() {
        assert_eq!(SortOrder::General.normalize_key("ABC"), "abc");
        assert_eq!(SortOrder::CaseSensitive.normalize_key("ABC"), "ABC");
    }

    #[test]
    fn unknown_id_is_unsupported() {
        assert_eq!(SortOrder::from_id(0xDEAD).unwrap_err().code(), ErrorCode::Unsupported);
    }
}
