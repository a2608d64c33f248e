//! Per-version format descriptor.
//!
//! Everything downstream — page layout offsets, identifier limits, which
//! column types are legal — is parameterized by which on-disk variant a file
//! uses. `JetFormat` is the lookup table the rest of the engine is built
//! against instead of hard-coding a single page size the way a one-version
//! reader would.

use crate::codec::ColumnType;
use crate::error::{Error, ErrorCode, Result};

/// The three file-format generations this engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Jet 3 — 2048-byte pages, the oldest supported variant.
    Jet3,
    /// Jet 4 — 4096-byte pages, 32-bit page numbers, UCS-2 text.
    Jet4,
    /// Access 2007+ ("Msisam") — Jet 4 layout plus EXT_DATETIME, extended
    /// NUMERIC precision and COMPLEX columns.
    Msisam2007,
}

/// Byte read from the database header that identifies the format.
const HEADER_VERSION_OFFSET: usize = 0x14;

/// Static, per-version layout and limits. One instance per [`FormatVersion`];
/// selection happens once, at open time, from the header page's version byte.
#[derive(Debug, Clone, Copy)]
pub struct JetFormat {
    pub version: FormatVersion,
    /// Size of every page in the file, including the header page.
    pub page_size: u32,
    /// Offset of the `row_count` field on a DATA page.
    pub data_row_count_offset: usize,
    /// Offset of the `free_space` field on a DATA page.
    pub data_free_space_offset: usize,
    /// Offset of the owning table-def page pointer on a DATA page.
    pub data_owner_offset: usize,
    /// Offset where the slot table begins on a DATA page.
    pub data_slot_table_offset: usize,
    /// Maximum length, in UCS-2 units, of a table/column/index name.
    pub max_identifier_len: usize,
    /// Maximum number of fixed-width columns allowed in one table.
    pub max_columns: usize,
    /// Text storage unit size in bytes (2 for UCS-2).
    pub text_unit_size: usize,
    /// Whether EXT_DATETIME/extended NUMERIC/COMPLEX columns are legal.
    pub supports_extended_types: bool,
}

impl JetFormat {
    const JET3: JetFormat = JetFormat {
        version: FormatVersion::Jet3,
        page_size: 2048,
        data_row_count_offset: 8,
        data_free_space_offset: 2,
        data_owner_offset: 4,
        data_slot_table_offset: 10,
        max_identifier_len: 64,
        max_columns: 255,
        text_unit_size: 2,
        supports_extended_types: false,
    };

    const JET4: JetFormat = JetFormat {
        version: FormatVersion::Jet4,
        page_size: 4096,
        data_row_count_offset: 8,
        data_free_space_offset: 2,
        data_owner_offset: 4,
        data_slot_table_offset: 10,
        max_identifier_len: 64,
        max_columns: 255,
        text_unit_size: 2,
        supports_extended_types: false,
    };

    const MSISAM2007: JetFormat = JetFormat {
        version: FormatVersion::Msisam2007,
        page_size: 4096,
        data_row_count_offset: 8,
        data_free_space_offset: 2,
        data_owner_offset: 4,
        data_slot_table_offset: 10,
        max_identifier_len: 64,
        max_columns: 255,
        text_unit_size: 2,
        supports_extended_types: true,
    };

    /// Look up the descriptor for an explicit version (used when creating a
    /// new database).
    pub fn for_version(version: FormatVersion) -> &'static JetFormat {
        match version {
            FormatVersion::Jet3 => &Self::JET3,
            FormatVersion::Jet4 => &Self::JET4,
            FormatVersion::Msisam2007 => &Self::MSISAM2007,
        }
    }

    /// Select a descriptor from the header page's version byte, after any
    /// decryption the [`crate::storage::pager::Codec`] applies.
    pub fn by_header_page(header: &[u8]) -> Result<&'static JetFormat> {
        let version = *header
            .get(HEADER_VERSION_OFFSET)
            .ok_or_else(|| Error::new(ErrorCode::CorruptFormat))?;
        match version {
            0x00 => Ok(&Self::JET3),
            0x01 => Ok(&Self::JET4),
            0x02 | 0x03 => Ok(&Self::MSISAM2007),
            _ => Err(Error::with_message(
                ErrorCode::Unsupported,
                format!("unrecognized Jet file-format version byte {version:#x}"),
            )),
        }
    }

    /// The header-byte value a file of this version is written with.
    pub fn version_byte(&self) -> u8 {
        match self.version {
            FormatVersion::Jet3 => 0x00,
            FormatVersion::Jet4 => 0x01,
            FormatVersion::Msisam2007 => 0x02,
        }
    }

    /// Whether `ty` is legal for this format version.
    pub fn supports_column_type(&self, ty: ColumnType) -> bool {
        match ty {
            ColumnType::ExtDateTime | ColumnType::Complex => self.supports_extended_types,
            ColumnType::Numeric => true,
            _ => true,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_header_page_dispatches_on_version_byte() {
        let mut header = vec![0u8; 0x20];
        header[HEADER_VERSION_OFFSET] = 0x01;
        let fmt = JetFormat::by_header_page(&header).unwrap();
        assert_eq!(fmt.version, FormatVersion::Jet4);
        assert_eq!(fmt.page_size, 4096);
    }

    #[test]
    fn unknown_version_is_unsupported() {
        let mut header = vec![0u8; 0x20];
        header[HEADER_VERSION_OFFSET] = 0x7f;
        let err = JetFormat::by_header_page(&header).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unsupported);
    }

    #[test]
    fn extended_types_gated_by_version() {
        assert!(!JetFormat::for_version(FormatVersion::Jet4).supports_column_type(ColumnType::Complex));
        assert!(JetFormat::for_version(FormatVersion::Msisam2007).supports_column_type(ColumnType::Complex));
    }
}
