//! Page channel: fixed-size page I/O, allocation, and the global
//! free-pages usage map.
//!
//! A file handle plus a page-size-aware read/write surface, stripped of
//! everything this engine rules out: no journal, no WAL, no lock-state
//! machine, no multi-connection cache coordination. What's left is just the
//! read/write/allocate surface callers above it need.

use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorCode, Result};
use crate::format::JetFormat;
use crate::os::{PageFile, PageVfs};
use crate::storage::pool::PagePool;
use crate::storage::usage_map::UsageMap;
use crate::types::{Pgno, INVALID_PGNO};

/// One-byte page type tag at offset 0 of every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    DbHeader = 0x00,
    Data = 0x01,
    TableDef = 0x02,
    IntermediateIndexData = 0x03,
    LeafIndexData = 0x04,
    UsageMap = 0x05,
}

impl PageType {
    pub fn from_byte(b: u8) -> Result<PageType> {
        Ok(match b {
            0x00 => PageType::DbHeader,
            0x01 => PageType::Data,
            0x02 => PageType::TableDef,
            0x03 => PageType::IntermediateIndexData,
            0x04 => PageType::LeafIndexData,
            0x05 => PageType::UsageMap,
            other => {
                return Err(Error::with_message(
                    ErrorCode::CorruptFormat,
                    format!("unrecognized page type byte {other:#x}"),
                ))
            }
        })
    }
}

/// Page-level transform applied on every physical page transfer, encoding
/// on write and decoding on read; must be idempotent under decode∘encode.
/// The default [`IdentityCodec`]
/// makes unencrypted files a no-op case of the same code path, rather than a
/// separately-branched one.
pub trait Codec: Send {
    fn encode(&mut self, buf: &mut [u8], pn: Pgno);
    fn decode(&mut self, buf: &mut [u8], pn: Pgno);
}

#[derive(Default, Clone, Copy)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn encode(&mut self, _buf: &mut [u8], _pn: Pgno) {}
    fn decode(&mut self, _buf: &mut [u8], _pn: Pgno) {}
}

/// A single owned page buffer, always exactly `page_size` bytes.
pub type Buffer = Vec<u8>;

/// Read/write/allocate pages of a single open database file.
/// Single-owner: concurrent calls from multiple threads are undefined,
/// matching the engine-wide single-threaded model.
pub struct PageChannel {
    file: Box<dyn PageFile>,
    format: &'static JetFormat,
    codec: Box<dyn Codec>,
    pool: PagePool,
    /// Global free-pages usage map, disjoint from every table's own used map.
    free_pages: UsageMap,
    /// Highest page number ever allocated; new pages extend the file past
    /// this when the free map has nothing to offer.
    page_count: Pgno,
    auto_sync: bool,
}

impl PageChannel {
    /// Open an existing database file, reading its header to determine page
    /// size and free-map location. `free_map_start`/`free_map_bits` describe
    /// where the global free-pages map lives — supplied by the catalog
    /// loader, which reads it out of the database-header-adjacent
    /// system row, since the page channel itself has no schema awareness.
    pub fn open(
        vfs: &dyn PageVfs,
        path: &Path,
        format: &'static JetFormat,
        codec: Box<dyn Codec>,
        free_pages: UsageMap,
        read_only: bool,
    ) -> Result<PageChannel> {
        let mut file = vfs.open(path, false, read_only)?;
        let file_len = file.len()?;
        let page_count = (file_len / format.page_size as u64) as Pgno;
        Ok(PageChannel {
            file,
            format,
            codec,
            pool: PagePool::new(format.page_size as usize),
            free_pages,
            page_count,
            auto_sync: false,
        })
    }

    /// Create a brand-new, empty database file of the given format.
    pub fn create(
        vfs: &dyn PageVfs,
        path: &Path,
        format: &'static JetFormat,
        codec: Box<dyn Codec>,
    ) -> Result<PageChannel> {
        let mut file = vfs.open(path, true, false)?;
        let mut header = vec![0u8; format.page_size as usize];
        header[0] = PageType::DbHeader as u8;
        header[0x14] = format.version_byte();
        file.write_at(&header, 0)?;
        file.sync()?;
        Ok(PageChannel {
            file,
            format,
            codec,
            pool: PagePool::new(format.page_size as usize),
            free_pages: UsageMap::new_inline(1),
            page_count: 1,
            auto_sync: false,
        })
    }

    pub fn format(&self) -> &'static JetFormat {
        self.format
    }

    pub fn page_count(&self) -> Pgno {
        self.page_count
    }

    pub fn set_auto_sync(&mut self, on: bool) {
        self.auto_sync = on;
    }

    /// Allocate a scratch buffer of exactly one page from the shared pool.
    pub fn wrap_as_buffer(&mut self, bytes: &[u8]) -> Buffer {
        let mut buf = self.pool.take();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        buf
    }

    /// Return a scratch buffer to the pool for reuse. Not required for
    /// correctness (buffers are plain `Vec<u8>`), but avoids repeated
    /// page-sized allocations across a long cursor scan.
    pub fn release_buffer(&mut self, buf: Buffer) {
        self.pool.give_back(buf);
    }

    /// Load a page, applying the decode hook. `pn == 0` addresses the
    /// database header page.
    pub fn read_page(&mut self, pn: Pgno) -> Result<Buffer> {
        if pn as u64 >= self.page_count as u64 {
            return Err(Error::with_message(
                ErrorCode::InvalidArgument,
                format!("page {pn} out of range (file has {} pages)", self.page_count),
            ));
        }
        let mut buf = self.pool.take();
        let offset = pn as u64 * self.format.page_size as u64;
        self.file.read_at(&mut buf, offset)?;
        self.codec.decode(&mut buf, pn);
        Ok(buf)
    }

    /// Overwrite the entirety of page `pn`.
    pub fn write_page(&mut self, buf: &Buffer, pn: Pgno) -> Result<()> {
        self.write_page_from(buf, pn, 0)
    }

    /// Write only `buf[offset..]` to the tail of page `pn`, leaving bytes
    /// before `offset` untouched on disk — used when a caller only touched
    /// the tail of a table-def row.
    pub fn write_page_from(&mut self, buf: &Buffer, pn: Pgno, offset: usize) -> Result<()> {
        if buf.len() != self.format.page_size as usize {
            return Err(Error::with_message(
                ErrorCode::InvalidArgument,
                "buffer size does not match page size",
            ));
        }
        let mut encoded = buf.clone();
        self.codec.encode(&mut encoded, pn);
        let base = pn as u64 * self.format.page_size as u64;
        self.file.write_at(&encoded[offset..], base + offset as u64)?;
        if pn as u64 >= self.page_count as u64 {
            self.page_count = pn + 1;
        }
        if self.auto_sync {
            self.file.sync()?;
        }
        Ok(())
    }

    /// Allocate a page, preferring reuse of a freed page over growing the
    /// file, only extending file length when the free map is empty.
    pub fn allocate_page(&mut self, ty: PageType) -> Result<(Pgno, Buffer)> {
        let pn = match self.free_pages.pop_any() {
            Some(pn) => pn,
            None => {
                let pn = self.page_count.max(1);
                self.page_count = pn + 1;
                pn
            }
        };
        let mut buf = self.pool.take();
        buf[0] = ty as u8;
        Ok((pn, buf))
    }

    /// Zero the page body and return it to the free map. Individual page
    /// frees never shrink the file; the header byte is left zeroed so a stray read of a
    /// freed page trips [`PageType::from_byte`] rather than silently being
    /// mistaken for live data.
    pub fn free_page(&mut self, pn: Pgno) -> Result<()> {
        if pn == INVALID_PGNO {
            return Err(Error::new(ErrorCode::InvalidArgument));
        }
        let zeroed = vec![0u8; self.format.page_size as usize];
        self.write_page(&zeroed, pn)?;
        self.free_pages.add(pn, true)?;
        Ok(())
    }

    pub fn free_pages(&self) -> &UsageMap {
        &self.free_pages
    }

    pub fn free_pages_mut(&mut self) -> &mut UsageMap {
        &mut self.free_pages
    }

    /// Force the underlying file to durable storage.
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync()
    }
}

/// Convenience for tests and [`crate::database::Database`]: resolve a
/// path-like value the same way the rest of the engine does.
pub fn canonicalize(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatVersion;
    use crate::os::mem::MemVfs;

    fn open_fresh() -> PageChannel {
        let vfs = MemVfs::new();
        let path = PathBuf::from("/t.mdb");
        PageChannel::create(&vfs, &path, JetFormat::for_version(FormatVersion::Jet4), Box::new(IdentityCodec)).unwrap()
    }

    #[test]
    fn allocate_extends_file_when_free_map_empty() {
        let mut chan = open_fresh();
        let (pn1, buf1) = chan.allocate_page(PageType::Data).unwrap();
        chan.write_page(&buf1, pn1).unwrap();
        let (pn2, _) = chan.allocate_page(PageType::Data).unwrap();
        assert_ne!(pn1, pn2);
        assert!(pn2 > pn1);
    }

    #[test]
    fn free_then_allocate_reuses_page() {
        let mut chan = open_fresh();
        let (pn, buf) = chan.allocate_page(PageType::Data).unwrap();
        chan.write_page(&buf, pn).unwrap();
        chan.free_page(pn).unwrap();
        let (reused, _) = chan.allocate_page(PageType::Data).unwrap();
        assert_eq!(reused, pn);
    }

    #[test]
    fn read_out_of_range_page_errors() {
        let mut chan = open_fresh();
        let err = chan.read_page(999).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn write_page_from_offset_preserves_prefix() {
        let mut chan = open_fresh();
        let (pn, mut buf) = chan.allocate_page(PageType::TableDef).unwrap();
        buf[10] = 0xAB;
        chan.write_page(&buf, pn).unwrap();
        let mut patch = chan.read_page(pn).unwrap();
        patch[20] = 0xCD;
        chan.write_page_from(&patch, pn, 20).unwrap();
        let roundtrip = chan.read_page(pn).unwrap();
        assert_eq!(roundtrip[10], 0xAB);
        assert_eq!(roundtrip[20], 0xCD);
    }
}
