//! Platform file abstraction for the page channel.
//!
//! No cross-process locking (coordination is the caller's problem), no
//! shared memory, no dynamic loading, no journal/WAL file kinds. What
//! survives is exactly what [`crate::storage::pager::PageChannel`] needs:
//! open a file, read/write at an absolute byte offset, truncate, sync,
//! report size.

use std::fs::{File, OpenOptions as FsOpenOptions};
use std::path::Path;

use crate::error::Result;

/// A single open database file.
pub trait PageFile: Send {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize>;
    fn truncate(&mut self, len: u64) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
    fn len(&mut self) -> Result<u64>;
}

/// Platform entry point: turns a path into a [`PageFile`]. Exists as a trait
/// (rather than a free function) so callers can substitute an in-memory or
/// instrumented file for tests without touching the rest of the engine.
pub trait PageVfs: Send + Sync {
    fn open(&self, path: &Path, create: bool, read_only: bool) -> Result<Box<dyn PageFile>>;
    fn remove(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// Default [`PageVfs`] backed by `std::fs`. Positioned I/O is expressed with
/// the platform's native pread/pwrite equivalents (`std::os::unix::fs::FileExt`,
/// `std::os::windows::fs::FileExt`) so no `libc`/`windows-sys` dependency is
/// needed purely to seek.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdVfs;

impl PageVfs for StdVfs {
    fn open(&self, path: &Path, create: bool, read_only: bool) -> Result<Box<dyn PageFile>> {
        let file = FsOpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(create && !read_only)
            .open(path)?;
        Ok(Box::new(StdPageFile { file }))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

struct StdPageFile {
    file: File,
}

#[cfg(unix)]
impl PageFile for StdPageFile {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        Ok(self.file.read_at(buf, offset)?)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.write_at(buf, offset)?;
        Ok(buf.len())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(windows)]
impl PageFile for StdPageFile {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::windows::fs::FileExt;
        Ok(self.file.seek_read(buf, offset)?)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        use std::os::windows::fs::FileExt;
        Ok(self.file.seek_write(buf, offset)?)
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(not(any(unix, windows)))]
impl PageFile for StdPageFile {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::io::{Read, Seek, SeekFrom, Write};
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(self.file.read(buf)?)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(self.file.write(buf)?)
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// In-memory [`PageFile`]/[`PageVfs`] used by tests so page-channel and
/// storage-layer tests don't touch the real filesystem.
pub mod mem {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    pub struct MemVfs {
        files: Arc<Mutex<HashMap<std::path::PathBuf, Vec<u8>>>>,
    }

    impl MemVfs {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl PageVfs for MemVfs {
        fn open(&self, path: &Path, create: bool, _read_only: bool) -> Result<Box<dyn PageFile>> {
            let mut files = self.files.lock().unwrap();
            if create {
                files.entry(path.to_path_buf()).or_default();
            } else if !files.contains_key(path) {
                return Err(crate::error::Error::new(crate::error::ErrorCode::Io));
            }
            Ok(Box::new(MemPageFile {
                path: path.to_path_buf(),
                files: self.files.clone(),
            }))
        }

        fn remove(&self, path: &Path) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }
    }

    struct MemPageFile {
        path: std::path::PathBuf,
        files: Arc<Mutex<HashMap<std::path::PathBuf, Vec<u8>>>>,
    }

    impl PageFile for MemPageFile {
        fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
            let files = self.files.lock().unwrap();
            let data = files.get(&self.path).map(|v| v.as_slice()).unwrap_or(&[]);
            let offset = offset as usize;
            if offset >= data.len() {
                buf.fill(0);
                return Ok(0);
            }
            let n = buf.len().min(data.len() - offset);
            buf[..n].copy_from_slice(&data[offset..offset + n]);
            if n < buf.len() {
                buf[n..].fill(0);
            }
            Ok(n)
        }

        fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
            let mut files = self.files.lock().unwrap();
            let data = files.entry(self.path.clone()).or_default();
            let end = offset as usize + buf.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset as usize..end].copy_from_slice(buf);
            Ok(buf.len())
        }

        fn truncate(&mut self, len: u64) -> Result<()> {
            let mut files = self.files.lock().unwrap();
            let data = files.entry(self.path.clone()).or_default();
            data.resize(len as usize, 0);
            Ok(())
        }

        fn sync(&mut self) -> Result<()> {
            Ok(())
        }

        fn len(&mut self) -> Result<u64> {
            let files = self.files.lock().unwrap();
            Ok(files.get(&self.path).map(|v| v.len()).unwrap_or(0) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mem::MemVfs;
    use std::path::PathBuf;

    #[test]
    fn mem_vfs_round_trips_writes() {
        let vfs = MemVfs::new();
        let path = PathBuf::from("/test.mdb");
        let mut f = vfs.open(&path, true, false).unwrap();
        f.write_at(b"hello", 4096).unwrap();
        let mut buf = [0u8; 5];
        f.read_at(&mut buf, 4096).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(f.len().unwrap(), 4101);
    }

    #[test]
    fn mem_vfs_open_without_create_fails_for_missing_file() {
        let vfs = MemVfs::new();
        assert!(vfs.open(&PathBuf::from("/missing.mdb"), false, false).is_err());
    }
}
