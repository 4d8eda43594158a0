//! # Disk Device Abstraction
//!
//! This module provides the [`DiskDevice`] trait, a copy-based abstraction
//! for block stores that lets the scheduler and buffer pool run against
//! different backends (a real file, or memory for tests).
//!
//! ## Copy-Based Interface
//!
//! The interface uses copy semantics for maximum portability:
//!
//! ```text
//! fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;
//! fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;
//! ```
//!
//! Both calls are blocking and synchronous from the caller's point of view.
//! Implementations take `&self` with interior mutability so a single device
//! can be shared between the scheduler worker and its owner.
//!
//! ## Read Semantics
//!
//! Reading a page that has never been written returns zeroes. The buffer
//! pool allocates page ids before their first write-back, so a fetch may
//! legitimately race ahead of any data reaching the device.
//!
//! ## Backends
//!
//! | Backend   | Storage          | Use                |
//! |-----------|------------------|--------------------|
//! | FileDisk  | one flat file    | persistent engines |
//! | MemDisk   | in-memory map    | tests, ephemerals  |

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use super::{PageBuf, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// A block-addressable store of fixed-size pages.
///
/// Implementations must be shareable across threads; the disk scheduler's
/// worker holds one reference while the owning pool holds another.
pub trait DiskDevice: Send + Sync {
    /// Reads the page into `buf`. Unwritten pages read as zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes the page. The write is visible to subsequent reads once this
    /// returns.
    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;
}

/// File-backed device: page `n` lives at byte offset `n * PAGE_SIZE`.
pub struct FileDisk {
    file: Mutex<File>,
}

impl FileDisk {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())
            .wrap_err_with(|| format!("failed to create disk file {:?}", path.as_ref()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Opens an existing file, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())
            .wrap_err_with(|| format!("failed to open disk file {:?}", path.as_ref()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}

impl DiskDevice for FileDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id != INVALID_PAGE_ID, "cannot read the invalid page id");

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::page_offset(page_id)))
            .wrap_err("seek failed")?;

        // A short read past the end of the file is not an error: the tail
        // of the buffer reads as zeroes.
        let mut filled = 0;
        while filled < PAGE_SIZE {
            match file.read(&mut buf[filled..]).wrap_err("read failed")? {
                0 => break,
                n => filled += n,
            }
        }
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id != INVALID_PAGE_ID, "cannot write the invalid page id");

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::page_offset(page_id)))
            .wrap_err("seek failed")?;
        file.write_all(data).wrap_err("write failed")?;
        Ok(())
    }
}

/// In-memory device for tests: pages live in a map, unwritten pages read
/// as zeroes.
#[derive(Default)]
pub struct MemDisk {
    pages: RwLock<HashMap<PageId, PageBuf>>,
}

impl MemDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages that have ever been written.
    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }
}

impl DiskDevice for MemDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id != INVALID_PAGE_ID, "cannot read the invalid page id");

        match self.pages.read().get(&page_id) {
            Some(page) => buf.copy_from_slice(&page[..]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id != INVALID_PAGE_ID, "cannot write the invalid page id");

        let mut pages = self.pages.write();
        match pages.get_mut(&page_id) {
            Some(page) => page.copy_from_slice(data),
            None => {
                pages.insert(page_id, Box::new(*data));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_disk_reads_zeroes_for_unwritten_pages() {
        let disk = MemDisk::new();
        let mut buf = Box::new([0xFFu8; PAGE_SIZE]);

        disk.read_page(7, &mut buf).unwrap();

        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(disk.page_count(), 0);
    }

    #[test]
    fn mem_disk_round_trips_written_pages() {
        let disk = MemDisk::new();
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xCD;

        disk.write_page(3, &data).unwrap();

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        disk.read_page(3, &mut buf).unwrap();
        assert_eq!(buf[0], 0xAB);
        assert_eq!(buf[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn mem_disk_rejects_invalid_page_id() {
        let disk = MemDisk::new();
        let mut buf = Box::new([0u8; PAGE_SIZE]);

        assert!(disk.read_page(INVALID_PAGE_ID, &mut buf).is_err());
        assert!(disk.write_page(INVALID_PAGE_ID, &buf).is_err());
    }

    #[test]
    fn file_disk_round_trips_written_pages() {
        let dir = tempfile::tempdir().unwrap();
        let disk = FileDisk::create(dir.path().join("pages.db")).unwrap();

        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[10] = 42;
        disk.write_page(5, &data).unwrap();

        let mut buf = Box::new([0xFFu8; PAGE_SIZE]);
        disk.read_page(5, &mut buf).unwrap();
        assert_eq!(buf[10], 42);
        assert_eq!(buf[11], 0);
    }

    #[test]
    fn file_disk_reads_zeroes_past_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let disk = FileDisk::create(dir.path().join("pages.db")).unwrap();

        let mut buf = Box::new([0xFFu8; PAGE_SIZE]);
        disk.read_page(100, &mut buf).unwrap();

        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn file_disk_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");

        {
            let disk = FileDisk::create(&path).unwrap();
            let mut data = Box::new([0u8; PAGE_SIZE]);
            data[0] = 0x5A;
            disk.write_page(0, &data).unwrap();
        }

        let disk = FileDisk::open(&path).unwrap();
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        disk.read_page(0, &mut buf).unwrap();
        assert_eq!(buf[0], 0x5A);
    }
}
