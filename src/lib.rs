//! # KeelDB - Storage & Buffering Substrate
//!
//! KeelDB is the storage core of a disk-resident relational engine: a
//! fixed-size page cache over a block device, an LRU-K victim selector,
//! scoped page guards interlocking pins with per-frame latches, a
//! background disk-I/O scheduler, and an on-disk extendible hash index
//! built on that substrate.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use keeldb::{
//!     BufferPoolManager, Crc32KeyHasher, DiskExtendibleHashTable, FileDisk,
//!     OrdComparator,
//! };
//!
//! let device = Arc::new(FileDisk::create("./pages.db")?);
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, device)?);
//!
//! let index = DiskExtendibleHashTable::<u64, u64, _, _>::new(
//!     Arc::clone(&bpm),
//!     OrdComparator,
//!     Crc32KeyHasher,
//!     2, // header depth
//!     9, // directory depth
//!     256, // bucket capacity
//! )?;
//!
//! index.insert(&42, &4200, None)?;
//! assert_eq!(index.get_value(&42, None)?, Some(4200));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Extendible Hash Table (index)      │
//! ├─────────────────────────────────────┤
//! │   Page Guards (pin + latch, RAII)    │
//! ├─────────────────────────────────────┤
//! │   Buffer Pool │ LRU-K Replacer       │
//! ├─────────────────────────────────────┤
//! │   Disk Scheduler (worker thread)     │
//! ├─────────────────────────────────────┤
//! │   Disk Device (file / memory)        │
//! └─────────────────────────────────────┘
//! ```
//!
//! Every layer above the device talks to pages exclusively through the
//! buffer pool: a lookup pins and latches its way down header → directory
//! → bucket, the pool evicts through the replacer and writes back through
//! the scheduler, and guards release latches and pins at scope exit.
//!
//! Out of scope by design: crash recovery, write-ahead logging,
//! multi-version concurrency, replication, and every query-processing
//! layer. The index surfaces an opaque transaction handle for outer layers
//! but never inspects it.
//!
//! ## Module Overview
//!
//! - [`storage`]: block device trait, file/memory devices, disk scheduler
//! - [`buffer`]: buffer pool manager, LRU-K replacer, page guards
//! - [`hash`]: extendible hash table and its page layouts
//! - [`config`]: centralized constants

pub mod buffer;
pub mod config;
pub mod hash;
pub mod storage;

pub use buffer::{BasicPageGuard, BufferPoolManager, LruKReplacer, ReadPageGuard, WritePageGuard};
pub use config::PAGE_SIZE;
pub use hash::{
    Crc32KeyHasher, DiskExtendibleHashTable, KeyComparator, KeyHasher, OrdComparator, Transaction,
};
pub use storage::{
    DiskDevice, DiskScheduler, FileDisk, MemDisk, PageId, INVALID_PAGE_ID,
};
