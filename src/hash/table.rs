//! # Disk-Resident Extendible Hash Table
//!
//! The table walks header → directory → bucket through buffer-pool guards.
//! Read paths crab-latch: each ancestor's read guard is released as soon as
//! the child page id is known, so point lookups never serialize on the
//! root. Write paths hold the directory's write latch for the whole
//! operation because splits, merges and depth changes restructure the
//! directory itself.
//!
//! ## Insert Outline
//!
//! ```text
//! 1. Header (write latch): resolve or create the directory, drop latch
//! 2. loop:
//!    a. Directory (write latch): resolve or create the bucket
//!    b. Bucket (write latch): duplicate key? -> false
//!    c. Room in the bucket? insert -> true
//!    d. Full: grow the directory if local == global (fail if both at
//!       max), bump the local depth, split, retry from (a)
//! ```
//!
//! A split can leave every entry on one side (the new bucket stays empty,
//! the old one full); the retry then splits again at the next depth, so a
//! skewed hash cascade terminates only when depth runs out.
//!
//! ## Remove Outline
//!
//! After a successful delete the bucket tries to merge with its split
//! image while both share a local depth and either is empty; each merge
//! redirects the dead bucket's directory slots to the survivor and
//! decrements the shared depth, recursing until the buckets differ. The
//! directory then sheds redundant upper halves while every local depth
//! sits strictly below the global depth.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::{ensure, eyre, Result};
use log::debug;
use smallvec::SmallVec;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::config::{HASH_DIRECTORY_MAX_DEPTH, HASH_HEADER_MAX_DEPTH};
use crate::storage::{PageId, INVALID_PAGE_ID};

use super::bucket_page::{BucketPage, BucketPageMut};
use super::directory_page::HashDirectoryPage;
use super::header_page::HashHeaderPage;
use super::{BucketEntry, KeyComparator, KeyHasher, Transaction};

/// Extendible hash index over fixed-size keys and values.
///
/// `C` supplies the key order inside buckets; `H` supplies the 32-bit
/// placement hash. The table itself owns no pages beyond the header id:
/// everything lives in the buffer pool.
pub struct DiskExtendibleHashTable<K, V, C, H> {
    bpm: Arc<BufferPoolManager>,
    cmp: C,
    hasher: H,
    directory_max_depth: u32,
    bucket_max_size: u32,
    header_page_id: PageId,
    _marker: PhantomData<fn(K, V)>,
}

impl<K, V, C, H> DiskExtendibleHashTable<K, V, C, H>
where
    K: BucketEntry,
    V: BucketEntry,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Creates a fresh table, allocating its header page.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hasher: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        ensure!(
            header_max_depth <= HASH_HEADER_MAX_DEPTH,
            "header max_depth {} exceeds limit {}",
            header_max_depth,
            HASH_HEADER_MAX_DEPTH
        );
        Self::check_shape(directory_max_depth, bucket_max_size)?;

        let header_page_id = {
            let guard = bpm
                .new_page_guarded()?
                .ok_or_else(|| eyre!("buffer pool exhausted allocating the hash table header"))?;
            let page_id = guard.page_id();
            let mut guard = guard.upgrade_write();
            guard.as_mut::<HashHeaderPage>()?.init(header_max_depth)?;
            page_id
        };
        debug!("created hash table with header page {header_page_id}");

        Ok(Self {
            bpm,
            cmp,
            hasher,
            directory_max_depth,
            bucket_max_size,
            header_page_id,
            _marker: PhantomData,
        })
    }

    /// Re-attaches to an existing table by its header page id. The caller
    /// is responsible for remembering the root id; there is no superblock.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hasher: H,
        header_page_id: PageId,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        Self::check_shape(directory_max_depth, bucket_max_size)?;
        {
            let guard = bpm
                .fetch_page_read(header_page_id)?
                .ok_or_else(|| eyre!("header page {header_page_id} unavailable"))?;
            let header = guard.as_ref::<HashHeaderPage>()?;
            ensure!(
                header.max_depth() <= HASH_HEADER_MAX_DEPTH,
                "page {} does not hold a hash table header",
                header_page_id
            );
        }
        Ok(Self {
            bpm,
            cmp,
            hasher,
            directory_max_depth,
            bucket_max_size,
            header_page_id,
            _marker: PhantomData,
        })
    }

    fn check_shape(directory_max_depth: u32, bucket_max_size: u32) -> Result<()> {
        ensure!(
            directory_max_depth <= HASH_DIRECTORY_MAX_DEPTH,
            "directory max_depth {} exceeds limit {}",
            directory_max_depth,
            HASH_DIRECTORY_MAX_DEPTH
        );
        ensure!(
            bucket_max_size >= 1 && bucket_max_size as usize <= BucketPage::<K, V>::capacity(),
            "bucket max_size {} outside 1..={}",
            bucket_max_size,
            BucketPage::<K, V>::capacity()
        );
        Ok(())
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn hash(&self, key: &K) -> u32 {
        self.hasher.hash_key(key)
    }

    fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        self.bpm
            .fetch_page_read(page_id)?
            .ok_or_else(|| eyre!("buffer pool exhausted fetching page {page_id}"))
    }

    fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        self.bpm
            .fetch_page_write(page_id)?
            .ok_or_else(|| eyre!("buffer pool exhausted fetching page {page_id}"))
    }

    fn new_write(&self) -> Result<(PageId, WritePageGuard<'_>)> {
        let guard = self
            .bpm
            .new_page_guarded()?
            .ok_or_else(|| eyre!("buffer pool exhausted allocating a page"))?;
        let page_id = guard.page_id();
        Ok((page_id, guard.upgrade_write()))
    }

    /// Looks the key up, crab-latching read guards down the levels.
    pub fn get_value(&self, key: &K, _txn: Option<&Transaction>) -> Result<Option<V>> {
        let hash = self.hash(key);

        let directory_page_id = {
            let header_guard = self.fetch_read(self.header_page_id)?;
            let header = header_guard.as_ref::<HashHeaderPage>()?;
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_page_id = {
            let directory_guard = self.fetch_read(directory_page_id)?;
            let directory = directory_guard.as_ref::<HashDirectoryPage>()?;
            directory.bucket_page_id(directory.hash_to_bucket_index(hash))
        };
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_guard = self.fetch_read(bucket_page_id)?;
        let bucket = BucketPage::<K, V>::new(bucket_guard.data())?;
        Ok(bucket.lookup(key, &self.cmp))
    }

    /// Inserts the pair. False when the key already exists or when the
    /// target bucket is full and no depth remains to split into.
    pub fn insert(&self, key: &K, value: &V, _txn: Option<&Transaction>) -> Result<bool> {
        let hash = self.hash(key);

        // Resolve (or create) the directory under the header write latch,
        // then let go of the header: directory growth never touches it.
        let mut header_guard = self.fetch_write(self.header_page_id)?;
        let (directory_idx, mut directory_page_id) = {
            let header = header_guard.as_ref::<HashHeaderPage>()?;
            let idx = header.hash_to_directory_index(hash);
            (idx, header.directory_page_id(idx))
        };
        if directory_page_id == INVALID_PAGE_ID {
            let (new_page_id, mut directory_guard) = self.new_write()?;
            directory_guard
                .as_mut::<HashDirectoryPage>()?
                .init(self.directory_max_depth)?;
            drop(directory_guard);
            header_guard
                .as_mut::<HashHeaderPage>()?
                .set_directory_page_id(directory_idx, new_page_id);
            directory_page_id = new_page_id;
            debug!("created directory page {new_page_id} for slot {directory_idx}");
        }
        drop(header_guard);

        loop {
            let mut directory_guard = self.fetch_write(directory_page_id)?;
            let (bucket_idx, mut bucket_page_id) = {
                let directory = directory_guard.as_ref::<HashDirectoryPage>()?;
                let idx = directory.hash_to_bucket_index(hash);
                (idx, directory.bucket_page_id(idx))
            };
            if bucket_page_id == INVALID_PAGE_ID {
                let (new_page_id, mut bucket_guard) = self.new_write()?;
                BucketPageMut::<K, V>::new(bucket_guard.data_mut())?.init(self.bucket_max_size)?;
                drop(bucket_guard);
                let directory = directory_guard.as_mut::<HashDirectoryPage>()?;
                directory.set_bucket_page_id(bucket_idx, new_page_id);
                directory.set_local_depth(bucket_idx, 0);
                bucket_page_id = new_page_id;
            }

            let mut bucket_guard = self.fetch_write(bucket_page_id)?;
            let mut bucket = BucketPageMut::<K, V>::new(bucket_guard.data_mut())?;
            if bucket.lookup(key, &self.cmp).is_some() {
                return Ok(false);
            }
            if !bucket.is_full() {
                let inserted = bucket.insert(key, value, &self.cmp);
                debug_assert!(inserted, "non-full bucket rejected an absent key");
                return Ok(true);
            }

            // Full bucket: make depth available, split, and retry against
            // the post-split layout.
            let directory = directory_guard.as_mut::<HashDirectoryPage>()?;
            if directory.local_depth(bucket_idx) == directory.global_depth() {
                if directory.global_depth() >= directory.max_depth() {
                    debug!(
                        "insert failed: bucket full at global depth {} == max",
                        directory.global_depth()
                    );
                    return Ok(false);
                }
                directory.incr_global_depth();
            }
            directory.incr_local_depth(bucket_idx);
            self.split_bucket(directory, &mut bucket, bucket_idx, bucket_page_id)?;
        }
    }

    /// Removes the key. After a successful delete, merges empty buckets
    /// with their split images and shrinks the directory when possible.
    pub fn remove(&self, key: &K, _txn: Option<&Transaction>) -> Result<bool> {
        let hash = self.hash(key);

        let directory_page_id = {
            let header_guard = self.fetch_read(self.header_page_id)?;
            let header = header_guard.as_ref::<HashHeaderPage>()?;
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut directory_guard = self.fetch_write(directory_page_id)?;
        let (bucket_idx, bucket_page_id) = {
            let directory = directory_guard.as_ref::<HashDirectoryPage>()?;
            let idx = directory.hash_to_bucket_index(hash);
            (idx, directory.bucket_page_id(idx))
        };
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        {
            let mut bucket_guard = self.fetch_write(bucket_page_id)?;
            let mut bucket = BucketPageMut::<K, V>::new(bucket_guard.data_mut())?;
            if !bucket.remove(key, &self.cmp) {
                return Ok(false);
            }
        } // the bucket guard drops here so merging can delete the page

        let directory = directory_guard.as_mut::<HashDirectoryPage>()?;
        self.merge_empty_buckets(directory, bucket_idx)?;
        while directory.can_shrink() {
            directory.decr_global_depth();
        }
        Ok(true)
    }

    /// Splits a full bucket whose local depth was just incremented: the
    /// entries are rehashed between the old bucket and a fresh split-image
    /// bucket, and every directory slot that aliased the old bucket is
    /// redirected by its low `local_depth` bits.
    fn split_bucket(
        &self,
        directory: &mut HashDirectoryPage,
        bucket: &mut BucketPageMut<'_, K, V>,
        bucket_idx: u32,
        bucket_page_id: PageId,
    ) -> Result<()> {
        let new_local_depth = directory.local_depth(bucket_idx);
        debug_assert!(new_local_depth > 0);
        let mask = (1u32 << new_local_depth) - 1;
        let keep_pattern = bucket_idx & mask;

        let (new_page_id, mut new_guard) = self.new_write()?;
        let mut new_bucket = BucketPageMut::<K, V>::new(new_guard.data_mut())?;
        new_bucket.init(self.bucket_max_size)?;

        let mut kept: SmallVec<[(K, V); 8]> = SmallVec::new();
        let mut moved: SmallVec<[(K, V); 8]> = SmallVec::new();
        for i in 0..bucket.size() {
            let entry_key = bucket.key_at(i);
            let entry_value = bucket.value_at(i);
            if self.hash(&entry_key) & mask == keep_pattern {
                kept.push((entry_key, entry_value));
            } else {
                moved.push((entry_key, entry_value));
            }
        }
        bucket.clear();
        for (k, v) in &kept {
            bucket.append(k, v)?;
        }
        for (k, v) in &moved {
            new_bucket.append(k, v)?;
        }

        for i in 0..directory.size() {
            if directory.bucket_page_id(i) != bucket_page_id {
                continue;
            }
            if i & mask != keep_pattern {
                directory.set_bucket_page_id(i, new_page_id);
            }
            directory.set_local_depth(i, new_local_depth as u8);
        }
        debug!(
            "split bucket page {bucket_page_id} at depth {new_local_depth}: \
             {} kept, {} moved to page {new_page_id}",
            kept.len(),
            moved.len()
        );
        Ok(())
    }

    /// Repeatedly merges the bucket at `bucket_idx` with its split image
    /// while both share a local depth and at least one is empty.
    fn merge_empty_buckets(
        &self,
        directory: &mut HashDirectoryPage,
        bucket_idx: u32,
    ) -> Result<()> {
        let mut idx = bucket_idx;
        loop {
            let local_depth = directory.local_depth(idx);
            if local_depth == 0 {
                return Ok(());
            }
            let split_idx = directory.split_image_index(idx);
            if directory.local_depth(split_idx) != local_depth {
                return Ok(());
            }
            let page_id = directory.bucket_page_id(idx);
            let split_page_id = directory.bucket_page_id(split_idx);
            if page_id == split_page_id
                || page_id == INVALID_PAGE_ID
                || split_page_id == INVALID_PAGE_ID
            {
                return Ok(());
            }

            let bucket_empty = self.bucket_is_empty(page_id)?;
            let split_empty = self.bucket_is_empty(split_page_id)?;
            if !bucket_empty && !split_empty {
                return Ok(());
            }
            let (dead_page_id, survivor_page_id) = if bucket_empty {
                (page_id, split_page_id)
            } else {
                (split_page_id, page_id)
            };

            let merged_depth = local_depth - 1;
            for i in 0..directory.size() {
                let slot = directory.bucket_page_id(i);
                if slot == dead_page_id {
                    directory.set_bucket_page_id(i, survivor_page_id);
                }
                if slot == dead_page_id || slot == survivor_page_id {
                    directory.set_local_depth(i, merged_depth as u8);
                }
            }
            self.bpm.delete_page(dead_page_id)?;
            debug!(
                "merged bucket page {dead_page_id} into {survivor_page_id} at depth {merged_depth}"
            );

            // The survivor may now merge again at the shallower depth.
            idx &= (1u32 << merged_depth) - 1;
        }
    }

    fn bucket_is_empty(&self, page_id: PageId) -> Result<bool> {
        let guard = self.fetch_read(page_id)?;
        Ok(BucketPage::<K, V>::new(guard.data())?.is_empty())
    }

    /// Walks header → directories checking the structural invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let mut directory_ids: SmallVec<[PageId; 8]> = SmallVec::new();
        {
            let header_guard = self.fetch_read(self.header_page_id)?;
            let header = header_guard.as_ref::<HashHeaderPage>()?;
            for i in 0..header.max_size() {
                let page_id = header.directory_page_id(i);
                if page_id != INVALID_PAGE_ID {
                    directory_ids.push(page_id);
                }
            }
        }
        for page_id in directory_ids {
            let guard = self.fetch_read(page_id)?;
            guard.as_ref::<HashDirectoryPage>()?.verify_integrity()?;
        }
        Ok(())
    }
}
