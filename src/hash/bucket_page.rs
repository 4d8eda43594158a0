//! # Hash Bucket Page
//!
//! A bucket stores up to `max_size` (key, value) pairs in key order behind
//! an 8-byte header. Because keys and values are generic fixed-size types,
//! the bucket is a typed *view* over raw page bytes rather than a concrete
//! zerocopy struct: entry offsets are computed from the entry size and the
//! pairs are copied in and out with unaligned zerocopy reads and writes.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size        Field
//! ------  ----------  --------------------------------------
//! 0       4           size (u32): live entries
//! 4       4           max_size (u32): capacity ceiling
//! 8       E * N       entries: key bytes then value bytes
//! ```
//!
//! `E = size_of::<K>() + size_of::<V>()`; N is bounded both by the page
//! capacity and the user-requested `max_size`.
//!
//! ## Search
//!
//! Entries stay sorted under the caller's comparator, so lookup is a
//! binary search returning either the matching index or the insertion
//! point ([`SearchResult`]).

use std::marker::PhantomData;
use std::mem::size_of;

use eyre::{ensure, Result};

use crate::config::{HASH_BUCKET_METADATA_SIZE, PAGE_SIZE};

use super::{BucketEntry, KeyComparator};

/// Outcome of a bucket binary search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(u32),
    /// Not present; payload is the insertion point that keeps the bucket
    /// sorted.
    NotFound(u32),
}

/// Read-only view of a bucket page.
pub struct BucketPage<'a, K, V> {
    data: &'a [u8],
    _marker: PhantomData<(K, V)>,
}

/// Mutable view of a bucket page.
pub struct BucketPageMut<'a, K, V> {
    data: &'a mut [u8],
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: BucketEntry, V: BucketEntry> BucketPage<'a, K, V> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "bucket view requires a full page, got {} bytes",
            data.len()
        );
        Ok(Self {
            data,
            _marker: PhantomData,
        })
    }

    /// Entries a page can physically hold for this (K, V) pair.
    pub const fn capacity() -> usize {
        (PAGE_SIZE - HASH_BUCKET_METADATA_SIZE) / Self::entry_size()
    }

    const fn entry_size() -> usize {
        size_of::<K>() + size_of::<V>()
    }

    fn entry_offset(idx: u32) -> usize {
        HASH_BUCKET_METADATA_SIZE + idx as usize * Self::entry_size()
    }

    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.data[0..4].try_into().unwrap())
    }

    pub fn max_size(&self) -> u32 {
        u32::from_le_bytes(self.data[4..8].try_into().unwrap())
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: u32) -> K {
        debug_assert!(idx < self.size());
        let offset = Self::entry_offset(idx);
        K::read_from_bytes(&self.data[offset..offset + size_of::<K>()]).unwrap()
    }

    pub fn value_at(&self, idx: u32) -> V {
        debug_assert!(idx < self.size());
        let offset = Self::entry_offset(idx) + size_of::<K>();
        V::read_from_bytes(&self.data[offset..offset + size_of::<V>()]).unwrap()
    }

    /// Binary search over the sorted entries.
    pub fn search<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> SearchResult {
        let mut lo = 0u32;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp.compare(key, &self.key_at(mid)) {
                std::cmp::Ordering::Greater => lo = mid + 1,
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Equal => return SearchResult::Found(mid),
            }
        }
        SearchResult::NotFound(lo)
    }

    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Option<V> {
        match self.search(key, cmp) {
            SearchResult::Found(idx) => Some(self.value_at(idx)),
            SearchResult::NotFound(_) => None,
        }
    }
}

impl<'a, K: BucketEntry, V: BucketEntry> BucketPageMut<'a, K, V> {
    pub fn new(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "bucket view requires a full page, got {} bytes",
            data.len()
        );
        Ok(Self {
            data,
            _marker: PhantomData,
        })
    }

    /// Prepares an empty bucket with the given capacity ceiling.
    pub fn init(&mut self, max_size: u32) -> Result<()> {
        ensure!(max_size >= 1, "bucket max_size must be at least 1");
        ensure!(
            max_size as usize <= BucketPage::<K, V>::capacity(),
            "bucket max_size {} exceeds page capacity {}",
            max_size,
            BucketPage::<K, V>::capacity()
        );
        self.set_size(0);
        self.data[4..8].copy_from_slice(&max_size.to_le_bytes());
        Ok(())
    }

    fn as_view(&self) -> BucketPage<'_, K, V> {
        BucketPage {
            data: self.data,
            _marker: PhantomData,
        }
    }

    pub fn size(&self) -> u32 {
        self.as_view().size()
    }

    pub fn max_size(&self) -> u32 {
        self.as_view().max_size()
    }

    pub fn is_full(&self) -> bool {
        self.as_view().is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.as_view().is_empty()
    }

    pub fn key_at(&self, idx: u32) -> K {
        self.as_view().key_at(idx)
    }

    pub fn value_at(&self, idx: u32) -> V {
        self.as_view().value_at(idx)
    }

    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Option<V> {
        self.as_view().lookup(key, cmp)
    }

    /// Inserts in sorted position. False when the bucket is full or the
    /// key already exists (no update-in-place).
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        if self.is_full() {
            return false;
        }
        match self.as_view().search(key, cmp) {
            SearchResult::Found(_) => false,
            SearchResult::NotFound(idx) => {
                self.insert_at(idx, key, value);
                true
            }
        }
    }

    /// Removes the key if present, shifting later entries down.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, cmp: &C) -> bool {
        match self.as_view().search(key, cmp) {
            SearchResult::Found(idx) => {
                self.remove_at(idx);
                true
            }
            SearchResult::NotFound(_) => false,
        }
    }

    /// Appends an entry whose key is greater than every stored key. Used
    /// when rebuilding a bucket from an already-sorted run during a split.
    pub fn append(&mut self, key: &K, value: &V) -> Result<()> {
        ensure!(!self.is_full(), "append to a full bucket");
        let size = self.size();
        self.insert_at(size, key, value);
        Ok(())
    }

    /// Drops every entry, keeping `max_size`.
    pub fn clear(&mut self) {
        self.set_size(0);
    }

    fn set_size(&mut self, size: u32) {
        self.data[0..4].copy_from_slice(&size.to_le_bytes());
    }

    fn insert_at(&mut self, idx: u32, key: &K, value: &V) {
        let entry_size = BucketPage::<K, V>::entry_size();
        let size = self.size() as usize;
        debug_assert!(idx as usize <= size);
        let start = BucketPage::<K, V>::entry_offset(idx);
        let end = HASH_BUCKET_METADATA_SIZE + size * entry_size;

        self.data.copy_within(start..end, start + entry_size);
        key.write_to(&mut self.data[start..start + size_of::<K>()])
            .unwrap();
        value
            .write_to(&mut self.data[start + size_of::<K>()..start + entry_size])
            .unwrap();
        self.set_size(size as u32 + 1);
    }

    fn remove_at(&mut self, idx: u32) {
        let entry_size = BucketPage::<K, V>::entry_size();
        let size = self.size() as usize;
        debug_assert!((idx as usize) < size);
        let start = BucketPage::<K, V>::entry_offset(idx);
        let end = HASH_BUCKET_METADATA_SIZE + size * entry_size;

        self.data.copy_within(start + entry_size..end, start);
        self.set_size(size as u32 - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::OrdComparator;

    fn bucket_page(max_size: u32) -> Vec<u8> {
        let mut data = vec![0u8; PAGE_SIZE];
        BucketPageMut::<u32, u64>::new(&mut data)
            .unwrap()
            .init(max_size)
            .unwrap();
        data
    }

    #[test]
    fn capacity_accounts_for_metadata_and_entry_size() {
        // (4096 - 8) / (4 + 8) = 340
        assert_eq!(BucketPage::<u32, u64>::capacity(), 340);
        // (4096 - 8) / (4 + 4) = 511
        assert_eq!(BucketPage::<u32, u32>::capacity(), 511);
    }

    #[test]
    fn init_rejects_oversized_max_size() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        assert!(bucket.init(341).is_err());
        assert!(bucket.init(0).is_err());
        bucket.init(340).unwrap();
    }

    #[test]
    fn view_requires_a_full_page() {
        let data = vec![0u8; 100];
        assert!(BucketPage::<u32, u64>::new(&data).is_err());
    }

    #[test]
    fn insert_keeps_keys_sorted() {
        let mut data = bucket_page(8);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        assert!(bucket.insert(&30, &300, &cmp));
        assert!(bucket.insert(&10, &100, &cmp));
        assert!(bucket.insert(&20, &200, &cmp));

        assert_eq!(bucket.size(), 3);
        assert_eq!(bucket.key_at(0), 10);
        assert_eq!(bucket.key_at(1), 20);
        assert_eq!(bucket.key_at(2), 30);
        assert_eq!(bucket.value_at(1), 200);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut data = bucket_page(8);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        assert!(bucket.insert(&5, &50, &cmp));
        assert!(!bucket.insert(&5, &51, &cmp));
        assert_eq!(bucket.lookup(&5, &cmp), Some(50));
    }

    #[test]
    fn insert_into_a_full_bucket_fails() {
        let mut data = bucket_page(2);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &10, &cmp));
        assert!(bucket.insert(&2, &20, &cmp));
        assert!(bucket.is_full());
        assert!(!bucket.insert(&3, &30, &cmp));
        assert_eq!(bucket.size(), 2);
    }

    #[test]
    fn remove_shifts_later_entries_down() {
        let mut data = bucket_page(8);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        for k in [1u32, 2, 3, 4] {
            bucket.insert(&k, &(k as u64 * 10), &cmp);
        }
        assert!(bucket.remove(&2, &cmp));
        assert!(!bucket.remove(&2, &cmp));

        assert_eq!(bucket.size(), 3);
        assert_eq!(bucket.key_at(0), 1);
        assert_eq!(bucket.key_at(1), 3);
        assert_eq!(bucket.key_at(2), 4);
        assert_eq!(bucket.value_at(2), 40);
    }

    #[test]
    fn lookup_misses_return_none() {
        let mut data = bucket_page(4);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        assert_eq!(bucket.lookup(&9, &cmp), None);
        bucket.insert(&9, &90, &cmp);
        assert_eq!(bucket.lookup(&9, &cmp), Some(90));
        assert_eq!(bucket.lookup(&8, &cmp), None);
        assert_eq!(bucket.lookup(&10, &cmp), None);
    }

    #[test]
    fn clear_empties_the_bucket_but_keeps_capacity() {
        let mut data = bucket_page(4);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        bucket.insert(&1, &10, &cmp);
        bucket.insert(&2, &20, &cmp);
        bucket.clear();

        assert!(bucket.is_empty());
        assert_eq!(bucket.max_size(), 4);
        assert!(bucket.insert(&1, &11, &cmp));
        assert_eq!(bucket.lookup(&1, &cmp), Some(11));
    }

    #[test]
    fn append_builds_a_sorted_run() {
        let mut data = bucket_page(4);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        bucket.append(&1, &10).unwrap();
        bucket.append(&5, &50).unwrap();
        bucket.append(&9, &90).unwrap();

        assert_eq!(bucket.lookup(&5, &cmp), Some(50));
        assert_eq!(bucket.size(), 3);
    }

    #[test]
    fn search_reports_insertion_points() {
        let mut data = bucket_page(8);
        let mut bucket = BucketPageMut::<u32, u64>::new(&mut data).unwrap();
        let cmp = OrdComparator;

        for k in [10u32, 20, 30] {
            bucket.insert(&k, &0, &cmp);
        }
        let view = BucketPage::<u32, u64>::new(&data).unwrap();
        assert_eq!(view.search(&5, &cmp), SearchResult::NotFound(0));
        assert_eq!(view.search(&15, &cmp), SearchResult::NotFound(1));
        assert_eq!(view.search(&20, &cmp), SearchResult::Found(1));
        assert_eq!(view.search(&35, &cmp), SearchResult::NotFound(3));
    }
}
