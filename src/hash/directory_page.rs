//! # Hash Directory Page
//!
//! A directory maps the low `global_depth` bits of a key hash to bucket
//! pages. Several directory slots may alias one bucket: a bucket with local
//! depth `l` is shared by every slot whose low `l` bits match, so the
//! directory can double (copying its lower half into its upper half)
//! without moving any bucket.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size   Field
//! ------  -----  --------------------------------------------
//! 0       4      max_depth (u32 LE)
//! 4       4      global_depth (u32 LE)
//! 8       2048   bucket_page_ids (u32 LE x 512)
//! 2056    512    local_depths (u8 x 512)
//! ```
//!
//! Fields are little-endian [`U32`]s, so the struct is `Unaligned` and can
//! be viewed in place at any offset of a frame buffer.
//!
//! ## Depth Invariants
//!
//! - `global_depth <= max_depth`
//! - `local_depths[i] <= global_depth` for every live slot
//! - slots that differ only above bit `local_depths[i]` share one bucket
//!   page and one local depth
//!
//! `verify_integrity` checks these; the table calls it from tests.

use eyre::{ensure, Result};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{HASH_DIRECTORY_ARRAY_SIZE, HASH_DIRECTORY_MAX_DEPTH, PAGE_SIZE};
use crate::storage::{PageId, INVALID_PAGE_ID};

type U32Le = U32<LittleEndian>;

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct HashDirectoryPage {
    max_depth: U32Le,
    global_depth: U32Le,
    bucket_page_ids: [U32Le; HASH_DIRECTORY_ARRAY_SIZE],
    local_depths: [u8; HASH_DIRECTORY_ARRAY_SIZE],
}

const _: () = assert!(
    std::mem::size_of::<HashDirectoryPage>() <= PAGE_SIZE,
    "directory page layout must fit in one page"
);

impl HashDirectoryPage {
    pub fn init(&mut self, max_depth: u32) -> Result<()> {
        ensure!(
            max_depth <= HASH_DIRECTORY_MAX_DEPTH,
            "directory max_depth {} exceeds limit {}",
            max_depth,
            HASH_DIRECTORY_MAX_DEPTH
        );
        self.max_depth = U32Le::new(max_depth);
        self.global_depth = U32Le::ZERO;
        self.bucket_page_ids.fill(U32Le::new(INVALID_PAGE_ID));
        self.local_depths.fill(0);
        Ok(())
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth.get()
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth.get()
    }

    /// Number of live slots: `2^global_depth`.
    pub fn size(&self) -> u32 {
        1 << self.global_depth.get()
    }

    /// Largest slot count this directory can reach.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth.get()
    }

    /// Mask selecting the low `global_depth` hash bits.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth.get()) - 1
    }

    /// Mask selecting the low `local_depth` bits of the given slot.
    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1u32 << self.local_depth(bucket_idx)) - 1
    }

    /// Routes a hash to its bucket slot using the low `global_depth` bits.
    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & self.global_depth_mask()
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        debug_assert!(bucket_idx < self.size());
        self.bucket_page_ids[bucket_idx as usize].get()
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, page_id: PageId) {
        debug_assert!(bucket_idx < self.size());
        self.bucket_page_ids[bucket_idx as usize] = U32Le::new(page_id);
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        debug_assert!(bucket_idx < self.size());
        self.local_depths[bucket_idx as usize] as u32
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u8) {
        debug_assert!(bucket_idx < self.size());
        self.local_depths[bucket_idx as usize] = local_depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        debug_assert!(bucket_idx < self.size());
        let idx = bucket_idx as usize;
        if (self.local_depths[idx] as u32) < self.max_depth.get() {
            self.local_depths[idx] += 1;
        }
    }

    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        debug_assert!(bucket_idx < self.size());
        let idx = bucket_idx as usize;
        if self.local_depths[idx] > 0 {
            self.local_depths[idx] -= 1;
        }
    }

    /// The slot that differs from `bucket_idx` only in bit
    /// `local_depth - 1`: its partner in a split or merge.
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        let local_depth = self.local_depth(bucket_idx);
        debug_assert!(local_depth > 0, "slot at depth 0 has no split image");
        bucket_idx ^ (1u32 << (local_depth - 1))
    }

    /// Doubles the directory by copying the lower half's entries into the
    /// upper half. No-op once `global_depth` reaches `max_depth`.
    pub fn incr_global_depth(&mut self) {
        if self.global_depth.get() >= self.max_depth.get() {
            return;
        }
        let half = self.size() as usize;
        for i in 0..half {
            self.bucket_page_ids[half + i] = self.bucket_page_ids[i];
            self.local_depths[half + i] = self.local_depths[i];
        }
        self.global_depth = U32Le::new(self.global_depth.get() + 1);
    }

    /// Halves the directory. Only safe when `can_shrink` holds.
    pub fn decr_global_depth(&mut self) {
        if self.global_depth.get() == 0 {
            return;
        }
        self.global_depth = U32Le::new(self.global_depth.get() - 1);
    }

    /// True when every slot's local depth is strictly below the global
    /// depth, making the top half of the directory redundant.
    pub fn can_shrink(&self) -> bool {
        (0..self.size()).all(|i| self.local_depth(i) < self.global_depth.get())
    }

    /// Checks the directory invariants listed in the module docs.
    pub fn verify_integrity(&self) -> Result<()> {
        ensure!(
            self.global_depth.get() <= self.max_depth.get(),
            "global depth {} exceeds max depth {}",
            self.global_depth.get(),
            self.max_depth.get()
        );
        for i in 0..self.size() {
            let local_depth = self.local_depth(i);
            ensure!(
                local_depth <= self.global_depth.get(),
                "slot {} local depth {} exceeds global depth {}",
                i,
                local_depth,
                self.global_depth.get()
            );
            let page_id = self.bucket_page_id(i);
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            let canonical = i & self.local_depth_mask(i);
            ensure!(
                page_id == self.bucket_page_id(canonical),
                "slot {} and its canonical alias {} reference different buckets",
                i,
                canonical
            );
            ensure!(
                local_depth == self.local_depth(canonical),
                "slot {} and its canonical alias {} disagree on local depth",
                i,
                canonical
            );
        }
        Ok(())
    }
}
