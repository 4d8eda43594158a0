//! # Buffer Pool Manager
//!
//! This module maps page ids onto a fixed array of in-memory frames,
//! evicting through the LRU-K replacer and writing back through the disk
//! scheduler.
//!
//! ## Frame Lifecycle
//!
//! ```text
//! Free ──pop──► Loading ──fill──► Resident(Clean)
//!                                   │        ▲
//!                         write-guard drop   flush / write-back
//!                                   ▼        │
//!                                Resident(Dirty)
//! Resident ──delete_page──► Free
//! ```
//!
//! A frame is resident exactly when its metadata carries a valid page id,
//! which is exactly when that id appears in the page table. The free list
//! and the set of resident frames always partition the pool.
//!
//! ## Pin Protocol
//!
//! Pages must be pinned before access to prevent eviction:
//!
//! 1. `fetch_page_*` / `new_page` pin the frame (pin count += 1)
//! 2. the caller reads or writes through a guard
//! 3. dropping the guard unpins; at pin count 0 the frame becomes evictable
//!
//! ## Locking
//!
//! One pool-wide mutex protects the page table, the free list, frame
//! metadata (page id, pin count, dirty flag) and all replacer interactions.
//! Each frame's byte buffer sits behind its own `RwLock` (the per-frame
//! latch), which guards are the only public way to acquire.
//!
//! The miss path installs the new mapping and `try_write`-latches the frame
//! while still holding the pool mutex (the victim's pin count is zero, so
//! the latch cannot be held), then releases the mutex before awaiting any
//! scheduler I/O. Concurrent fetchers of the same page pin it under the
//! mutex and then block on the frame latch until the fill completes. The
//! pool only ever takes frame latches non-blockingly while holding the
//! mutex, so the pool mutex → latch pair cannot deadlock against guard
//! holders, who block on latches only after the mutex is released.

use std::sync::Arc;

use eyre::{ensure, Result};
use hashbrown::HashMap;
use log::debug;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockWriteGuard};

use crate::config::{DEFAULT_POOL_SIZE, DEFAULT_REPLACER_K};
use crate::storage::{
    DiskDevice, DiskScheduler, PageBuf, PageId, INVALID_PAGE_ID, PAGE_SIZE,
};

use super::guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
use super::lru_k::LruKReplacer;
use super::FrameId;

#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn vacant() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    metas: Vec<FrameMeta>,
    next_page_id: PageId,
}

/// Fixed-size page cache over a disk device.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<RwLock<PageBuf>>,
    state: Mutex<PoolState>,
    replacer: LruKReplacer,
    scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, replacer_k: usize, device: Arc<dyn DiskDevice>) -> Result<Self> {
        ensure!(pool_size >= 1, "pool size must be at least 1");

        let frames: Vec<RwLock<PageBuf>> = (0..pool_size)
            .map(|_| RwLock::new(Box::new([0u8; PAGE_SIZE])))
            .collect();
        Ok(Self {
            pool_size,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).collect(),
                metas: vec![FrameMeta::vacant(); pool_size],
                next_page_id: 0,
            }),
            replacer: LruKReplacer::new(pool_size, replacer_k)?,
            scheduler: DiskScheduler::new(device)?,
        })
    }

    /// `new` with the crate-default pool size and replacer K.
    pub fn with_defaults(device: Arc<dyn DiskDevice>) -> Result<Self> {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_REPLACER_K, device)
    }

    /// Allocates a fresh page id, pins it into a zeroed frame and returns
    /// the id. `None` when every frame is pinned.
    pub fn new_page(&self) -> Result<Option<PageId>> {
        Ok(self.allocate_page()?.map(|(page_id, _)| page_id))
    }

    /// `new_page` wrapped in a pin-owning guard.
    pub fn new_page_guarded(&self) -> Result<Option<BasicPageGuard<'_>>> {
        Ok(self
            .allocate_page()?
            .map(|(page_id, frame_id)| BasicPageGuard::new(self, page_id, frame_id)))
    }

    /// Pins the page, loading it from disk if necessary. `None` for the
    /// invalid id or when no frame can be obtained.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<Option<BasicPageGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|frame_id| BasicPageGuard::new(self, page_id, frame_id)))
    }

    /// Fetches the page and acquires its shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<ReadPageGuard<'_>>> {
        Ok(self.fetch_page_basic(page_id)?.map(BasicPageGuard::upgrade_read))
    }

    /// Fetches the page and acquires its exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<WritePageGuard<'_>>> {
        Ok(self.fetch_page_basic(page_id)?.map(BasicPageGuard::upgrade_write))
    }

    /// Drops one pin, OR-ing in the caller's dirty flag. False when the
    /// page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        if page_id == INVALID_PAGE_ID {
            return false;
        }
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let meta = &mut state.metas[frame_id];
        if meta.pin_count == 0 {
            return false;
        }
        meta.is_dirty |= is_dirty;
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer
                .set_evictable(frame_id, true)
                .expect("frame id bounded by pool size"); // INVARIANT: frame ids come from the frame array
        }
        true
    }

    /// Writes the page through to disk regardless of its dirty flag (a
    /// conditional write would miss the caller's explicit intent) and
    /// clears the flag. False when the page is not resident.
    ///
    /// Takes the frame's shared latch for the copy-out: callers must not
    /// hold a write guard on the same page.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        // Pin the frame so it cannot be evicted while the mutex is released
        // for the latch and the I/O.
        let frame_id = {
            let mut state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            let meta = &mut state.metas[frame_id];
            meta.pin_count += 1;
            if meta.pin_count == 1 {
                self.replacer.set_evictable(frame_id, false)?;
            }
            frame_id
        };

        let io_result = (|| -> Result<()> {
            let data = {
                let latch = self.frames[frame_id].read();
                let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                buf.copy_from_slice(&latch[..]);
                buf
            };
            self.scheduler.write_page(page_id, data).wait()?;
            Ok(())
        })();

        let mut state = self.state.lock();
        let meta = &mut state.metas[frame_id];
        if io_result.is_ok() {
            meta.is_dirty = false;
        }
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true)?;
        }
        drop(state);

        io_result.map(|()| true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();
        for page_id in page_ids {
            // A page may have been deleted since the snapshot; that flush
            // degenerates to Ok(false).
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Evicts the page without write-back, frees its frame and releases the
    /// id. False while the page is pinned; true when it was not resident.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(true);
        }
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };
        if state.metas[frame_id].pin_count > 0 {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        state.metas[frame_id] = FrameMeta::vacant();
        state.free_list.push(frame_id);
        self.replacer.remove(frame_id)?;
        if let Some(mut latch) = self.frames[frame_id].try_write() {
            latch.fill(0);
        }
        debug!("deleted page {page_id} from frame {frame_id}");
        Ok(true)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Frames currently on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Pages currently mapped to frames.
    pub fn resident_page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    pub(crate) fn frame_data(&self, frame_id: FrameId) -> &RwLock<PageBuf> {
        &self.frames[frame_id]
    }

    /// Core of `new_page`: obtain a frame, install a fresh id, zero the
    /// contents.
    fn allocate_page(&self) -> Result<Option<(PageId, FrameId)>> {
        let mut state = self.state.lock();
        let Some((frame_id, mut latch, writeback)) = self.take_victim_frame(&mut state)? else {
            return Ok(None);
        };

        let page_id = state.next_page_id;
        state.next_page_id += 1;
        state.page_table.insert(page_id, frame_id);
        state.metas[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        drop(state);

        if let Some(old_page_id) = writeback {
            self.write_back(old_page_id, &latch)?;
        }
        latch.fill(0);
        Ok(Some((page_id, frame_id)))
    }

    /// Core of the fetch family: pin the resident frame, or obtain a frame
    /// and fill it from disk.
    fn fetch_page(&self, page_id: PageId) -> Result<Option<FrameId>> {
        if page_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.metas[frame_id].pin_count += 1;
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(Some(frame_id));
        }

        let Some((frame_id, mut latch, writeback)) = self.take_victim_frame(&mut state)? else {
            return Ok(None);
        };
        state.page_table.insert(page_id, frame_id);
        state.metas[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        drop(state);

        if let Some(old_page_id) = writeback {
            self.write_back(old_page_id, &latch)?;
        }
        let data = self.scheduler.read_page(page_id).wait()?;
        latch.copy_from_slice(&data[..]);
        Ok(Some(frame_id))
    }

    /// Pops a free frame or evicts one, detaching any old mapping. The
    /// returned write latch is held so the fill can proceed outside the
    /// pool mutex; `writeback` carries the old page id when its contents
    /// must reach disk first.
    #[allow(clippy::type_complexity)]
    fn take_victim_frame<'a>(
        &'a self,
        state: &mut MutexGuard<'_, PoolState>,
    ) -> Result<Option<(FrameId, RwLockWriteGuard<'a, PageBuf>, Option<PageId>)>> {
        let frame_id = match state.free_list.pop() {
            Some(frame_id) => frame_id,
            None => match self.replacer.evict() {
                Some(frame_id) => frame_id,
                None => return Ok(None),
            },
        };

        let meta = state.metas[frame_id];
        debug_assert_eq!(meta.pin_count, 0, "victim frame still pinned");
        let latch = self.frames[frame_id]
            .try_write()
            .expect("unpinned frame cannot be latched"); // INVARIANT: every latch holder owns a pin

        if meta.page_id != INVALID_PAGE_ID {
            state.page_table.remove(&meta.page_id);
        }
        let writeback = (meta.page_id != INVALID_PAGE_ID && meta.is_dirty).then_some(meta.page_id);
        Ok(Some((frame_id, latch, writeback)))
    }

    fn write_back(&self, page_id: PageId, frame: &PageBuf) -> Result<()> {
        debug!("writing back dirty page {page_id}");
        let mut data: PageBuf = Box::new([0u8; PAGE_SIZE]);
        data.copy_from_slice(&frame[..]);
        self.scheduler.write_page(page_id, data).wait()?;
        Ok(())
    }
}
