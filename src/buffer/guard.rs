//! # Scoped Page Guards
//!
//! Guards bind a page pin (and optionally a frame latch) to a scope so that
//! both are released on every exit path. Three flavors exist:
//!
//! - [`BasicPageGuard`]: pin only. No byte access; upgrade to a latched
//!   guard to touch data.
//! - [`ReadPageGuard`]: pin + shared latch, immutable byte access.
//! - [`WritePageGuard`]: pin + exclusive latch, mutable byte access. Always
//!   unpins dirty.
//!
//! Guards are move-only linear resources: Rust's move semantics make a
//! moved-from guard inert, and `upgrade_read`/`upgrade_write` consume the
//! basic guard while transferring its pin to the latched guard. Dropping a
//! latched guard releases the latch first and unpins second, so the pool
//! never observes a pinned-and-unlatched window in the other order.

use std::mem;

use eyre::Result;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::storage::{parse_zerocopy, parse_zerocopy_mut, PageBuf, PageId};

use super::pool::BufferPoolManager;
use super::FrameId;

/// A pinned page without a latch.
pub struct BasicPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    frame_id: FrameId,
    is_dirty: bool,
}

impl<'a> BasicPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame_id: FrameId) -> Self {
        Self {
            bpm,
            page_id,
            frame_id,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Marks the page dirty for the eventual unpin.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Acquires the shared latch, consuming this guard. The pin transfers.
    pub fn upgrade_read(self) -> ReadPageGuard<'a> {
        let latch = self.bpm.frame_data(self.frame_id).read();
        let guard = ReadPageGuard {
            bpm: self.bpm,
            page_id: self.page_id,
            is_dirty: self.is_dirty,
            latch: Some(latch),
        };
        mem::forget(self);
        guard
    }

    /// Acquires the exclusive latch, consuming this guard. The pin
    /// transfers.
    pub fn upgrade_write(self) -> WritePageGuard<'a> {
        let latch = self.bpm.frame_data(self.frame_id).write();
        let guard = WritePageGuard {
            bpm: self.bpm,
            page_id: self.page_id,
            latch: Some(latch),
        };
        mem::forget(self);
        guard
    }
}

impl Drop for BasicPageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.is_dirty);
    }
}

/// A pinned page held under its shared latch.
pub struct ReadPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    is_dirty: bool,
    latch: Option<RwLockReadGuard<'a, PageBuf>>,
}

impl ReadPageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().expect("latch held until drop")[..] // INVARIANT: the latch is only taken in drop
    }

    /// Interprets the page bytes as a zerocopy struct.
    pub fn as_ref<T: FromBytes + KnownLayout + Immutable>(&self) -> Result<&T> {
        parse_zerocopy(self.data(), std::any::type_name::<T>())
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        drop(self.latch.take());
        self.bpm.unpin_page(self.page_id, self.is_dirty);
    }
}

/// A pinned page held under its exclusive latch. Unpins dirty.
pub struct WritePageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    latch: Option<RwLockWriteGuard<'a, PageBuf>>,
}

impl WritePageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().expect("latch held until drop")[..] // INVARIANT: the latch is only taken in drop
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.latch.as_mut().expect("latch held until drop")[..] // INVARIANT: the latch is only taken in drop
    }

    /// Interprets the page bytes as a zerocopy struct.
    pub fn as_ref<T: FromBytes + KnownLayout + Immutable>(&self) -> Result<&T> {
        parse_zerocopy(self.data(), std::any::type_name::<T>())
    }

    /// Interprets the page bytes as a mutable zerocopy struct.
    pub fn as_mut<T: FromBytes + KnownLayout + IntoBytes>(&mut self) -> Result<&mut T> {
        parse_zerocopy_mut(self.data_mut(), std::any::type_name::<T>())
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        drop(self.latch.take());
        self.bpm.unpin_page(self.page_id, true);
    }
}
