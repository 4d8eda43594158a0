//! # Buffer Pool Integration Tests
//!
//! End-to-end scenarios over the pool, the replacer and the guards:
//!
//! - pool accounting (free + resident always equals pool size)
//! - LRU-K eviction preference under realistic pin/unpin traffic
//! - byte round-trips across eviction and explicit flushes
//! - dirty propagation through write guards
//! - persistence through a file-backed device

use std::sync::Arc;

use keeldb::{BufferPoolManager, DiskDevice, FileDisk, MemDisk, PageId, PAGE_SIZE};

fn mem_pool(pool_size: usize, k: usize) -> BufferPoolManager {
    BufferPoolManager::new(pool_size, k, Arc::new(MemDisk::new())).unwrap()
}

mod accounting {
    use super::*;

    #[test]
    fn free_and_resident_frames_partition_the_pool() {
        let bpm = mem_pool(5, 2);
        let check = |bpm: &BufferPoolManager| {
            assert_eq!(bpm.free_frame_count() + bpm.resident_page_count(), 5);
        };
        check(&bpm);

        let mut pages = Vec::new();
        for _ in 0..5 {
            pages.push(bpm.new_page().unwrap().unwrap());
            check(&bpm);
        }
        assert_eq!(bpm.new_page().unwrap(), None);

        for &page_id in &pages {
            assert!(bpm.unpin_page(page_id, false));
            check(&bpm);
        }

        // Deleting returns frames to the free list.
        assert!(bpm.delete_page(pages[0]).unwrap());
        assert!(bpm.delete_page(pages[1]).unwrap());
        check(&bpm);
        assert_eq!(bpm.free_frame_count(), 2);

        // Eviction churn keeps the partition intact.
        for _ in 0..8 {
            let page_id = bpm.new_page().unwrap().unwrap();
            bpm.unpin_page(page_id, false);
            check(&bpm);
        }
    }

    #[test]
    fn page_ids_never_repeat() {
        let bpm = mem_pool(2, 2);
        let mut seen = Vec::new();
        for _ in 0..10 {
            let page_id = bpm.new_page().unwrap().unwrap();
            assert!(!seen.contains(&page_id));
            seen.push(page_id);
            bpm.unpin_page(page_id, false);
        }
    }
}

mod eviction {
    use super::*;

    #[test]
    fn reused_pages_outlive_scanned_ones() {
        // Pool of 3, k = 2: pages touched twice live in the replacer's
        // cache list and survive; the page touched once is the victim.
        let bpm = mem_pool(3, 2);

        let p1 = bpm.new_page().unwrap().unwrap();
        let p2 = bpm.new_page().unwrap().unwrap();
        let p3 = bpm.new_page().unwrap().unwrap();
        for &page_id in &[p1, p2, p3] {
            assert!(bpm.unpin_page(page_id, false));
        }

        // A second access moves p1 and p2 past the k threshold.
        for &page_id in &[p1, p2] {
            let guard = bpm.fetch_page_basic(page_id).unwrap().unwrap();
            drop(guard);
        }

        // The next allocation must evict p3, the only history-list page.
        let p4 = bpm.new_page().unwrap().unwrap();
        bpm.unpin_page(p4, false);

        // p1 and p2 can be re-latched without touching disk state; p3 got
        // evicted, so re-fetching it must still produce its (zeroed)
        // contents from the device.
        let guard = bpm.fetch_page_read(p3).unwrap().unwrap();
        assert!(guard.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn pinned_pages_are_never_victims() {
        let bpm = mem_pool(2, 2);

        let _guard1 = bpm.new_page_guarded().unwrap().unwrap();
        let _guard2 = bpm.new_page_guarded().unwrap().unwrap();

        assert_eq!(bpm.new_page().unwrap(), None);
        assert!(bpm.fetch_page_basic(999).unwrap().is_none());
    }
}

mod round_trip {
    use super::*;

    #[test]
    fn bytes_survive_eviction_and_refetch() {
        let bpm = mem_pool(1, 2);

        let page_id = {
            let guard = bpm.new_page_guarded().unwrap().unwrap();
            let mut guard = guard.upgrade_write();
            let page_id = guard.page_id();
            guard.data_mut()[0] = 0xDE;
            guard.data_mut()[PAGE_SIZE - 1] = 0xAD;
            page_id
        };

        // Cycle the only frame through another page.
        let filler = bpm.new_page().unwrap().unwrap();
        bpm.unpin_page(filler, false);

        let guard = bpm.fetch_page_read(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[0], 0xDE);
        assert_eq!(guard.data()[PAGE_SIZE - 1], 0xAD);
    }

    #[test]
    fn write_guard_drop_reports_dirty() {
        // Scenario: write-guard a page, let the guard drop, then force an
        // eviction cycle; the updated bytes must come back.
        let bpm = mem_pool(2, 2);

        let page_id = {
            let guard = bpm.new_page_guarded().unwrap().unwrap();
            let mut guard = guard.upgrade_write();
            let page_id = guard.page_id();
            guard.data_mut()[7] = 0x77;
            page_id
        };

        // The unpin left by the write guard must have carried dirty=true:
        // after eviction the update is only visible if it was written back.
        for _ in 0..2 {
            let spill = bpm.new_page().unwrap().unwrap();
            bpm.unpin_page(spill, false);
        }

        let guard = bpm.fetch_page_read(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[7], 0x77);
    }

    #[test]
    fn flush_page_reaches_the_device_immediately() {
        let device = Arc::new(MemDisk::new());
        let bpm =
            BufferPoolManager::new(4, 2, Arc::clone(&device) as Arc<dyn DiskDevice>).unwrap();

        let page_id = {
            let guard = bpm.new_page_guarded().unwrap().unwrap();
            let mut guard = guard.upgrade_write();
            guard.data_mut()[0] = 0x55;
            guard.page_id()
        };

        // Still resident and unflushed: the device has nothing yet.
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        device.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf[0], 0);

        assert!(bpm.flush_page(page_id).unwrap());
        device.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf[0], 0x55);
    }

    #[test]
    fn flush_all_pages_writes_every_resident_page() {
        let device = Arc::new(MemDisk::new());
        let bpm =
            BufferPoolManager::new(4, 2, Arc::clone(&device) as Arc<dyn DiskDevice>).unwrap();

        let mut pages: Vec<PageId> = Vec::new();
        for i in 0..3u8 {
            let guard = bpm.new_page_guarded().unwrap().unwrap();
            let mut guard = guard.upgrade_write();
            guard.data_mut()[0] = i + 1;
            pages.push(guard.page_id());
        }

        bpm.flush_all_pages().unwrap();

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        for (i, &page_id) in pages.iter().enumerate() {
            device.read_page(page_id, &mut buf).unwrap();
            assert_eq!(buf[0], i as u8 + 1);
        }
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn deleted_pages_free_their_frames_for_reuse() {
        let bpm = mem_pool(2, 2);

        let p0 = bpm.new_page().unwrap().unwrap();
        let p1 = bpm.new_page().unwrap().unwrap();
        assert_eq!(bpm.new_page().unwrap(), None);

        bpm.unpin_page(p0, false);
        assert!(bpm.delete_page(p0).unwrap());

        // The freed frame takes the next allocation without any eviction.
        let p2 = bpm.new_page().unwrap().unwrap();
        assert_ne!(p2, p0);
        bpm.unpin_page(p1, false);
        bpm.unpin_page(p2, false);
    }

    #[test]
    fn delete_respects_outstanding_pins() {
        let bpm = mem_pool(2, 2);
        let guard = bpm.new_page_guarded().unwrap().unwrap();
        let page_id = guard.page_id();

        assert!(!bpm.delete_page(page_id).unwrap());
        drop(guard);
        assert!(bpm.delete_page(page_id).unwrap());
    }

    #[test]
    fn fetch_after_delete_reads_device_state() {
        // Deleting evicts without write-back: dirty in-memory contents are
        // discarded and a later fetch sees whatever the device had.
        let bpm = mem_pool(2, 2);

        let page_id = {
            let guard = bpm.new_page_guarded().unwrap().unwrap();
            let mut guard = guard.upgrade_write();
            guard.data_mut()[0] = 0xAA;
            guard.page_id()
        };
        assert!(bpm.delete_page(page_id).unwrap());

        let guard = bpm.fetch_page_read(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[0], 0);
    }
}

mod file_backed {
    use super::*;

    #[test]
    fn pool_state_survives_reopen_through_a_file_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");

        let page_id = {
            let device = Arc::new(FileDisk::create(&path).unwrap());
            let bpm = BufferPoolManager::new(4, 2, device).unwrap();
            let guard = bpm.new_page_guarded().unwrap().unwrap();
            let mut guard = guard.upgrade_write();
            guard.data_mut()[..4].copy_from_slice(b"keel");
            let page_id = guard.page_id();
            drop(guard);
            bpm.flush_all_pages().unwrap();
            page_id
        };

        let device = Arc::new(FileDisk::open(&path).unwrap());
        let bpm = BufferPoolManager::new(4, 2, device).unwrap();
        let guard = bpm.fetch_page_read(page_id).unwrap().unwrap();
        assert_eq!(&guard.data()[..4], b"keel");
    }
}
