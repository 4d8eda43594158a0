//! # Hash Header Page
//!
//! The root page of an extendible hash table. It fans the 32-bit key hash
//! out across up to `2^max_depth` directory pages using the *top* hash
//! bits, so that the directories themselves stay small enough to fit in one
//! page each.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size   Field
//! ------  -----  --------------------------------------------
//! 0       4      max_depth (u32 LE)
//! 4       2048   directory_page_ids (u32 LE x 512)
//! ```
//!
//! Fields are little-endian [`U32`]s, so the struct is `Unaligned` and can
//! be viewed in place at any offset of a frame buffer.
//!
//! Only the first `2^max_depth` slots are used; every slot starts as
//! `INVALID_PAGE_ID` and is filled lazily the first time a key routes to
//! it.

use eyre::{ensure, Result};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{HASH_HEADER_ARRAY_SIZE, HASH_HEADER_MAX_DEPTH, PAGE_SIZE};
use crate::storage::{PageId, INVALID_PAGE_ID};

type U32Le = U32<LittleEndian>;

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct HashHeaderPage {
    max_depth: U32Le,
    directory_page_ids: [U32Le; HASH_HEADER_ARRAY_SIZE],
}

const _: () = assert!(
    std::mem::size_of::<HashHeaderPage>() <= PAGE_SIZE,
    "header page layout must fit in one page"
);

impl HashHeaderPage {
    pub fn init(&mut self, max_depth: u32) -> Result<()> {
        ensure!(
            max_depth <= HASH_HEADER_MAX_DEPTH,
            "header max_depth {} exceeds limit {}",
            max_depth,
            HASH_HEADER_MAX_DEPTH
        );
        self.max_depth = U32Le::new(max_depth);
        self.directory_page_ids.fill(U32Le::new(INVALID_PAGE_ID));
        Ok(())
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth.get()
    }

    /// Number of usable directory slots.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth.get()
    }

    /// Routes a hash to its directory slot using the top `max_depth` bits.
    pub fn hash_to_directory_index(&self, hash: u32) -> u32 {
        let max_depth = self.max_depth.get();
        if max_depth == 0 {
            0
        } else {
            hash >> (32 - max_depth)
        }
    }

    pub fn directory_page_id(&self, directory_idx: u32) -> PageId {
        debug_assert!(directory_idx < self.max_size());
        self.directory_page_ids[directory_idx as usize].get()
    }

    pub fn set_directory_page_id(&mut self, directory_idx: u32, page_id: PageId) {
        debug_assert!(directory_idx < self.max_size());
        self.directory_page_ids[directory_idx as usize] = U32Le::new(page_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(max_depth: u32) -> HashHeaderPage {
        let mut page = HashHeaderPage {
            max_depth: U32Le::ZERO,
            directory_page_ids: [U32Le::ZERO; HASH_HEADER_ARRAY_SIZE],
        };
        page.init(max_depth).unwrap();
        page
    }

    #[test]
    fn header_page_size_is_2052_bytes() {
        assert_eq!(std::mem::size_of::<HashHeaderPage>(), 2052);
    }

    #[test]
    fn init_fills_slots_with_the_invalid_id() {
        let page = header(2);
        assert_eq!(page.max_depth(), 2);
        assert_eq!(page.max_size(), 4);
        for i in 0..page.max_size() {
            assert_eq!(page.directory_page_id(i), INVALID_PAGE_ID);
        }
    }

    #[test]
    fn init_rejects_oversized_depth() {
        let mut page = header(0);
        assert!(page.init(HASH_HEADER_MAX_DEPTH + 1).is_err());
    }

    #[test]
    fn hash_routes_by_top_bits() {
        let page = header(2);
        assert_eq!(page.hash_to_directory_index(0x0000_0000), 0);
        assert_eq!(page.hash_to_directory_index(0x4000_0000), 1);
        assert_eq!(page.hash_to_directory_index(0x8000_0000), 2);
        assert_eq!(page.hash_to_directory_index(0xC000_0000), 3);
        assert_eq!(page.hash_to_directory_index(0xFFFF_FFFF), 3);
    }

    #[test]
    fn zero_depth_header_routes_everything_to_slot_zero() {
        let page = header(0);
        assert_eq!(page.max_size(), 1);
        assert_eq!(page.hash_to_directory_index(0), 0);
        assert_eq!(page.hash_to_directory_index(u32::MAX), 0);
    }

    #[test]
    fn slots_store_and_return_page_ids() {
        let mut page = header(3);
        page.set_directory_page_id(5, 1234);
        assert_eq!(page.directory_page_id(5), 1234);
        assert_eq!(page.directory_page_id(4), INVALID_PAGE_ID);
    }

    #[test]
    fn header_parses_in_place_from_page_bytes() {
        let mut bytes = vec![0u8; PAGE_SIZE];
        {
            let page =
                crate::storage::parse_zerocopy_mut::<HashHeaderPage>(&mut bytes, "HashHeaderPage")
                    .unwrap();
            page.init(3).unwrap();
            page.set_directory_page_id(2, 77);
        }
        let page = crate::storage::parse_zerocopy::<HashHeaderPage>(&bytes, "HashHeaderPage")
            .unwrap();
        assert_eq!(page.max_depth(), 3);
        assert_eq!(page.directory_page_id(2), 77);
    }
}
