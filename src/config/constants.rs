//! # KeelDB Configuration Constants
//!
//! This module centralizes all configuration constants, grouping
//! interdependent values together and documenting their relationships.
//! Constants that depend on each other are co-located to prevent mismatch
//! bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> HASH_HEADER_ARRAY_SIZE (512 directory ids, 4 bytes each,
//!       │     plus 4 bytes of metadata must fit in one page)
//!       │
//!       └─> HASH_DIRECTORY_ARRAY_SIZE (512 bucket ids at 4 bytes plus
//!             512 local depths at 1 byte plus 8 bytes of metadata must
//!             fit in one page)
//!
//! HASH_HEADER_MAX_DEPTH (9)
//!       │
//!       └─> 2^HASH_HEADER_MAX_DEPTH == HASH_HEADER_ARRAY_SIZE
//!
//! HASH_DIRECTORY_MAX_DEPTH (9)
//!       │
//!       └─> 2^HASH_DIRECTORY_MAX_DEPTH == HASH_DIRECTORY_ARRAY_SIZE
//!
//! DEFAULT_POOL_SIZE (64)
//!       │
//!       └─> DEFAULT_REPLACER_K (2): the replacer tracks at most
//!             pool-size frames regardless of K
//! ```
//!
//! ## Modifying Constants
//!
//! Before changing any constant:
//! 1. Check the dependency graph above
//! 2. Run `cargo build` to verify the compile-time assertions
//! 3. Run the full test suite

// ============================================================================
// PAGE LAYOUT
// The fundamental unit of disk I/O and buffering
// ============================================================================

/// Size of each page in bytes (4KB).
/// This is the fundamental unit of I/O and caching.
pub const PAGE_SIZE: usize = 4096;

// ============================================================================
// BUFFER POOL CONFIGURATION
// ============================================================================

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default K for the LRU-K replacement policy.
/// K = 2 distinguishes scan traffic (one access) from reused pages.
pub const DEFAULT_REPLACER_K: usize = 2;

// ============================================================================
// EXTENDIBLE HASH LAYOUT
// Array capacities are fixed in the page layout; the runtime max_depth
// fields bound how much of each array is used.
// ============================================================================

/// Number of directory-page-id slots in a hash header page.
pub const HASH_HEADER_ARRAY_SIZE: usize = 512;

/// Maximum header depth: the header indexes directories by the top
/// `max_depth` bits of the hash, so 2^max_depth slots must exist.
pub const HASH_HEADER_MAX_DEPTH: u32 = 9;

/// Number of bucket-page-id slots (and local depths) in a directory page.
pub const HASH_DIRECTORY_ARRAY_SIZE: usize = 512;

/// Maximum directory depth: `global_depth` can never exceed this.
pub const HASH_DIRECTORY_MAX_DEPTH: u32 = 9;

/// Bytes of metadata (`size` + `max_size`) at the front of a bucket page.
pub const HASH_BUCKET_METADATA_SIZE: usize = 8;

const _: () = assert!(
    1 << HASH_HEADER_MAX_DEPTH == HASH_HEADER_ARRAY_SIZE,
    "header array size must equal 2^HASH_HEADER_MAX_DEPTH"
);

const _: () = assert!(
    1 << HASH_DIRECTORY_MAX_DEPTH == HASH_DIRECTORY_ARRAY_SIZE,
    "directory array size must equal 2^HASH_DIRECTORY_MAX_DEPTH"
);

const _: () = assert!(
    4 + 4 * HASH_HEADER_ARRAY_SIZE <= PAGE_SIZE,
    "header page layout must fit in one page"
);

const _: () = assert!(
    8 + 5 * HASH_DIRECTORY_ARRAY_SIZE <= PAGE_SIZE,
    "directory page layout must fit in one page"
);
