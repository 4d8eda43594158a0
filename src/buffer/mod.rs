//! # Buffer Module
//!
//! This module implements the in-memory page cache for KeelDB: a fixed pool
//! of frames fronting the disk, an LRU-K victim selector, and scoped guards
//! that tie page pins to reader/writer latches.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │       Guards (Basic / Read / Write)       │  pin + latch, RAII
//! ├───────────────────────────────────────────┤
//! │            BufferPoolManager              │  page table, free list
//! ├──────────────────────┬────────────────────┤
//! │     LruKReplacer     │   DiskScheduler    │
//! └──────────────────────┴────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - `lru_k`: the LRU-K replacement policy
//! - `pool`: frame management, pinning, fetch/new/flush/delete
//! - `guard`: scoped page access handles

mod guard;
mod lru_k;
mod pool;

pub use guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
pub use lru_k::LruKReplacer;
pub use pool::BufferPoolManager;

/// Index of a frame within the buffer pool.
pub type FrameId = usize;
