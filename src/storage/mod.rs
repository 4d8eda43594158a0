//! # Storage Module
//!
//! This module provides the disk substrate for KeelDB: a block-addressable
//! device abstraction and an asynchronous I/O scheduler in front of it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        Buffer Pool           │
//! ├──────────────────────────────┤
//! │   DiskScheduler (worker)     │   FIFO queue, completion handles
//! ├──────────────────────────────┤
//! │   DiskDevice (trait)         │   FileDisk / MemDisk
//! └──────────────────────────────┘
//! ```
//!
//! The device is a thin, synchronous block store: read or write one
//! fixed-size page by id. All asynchrony lives in the scheduler, whose
//! single background worker consumes requests in submission order. Callers
//! never talk to the device directly; they schedule requests and block on
//! the request's completion handle.
//!
//! ## Page Identity
//!
//! Pages are identified by a 32-bit [`PageId`]. Ids are allocated
//! monotonically from 0 by the buffer pool; [`INVALID_PAGE_ID`] is the
//! distinguished "no page" sentinel and is never stored on disk as a live
//! reference target.
//!
//! ## Buffer Ownership
//!
//! Requests carry owned page buffers ([`PageBuf`]) that are copied at the
//! frame boundary. This keeps the worker thread free of any aliasing into
//! pool frames: the buffer travels into the request and comes back through
//! the completion handle.
//!
//! ## Module Organization
//!
//! - `disk`: the `DiskDevice` trait with file-backed and in-memory
//!   implementations
//! - `scheduler`: the FIFO request queue and its background worker

mod disk;
mod scheduler;

pub use disk::{DiskDevice, FileDisk, MemDisk};
pub use scheduler::{DiskRequest, DiskScheduler, IoHandle, IoOp};

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, KnownLayout};

pub use crate::config::PAGE_SIZE;

/// 32-bit page identifier. Allocated monotonically by the buffer pool.
pub type PageId = u32;

/// Sentinel for "no page". Never allocated.
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// An owned, heap-allocated page-sized buffer.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

/// Parses a zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_zerocopy<'a, T: FromBytes + KnownLayout + Immutable>(
    bytes: &'a [u8],
    type_name: &str,
) -> Result<&'a T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

/// Parses a mutable zerocopy struct from a byte slice with size validation.
#[inline]
pub fn parse_zerocopy_mut<'a, T: FromBytes + KnownLayout + zerocopy::IntoBytes>(
    bytes: &'a mut [u8],
    type_name: &str,
) -> Result<&'a mut T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::mut_from_bytes(&mut bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}
