//! # Disk I/O Scheduler
//!
//! This module serializes page I/O behind a FIFO queue drained by a single
//! long-lived worker thread.
//!
//! ## Design Overview
//!
//! ```text
//! Thread 1 ──┐
//! Thread 2 ──┼──► RequestQueue ──► worker ──► DiskDevice
//! Thread 3 ──┘        │
//!                  sentinel (None) shuts the worker down
//! ```
//!
//! Callers build a [`DiskRequest`] (or use the `read_page`/`write_page`
//! conveniences) and later block on the request's [`IoHandle`]. The worker
//! pops requests in submission order, performs the device call, and signals
//! the handle with the result. Because there is exactly one worker and the
//! queue is FIFO, I/Os against the same page id complete in the order they
//! were scheduled; ordering across distinct page ids is not specified.
//!
//! ## Shutdown
//!
//! Dropping the scheduler enqueues a `None` sentinel and joins the worker.
//! Requests enqueued before the sentinel are drained first, so no scheduled
//! I/O is lost on shutdown.
//!
//! ## Failure
//!
//! Device errors propagate through the completion handle to whichever
//! caller scheduled the request. The scheduler itself never fails after
//! construction.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use eyre::{Result, WrapErr};
use log::trace;
use parking_lot::{Condvar, Mutex};

use super::disk::DiskDevice;
use super::{PageBuf, PageId, PAGE_SIZE};

/// Kind of device operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

/// A single page I/O request.
///
/// The buffer is owned by the request: it is the data source for writes and
/// the destination for reads, and it travels back to the caller through the
/// completion handle so it can be reused.
pub struct DiskRequest {
    pub op: IoOp,
    pub page_id: PageId,
    pub data: PageBuf,
    pub completion: IoHandle,
}

struct IoCompletion {
    result: Mutex<Option<Result<PageBuf>>>,
    done: Condvar,
}

/// Completion handle for a scheduled request.
///
/// Single-consumer: `wait` hands the result (and the request's buffer) to
/// exactly one caller.
#[derive(Clone)]
pub struct IoHandle {
    inner: Arc<IoCompletion>,
}

impl Default for IoHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IoHandle {
    /// Creates an unsignalled handle for a hand-built [`DiskRequest`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(IoCompletion {
                result: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    /// Blocks until the worker has performed the I/O, yielding the request
    /// buffer on success or the device error on failure.
    pub fn wait(&self) -> Result<PageBuf> {
        let mut slot = self.inner.result.lock();
        while slot.is_none() {
            self.inner.done.wait(&mut slot);
        }
        slot.take().expect("completion signalled without a result") // INVARIANT: the wait loop only exits once the slot is filled
    }

    fn complete(&self, result: Result<PageBuf>) {
        *self.inner.result.lock() = Some(result);
        self.inner.done.notify_all();
    }
}

struct RequestQueue {
    queue: Mutex<VecDeque<Option<DiskRequest>>>,
    ready: Condvar,
}

impl RequestQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    fn put(&self, message: Option<DiskRequest>) {
        self.queue.lock().push_back(message);
        self.ready.notify_one();
    }

    fn take(&self) -> Option<DiskRequest> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(message) = queue.pop_front() {
                return message;
            }
            self.ready.wait(&mut queue);
        }
    }
}

/// Serializes and executes page I/O against a shared [`DiskDevice`].
pub struct DiskScheduler {
    queue: Arc<RequestQueue>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(device: Arc<dyn DiskDevice>) -> Result<Self> {
        let queue = Arc::new(RequestQueue::new());
        let worker_queue = Arc::clone(&queue);
        let worker = thread::Builder::new()
            .name("keeldb-disk-io".into())
            .spawn(move || worker_loop(worker_queue, device))
            .wrap_err("failed to spawn the disk scheduler worker")?;
        Ok(Self {
            queue,
            worker: Some(worker),
        })
    }

    /// Enqueues a request. Completion is signalled through the request's
    /// handle.
    pub fn schedule(&self, request: DiskRequest) {
        self.queue.put(Some(request));
    }

    /// Schedules a read of `page_id` into a fresh buffer.
    pub fn read_page(&self, page_id: PageId) -> IoHandle {
        let completion = IoHandle::new();
        self.schedule(DiskRequest {
            op: IoOp::Read,
            page_id,
            data: Box::new([0u8; PAGE_SIZE]),
            completion: completion.clone(),
        });
        completion
    }

    /// Schedules a write of `data` to `page_id`.
    pub fn write_page(&self, page_id: PageId, data: PageBuf) -> IoHandle {
        let completion = IoHandle::new();
        self.schedule(DiskRequest {
            op: IoOp::Write,
            page_id,
            data,
            completion: completion.clone(),
        });
        completion
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.queue.put(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(queue: Arc<RequestQueue>, device: Arc<dyn DiskDevice>) {
    while let Some(request) = queue.take() {
        let DiskRequest {
            op,
            page_id,
            mut data,
            completion,
        } = request;
        let result = match op {
            IoOp::Read => device.read_page(page_id, &mut data),
            IoOp::Write => device.write_page(page_id, &data),
        };
        completion.complete(result.map(|()| data));
    }
    trace!("disk scheduler worker draining complete, exiting");
}
