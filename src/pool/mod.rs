// src/pool/mod.rs
//! BufferPool - fixed set of sink-allocated frame buffers.
//!
//! Buffers live in slots identified by `BufferId`. A free buffer sits in the
//! pool's queue; an acquired buffer is owned by whoever holds the
//! `FrameBuffer` value, so a buffer cannot be released twice or touched after
//! it has been handed on.
//!
//! Threading model:
//! - `acquire()` runs on the producer thread and blocks until a buffer is free
//! - `release()` runs on the release path (sink events)
//! - `drain()`/`destroy()` run on the shutdown path once production stopped

use crate::frame::{BufferId, FrameBuffer};
use crate::sink::SinkError;
use log::*;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Source of payload memory for pool buffers, normally backed by the sink.
pub trait PayloadAllocator: Send + Sync {
    fn alloc_payload(&self, size: usize) -> Result<Box<[u8]>, SinkError>;
    fn free_payload(&self, payload: Box<[u8]>);
}

/// Errors raised by `BufferPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A pool needs at least one buffer.
    ZeroCapacity,
    /// Allocating the buffer for `slot` failed; earlier allocations were freed.
    Allocation { slot: usize, source: SinkError },
    /// The buffer does not belong to this pool.
    ForeignBuffer(BufferId),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::ZeroCapacity => write!(f, "buffer pool capacity must be at least 1"),
            PoolError::Allocation { slot, source } => {
                write!(f, "failed to allocate pool buffer {}: {}", slot, source)
            }
            PoolError::ForeignBuffer(id) => write!(f, "buffer {} does not belong to this pool", id),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Allocation { source, .. } => Some(source),
            _ => None,
        }
    }
}

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

struct FreeQueue {
    buffers: VecDeque<FrameBuffer>,
    destroyed: bool,
}

pub struct BufferPool {
    id: u32,
    capacity: usize,
    buffer_size: usize,
    allocator: Arc<dyn PayloadAllocator>,
    free: Mutex<FreeQueue>,
    /// Signalled on every release.
    returned: Condvar,
}

impl BufferPool {
    /// Allocates `capacity` buffers of `buffer_size` bytes through `allocator`.
    ///
    /// If any allocation fails, every buffer allocated so far is freed again
    /// before the error is returned.
    pub fn create(
        capacity: usize,
        buffer_size: usize,
        allocator: Arc<dyn PayloadAllocator>,
    ) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let mut buffers = VecDeque::with_capacity(capacity);
        for slot in 0..capacity {
            match allocator.alloc_payload(buffer_size) {
                Ok(payload) => {
                    let id = BufferId {
                        pool: id,
                        slot: slot as u32,
                    };
                    buffers.push_back(FrameBuffer::new(id, payload));
                }
                Err(source) => {
                    warn!(
                        "BufferPool: allocation {} of {} failed ({}), rolling back",
                        slot + 1,
                        capacity,
                        source
                    );
                    for buffer in buffers.drain(..) {
                        allocator.free_payload(buffer.into_payload());
                    }
                    return Err(PoolError::Allocation { slot, source });
                }
            }
        }

        info!(
            "BufferPool {}: {} buffers of {} bytes allocated",
            id, capacity, buffer_size
        );

        Ok(Self {
            id,
            capacity,
            buffer_size,
            allocator,
            free: Mutex::new(FreeQueue {
                buffers,
                destroyed: false,
            }),
            returned: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FreeQueue> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a free buffer, blocking until one is released if none is queued.
    pub fn acquire(&self) -> FrameBuffer {
        let mut queue = self.lock();
        loop {
            if let Some(buffer) = queue.buffers.pop_front() {
                trace!("BufferPool {}: acquired {}", self.id, buffer.id());
                return buffer;
            }
            queue = self
                .returned
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns `buffer` to the free queue and wakes anyone waiting on it.
    ///
    /// A buffer from another pool is dropped and reported as an error.
    pub fn release(&self, buffer: FrameBuffer) -> Result<(), PoolError> {
        let id = buffer.id();
        if id.pool != self.id || id.slot as usize >= self.capacity {
            return Err(PoolError::ForeignBuffer(id));
        }

        self.lock().buffers.push_back(buffer);
        self.returned.notify_all();
        trace!("BufferPool {}: released {}", self.id, id);
        Ok(())
    }

    /// Blocks until every buffer is back in the free queue.
    ///
    /// Only valid once nothing submits any more. Logs progress on entry and
    /// again every `poll_interval` while buffers are still out. Returns how
    /// many progress lines were logged.
    pub fn drain(&self, poll_interval: Duration) -> usize {
        let mut queue = self.lock();
        let mut report = true;
        let mut reports = 0;
        while !queue.destroyed && queue.buffers.len() < self.capacity {
            if report {
                info!(
                    "Waiting for {} buffers ...",
                    self.capacity - queue.buffers.len()
                );
                reports += 1;
            }
            let (guard, timeout) = self
                .returned
                .wait_timeout(queue, poll_interval)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
            report = timeout.timed_out();
        }
        debug!("BufferPool {}: all {} buffers returned", self.id, self.capacity);
        reports
    }

    /// Frees all buffer memory through the allocator.
    ///
    /// # Panics
    ///
    /// Panics if any buffer is still outstanding: its memory may still be
    /// read by the sink. Call `drain()` first. Destroying twice is a no-op.
    pub fn destroy(&self) {
        let mut queue = self.lock();
        if queue.destroyed {
            return;
        }

        let outstanding = self.capacity - queue.buffers.len();
        if outstanding != 0 {
            panic!(
                "BufferPool {}: destroyed with {} of {} buffers still outstanding",
                self.id, outstanding, self.capacity
            );
        }

        for buffer in queue.buffers.drain(..) {
            self.allocator.free_payload(buffer.into_payload());
        }
        queue.destroyed = true;
        info!("BufferPool {}: destroyed", self.id);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of buffers currently in the free queue.
    pub fn free_count(&self) -> usize {
        self.lock().buffers.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        let queue = self.free.get_mut().unwrap_or_else(PoisonError::into_inner);
        if queue.destroyed {
            return;
        }
        warn!(
            "BufferPool {}: dropped without destroy, freeing {} queued buffers",
            self.id,
            queue.buffers.len()
        );
        for buffer in queue.buffers.drain(..) {
            self.allocator.free_payload(buffer.into_payload());
        }
    }
}
