//! Reusable byte buffers.
//!
//! Injected scripts (P2SH redeem scripts and P2WSH witness scripts) are re-wrapped with a length
//! prefix before being parsed. The scratch space for that comes from a pool, and a
//! [`PooledBuffer`] hands itself back when it goes out of scope, whichever way the parse exits.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

/// Idle buffers above this count are freed instead of kept.
pub const DEFAULT_MAX_POOLED: usize = 16;

#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
}

lazy_static::lazy_static! {
    static ref SHARED: BufferPool = BufferPool::new(DEFAULT_MAX_POOLED);
}

impl BufferPool {
    pub fn new(max_pooled: usize) -> Self {
        BufferPool {
            idle: Mutex::new(Vec::new()),
            max_pooled,
        }
    }

    /// The process-wide pool used when an interpreter isn't given one.
    pub fn shared() -> &'static BufferPool {
        &SHARED
    }

    /// An empty buffer with room for at least `size` bytes.
    pub fn borrow(&self, size: usize) -> PooledBuffer<'_> {
        let mut buf = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        buf.reserve(size);
        PooledBuffer { buf, pool: self }
    }

    /// How many buffers are waiting to be reused.
    pub fn idle(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_pooled {
            idle.push(buf);
        } else {
            trace!(capacity = buf.capacity(), "pool full, freeing buffer");
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new(DEFAULT_MAX_POOLED)
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
