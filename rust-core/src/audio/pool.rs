//! Pool of reusable scratch buffers for the real-time thread
//!
//! Buffers circulate through a bounded `crossbeam-channel`: acquiring is a
//! `try_recv`, releasing (on guard drop) is a `try_send`. Neither blocks.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};

/// Buffers preallocated in the process-wide pool
const SHARED_POOL_BUFFERS: usize = 16;

/// Capacity (in samples) of each preallocated buffer
const SHARED_POOL_CAPACITY: usize = 16384;

pub struct BufferPool {
    free_tx: Sender<Vec<f32>>,
    free_rx: Receiver<Vec<f32>>,
}

impl BufferPool {
    /// Create a pool holding `count` buffers of `capacity` samples
    pub fn new(count: usize, capacity: usize) -> Arc<Self> {
        let (free_tx, free_rx) = bounded(count.max(1));
        for _ in 0..count {
            let _ = free_tx.try_send(Vec::with_capacity(capacity));
        }
        Arc::new(Self { free_tx, free_rx })
    }

    /// Process-wide pool shared by all players
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<BufferPool>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| BufferPool::new(SHARED_POOL_BUFFERS, SHARED_POOL_CAPACITY)))
    }

    /// Take a zeroed buffer of `len` samples.
    ///
    /// Allocates only when the pool is exhausted or the pooled buffer is
    /// too small for `len`.
    pub fn acquire(self: &Arc<Self>, len: usize) -> PooledBuffer {
        let mut buffer = self.free_rx.try_recv().unwrap_or_default();
        buffer.clear();
        buffer.resize(len, 0.0);
        PooledBuffer {
            buffer,
            pool: Arc::clone(self),
        }
    }

    /// Buffers currently waiting in the pool
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }
}

/// Scratch buffer on loan from a [`BufferPool`], returned when dropped
pub struct PooledBuffer {
    buffer: Vec<f32>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // A full pool means this buffer was allocated on exhaustion; let it go
        let _ = self.pool.free_tx.try_send(std::mem::take(&mut self.buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_return() {
        let pool = BufferPool::new(2, 64);
        assert_eq!(pool.available(), 2);
        {
            let buffer = pool.acquire(32);
            assert_eq!(buffer.len(), 32);
            assert!(buffer.iter().all(|&s| s == 0.0));
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_exhaustion_allocates() {
        let pool = BufferPool::new(1, 16);
        let a = pool.acquire(8);
        let b = pool.acquire(8);
        assert_eq!(pool.available(), 0);
        drop(a);
        drop(b);
        // The extra buffer is dropped, the pool stays at its capacity
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_reused_buffer_is_cleared() {
        let pool = BufferPool::new(1, 16);
        {
            let mut buffer = pool.acquire(4);
            buffer.fill(1.0);
        }
        let buffer = pool.acquire(4);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }
}
