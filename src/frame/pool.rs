//! Pooled payload buffers.
//!
//! Every frame payload lives in a [`PooledBuf`]. The guard owns its buffer
//! exclusively and gives it back to the pool on drop, so a payload is
//! released exactly once on every path, including error paths.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::core::POOL_BUFFER_SIZE;

/// Default number of idle buffers kept by a pool.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

#[derive(Debug)]
struct PoolInner {
    /// Idle buffers ready for reuse.
    free: Mutex<Vec<BytesMut>>,
    /// Capacity of each buffer.
    buf_size: usize,
    /// Maximum number of idle buffers retained.
    max_cached: usize,
    /// Buffers handed out and not yet returned.
    outstanding: AtomicUsize,
}

/// A pool of reusable payload buffers, owned by one session.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(POOL_BUFFER_SIZE, DEFAULT_POOL_CAPACITY)
    }
}

impl BufferPool {
    /// Create a pool of `buf_size`-byte buffers keeping at most `max_cached`
    /// idle buffers.
    pub fn new(buf_size: usize, max_cached: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                buf_size,
                max_cached,
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Take an empty buffer from the pool, allocating if none is idle.
    pub fn acquire(&self) -> PooledBuf {
        let buf = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.inner.buf_size));
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        PooledBuf {
            buf: Some(buf),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Take a buffer and fill it with a copy of `data`.
    pub fn copy_from(&self, data: &[u8]) -> PooledBuf {
        let mut buf = self.acquire();
        buf.extend_from_slice(data);
        buf
    }

    /// Capacity of each pooled buffer.
    pub fn buf_size(&self) -> usize {
        self.inner.buf_size
    }

    /// Number of buffers currently held outside the pool.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Relaxed)
    }

    /// Number of idle buffers ready for reuse.
    pub fn cached(&self) -> usize {
        self.inner.free.lock().len()
    }
}

/// Exclusive handle to a pooled buffer.
///
/// Dereferences to the underlying [`BytesMut`]. Dropping the handle clears
/// the buffer and returns it to its pool.
pub struct PooledBuf {
    buf: Option<BytesMut>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuf {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        // Only `drop` takes the buffer out.
        self.buf.as_ref().expect("pooled buffer used after release")
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.buf.as_mut().expect("pooled buffer used after release")
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf").field("len", &self.len()).finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let Some(mut buf) = self.buf.take() else {
            return;
        };
        self.pool.outstanding.fetch_sub(1, Ordering::Relaxed);
        if buf.capacity() < self.pool.buf_size {
            return;
        }
        buf.clear();
        let mut free = self.pool.free.lock();
        if free.len() < self.pool.max_cached {
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let pool = BufferPool::new(64, 4);
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 64);
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(pool.cached(), 0);

        drop(buf);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.cached(), 1);
    }

    #[test]
    fn test_reuse_clears_contents() {
        let pool = BufferPool::new(64, 4);
        let buf = pool.copy_from(b"stale");
        assert_eq!(&buf[..], b"stale");
        drop(buf);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.cached(), 0);
    }

    #[test]
    fn test_cache_is_bounded() {
        let pool = BufferPool::new(16, 2);
        let bufs: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.outstanding(), 5);

        drop(bufs);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.cached(), 2);
    }

    #[test]
    fn test_shrunk_buffer_not_cached() {
        let pool = BufferPool::new(64, 4);
        let mut buf = pool.acquire();
        *buf = BytesMut::new();
        drop(buf);

        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.cached(), 0);
    }
}
