//! Memory accounting for buffered collections.
//!
//! Every in-memory segment of a spillable collection holds a
//! [`MemoryReservation`] against the execution's [`MemoryPool`]. A refused
//! grow is not an error: the collection spills its segment, frees the
//! reservation and carries on.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Byte budget shared by the collections of one execution.
pub struct MemoryPool {
    limit: Option<usize>,
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryPool {
    /// A pool refusing growth past `limit` bytes.
    pub fn bounded(limit: usize) -> Self {
        Self::with_limit(Some(limit))
    }

    /// A pool that only keeps count.
    pub fn unbounded() -> Self {
        Self::with_limit(None)
    }

    fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    /// Highest `used` seen since the pool was created.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn try_grow(&self, bytes: usize) -> bool {
        let grown = self.used.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
            let next = used.saturating_add(bytes);
            match self.limit {
                Some(limit) if next > limit => None,
                _ => Some(next),
            }
        });
        match grown {
            Ok(before) => {
                self.peak.fetch_max(before + bytes, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    fn shrink(&self, bytes: usize) {
        let _ = self.used.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
            Some(used.saturating_sub(bytes))
        });
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("limit", &self.limit)
            .field("used", &self.used())
            .field("peak", &self.peak())
            .finish()
    }
}

/// Bytes one in-memory segment holds in a pool. Returned to the pool on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    pool: Arc<MemoryPool>,
    bytes: usize,
}

impl MemoryReservation {
    pub fn new(pool: Arc<MemoryPool>) -> Self {
        Self { pool, bytes: 0 }
    }

    pub fn size(&self) -> usize {
        self.bytes
    }

    /// Grow by `bytes`, or leave the reservation unchanged when the pool
    /// refuses.
    pub fn try_grow(&mut self, bytes: usize) -> bool {
        if bytes == 0 {
            return true;
        }
        let granted = self.pool.try_grow(bytes);
        if granted {
            self.bytes += bytes;
        }
        granted
    }

    /// Return everything to the pool, keeping the reservation usable.
    pub fn free(&mut self) {
        self.pool.shrink(self.bytes);
        self.bytes = 0;
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_pool_refuses_past_limit() {
        let pool = Arc::new(MemoryPool::bounded(1000));
        let mut first = MemoryReservation::new(Arc::clone(&pool));
        let mut second = MemoryReservation::new(Arc::clone(&pool));
        assert!(first.try_grow(500));
        assert!(second.try_grow(400));
        assert!(!second.try_grow(200));
        assert_eq!(second.size(), 400);
        assert_eq!(pool.used(), 900);

        first.free();
        assert_eq!(pool.used(), 400);
        assert!(second.try_grow(200));
        assert_eq!(pool.peak(), 900);
    }

    #[test]
    fn test_reservation_returned_on_drop() {
        let pool = Arc::new(MemoryPool::unbounded());
        {
            let mut reservation = MemoryReservation::new(Arc::clone(&pool));
            assert!(reservation.try_grow(300));
            assert!(reservation.try_grow(usize::MAX / 2));
        }
        assert_eq!(pool.used(), 0);
        assert_eq!(pool.peak(), 300 + usize::MAX / 2);
        assert_eq!(pool.limit(), None);
    }
}
