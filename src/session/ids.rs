//! Connection-id allocation.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::core::ID_WRAP_MARGIN;

/// Monotonic connection-id counter.
///
/// Ids are drawn with an atomic increment and re-drawn while the caller
/// reports them in use. The counter wraps back to zero before it gets within
/// `ID_WRAP_MARGIN` of `i32::MAX`. The in-use check is best effort; callers
/// that need a hard guarantee insert with [`ConnRegistry::insert_new`].
///
/// [`ConnRegistry::insert_new`]: super::ConnRegistry::insert_new
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: AtomicI32,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Create an allocator whose next id follows `last`.
    pub fn starting_after(last: i32) -> Self {
        Self {
            last: AtomicI32::new(last),
        }
    }

    /// Draw the next id not reported by `in_use`.
    pub fn next_id(&self, in_use: impl Fn(i32) -> bool) -> i32 {
        loop {
            if i32::MAX - self.last.load(Ordering::Acquire) < ID_WRAP_MARGIN {
                self.last.store(0, Ordering::Release);
            }
            let id = self.last.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
            if id > 0 && !in_use(id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_increase() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next_id(|_| false), 1);
        assert_eq!(ids.next_id(|_| false), 2);
        assert_eq!(ids.next_id(|_| false), 3);
    }

    #[test]
    fn test_skips_ids_in_use() {
        let ids = IdAllocator::new();
        let taken: HashSet<i32> = [1, 2, 4].into_iter().collect();
        assert_eq!(ids.next_id(|id| taken.contains(&id)), 3);
        assert_eq!(ids.next_id(|id| taken.contains(&id)), 5);
    }

    #[test]
    fn test_wraps_before_overflow() {
        let ids = IdAllocator::starting_after(i32::MAX - ID_WRAP_MARGIN + 1);
        assert_eq!(ids.next_id(|_| false), 1);
    }

    #[test]
    fn test_no_wrap_outside_margin() {
        let ids = IdAllocator::starting_after(i32::MAX - ID_WRAP_MARGIN - 1);
        assert_eq!(ids.next_id(|_| false), i32::MAX - ID_WRAP_MARGIN);
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = std::sync::Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..500).map(|_| ids.next_id(|_| false)).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
