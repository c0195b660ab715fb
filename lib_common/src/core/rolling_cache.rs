//! # Rolling Cache
//!
//! Bounded, newest-first buffer of the most recently discovered events, served
//! to clients that join late or poll.
//!
//! Writers build the next list under the write lock and swap it in as a new
//! `Arc`. Readers only clone the current `Arc`, so a snapshot is always one
//! whole list, either from before or after an append.

use std::sync::{Arc, PoisonError, RwLock};

/// Newest-first cache holding at most `capacity` entries.
#[derive(Debug)]
pub struct RollingCache<T> {
    entries: RwLock<Arc<Vec<T>>>,
    capacity: usize,
}

impl<T: Clone> RollingCache<T> {
    /// Creates an empty cache. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Prepends `batch` (kept in its given order) and truncates to capacity.
    ///
    /// If the batch alone exceeds the capacity, its tail never reaches the cache.
    pub fn append(&self, batch: &[T]) {
        if batch.is_empty() {
            return;
        }

        // Poisoning cannot leave a half-written list behind: the only write is
        // a single pointer swap.
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = Vec::with_capacity(self.capacity);
        next.extend(batch.iter().take(self.capacity).cloned());
        let room = self.capacity - next.len();
        next.extend(guard.iter().take(room).cloned());

        *guard = Arc::new(next);
    }

    /// The current contents, newest first.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// True if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_batch_goes_in_front_in_order() {
        let cache = RollingCache::new(50);
        cache.append(&["A", "B"]);
        assert_eq!(*cache.snapshot(), vec!["A", "B"]);

        cache.append(&["C"]);
        assert_eq!(*cache.snapshot(), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let cache = RollingCache::new(5);
        cache.append(&[1, 2]);
        let before = cache.snapshot();
        cache.append(&[]);
        assert!(Arc::ptr_eq(&before, &cache.snapshot()));
    }

    #[test]
    fn test_oversized_batch_keeps_its_head() {
        let cache = RollingCache::new(2);
        cache.append(&["old"]);
        cache.append(&["X", "Y", "Z"]);
        assert_eq!(*cache.snapshot(), vec!["X", "Y"]);
    }

    #[test]
    fn test_older_entries_fall_off_the_end() {
        let cache = RollingCache::new(3);
        cache.append(&[1, 2]);
        cache.append(&[3, 4]);
        assert_eq!(*cache.snapshot(), vec![3, 4, 1]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_appends() {
        let cache = RollingCache::new(4);
        cache.append(&[1]);
        let held = cache.snapshot();
        cache.append(&[2]);
        assert_eq!(*held, vec![1]);
    }

    #[test]
    fn test_concurrent_readers_only_see_whole_lists() {
        let cache = Arc::new(RollingCache::new(8));
        let writer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for round in 0..500u32 {
                    let batch: Vec<u32> = (0..3).map(|i| round * 10 + i).collect();
                    cache.append(&batch);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snap = cache.snapshot();
                        assert!(snap.len() <= 8);
                        // Every append contributes a contiguous, ascending run of
                        // three; the front of any observed list is one such run.
                        if snap.len() >= 3 {
                            assert_eq!(snap[1], snap[0] + 1);
                            assert_eq!(snap[2], snap[0] + 2);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
