//! # Seen-Identity Set
//!
//! Remembers which upstream identities have already been processed so the
//! poller never emits the same event twice.
//!
//! The set is bounded. Identities are kept in discovery order and the oldest
//! ones are forgotten once `capacity` is exceeded. An upstream page only ever
//! contains the most recent few records, so an identity that has fallen far
//! behind the current page can no longer reappear and is safe to drop. The
//! capacity must therefore cover at least two pages: ids are recorded in page
//! order, newest first, so an id can be followed by the older rest of its own
//! page and then by the newer ids of later pages while it is still listed.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Bounded, insertion-ordered set of seen identities.
#[derive(Debug)]
pub struct SeenSet<K> {
    members: HashSet<K>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Hash + Eq + Clone> SeenSet<K> {
    /// Creates an empty set that remembers at most `capacity` identities.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            members: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Check-and-record in one step.
    ///
    /// Returns `true` if `id` had not been seen (and records it), `false` if it
    /// is a repeat.
    pub fn check_and_insert(&mut self, id: &K) -> bool {
        if self.members.contains(id) {
            return false;
        }

        self.members.insert(id.clone());
        self.order.push_back(id.clone());

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    /// Membership test without recording.
    pub fn contains(&self, id: &K) -> bool {
        self.members.contains(id)
    }

    /// Number of identities currently remembered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of identities remembered.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
