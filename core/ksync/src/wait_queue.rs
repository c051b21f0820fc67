//! A queue of blocked waiters, retrievable in priority order.

use alloc::collections::VecDeque;
use core::cmp::Reverse;

use ktypes::{Priority, TaskId};

use crate::sched;

/// Something that can sit in a [`WaitQueue`].
pub trait Waiter {
    /// The priority this waiter is ordered by, read at the time of the call.
    fn priority(&self) -> Priority;
}

impl Waiter for TaskId {
    fn priority(&self) -> Priority {
        sched::effective_priority(*self)
    }
}

struct Entry<T> {
    seq: u64,
    item: T,
}

/// A wait queue ordered by descending priority, FIFO among equals.
///
/// Entries are inserted in sorted position, but priorities may change while an
/// entry waits (a donation can raise a blocked task), so every pop re-sorts by
/// the priorities current at that instant.
pub struct WaitQueue<T> {
    entries: VecDeque<Entry<T>>,
    next_seq: u64,
}

impl<T: Waiter> WaitQueue<T> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Inserts `item` behind every entry with the same or higher priority.
    pub fn insert(&mut self, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let prio = item.priority();
        let pos = self
            .entries
            .iter()
            .position(|e| e.item.priority() < prio)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, Entry { seq, item });
    }

    /// Re-establishes the order after priorities changed.
    pub fn resort(&mut self) {
        self.entries
            .make_contiguous()
            .sort_by_cached_key(|e| (Reverse(e.item.priority()), e.seq));
    }

    /// Removes and returns the entry with the highest current priority.
    pub fn pop_highest(&mut self) -> Option<T> {
        self.resort();
        self.entries.pop_front().map(|e| e.item)
    }

    /// Returns the highest current priority among the entries.
    pub fn highest_priority(&self) -> Option<Priority> {
        self.entries.iter().map(|e| e.item.priority()).max()
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.entries.retain(|e| f(&e.item));
    }

    /// Iterates over the entries in their stored order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.item)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Waiter> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
