//! A counting semaphore with priority-ordered wakeups.

use kspin::SpinNoIrq;
use ktypes::TaskId;

use crate::{sched, wait_queue::WaitQueue};

struct Inner {
    count: usize,
    waiters: WaitQueue<TaskId>,
}

/// A counting semaphore.
///
/// When permits run out, callers block in a wait queue. A release wakes the
/// waiter with the highest effective priority at release time.
pub struct Semaphore {
    inner: SpinNoIrq<Inner>,
}

impl Semaphore {
    /// Creates a new semaphore with the given number of permits.
    pub const fn new(permits: usize) -> Self {
        Self {
            inner: SpinNoIrq::new(Inner {
                count: permits,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Acquires a permit, blocking until one is available.
    ///
    /// # Panics
    ///
    /// Panics when called from interrupt context.
    pub fn acquire(&self) {
        sched::assert_can_block("Semaphore::acquire");
        let curr = sched::current();
        loop {
            let mut inner = self.inner.lock();
            if inner.count > 0 {
                inner.count -= 1;
                return;
            }
            trace!("task {curr} blocks on semaphore {:p}", self);
            inner.waiters.insert(curr);
            drop(inner);
            sched::block_current();
        }
    }

    /// Tries to acquire a permit without blocking.
    ///
    /// Returns `true` if a permit was acquired, `false` otherwise.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.count > 0 {
            inner.count -= 1;
            true
        } else {
            false
        }
    }

    /// Releases a permit, waking the highest-priority waiter if any.
    ///
    /// May be called from interrupt context.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.waiters.pop_highest() {
            trace!("semaphore {:p} wakes task {task}", self);
            sched::unblock(task);
        }
        inner.count += 1;
        drop(inner);
        sched::maybe_preempt();
    }

    /// Returns the current number of available permits.
    pub fn available_permits(&self) -> usize {
        self.inner.lock().count
    }

    /// Returns the number of tasks blocked on this semaphore.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Acquires a permit and returns a guard.
    ///
    /// The permit is automatically released when the guard is dropped.
    pub fn acquire_guard(&self) -> SemaphoreGuard<'_> {
        self.acquire();
        SemaphoreGuard { sem: self }
    }
}

/// RAII guard for a semaphore permit.
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}
