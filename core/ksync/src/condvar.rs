//! A Mesa-style condition variable.

use alloc::sync::Arc;

use kspin::SpinNoIrq;
use ktypes::{Priority, TaskId};

use crate::{
    lock::{Lock, Mutex, MutexGuard},
    sched,
    semaphore::Semaphore,
    wait_queue::{WaitQueue, Waiter},
};

/// A task parked on a condition variable, with a private semaphore to wake it.
struct CondWaiter {
    task: TaskId,
    sema: Semaphore,
}

impl Waiter for Arc<CondWaiter> {
    fn priority(&self) -> Priority {
        sched::effective_priority(self.task)
    }
}

/// A condition variable tied to a [`Lock`].
///
/// Signals wake the waiter with the highest effective priority. Wakeups are
/// Mesa-style: by the time a woken task reacquires the lock the condition may
/// no longer hold, so callers re-check it in a loop (see
/// [`wait_while`](Condvar::wait_while)).
pub struct Condvar {
    waiters: SpinNoIrq<WaitQueue<Arc<CondWaiter>>>,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            waiters: SpinNoIrq::new(WaitQueue::new()),
        }
    }

    /// Atomically releases `lock` and waits to be signaled, then reacquires
    /// `lock` before returning.
    ///
    /// # Panics
    ///
    /// Panics if the current task does not hold `lock`, or when called from
    /// interrupt context.
    pub fn wait(&self, lock: &Lock) {
        sched::assert_can_block("Condvar::wait");
        let curr = sched::current();
        assert!(
            lock.is_held_by_current(),
            "task {curr} waited on a condition without holding its lock"
        );
        let waiter = Arc::new(CondWaiter {
            task: curr,
            sema: Semaphore::new(0),
        });
        self.waiters.lock().insert(waiter.clone());
        lock.release();
        waiter.sema.acquire();
        lock.acquire();
    }

    /// Wakes the highest-priority waiter, if any.
    ///
    /// # Panics
    ///
    /// Panics if the current task does not hold `lock`.
    pub fn signal(&self, lock: &Lock) {
        assert!(
            lock.is_held_by_current(),
            "task {} signaled a condition without holding its lock",
            sched::current()
        );
        let Some(waiter) = self.waiters.lock().pop_highest() else {
            return;
        };
        trace!("condvar {:p} signals task {}", self, waiter.task);
        waiter.sema.release();
    }

    /// Wakes every waiter, highest priority first.
    pub fn broadcast(&self, lock: &Lock) {
        while !self.waiters.lock().is_empty() {
            self.signal(lock);
        }
    }

    /// Like [`wait`](Condvar::wait), for a lock held through a [`MutexGuard`].
    pub fn wait_guard<T>(&self, guard: &mut MutexGuard<'_, T>) {
        self.wait(Self::raw(guard));
    }

    /// Like [`signal`](Condvar::signal), for a lock held through a [`MutexGuard`].
    pub fn signal_guard<T>(&self, guard: &MutexGuard<'_, T>) {
        self.signal(Self::raw(guard));
    }

    /// Like [`broadcast`](Condvar::broadcast), for a lock held through a
    /// [`MutexGuard`].
    pub fn broadcast_guard<T>(&self, guard: &MutexGuard<'_, T>) {
        self.broadcast(Self::raw(guard));
    }

    /// Locks `mutex` and waits until `condition` returns `false`.
    ///
    /// Returns the guard, with the condition known to be false.
    pub fn wait_while<'a, T, F>(&self, mutex: &'a Mutex<T>, mut condition: F) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        let mut guard = mutex.lock();
        while condition(&mut guard) {
            self.wait_guard(&mut guard);
        }
        guard
    }

    /// Returns the number of tasks waiting on this condition.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn raw<'a, T>(guard: &'a MutexGuard<'_, T>) -> &'a Lock {
        // SAFETY: the guard proves the lock is held; it is only released and
        // reacquired by the same task before the guard is used again.
        unsafe { MutexGuard::mutex(guard).raw() }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
