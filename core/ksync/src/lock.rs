//! A sleeping lock with priority donation.

#[cfg(feature = "stats")]
use core::sync::atomic::AtomicU64;
use core::sync::atomic::{AtomicUsize, Ordering};

use ktypes::TaskId;

use crate::{
    donation::{ENGINE, LockId},
    sched,
    semaphore::Semaphore,
};

static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(1);

/// Statistics for lock operations (available with `stats` feature).
#[cfg(feature = "stats")]
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total number of acquisitions
    pub acquisitions: AtomicU64,
    /// Acquisitions that found the lock held
    pub contended: AtomicU64,
    /// Holders raised by donations made from this lock
    pub donations: AtomicU64,
}

/// A mutual-exclusion lock built on a binary [`Semaphore`].
///
/// A task that blocks on a held lock donates its effective priority to the
/// holder, and transitively to whatever that holder is blocked on. Releasing
/// the lock takes back the donations made through it.
///
/// Unlike a semaphore, a lock has an owner: only the task that acquired it
/// may release it, and acquiring it twice is an error.
pub struct Lock {
    id: AtomicUsize,
    gate: Semaphore,
    #[cfg(feature = "stats")]
    stats: LockStats,
}

impl Lock {
    /// Creates an unlocked [`Lock`].
    pub const fn new() -> Self {
        Self {
            id: AtomicUsize::new(0),
            gate: Semaphore::new(1),
            #[cfg(feature = "stats")]
            stats: LockStats {
                acquisitions: AtomicU64::new(0),
                contended: AtomicU64::new(0),
                donations: AtomicU64::new(0),
            },
        }
    }

    // Locks are usable from `static`s, so the identity is assigned on first use.
    fn id(&self) -> LockId {
        let id = self.id.load(Ordering::Acquire);
        if id != 0 {
            return LockId(id);
        }
        let fresh = NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed);
        match self
            .id
            .compare_exchange(0, fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => LockId(fresh),
            Err(existing) => LockId(existing),
        }
    }

    /// Acquires the lock, blocking until it is free.
    ///
    /// # Panics
    ///
    /// Panics if the current task already holds the lock, or when called from
    /// interrupt context.
    pub fn acquire(&self) {
        sched::assert_can_block("Lock::acquire");
        let curr = sched::current();
        let id = self.id();
        #[cfg(feature = "stats")]
        self.stats.acquisitions.fetch_add(1, Ordering::Relaxed);

        let mut engine = ENGINE.lock();
        let holder = engine.holder(id);
        assert_ne!(
            holder,
            Some(curr),
            "task {curr} tried to acquire lock it already holds."
        );
        if let Some(holder) = holder {
            let _raised = engine.begin_wait(curr, id, holder);
            #[cfg(feature = "stats")]
            {
                self.stats.contended.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .donations
                    .fetch_add(_raised as u64, Ordering::Relaxed);
            }
        }
        drop(engine);

        self.gate.acquire();

        let mut engine = ENGINE.lock();
        engine.end_wait(curr);
        engine.set_holder(id, curr);
    }

    /// Tries to acquire the lock without blocking.
    ///
    /// Returns `true` if the lock was acquired, `false` if it is held.
    pub fn try_acquire(&self) -> bool {
        let curr = sched::current();
        let id = self.id();
        let mut engine = ENGINE.lock();
        assert_ne!(
            engine.holder(id),
            Some(curr),
            "task {curr} tried to acquire lock it already holds."
        );
        if !self.gate.try_acquire() {
            return false;
        }
        #[cfg(feature = "stats")]
        self.stats.acquisitions.fetch_add(1, Ordering::Relaxed);
        engine.set_holder(id, curr);
        true
    }

    /// Releases the lock and hands it to the highest-priority waiter.
    ///
    /// # Panics
    ///
    /// Panics if the current task does not hold the lock.
    pub fn release(&self) {
        let curr = sched::current();
        let id = self.id();
        let mut engine = ENGINE.lock();
        assert_eq!(
            engine.holder(id),
            Some(curr),
            "task {curr} tried to release lock it doesn't hold"
        );
        engine.clear_holder(id);
        engine.revoke(curr, id);
        drop(engine);
        self.gate.release();
    }

    /// Returns `true` if the current task holds this lock.
    pub fn is_held_by_current(&self) -> bool {
        self.holder() == Some(sched::current())
    }

    /// Returns the task holding this lock, if any.
    pub fn holder(&self) -> Option<TaskId> {
        ENGINE.lock().holder(self.id())
    }

    /// Returns `true` if some task holds this lock.
    pub fn is_locked(&self) -> bool {
        self.holder().is_some()
    }

    /// Returns the lock statistics (only available with `stats` feature).
    ///
    /// Returns `(acquisitions, contended, donations)`.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.acquisitions.load(Ordering::Relaxed),
            self.stats.contended.load(Ordering::Relaxed),
            self.stats.donations.load(Ordering::Relaxed),
        )
    }

    /// Resets all statistics counters (only available with `stats` feature).
    #[cfg(feature = "stats")]
    pub fn reset_stats(&self) {
        self.stats.acquisitions.store(0, Ordering::Relaxed);
        self.stats.contended.store(0, Ordering::Relaxed);
        self.stats.donations.store(0, Ordering::Relaxed);
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let id = *self.id.get_mut();
        if id != 0 {
            ENGINE.lock().clear_holder(LockId(id));
        }
    }
}

unsafe impl lock_api::RawMutex for Lock {
    type GuardMarker = lock_api::GuardNoSend;

    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Lock::new();

    #[inline(always)]
    fn lock(&self) {
        self.acquire();
    }

    #[inline(always)]
    fn try_lock(&self) -> bool {
        self.try_acquire()
    }

    #[inline(always)]
    unsafe fn unlock(&self) {
        self.release();
    }

    #[inline(always)]
    fn is_locked(&self) -> bool {
        Lock::is_locked(self)
    }
}

/// An alias of [`lock_api::Mutex`] backed by a donating [`Lock`].
pub type Mutex<T> = lock_api::Mutex<Lock, T>;
/// An alias of [`lock_api::MutexGuard`].
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, Lock, T>;
