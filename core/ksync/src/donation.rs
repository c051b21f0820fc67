//! Priority donation bookkeeping.
//!
//! For every task that holds a contended lock or waits on one, the engine
//! keeps the lock it is blocked on (`waiting_on`) and the set of tasks
//! donating to it (`donations`). Lock holders are recorded per [`LockId`].
//! Tasks are only ever referred to by [`TaskId`]; the scheduler owns them.

use alloc::collections::BTreeMap;
use core::fmt;

use kspin::SpinNoIrq;
use ktypes::{Priority, TaskId};

use crate::{sched, wait_queue::WaitQueue};

/// Default number of hops a donation is propagated along a chain of locks.
pub const MAX_DONATION_DEPTH: usize = 8;

/// Tunable donation behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DonationPolicy {
    /// Whether blocking on a held lock donates priority at all.
    pub enabled: bool,
    /// Maximum number of holders raised by one donation.
    pub max_depth: usize,
}

impl DonationPolicy {
    pub const DEFAULT: Self = Self {
        enabled: true,
        max_depth: MAX_DONATION_DEPTH,
    };

    /// Donation turned off, as under an advanced scheduler that computes
    /// priorities on its own.
    pub const DISABLED: Self = Self {
        enabled: false,
        max_depth: 0,
    };
}

impl Default for DonationPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Identity of a [`Lock`](crate::Lock) inside the donation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LockId(pub(crate) usize);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Default)]
struct Links {
    waiting_on: Option<LockId>,
    donations: WaitQueue<TaskId>,
}

impl Links {
    fn is_idle(&self) -> bool {
        self.waiting_on.is_none() && self.donations.is_empty()
    }
}

pub(crate) struct DonationEngine {
    holders: BTreeMap<LockId, TaskId>,
    links: BTreeMap<TaskId, Links>,
    policy: DonationPolicy,
}

pub(crate) static ENGINE: SpinNoIrq<DonationEngine> = SpinNoIrq::new(DonationEngine {
    holders: BTreeMap::new(),
    links: BTreeMap::new(),
    policy: DonationPolicy::DEFAULT,
});

/// Installs a new donation policy.
///
/// Intended for boot time. Donations made under the previous policy stay in
/// place until the locks involved are released.
pub fn set_donation_policy(policy: DonationPolicy) {
    info!("donation policy: {policy:?}");
    ENGINE.lock().policy = policy;
}

/// Returns the current donation policy.
pub fn donation_policy() -> DonationPolicy {
    ENGINE.lock().policy
}

/// Recomputes the effective priority of `task` from its base priority and
/// the donations it currently receives.
///
/// Called by the scheduler after it changes a base priority.
pub fn refresh_priority(task: TaskId) {
    ENGINE.lock().refresh(task);
}

impl DonationEngine {
    pub(crate) fn holder(&self, lock: LockId) -> Option<TaskId> {
        self.holders.get(&lock).copied()
    }

    pub(crate) fn set_holder(&mut self, lock: LockId, task: TaskId) {
        self.holders.insert(lock, task);
    }

    pub(crate) fn clear_holder(&mut self, lock: LockId) {
        self.holders.remove(&lock);
    }

    /// Records that `donor` is about to block on `lock`, held by `holder`,
    /// and pushes the donor's priority down the chain.
    ///
    /// Returns the number of holders whose priority was raised.
    pub(crate) fn begin_wait(&mut self, donor: TaskId, lock: LockId, holder: TaskId) -> usize {
        if !self.policy.enabled {
            return 0;
        }
        self.links.entry(donor).or_default().waiting_on = Some(lock);
        self.links.entry(holder).or_default().donations.insert(donor);
        self.propagate(donor)
    }

    fn propagate(&mut self, donor: TaskId) -> usize {
        let mut raised = 0;
        let mut curr = donor;
        for _ in 0..self.policy.max_depth {
            let Some(lock) = self.links.get(&curr).and_then(|l| l.waiting_on) else {
                return raised;
            };
            let Some(holder) = self.holder(lock) else {
                return raised;
            };
            let prio = sched::effective_priority(curr);
            if sched::effective_priority(holder) < prio {
                debug!("task {curr} donates priority {prio} to task {holder} through {lock}");
                sched::set_effective_priority(holder, prio);
                raised += 1;
            }
            curr = holder;
        }
        if self.links.get(&curr).is_some_and(|l| l.waiting_on.is_some()) {
            warn!(
                "donation from task {donor} stopped at task {curr} after {} hops",
                self.policy.max_depth
            );
        }
        raised
    }

    /// Clears the `waiting_on` record of a task that just obtained its lock.
    pub(crate) fn end_wait(&mut self, task: TaskId) {
        if let Some(links) = self.links.get_mut(&task) {
            links.waiting_on = None;
            if links.is_idle() {
                self.links.remove(&task);
            }
        }
    }

    /// Drops every donation `holder` receives through `lock` and recomputes
    /// its effective priority.
    pub(crate) fn revoke(&mut self, holder: TaskId, lock: LockId) {
        let Some(mut donations) = self
            .links
            .get_mut(&holder)
            .map(|l| core::mem::take(&mut l.donations))
        else {
            self.refresh(holder);
            return;
        };
        let links = &self.links;
        donations.retain(|donor| {
            let keep = links.get(donor).and_then(|l| l.waiting_on) != Some(lock);
            if !keep {
                debug!("task {holder} loses donation from task {donor} on release of {lock}");
            }
            keep
        });
        if let Some(l) = self.links.get_mut(&holder) {
            l.donations = donations;
            if l.is_idle() {
                self.links.remove(&holder);
            }
        }
        self.refresh(holder);
    }

    fn refresh(&mut self, task: TaskId) {
        let base = sched::base_priority(task);
        let donated = if self.policy.enabled {
            self.links
                .get(&task)
                .and_then(|l| l.donations.highest_priority())
        } else {
            None
        };
        let prio = donated.map_or(base, |d: Priority| d.max(base));
        sched::set_effective_priority(task, prio);
    }
}
