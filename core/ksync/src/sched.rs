//! The scheduler operations the synchronization core is built on.

use ktypes::{Priority, TaskId};

/// Operations consumed from the scheduler.
///
/// The scheduler crate provides the single implementation with
/// `#[crate_interface::impl_interface]`. All calls are made from task
/// context except [`unblock`](SchedulerIf::unblock) and
/// [`maybe_preempt`](SchedulerIf::maybe_preempt), which may also run inside
/// an interrupt handler.
#[crate_interface::def_interface]
pub trait SchedulerIf {
    /// Returns the task that owns the CPU.
    fn current_task() -> TaskId;

    /// Suspends the current task until it is passed to `unblock`.
    ///
    /// If `unblock` already ran for the current task since it last blocked,
    /// returns immediately.
    fn block_current();

    /// Moves a blocked task to the ready queue.
    fn unblock(task: TaskId);

    /// Yields if a ready task has a strictly higher effective priority than
    /// the current one. Deferred to handler exit in interrupt context.
    fn maybe_preempt();

    /// Returns the priority assigned to `task` by policy.
    fn base_priority(task: TaskId) -> Priority;

    /// Returns the priority the scheduler orders `task` by.
    fn effective_priority(task: TaskId) -> Priority;

    /// Overrides the effective priority of `task`.
    fn set_effective_priority(task: TaskId, priority: Priority);

    /// Returns `true` while an interrupt handler is running.
    fn in_interrupt() -> bool;
}

#[inline]
pub(crate) fn current() -> TaskId {
    crate_interface::call_interface!(SchedulerIf::current_task)
}

#[inline]
pub(crate) fn block_current() {
    crate_interface::call_interface!(SchedulerIf::block_current)
}

#[inline]
pub(crate) fn unblock(task: TaskId) {
    crate_interface::call_interface!(SchedulerIf::unblock, task)
}

#[inline]
pub(crate) fn maybe_preempt() {
    crate_interface::call_interface!(SchedulerIf::maybe_preempt)
}

#[inline]
pub(crate) fn base_priority(task: TaskId) -> Priority {
    crate_interface::call_interface!(SchedulerIf::base_priority, task)
}

#[inline]
pub(crate) fn effective_priority(task: TaskId) -> Priority {
    crate_interface::call_interface!(SchedulerIf::effective_priority, task)
}

#[inline]
pub(crate) fn set_effective_priority(task: TaskId, priority: Priority) {
    crate_interface::call_interface!(SchedulerIf::set_effective_priority, task, priority)
}

#[inline]
pub(crate) fn in_interrupt() -> bool {
    crate_interface::call_interface!(SchedulerIf::in_interrupt)
}

/// Panics if the caller cannot sleep.
#[inline]
pub(crate) fn assert_can_block(what: &str) {
    assert!(
        !in_interrupt(),
        "task {} called blocking {} from interrupt context",
        current(),
        what
    );
}
