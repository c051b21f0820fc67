use ksync::SchedulerIf;
use ktypes::{PRI_MIN, Priority, TaskId, TaskState};

use crate::run_queue::with_machine;

struct SchedulerIfImpl;

#[crate_interface::impl_interface]
impl SchedulerIf for SchedulerIfImpl {
    fn current_task() -> TaskId {
        crate::current()
    }

    fn block_current() {
        crate::block_current()
    }

    fn unblock(task: TaskId) {
        crate::unblock(task)
    }

    fn maybe_preempt() {
        crate::maybe_preempt()
    }

    fn base_priority(task: TaskId) -> Priority {
        with_machine(|m| m.tasks.get(&task).map_or(PRI_MIN, |e| e.base_priority))
    }

    fn effective_priority(task: TaskId) -> Priority {
        with_machine(|m| m.tasks.get(&task).map_or(PRI_MIN, |e| e.priority))
    }

    fn set_effective_priority(task: TaskId, priority: Priority) {
        with_machine(|m| match m.tasks.get_mut(&task) {
            Some(e) if e.state != TaskState::Exited => e.priority = priority,
            _ => warn!("priority change for dead task {task} ignored"),
        })
    }

    fn in_interrupt() -> bool {
        crate::irq::in_interrupt()
    }
}
