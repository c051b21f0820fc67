//! Simulated interrupt context.

use crate::run_queue::with_machine;

/// Runs `f` as an interrupt handler on top of the current task.
///
/// Inside the handler blocking is forbidden, and a preemption requested by
/// [`maybe_preempt`](crate::maybe_preempt) is deferred until the outermost
/// handler returns.
pub fn handle<R>(f: impl FnOnce() -> R) -> R {
    struct IrqExit;

    impl Drop for IrqExit {
        fn drop(&mut self) {
            let resched = with_machine(|m| {
                m.irq_depth -= 1;
                m.irq_depth == 0 && core::mem::take(&mut m.resched_pending)
            });
            if resched && !std::thread::panicking() {
                crate::maybe_preempt();
            }
        }
    }

    with_machine(|m| m.irq_depth += 1);
    let _exit = IrqExit;
    f()
}

/// Returns `true` while an interrupt handler is running.
pub fn in_interrupt() -> bool {
    with_machine(|m| m.irq_depth > 0)
}
