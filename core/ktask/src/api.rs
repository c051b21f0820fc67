//! Task APIs.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
};

use ksync::DonationPolicy;
use ktypes::{Priority, TaskId, TaskState};

use crate::{
    run_queue::{self, Halt, Machine, Parker, with_machine},
    task::{JoinHandle, TaskBuilder, TaskExit, alloc_id},
};

static BOOT_LOCK: Mutex<()> = Mutex::new(());

/// Brings up a fresh machine and runs `f` as its initial task.
///
/// The initial task runs at [`PRI_DEFAULT`](ktypes::PRI_DEFAULT). `boot`
/// returns once every task spawned on the machine has exited. Concurrent calls
/// are serialized, and the donation policy is reset to its default.
///
/// # Panics
///
/// Re-raises the first panic of any task. Panics with a message containing
/// `deadlock` when the remaining tasks are all blocked.
pub fn boot<F: FnOnce()>(f: F) {
    let _serial = BOOT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    struct Teardown;
    impl Drop for Teardown {
        fn drop(&mut self) {
            run_queue::install(None);
        }
    }

    let init = alloc_id();
    run_queue::install(Some(Machine::new(init, Arc::new(Parker::new()))));
    let _teardown = Teardown;
    ksync::set_donation_policy(DonationPolicy::DEFAULT);
    info!("boot: init task {init}");

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        if !payload.is::<TaskExit>() {
            panic::resume_unwind(payload);
        }
    }
    run_exit_hooks(init);

    // Retire the initial task and idle until the others are done.
    let idle = with_machine(|m| {
        if m.halt.is_none() {
            m.switch_away(TaskState::Exited);
        }
        m.idle.clone()
    });
    loop {
        let halt = with_machine(|m| m.halt);
        match halt {
            Some(Halt::Finished) => break,
            Some(Halt::Deadlock) => {
                let (failure, unfinished) = with_machine(|m| (m.failure.take(), m.unfinished()));
                if let Some(payload) = failure {
                    panic::resume_unwind(payload);
                }
                panic!("deadlock: {unfinished:?} can never run again");
            }
            None => idle.park(),
        }
    }

    if let Some(payload) = with_machine(|m| m.failure.take()) {
        panic::resume_unwind(payload);
    }
    info!("boot: all tasks finished");
}

/// Called by a task thread after it is handed the CPU.
///
/// The initial task reports a deadlock; any other task was stranded by a
/// halted machine and never runs again.
pub(crate) fn check_halted(me: TaskId, parker: &Parker) {
    let (halt, is_init) = with_machine(|m| (m.halt, m.init == me));
    match halt {
        None => {}
        Some(_) if !is_init => loop {
            parker.park();
        },
        Some(_) => {
            let (failure, unfinished) = with_machine(|m| (m.failure.take(), m.unfinished()));
            if let Some(payload) = failure {
                panic::resume_unwind(payload);
            }
            panic!("deadlock: {unfinished:?} can never run again");
        }
    }
}

/// Returns the id of the running task.
pub fn current() -> TaskId {
    with_machine(|m| m.current())
}

/// Returns the scheduler state of `task`, if it was ever spawned on this
/// machine.
pub fn task_state(task: TaskId) -> Option<TaskState> {
    with_machine(|m| m.tasks.get(&task).map(|e| e.state))
}

/// Spawns a new task at [`PRI_DEFAULT`](ktypes::PRI_DEFAULT).
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    TaskBuilder::new("task").spawn(f)
}

/// Puts the current task behind every ready task of equal or higher
/// priority.
pub fn yield_now() {
    let switched = with_machine(|m| {
        if m.halt.is_some() || m.irq_depth > 0 {
            return None;
        }
        let curr = m.current();
        Some((curr, m.switch_away(TaskState::Ready)))
    });
    // When no other task was picked the token is already there.
    if let Some((curr, parker)) = switched {
        parker.park();
        check_halted(curr, &parker);
    }
}

/// Yields if a ready task has a strictly higher priority than the current
/// one. In interrupt context the yield happens when the handler returns.
pub fn maybe_preempt() {
    let preempt = with_machine(|m| {
        if m.halt.is_some() {
            return false;
        }
        let curr = m.current_entry().priority;
        let higher = m.best_ready_priority().is_some_and(|p| p > curr);
        if higher && m.irq_depth > 0 {
            m.resched_pending = true;
            return false;
        }
        higher
    });
    if preempt {
        yield_now();
    }
}

/// Blocks the current task until [`unblock`] is called for it.
///
/// Returns at once if an `unblock` already arrived since the task last
/// blocked.
///
/// # Panics
///
/// Panics in interrupt context.
pub fn block_current() {
    let parker = with_machine(|m| {
        assert!(
            m.irq_depth == 0,
            "task {} tried to block in interrupt context",
            m.current()
        );
        if m.halt.is_some() {
            panic!("task {} tried to block on a halted machine", m.current());
        }
        let curr = m.current();
        let entry = m.current_entry();
        if entry.wakeup_pending {
            entry.wakeup_pending = false;
            return None;
        }
        Some((curr, m.switch_away(TaskState::Blocked)))
    });
    if let Some((curr, parker)) = parker {
        parker.park();
        check_halted(curr, &parker);
    }
}

/// Makes a blocked task ready. Does not preempt the caller.
pub fn unblock(task: TaskId) {
    with_machine(|m| match m.tasks.get(&task).map(|e| e.state) {
        Some(TaskState::Blocked) => m.push_ready(task),
        Some(TaskState::Running | TaskState::Ready) => {
            if let Some(e) = m.tasks.get_mut(&task) {
                e.wakeup_pending = true;
            }
        }
        Some(TaskState::Exited) | None => warn!("unblock of dead task {task} ignored"),
    })
}

/// Terminates the current task.
///
/// Locals of the task are dropped as the task unwinds. When called by the
/// initial task, [`boot`] carries on as if its closure had returned.
pub fn exit() -> ! {
    panic::resume_unwind(Box::new(TaskExit))
}

/// Registers `hook` to run once the current task's body has finished,
/// whether it returned, called [`exit`] or panicked.
///
/// Hooks run in registration order, still as the current task, so they may
/// block. A hook registered by another hook runs too.
pub fn on_exit(hook: impl FnOnce() + Send + 'static) {
    with_machine(|m| m.current_entry().exit_hooks.push(Box::new(hook)));
}

pub(crate) fn run_exit_hooks(me: TaskId) {
    loop {
        let hooks = with_machine(|m| m.take_exit_hooks(me));
        if hooks.is_empty() {
            return;
        }
        for hook in hooks {
            match panic::catch_unwind(AssertUnwindSafe(hook)) {
                Ok(()) => {}
                Err(payload) if payload.is::<TaskExit>() => {}
                Err(payload) => {
                    error!("exit hook of task {me} panicked");
                    with_machine(|m| m.record_failure(payload));
                }
            }
        }
    }
}

/// Sets the base priority of the current task.
///
/// The effective priority never drops below what the task is donated. Yields
/// if the task is no longer the highest-priority one.
pub fn set_priority(priority: Priority) {
    let curr = with_machine(|m| {
        let entry = m.current_entry();
        entry.base_priority = priority.min(ktypes::PRI_MAX);
        m.current()
    });
    ksync::refresh_priority(curr);
    maybe_preempt();
}

/// Returns the effective priority of the current task.
pub fn get_priority() -> Priority {
    with_machine(|m| m.current_entry().priority)
}

/// Returns the base priority of the current task.
pub fn base_priority() -> Priority {
    with_machine(|m| m.current_entry().base_priority)
}

/// Returns the effective priority of `task`, if it is known.
pub fn priority_of(task: TaskId) -> Option<Priority> {
    with_machine(|m| m.tasks.get(&task).map(|e| e.priority))
}
