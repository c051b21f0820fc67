//! Task creation and joining.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread,
};

use ksync::Semaphore;
use ktypes::{PRI_DEFAULT, PRI_MAX, Priority, TaskId, TaskState};

use crate::run_queue::{Parker, TaskEntry, with_machine};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn alloc_id() -> TaskId {
    TaskId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Unwind payload used by [`exit`](crate::exit) to leave a task early.
pub(crate) struct TaskExit;

struct JoinSlot<T> {
    done: Semaphore,
    value: Mutex<Option<T>>,
}

/// A handle to join a spawned task.
pub struct JoinHandle<T> {
    id: TaskId,
    slot: Arc<JoinSlot<T>>,
}

impl<T> JoinHandle<T> {
    /// Returns the id of the task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Blocks until the task finishes and returns its result.
    ///
    /// Returns `None` if the task panicked or left through
    /// [`exit`](crate::exit).
    pub fn join(self) -> Option<T> {
        self.slot.done.acquire();
        self.slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// A struct to build a new task.
///
/// The task id is reserved when the builder is created, so it can be handed
/// out before the task starts running.
pub struct TaskBuilder {
    id: TaskId,
    name: String,
    priority: Priority,
}

impl TaskBuilder {
    /// Creates a builder for a task named `name` at [`PRI_DEFAULT`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: alloc_id(),
            name: name.into(),
            priority: PRI_DEFAULT,
        }
    }

    /// Sets the base priority of the task, clamped to [`PRI_MAX`].
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority.min(PRI_MAX);
        self
    }

    /// Returns the id the task will run under.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Makes the task ready and returns a handle to join it.
    ///
    /// If the new task has a higher priority than the caller, it runs before
    /// this function returns.
    pub fn spawn<F, T>(self, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let Self { id, name, priority } = self;
        let parker = Arc::new(Parker::new());
        let slot = Arc::new(JoinSlot {
            done: Semaphore::new(0),
            value: Mutex::new(None),
        });

        let entry = TaskEntry::new(name.clone(), priority, TaskState::Ready, parker.clone());
        with_machine(|m| m.admit(id, entry));

        let task_slot = slot.clone();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || task_entry(id, parker, task_slot, f));
        if let Err(e) = spawned {
            panic!("ktask: failed to start a thread for task {name}: {e}");
        }

        crate::maybe_preempt();
        JoinHandle { id, slot }
    }
}

fn task_entry<F, T>(id: TaskId, parker: Arc<Parker>, slot: Arc<JoinSlot<T>>, f: F)
where
    F: FnOnce() -> T,
{
    parker.park();
    crate::api::check_halted(id, &parker);
    trace!("task {id} starts");

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => {
            *slot.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        }
        Err(payload) if payload.is::<TaskExit>() => {}
        Err(payload) => {
            error!("task {id} panicked");
            with_machine(|m| m.record_failure(payload));
        }
    }
    crate::api::run_exit_hooks(id);

    slot.done.release();
    with_machine(|m| {
        trace!("task {id} exits");
        m.switch_away(TaskState::Exited);
    });
}
