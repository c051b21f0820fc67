//! Machine state: the task table, the ready queue and CPU ownership.
//!
//! Every task is backed by an OS thread, but only the task recorded as
//! `current` is allowed to run. A switch hands the CPU over by unparking the
//! next task's thread before the previous one parks itself.

use std::{
    any::Any,
    collections::BTreeMap,
    sync::{Arc, Condvar, Mutex, PoisonError},
};

use kspin::SpinNoIrq;
use ktypes::{Priority, TaskId, TaskState};

/// A one-token parking slot for a task thread.
///
/// Parked threads really sleep, so this is the one place that needs the OS
/// mutex and condition variable.
pub(crate) struct Parker {
    token: Mutex<bool>,
    cvar: Condvar,
}

impl Parker {
    pub(crate) fn new() -> Self {
        Self {
            token: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    /// Sleeps until a token is available, then consumes it.
    pub(crate) fn park(&self) {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        while !*token {
            token = self
                .cvar
                .wait(token)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *token = false;
    }

    pub(crate) fn unpark(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cvar.notify_one();
    }
}

pub(crate) struct TaskEntry {
    pub(crate) name: String,
    pub(crate) base_priority: Priority,
    pub(crate) priority: Priority,
    pub(crate) state: TaskState,
    pub(crate) wakeup_pending: bool,
    pub(crate) parker: Arc<Parker>,
    pub(crate) exit_hooks: Vec<ExitHook>,
}

pub(crate) type ExitHook = Box<dyn FnOnce() + Send>;

impl TaskEntry {
    pub(crate) fn new(
        name: String,
        priority: Priority,
        state: TaskState,
        parker: Arc<Parker>,
    ) -> Self {
        Self {
            name,
            base_priority: priority,
            priority,
            state,
            wakeup_pending: false,
            parker,
            exit_hooks: Vec::new(),
        }
    }
}

/// Why the scheduler ran out of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Halt {
    /// Every task exited.
    Finished,
    /// Tasks remain but all of them are blocked.
    Deadlock,
}

pub(crate) struct Machine {
    pub(crate) tasks: BTreeMap<TaskId, TaskEntry>,
    ready: Vec<(u64, TaskId)>,
    seq: u64,
    pub(crate) current: Option<TaskId>,
    pub(crate) init: TaskId,
    pub(crate) irq_depth: usize,
    pub(crate) resched_pending: bool,
    pub(crate) halt: Option<Halt>,
    pub(crate) idle: Arc<Parker>,
    pub(crate) failure: Option<Box<dyn Any + Send>>,
}

// Held only for bookkeeping; never across a park.
static MACHINE: SpinNoIrq<Option<Machine>> = SpinNoIrq::new(None);

/// Runs `f` on the booted machine.
///
/// # Panics
///
/// Panics if no machine is running.
pub(crate) fn with_machine<R>(f: impl FnOnce(&mut Machine) -> R) -> R {
    let mut guard = MACHINE.lock();
    match guard.as_mut() {
        Some(machine) => f(machine),
        None => panic!("ktask: no machine is running, call `ktask::boot` first"),
    }
}

pub(crate) fn install(machine: Option<Machine>) -> Option<Machine> {
    core::mem::replace(&mut *MACHINE.lock(), machine)
}

impl Machine {
    pub(crate) fn new(init: TaskId, parker: Arc<Parker>) -> Self {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            init,
            TaskEntry::new("init".into(), ktypes::PRI_DEFAULT, TaskState::Running, parker),
        );
        Self {
            tasks,
            ready: Vec::new(),
            seq: 0,
            current: Some(init),
            init,
            irq_depth: 0,
            resched_pending: false,
            halt: None,
            idle: Arc::new(Parker::new()),
            failure: None,
        }
    }

    pub(crate) fn current(&self) -> TaskId {
        match self.current {
            Some(task) => task,
            None => panic!("ktask: no task is running"),
        }
    }

    pub(crate) fn current_entry(&mut self) -> &mut TaskEntry {
        let curr = self.current();
        self.entry(curr)
    }

    fn entry(&mut self, task: TaskId) -> &mut TaskEntry {
        match self.tasks.get_mut(&task) {
            Some(entry) => entry,
            None => panic!("ktask: unknown task {task}"),
        }
    }

    /// Registers a new task in the ready queue.
    pub(crate) fn admit(&mut self, task: TaskId, entry: TaskEntry) {
        debug!("admit task {task} {:?} at priority {}", entry.name, entry.priority);
        self.tasks.insert(task, entry);
        self.push_ready(task);
    }

    /// Appends `task` to the ready queue, behind tasks of equal priority.
    pub(crate) fn push_ready(&mut self, task: TaskId) {
        self.entry(task).state = TaskState::Ready;
        self.ready.push((self.seq, task));
        self.seq += 1;
    }

    /// Effective priority of the best ready task.
    pub(crate) fn best_ready_priority(&self) -> Option<Priority> {
        self.ready
            .iter()
            .filter_map(|(_, t)| self.tasks.get(t).map(|e| e.priority))
            .max()
    }

    // Priorities can change while a task waits, so the queue is scanned on
    // every pick instead of being kept sorted.
    fn pop_ready(&mut self) -> Option<TaskId> {
        let tasks = &self.tasks;
        let (pos, _) = self
            .ready
            .iter()
            .enumerate()
            .max_by(|(_, (sa, a)), (_, (sb, b))| {
                let pa = tasks.get(a).map_or(0, |e| e.priority);
                let pb = tasks.get(b).map_or(0, |e| e.priority);
                pa.cmp(&pb).then(sb.cmp(sa))
            })?;
        Some(self.ready.remove(pos).1)
    }

    /// Gives the CPU to the best ready task.
    ///
    /// The caller must already have moved the previous task out of `Running`.
    /// When nothing is runnable the machine halts: either every task is done,
    /// or the remaining ones can never be woken.
    pub(crate) fn dispatch(&mut self) {
        if let Some(next) = self.pop_ready() {
            let entry = self.entry(next);
            entry.state = TaskState::Running;
            let parker = entry.parker.clone();
            trace!("switch to task {next}");
            self.current = Some(next);
            parker.unpark();
            return;
        }
        self.current = None;
        let blocked: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, e)| e.state == TaskState::Blocked)
            .map(|(t, _)| *t)
            .collect();
        if blocked.is_empty() {
            self.halt = Some(Halt::Finished);
            self.idle.unpark();
            return;
        }
        error!("deadlock: tasks {blocked:?} are blocked and nothing is ready");
        self.halt = Some(Halt::Deadlock);
        match self.tasks.get(&self.init) {
            Some(init) if init.state == TaskState::Blocked => init.parker.unpark(),
            _ => self.idle.unpark(),
        }
    }

    /// Takes the CPU away from the current task and returns its parker.
    pub(crate) fn switch_away(&mut self, state: TaskState) -> Arc<Parker> {
        let curr = self.current();
        let entry = self.entry(curr);
        let parker = entry.parker.clone();
        if state == TaskState::Ready {
            self.push_ready(curr);
        } else {
            entry.state = state;
        }
        self.dispatch();
        parker
    }

    /// Takes the exit hooks registered by `task`, oldest first.
    pub(crate) fn take_exit_hooks(&mut self, task: TaskId) -> Vec<ExitHook> {
        core::mem::take(&mut self.entry(task).exit_hooks)
    }

    pub(crate) fn record_failure(&mut self, payload: Box<dyn Any + Send>) {
        if self.failure.is_none() {
            self.failure = Some(payload);
        }
    }

    /// Names of tasks that have not exited.
    pub(crate) fn unfinished(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, e)| e.state != TaskState::Exited)
            .map(|(t, e)| format!("{} {t} ({:?})", e.name, e.state))
            .collect()
    }
}
