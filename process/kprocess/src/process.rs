//! Processes and the fork / wait / exit handshake.

use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use kerrno::{KError, KResult, ensure, k_bail, k_err};
use ksync::Semaphore;
use kspin::SpinNoIrq;
use ktask::TaskBuilder;
use ktypes::TaskId;

use crate::table;

/// Exit status of a child whose fork failed.
pub const TID_ERROR: i32 = -1;

type ExitHook = Box<dyn FnOnce() + Send>;

/// A process: a task plus the state its parent needs to wait for it.
///
/// Three semaphores, all starting at zero, order the lifecycle:
/// - `fork_sema`: released by the child once it has duplicated the parent,
///   successfully or not. The parent sleeps on it inside [`fork`](Self::fork).
/// - `wait_sema`: released by the child when it exits. A waiting parent sleeps
///   on it.
/// - `free_sema`: released by the parent after reading the exit status. The
///   exiting child sleeps on it, so its status stays readable until then.
///
/// When a process's task ends, however it ends, the children it never waited
/// for get their `free_sema` released and the process leaves the table.
pub struct Process {
    pid: TaskId,
    name: String,
    parent: Option<TaskId>,
    exit_status: AtomicI32,
    // Code of the error that failed the fork, 0 if none.
    fork_error: AtomicI32,
    fork_sema: Semaphore,
    wait_sema: Semaphore,
    free_sema: Semaphore,
    children: SpinNoIrq<Vec<Arc<Process>>>,
    exit_hooks: SpinNoIrq<Vec<ExitHook>>,
}

impl Process {
    fn new(pid: TaskId, name: &str, parent: Option<TaskId>) -> Self {
        Self {
            pid,
            name: name.into(),
            parent,
            exit_status: AtomicI32::new(0),
            fork_error: AtomicI32::new(0),
            fork_sema: Semaphore::new(0),
            wait_sema: Semaphore::new(0),
            free_sema: Semaphore::new(0),
            children: SpinNoIrq::new(Vec::new()),
            exit_hooks: SpinNoIrq::new(Vec::new()),
        }
    }

    /// Turns the current task into the first process.
    ///
    /// Nobody waits for this process, so its exit does not block.
    pub fn new_init(name: &str) -> KResult<Arc<Self>> {
        let pid = ktask::current();
        ensure!(
            table::find(pid).is_none(),
            k_err!(AlreadyExists, "task is already a process")
        );
        let init = Arc::new(Self::new(pid, name, None));
        table::insert(init.clone());
        init.reap_on_task_end();
        info!("{name}: init process {pid}");
        Ok(init)
    }

    /// Returns the process of the current task.
    pub fn current() -> KResult<Arc<Self>> {
        match table::find(ktask::current()) {
            Some(process) => Ok(process),
            None => k_err!(NotFound, "current task is not a process"),
        }
    }

    pub fn pid(&self) -> TaskId {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pid of the parent, or `None` for the first process.
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// Pids of the children that have not been waited for.
    pub fn children(&self) -> Vec<TaskId> {
        self.children.lock().iter().map(|c| c.pid).collect()
    }

    /// Registers `hook` to run when this process exits, before its parent
    /// is woken.
    ///
    /// Hooks release what the process owns (open files and the like) and run
    /// in the exiting task, so they may block.
    pub fn at_exit(&self, hook: impl FnOnce() + Send + 'static) {
        self.exit_hooks.lock().push(Box::new(hook));
    }

    /// Creates a child process and waits until it has copied what it needs
    /// from this one.
    ///
    /// The child runs `duplicate` first. If that fails, the error is returned
    /// here and the child is reaped. Otherwise the child goes on with `main`
    /// and exits with the status `main` returns.
    ///
    /// # Arguments
    /// * `name` - Name of the child task and process
    /// * `duplicate` - Copies the parent's resources into the child
    /// * `main` - What the child runs afterwards
    pub fn fork<D, M>(self: &Arc<Self>, name: &str, duplicate: D, main: M) -> KResult<TaskId>
    where
        D: FnOnce(&Arc<Process>) -> KResult + Send + 'static,
        M: FnOnce() -> i32 + Send + 'static,
    {
        self.ensure_current()?;
        let builder = TaskBuilder::new(name);
        let pid = builder.id();
        let child = Arc::new(Self::new(pid, name, Some(self.pid)));
        self.children.lock().push(child.clone());
        table::insert(child.clone());

        let c = child.clone();
        builder.spawn(move || c.run_child(duplicate, main));

        child.fork_sema.acquire();
        if let Ok(e) = KError::try_from_i32(child.fork_error.load(Ordering::Acquire)) {
            self.wait(pid)?;
            return Err(e);
        }
        debug!("{}: forked {} as {pid}", self.name, child.name);
        Ok(pid)
    }

    fn run_child<D, M>(self: Arc<Self>, duplicate: D, main: M)
    where
        D: FnOnce(&Arc<Process>) -> KResult,
        M: FnOnce() -> i32,
    {
        self.reap_on_task_end();
        if let Err(e) = duplicate(&self) {
            info!("{}: fork failed: {e}", self.name);
            self.fork_error.store(e.code(), Ordering::Release);
            self.exit_status.store(TID_ERROR, Ordering::Release);
            self.fork_sema.release();
            self.terminate();
        }
        self.fork_sema.release();
        let status = main();
        self.exit(status);
    }

    /// Waits for the child `pid` to exit and returns its exit status.
    ///
    /// Each child can be waited for once. Returns
    /// [`NoSuchProcess`](kerrno::KErrorKind::NoSuchProcess) without blocking
    /// if `pid` is not a child of this process or was already waited for.
    pub fn wait(&self, pid: TaskId) -> KResult<i32> {
        self.ensure_current()?;
        let child = self.children.lock().iter().find(|c| c.pid == pid).cloned();
        let Some(child) = child else {
            k_bail!(NoSuchProcess, pid);
        };

        child.wait_sema.acquire();
        let status = child.exit_status.load(Ordering::Acquire);
        self.children.lock().retain(|c| c.pid != pid);
        child.free_sema.release();
        Ok(status)
    }

    /// Like [`wait`](Self::wait), with failures folded into `-1` as the
    /// system call reports them.
    pub fn wait_status(&self, pid: TaskId) -> i32 {
        self.wait(pid).unwrap_or(-1)
    }

    /// Terminates the current process with `status`.
    ///
    /// # Panics
    ///
    /// Panics if called from another task than the process's own.
    pub fn exit(&self, status: i32) -> ! {
        assert_eq!(
            self.pid,
            ktask::current(),
            "{} exited on behalf of another task",
            self.name
        );
        self.exit_status.store(status, Ordering::Release);
        info!("{}: exit({status})", self.name);
        self.terminate()
    }

    fn terminate(&self) -> ! {
        let hooks = core::mem::take(&mut *self.exit_hooks.lock());
        for hook in hooks {
            hook();
        }

        self.release_orphans();
        if self.parent.is_some() {
            self.wait_sema.release();
            self.free_sema.acquire();
        }
        table::remove(self.pid);
        ktask::exit()
    }

    // Registered by the process's own task, so the table entry and the
    // orphans are dealt with even if `exit` is never called.
    fn reap_on_task_end(self: &Arc<Self>) {
        let this = self.clone();
        ktask::on_exit(move || {
            this.release_orphans();
            table::remove(this.pid);
        });
    }

    // Children never waited for are released up front, so they finish
    // without anyone reading their status.
    fn release_orphans(&self) {
        let orphans = core::mem::take(&mut *self.children.lock());
        for orphan in orphans {
            debug!("{}: orphaning {}", self.name, orphan.pid);
            orphan.free_sema.release();
        }
    }

    fn ensure_current(&self) -> KResult {
        ensure!(
            self.pid == ktask::current(),
            k_err!(OperationNotPermitted, "not the calling process")
        );
        Ok(())
    }
}
