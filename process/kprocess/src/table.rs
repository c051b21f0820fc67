//! Global table of live processes, keyed by pid.

use std::{collections::BTreeMap, sync::Arc};

use kspin::SpinNoIrq;
use ktypes::TaskId;

use crate::Process;

static PROCESS_TABLE: SpinNoIrq<BTreeMap<TaskId, Arc<Process>>> =
    SpinNoIrq::new(BTreeMap::new());

pub(crate) fn insert(process: Arc<Process>) {
    PROCESS_TABLE.lock().insert(process.pid(), process);
}

pub(crate) fn remove(pid: TaskId) -> Option<Arc<Process>> {
    PROCESS_TABLE.lock().remove(&pid)
}

/// Looks up a live process by pid.
pub fn find(pid: TaskId) -> Option<Arc<Process>> {
    PROCESS_TABLE.lock().get(&pid).cloned()
}

