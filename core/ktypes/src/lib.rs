// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Vocabulary shared between the scheduler and the synchronization core.
//!
//! Execution contexts are owned by the scheduler and addressed everywhere
//! else through a [`TaskId`] handle. Nothing in this crate owns a task.

#![no_std]

use core::fmt;

/// Scheduling priority. Larger values run first.
pub type Priority = u8;

/// Lowest priority.
pub const PRI_MIN: Priority = 0;
/// Priority of the initial task and of tasks spawned without an explicit one.
pub const PRI_DEFAULT: Priority = 31;
/// Highest priority.
pub const PRI_MAX: Priority = 63;

/// Stable handle of an execution context.
///
/// Identifiers are never reused, so a stale handle can only fail an
/// existence check, never alias a newer task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduler-visible state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Currently owns the CPU.
    Running,
    /// Waiting in the ready queue.
    Ready,
    /// Suspended until explicitly unblocked.
    Blocked,
    /// Finished; the handle only survives in stale references.
    Exited,
}
