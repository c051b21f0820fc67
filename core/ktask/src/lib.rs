// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! A strict-priority task runtime for a single logical CPU.
//!
//! Tasks are backed by OS threads, but exactly one of them runs at a time:
//! the scheduler hands the CPU from thread to thread at blocking points,
//! yields and preemption checks. The ready task with the highest effective
//! priority always runs next, FIFO among equal priorities.
//!
//! This crate is the scheduler behind [`ksync`]: it implements
//! [`ksync::SchedulerIf`], so semaphores, locks and condition variables block
//! and wake tasks through it.
//!
//! # Examples
//!
//! ```
//! use ksync::Semaphore;
//! use std::sync::Arc;
//!
//! ktask::boot(|| {
//!     let sem = Arc::new(Semaphore::new(0));
//!     let s = sem.clone();
//!     let child = ktask::TaskBuilder::new("child")
//!         .priority(40)
//!         .spawn(move || s.release());
//!     sem.acquire();
//!     child.join();
//! });
//! ```

#[macro_use]
extern crate log;

mod api;
pub mod irq;
mod run_queue;
mod sched_if;
mod task;

pub use self::{
    api::{
        base_priority, block_current, boot, current, exit, get_priority, maybe_preempt,
        on_exit, priority_of, set_priority, spawn, task_state, unblock, yield_now,
    },
    task::{JoinHandle, TaskBuilder},
};
pub use ktypes::{PRI_DEFAULT, PRI_MAX, PRI_MIN, Priority, TaskId, TaskState};
