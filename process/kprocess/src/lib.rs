// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Process lifecycle on top of [`ktask`] and [`ksync`].
//!
//! A [`Process`] wraps a task with what its parent needs to wait for it: an
//! exit status, the list of children and three semaphores that order the
//! fork, exit and reap steps. Every process is registered in a global table
//! until its task finishes, see [`find`].
//!
//! ```
//! use kprocess::Process;
//!
//! ktask::boot(|| {
//!     let init = Process::new_init("init").unwrap();
//!     let pid = init.fork("child", |_| Ok(()), || 7).unwrap();
//!     assert_eq!(init.wait(pid), Ok(7));
//! });
//! ```

#[macro_use]
extern crate log;

mod process;
mod table;

pub use self::{
    process::{Process, TID_ERROR},
    table::find,
};
