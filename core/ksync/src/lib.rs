// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Kernel synchronization primitives with priority donation.
//!
//! This crate provides blocking synchronization primitives for kernel tasks:
//!
//! - [`Semaphore`]: Counting semaphore that wakes waiters by priority
//! - [`Lock`]: Owned binary lock whose waiters donate priority to the holder
//! - [`Mutex`]: [`lock_api`] mutex backed by [`Lock`]
//! - [`Condvar`]: Mesa-style condition variable over a [`Lock`]
//! - [`WaitQueue`]: Priority-ordered queue of waiters
//!
//! The primitives do not schedule anything themselves. They consume the
//! [`SchedulerIf`] interface, which the task crate implements.
//!
//! # Examples
//!
//! ## Mutex
//! ```rust,ignore
//! use ksync::Mutex;
//!
//! static DATA: Mutex<Vec<u8>> = Mutex::new(Vec::new());
//!
//! fn task() {
//!     let mut data = DATA.lock();
//!     data.push(42);
//! }
//! ```
//!
//! ## Condition variable
//! ```rust,ignore
//! use ksync::{Condvar, Mutex};
//!
//! static READY: Mutex<bool> = Mutex::new(false);
//! static CV: Condvar = Condvar::new();
//!
//! fn consumer() {
//!     let _ready = CV.wait_while(&READY, |ready| !*ready);
//! }
//!
//! fn producer() {
//!     let mut ready = READY.lock();
//!     *ready = true;
//!     CV.broadcast_guard(&ready);
//! }
//! ```
//!
//! ## Semaphore
//! ```rust,ignore
//! use ksync::Semaphore;
//!
//! static SEM: Semaphore = Semaphore::new(3);
//!
//! fn task() {
//!     let _guard = SEM.acquire_guard();
//!     // permit released when the guard is dropped
//! }
//! ```
//!
//! # Features
//!
//! - `smp`: Guard primitive state with real spinlocks instead of IRQ masking only
//! - `stats`: Enable lock statistics tracking (acquisitions, contention, donations)

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;
extern crate alloc;

pub use kspin as spin;

mod condvar;
mod donation;
mod lock;
mod sched;
mod semaphore;
mod wait_queue;

#[cfg(feature = "stats")]
pub use self::lock::LockStats;
pub use self::{
    condvar::Condvar,
    donation::{
        DonationPolicy, MAX_DONATION_DEPTH, donation_policy, refresh_priority, set_donation_policy,
    },
    lock::{Lock, Mutex, MutexGuard},
    sched::SchedulerIf,
    semaphore::{Semaphore, SemaphoreGuard},
    wait_queue::{WaitQueue, Waiter},
};
