use std::sync::{Arc, Mutex as StdMutex};

use ksync::{DonationPolicy, Lock, Semaphore};
use ktask::{self as thread, PRI_DEFAULT, TaskBuilder};

type Log = Arc<StdMutex<Vec<&'static str>>>;

fn new_log() -> Log {
    Arc::new(StdMutex::new(Vec::new()))
}

fn record(log: &Log, what: &'static str) {
    log.lock().unwrap().push(what);
}

/// Spawns a task at `prio` that takes `lock`, records `name` and releases it.
fn contend(lock: &Arc<Lock>, log: &Log, name: &'static str, prio: u8) -> ktask::JoinHandle<()> {
    let (lock, log) = (lock.clone(), log.clone());
    TaskBuilder::new(name).priority(prio).spawn(move || {
        lock.acquire();
        record(&log, name);
        lock.release();
    })
}

#[test]
fn donate_one() {
    thread::boot(|| {
        let lock = Arc::new(Lock::new());
        let log = new_log();
        lock.acquire();

        let h1 = contend(&lock, &log, "acquire1", PRI_DEFAULT + 1);
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 1);
        let h2 = contend(&lock, &log, "acquire2", PRI_DEFAULT + 2);
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 2);
        assert_eq!(thread::base_priority(), PRI_DEFAULT);

        lock.release();
        assert_eq!(*log.lock().unwrap(), ["acquire2", "acquire1"]);
        assert_eq!(thread::get_priority(), PRI_DEFAULT);
        h1.join();
        h2.join();
    });
}

#[test]
fn donate_multiple() {
    thread::boot(|| {
        let (a, b) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
        let log = new_log();
        a.acquire();
        b.acquire();

        let ha = contend(&a, &log, "a", PRI_DEFAULT + 1);
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 1);
        let hb = contend(&b, &log, "b", PRI_DEFAULT + 2);
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 2);

        // Only the donation made through `b` goes away.
        b.release();
        assert_eq!(*log.lock().unwrap(), ["b"]);
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 1);

        a.release();
        assert_eq!(*log.lock().unwrap(), ["b", "a"]);
        assert_eq!(thread::get_priority(), PRI_DEFAULT);
        ha.join();
        hb.join();
    });
}

#[test]
fn donate_nest() {
    thread::boot(|| {
        let (a, b) = (Arc::new(Lock::new()), Arc::new(Lock::new()));
        let log = new_log();
        a.acquire();

        let (ma, mb, mlog) = (a.clone(), b.clone(), log.clone());
        let medium = TaskBuilder::new("medium")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || {
                mb.acquire();
                ma.acquire();
                record(&mlog, "medium got a");
                ma.release();
                mb.release();
                record(&mlog, "medium done");
            });
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 1);

        let high = contend(&b, &log, "high", PRI_DEFAULT + 2);
        // High's priority flows through medium down to us.
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 2);
        assert_eq!(thread::priority_of(medium.id()), Some(PRI_DEFAULT + 2));

        a.release();
        assert_eq!(
            *log.lock().unwrap(),
            ["medium got a", "high", "medium done"]
        );
        assert_eq!(thread::get_priority(), PRI_DEFAULT);
        assert_eq!(thread::priority_of(medium.id()), Some(PRI_DEFAULT + 1));
        medium.join();
        high.join();
    });
}

/// Builds a chain: task `i` holds `locks[i]` and blocks on `locks[i - 1]`;
/// the caller holds `locks[0]`.
fn build_chain(locks: &[Arc<Lock>], log: &Log) -> Vec<ktask::JoinHandle<()>> {
    const NAMES: [&str; 8] = ["t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8"];
    (1..locks.len())
        .map(|i| {
            let (own, next) = (locks[i].clone(), locks[i - 1].clone());
            let log = log.clone();
            let name = NAMES[i - 1];
            TaskBuilder::new(name)
                .priority(PRI_DEFAULT + i as u8)
                .spawn(move || {
                    own.acquire();
                    next.acquire();
                    record(&log, name);
                    next.release();
                    own.release();
                })
        })
        .collect()
}

#[test]
fn donation_chain_reaches_root() {
    thread::boot(|| {
        let locks: Vec<_> = (0..6).map(|_| Arc::new(Lock::new())).collect();
        let log = new_log();
        locks[0].acquire();
        let handles = build_chain(&locks, &log);

        let top = contend(&locks[5], &log, "top", 60);
        assert_eq!(thread::get_priority(), 60);
        for h in &handles {
            assert_eq!(thread::priority_of(h.id()), Some(60));
        }

        locks[0].release();
        assert_eq!(*log.lock().unwrap(), ["t1", "t2", "t3", "t4", "t5", "top"]);
        assert_eq!(thread::get_priority(), PRI_DEFAULT);
        for h in handles {
            h.join();
        }
        top.join();
    });
}

#[test]
fn donation_depth_is_bounded() {
    thread::boot(|| {
        ksync::set_donation_policy(DonationPolicy {
            enabled: true,
            max_depth: 2,
        });
        let locks: Vec<_> = (0..4).map(|_| Arc::new(Lock::new())).collect();
        let log = new_log();
        locks[0].acquire();
        let handles = build_chain(&locks, &log);
        // Each donation travels two hops, so t3 stopped at t1.
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 2);
        assert_eq!(thread::priority_of(handles[0].id()), Some(PRI_DEFAULT + 3));

        let top = contend(&locks[3], &log, "top", 60);
        assert_eq!(thread::priority_of(handles[2].id()), Some(60));
        assert_eq!(thread::priority_of(handles[1].id()), Some(60));
        assert_eq!(thread::priority_of(handles[0].id()), Some(PRI_DEFAULT + 3));
        assert_eq!(thread::get_priority(), PRI_DEFAULT + 2);

        locks[0].release();
        assert_eq!(*log.lock().unwrap(), ["t1", "t2", "t3", "top"]);
        for h in handles {
            h.join();
        }
        top.join();
        ksync::set_donation_policy(DonationPolicy::DEFAULT);
    });
}

#[test]
fn donation_disabled() {
    thread::boot(|| {
        ksync::set_donation_policy(DonationPolicy::DISABLED);
        assert_eq!(ksync::donation_policy(), DonationPolicy::DISABLED);

        let lock = Arc::new(Lock::new());
        let log = new_log();
        lock.acquire();
        let h = contend(&lock, &log, "high", 50);
        assert_eq!(thread::get_priority(), PRI_DEFAULT);

        lock.release();
        assert_eq!(*log.lock().unwrap(), ["high"]);
        h.join();
        ksync::set_donation_policy(DonationPolicy::default());
    });
}

#[test]
fn set_priority_keeps_donation() {
    thread::boot(|| {
        let lock = Arc::new(Lock::new());
        let log = new_log();
        lock.acquire();
        let h = contend(&lock, &log, "high", 40);
        assert_eq!(thread::get_priority(), 40);

        thread::set_priority(20);
        assert_eq!(thread::get_priority(), 40);
        assert_eq!(thread::base_priority(), 20);

        thread::set_priority(45);
        assert_eq!(thread::get_priority(), 45);
        thread::set_priority(20);

        lock.release();
        assert_eq!(*log.lock().unwrap(), ["high"]);
        assert_eq!(thread::get_priority(), 20);
        h.join();
    });
}

#[test]
fn donation_reorders_semaphore_waiters() {
    thread::boot(|| {
        let lock = Arc::new(Lock::new());
        let sema = Arc::new(Semaphore::new(0));
        let log = new_log();

        let (l, s, lg) = (lock.clone(), sema.clone(), log.clone());
        let holder = TaskBuilder::new("holder")
            .priority(PRI_DEFAULT + 1)
            .spawn(move || {
                l.acquire();
                s.acquire();
                record(&lg, "holder");
                l.release();
            });
        let (s, lg) = (sema.clone(), log.clone());
        let other = TaskBuilder::new("other")
            .priority(PRI_DEFAULT + 2)
            .spawn(move || {
                s.acquire();
                record(&lg, "other");
            });
        // Raises the holder above `other` while both wait on the semaphore.
        let high = contend(&lock, &log, "high", 50);
        assert_eq!(thread::priority_of(holder.id()), Some(50));

        sema.release();
        sema.release();
        assert_eq!(*log.lock().unwrap(), ["holder", "high", "other"]);
        holder.join();
        other.join();
        high.join();
    });
}
