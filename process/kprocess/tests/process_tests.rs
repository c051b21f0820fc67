use std::sync::{Arc, Mutex as StdMutex};

use kerrno::{KError, k_err};
use kprocess::{Process, TID_ERROR};
use ksync::{Mutex, Semaphore};
use ktask::{PRI_DEFAULT, TaskId};

#[test]
fn wait_in_any_order() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        let pids: Vec<_> = [3, 1, 2]
            .into_iter()
            .map(|status| init.fork("child", |_| Ok(()), move || status).unwrap())
            .collect();
        assert_eq!(init.children(), pids);

        assert_eq!(init.wait(pids[1]), Ok(1));
        assert_eq!(init.wait(pids[2]), Ok(2));
        assert_eq!(init.wait_status(pids[0]), 3);
        assert!(init.children().is_empty());

        // Let the reaped children finish.
        ktask::yield_now();
        for pid in pids {
            assert!(kprocess::find(pid).is_none());
        }
    });
}

#[test]
fn wait_blocks_until_exit() {
    ktask::boot(|| {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let init = Process::new_init("init").unwrap();

        let l = log.clone();
        let pid = init
            .fork(
                "child",
                |_| Ok(()),
                move || {
                    ktask::yield_now();
                    l.lock().unwrap().push("child");
                    Process::current().unwrap().exit(9)
                },
            )
            .unwrap();
        log.lock().unwrap().push("forked");
        assert_eq!(init.wait(pid), Ok(9));
        log.lock().unwrap().push("reaped");
        assert_eq!(*log.lock().unwrap(), ["forked", "child", "reaped"]);
    });
}

#[test]
fn child_is_waited_once() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        let pid = init.fork("child", |_| Ok(()), || 0).unwrap();
        assert_eq!(init.wait(pid), Ok(0));
        assert_eq!(init.wait(pid), Err(KError::NoSuchProcess));
        assert_eq!(init.wait_status(pid), -1);
    });
}

#[test]
fn wait_on_non_child_fails() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        assert_eq!(init.wait(init.pid()), Err(KError::NoSuchProcess));
        assert_eq!(init.wait_status(TaskId::new(u64::MAX)), -1);
        assert!(init.children().is_empty());
    });
}

#[test]
fn only_the_process_itself_may_wait() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        let me = init.clone();
        let pid = init
            .fork(
                "child",
                |_| Ok(()),
                move || {
                    let own = Process::current().unwrap();
                    assert_eq!(own.parent(), Some(me.pid()));
                    assert_eq!(me.wait(own.pid()), Err(KError::OperationNotPermitted));
                    0
                },
            )
            .unwrap();
        assert_eq!(init.wait(pid), Ok(0));
    });
}

#[test]
fn failed_fork_is_reaped() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        let res = init.fork("child", |_| k_err!(NoMemory), || unreachable!());
        assert_eq!(res, Err(KError::NoMemory));
        assert!(init.children().is_empty());

        let pid = init.fork("child", |_| Ok(()), || TID_ERROR - 1).unwrap();
        assert_eq!(init.wait(pid), Ok(TID_ERROR - 1));
    });
}

#[test]
fn child_runs_at_default_priority() {
    ktask::boot(|| {
        ktask::set_priority(40);
        let init = Process::new_init("init").unwrap();
        let pid = init.fork("child", |_| Ok(()), || 0).unwrap();
        assert_eq!(ktask::priority_of(pid), Some(PRI_DEFAULT));
        assert_eq!(init.wait(pid), Ok(0));
    });
}

#[test]
fn orphans_are_released() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        let grandchildren = Arc::new(StdMutex::new(Vec::new()));

        let g = grandchildren.clone();
        let pid = init
            .fork(
                "parent",
                |_| Ok(()),
                move || {
                    let me = Process::current().unwrap();
                    for status in [5, 6] {
                        let pid = me.fork("orphan", |_| Ok(()), move || status).unwrap();
                        g.lock().unwrap().push(pid);
                    }
                    assert_eq!(me.children().len(), 2);
                    0
                },
            )
            .unwrap();
        assert_eq!(init.wait(pid), Ok(0));

        ktask::yield_now();
        assert!(kprocess::find(pid).is_none());
        let grandchildren = grandchildren.lock().unwrap();
        assert_eq!(grandchildren.len(), 2);
        for &orphan in grandchildren.iter() {
            assert!(kprocess::find(orphan).is_none());
        }
    });
}

#[derive(Default)]
struct FakeFs {
    open: Vec<TaskId>,
}

#[test]
fn exit_hooks_release_resources() {
    ktask::boot(|| {
        let fs = Arc::new(Mutex::new(FakeFs::default()));
        let init = Process::new_init("init").unwrap();

        let f = fs.clone();
        let pid = init
            .fork(
                "child",
                move |child| {
                    let pid = child.pid();
                    f.lock().open.push(pid);
                    child.at_exit(move || f.lock().open.retain(|&p| p != pid));
                    Ok(())
                },
                // Stay alive until the parent has checked the open files.
                || {
                    ktask::yield_now();
                    0
                },
            )
            .unwrap();
        assert_eq!(fs.lock().open, [pid]);
        assert_eq!(init.wait(pid), Ok(0));
        assert!(fs.lock().open.is_empty());
    });
}

#[test]
fn current_requires_a_process() {
    ktask::boot(|| {
        assert_eq!(Process::current().err(), Some(KError::NotFound));
        let init = Process::new_init("init").unwrap();
        assert_eq!(Process::current().map(|p| p.pid()), Ok(init.pid()));
        assert_eq!(
            Process::new_init("again").err(),
            Some(KError::AlreadyExists)
        );
    });
}

#[test]
fn root_process_exit_does_not_block() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        let child = init.fork("child", |_| Ok(()), || 0).unwrap();
        assert_eq!(init.children(), [child]);
        init.exit(0)
    });
}

#[test]
fn init_returning_releases_its_children() {
    let mut pids = Vec::new();
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        pids.push(init.pid());
        pids.push(init.fork("done", |_| Ok(()), || 3).unwrap());
        pids.push(
            init.fork(
                "running",
                |_| Ok(()),
                || {
                    ktask::yield_now();
                    4
                },
            )
            .unwrap(),
        );
        assert_eq!(init.children(), pids[1..]);
    });
    for pid in pids {
        assert!(kprocess::find(pid).is_none());
    }
}

#[test]
fn parent_task_ending_without_exit_releases_orphans() {
    ktask::boot(|| {
        let init = Process::new_init("init").unwrap();
        let orphan = Arc::new(StdMutex::new(None));
        let ended = Arc::new(Semaphore::new(0));

        let (o, e) = (orphan.clone(), ended.clone());
        let pid = init
            .fork(
                "parent",
                |_| Ok(()),
                move || {
                    ktask::on_exit(move || e.release());
                    let me = Process::current().unwrap();
                    *o.lock().unwrap() = Some(me.fork("orphan", |_| Ok(()), || 5).unwrap());
                    // Leave the task without going through `Process::exit`.
                    ktask::exit()
                },
            )
            .unwrap();
        ended.acquire();
        ktask::yield_now();

        assert!(kprocess::find(pid).is_none());
        let orphan = orphan.lock().unwrap().unwrap();
        assert!(kprocess::find(orphan).is_none());
        // Never reached the exit rendezvous, so it is still listed.
        assert_eq!(init.children(), [pid]);
    });
}
