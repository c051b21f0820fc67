use std::{cell::Cell, rc::Rc};

use ksync::{WaitQueue, Waiter};
use ktask::Priority;

#[derive(Clone)]
struct Probe {
    name: &'static str,
    prio: Rc<Cell<Priority>>,
}

impl Probe {
    fn new(name: &'static str, prio: Priority) -> Self {
        Self {
            name,
            prio: Rc::new(Cell::new(prio)),
        }
    }
}

impl Waiter for Probe {
    fn priority(&self) -> Priority {
        self.prio.get()
    }
}

fn drain(q: &mut WaitQueue<Probe>) -> Vec<&'static str> {
    std::iter::from_fn(|| q.pop_highest()).map(|p| p.name).collect()
}

#[test]
fn pops_highest_first() {
    let mut q = WaitQueue::new();
    q.insert(Probe::new("low", 10));
    q.insert(Probe::new("high", 50));
    q.insert(Probe::new("mid", 30));
    assert_eq!(q.len(), 3);
    assert_eq!(q.highest_priority(), Some(50));
    assert_eq!(drain(&mut q), ["high", "mid", "low"]);
    assert!(q.is_empty());
    assert_eq!(q.highest_priority(), None);
}

#[test]
fn equal_priorities_are_fifo() {
    let mut q = WaitQueue::new();
    for name in ["a", "b", "c"] {
        q.insert(Probe::new(name, 20));
    }
    q.insert(Probe::new("x", 40));
    q.insert(Probe::new("d", 20));
    assert_eq!(drain(&mut q), ["x", "a", "b", "c", "d"]);
}

#[test]
fn priority_raised_while_waiting() {
    let mut q = WaitQueue::new();
    let late = Probe::new("late", 5);
    q.insert(Probe::new("first", 20));
    q.insert(late.clone());
    q.insert(Probe::new("second", 20));

    // A donation lands after insertion.
    late.prio.set(25);
    assert_eq!(q.iter().next().map(|p| p.name), Some("first"));
    assert_eq!(drain(&mut q), ["late", "first", "second"]);
}

#[test]
fn resort_keeps_insertion_order_for_ties() {
    let mut q = WaitQueue::new();
    let a = Probe::new("a", 10);
    let b = Probe::new("b", 30);
    q.insert(a.clone());
    q.insert(b.clone());
    a.prio.set(30);
    q.resort();
    let names: Vec<_> = q.iter().map(|p| p.name).collect();
    assert_eq!(names, ["a", "b"]);
    b.prio.set(10);
    q.resort();
    let names: Vec<_> = q.iter().map(|p| p.name).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn retain_removes_entries() {
    let mut q = WaitQueue::new();
    for (name, prio) in [("a", 1), ("b", 2), ("c", 3)] {
        q.insert(Probe::new(name, prio));
    }
    q.retain(|p| p.name != "b");
    assert_eq!(drain(&mut q), ["c", "a"]);
}
