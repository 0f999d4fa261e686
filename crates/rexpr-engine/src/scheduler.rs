//! Cooperative FIFO task queue.
//!
//! Deferred work (convergence re-checks, member hop binding, tracker
//! flushes) is enqueued here and drained by [`Scheduler::run_until_idle`].
//! Tasks run in the order they were deferred; a task may defer more tasks.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::error::{EngineError, EngineResult};

type Task = Box<dyn FnOnce()>;

pub struct Scheduler {
    queue: RefCell<VecDeque<Task>>,
    running: Cell<bool>,
    max_steps: usize,
}

impl Scheduler {
    pub fn new(max_steps: usize) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            running: Cell::new(false),
            max_steps,
        }
    }

    /// Enqueue `task` for the next drain.
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Drain the queue until it is empty.
    ///
    /// A nested call while a drain is already in progress returns at once;
    /// the outer drain picks up whatever was enqueued. Draining more than
    /// `max_steps` tasks stops with [`EngineError::Stalled`] and leaves the
    /// remaining tasks queued.
    pub fn run_until_idle(&self) -> EngineResult<usize> {
        if self.running.replace(true) {
            return Ok(0);
        }
        let mut steps = 0;
        let result = loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break Ok(steps);
            };
            if steps >= self.max_steps {
                self.queue.borrow_mut().push_front(task);
                break Err(EngineError::Stalled { steps });
            }
            steps += 1;
            task();
        };
        self.running.set(false);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_tasks_run_in_registration_order() {
        let scheduler = Rc::new(Scheduler::new(100));
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            scheduler.defer(move || log.borrow_mut().push(i));
        }
        assert_eq!(scheduler.run_until_idle().unwrap(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_tasks_deferred_during_drain_run_after_queued_ones() {
        let scheduler = Rc::new(Scheduler::new(100));
        let log = Rc::new(RefCell::new(Vec::new()));
        let (s, l) = (Rc::clone(&scheduler), Rc::clone(&log));
        scheduler.defer(move || {
            l.borrow_mut().push("first");
            let l = Rc::clone(&l);
            s.defer(move || l.borrow_mut().push("deferred"));
        });
        let l = Rc::clone(&log);
        scheduler.defer(move || l.borrow_mut().push("second"));
        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second", "deferred"]);
    }

    #[test]
    fn test_nested_drain_is_a_no_op() {
        let scheduler = Rc::new(Scheduler::new(100));
        let s = Rc::clone(&scheduler);
        scheduler.defer(move || {
            assert_eq!(s.run_until_idle().unwrap(), 0);
        });
        assert_eq!(scheduler.run_until_idle().unwrap(), 1);
    }

    #[test]
    fn test_runaway_queue_stalls() {
        fn forever(s: Rc<Scheduler>) {
            let next = Rc::clone(&s);
            s.defer(move || forever(next));
        }
        let scheduler = Rc::new(Scheduler::new(10));
        forever(Rc::clone(&scheduler));
        match scheduler.run_until_idle() {
            Err(EngineError::Stalled { steps }) => assert_eq!(steps, 10),
            other => panic!("expected stall, got {other:?}"),
        }
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.pending(), 1);
    }
}
