//! Reactive Scheduler: queue-based, single-threaded batching.
//!
//! A tracked write never flushes synchronously. It moves the instance from
//! Clean to Pending, pushes it on the queue, and `run_until_idle` (the
//! single consumer loop, standing in for a microtask drain) performs one
//! flush per queue entry. Writes that land while an instance is already
//! Pending coalesce into the existing entry; writes that land mid-flush are
//! picked up by the remainder of the same pass. Flushes of independent
//! instances interleave in queue order but never nest.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::component::InstanceCore;
use crate::validate::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Clean,
    Pending,
    Flushing,
    Destroyed,
}

#[derive(Default)]
pub struct Scheduler {
    queue: RefCell<VecDeque<Weak<InstanceCore>>>,
}

impl Scheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Scheduler::default())
    }

    pub(crate) fn enqueue(&self, instance: Weak<InstanceCore>) {
        self.queue.borrow_mut().push_back(instance);
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Drains the queue, flushing one instance per entry. Destroyed or
    /// dropped instances are skipped. A statement body error stops the
    /// drain and is returned; remaining entries stay queued.
    pub fn run_until_idle(&self) -> Result<(), RuntimeError> {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(weak) = next else {
                return Ok(());
            };
            if let Some(instance) = weak.upgrade() {
                instance.flush()?;
            }
        }
    }
}
