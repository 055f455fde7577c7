//! Single-threaded cooperative reactor.
//!
//! Work comes in two classes. Normal callbacks run in submission order.
//! Immediate (async) callbacks run ahead of every pending normal callback at
//! the next point the reactor picks work, but never inside another callback.

pub mod clock;

pub use clock::{ClockError, HostClock, ManualClock, McuClock};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use thiserror::Error;

/// Default bound on queued callbacks.
pub const DEFAULT_REACTOR_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("reactor is shut down")]
    Closed,
    #[error("reactor queue is full ({0} callbacks pending)")]
    Full(usize),
}

/// Callback run by the reactor with exclusive access to its context and the
/// event time it was picked at.
pub type ReactorJob<C> = Box<dyn FnOnce(&mut C, f64)>;

struct ScheduledJob<C> {
    id: TaskId,
    priority: Priority,
    job: ReactorJob<C>,
}

impl<C> PartialEq for ScheduledJob<C> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.id == other.id
    }
}
impl<C> Eq for ScheduledJob<C> {}
impl<C> PartialOrd for ScheduledJob<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<C> Ord for ScheduledJob<C> {
    // max-heap: higher priority first, then the older submission
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

pub struct Reactor<C> {
    queue: BinaryHeap<ScheduledJob<C>>,
    next_id: u64,
    capacity: usize,
    closed: bool,
}

impl<C> Reactor<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_id: 0,
            capacity,
            closed: false,
        }
    }

    /// Queue ordinary work behind everything already pending.
    pub fn register_callback(&mut self, job: ReactorJob<C>) -> Result<TaskId, SchedulerError> {
        self.push(Priority::Normal, job)
    }

    /// Queue work that runs before any pending normal callback.
    pub fn register_async_callback(&mut self, job: ReactorJob<C>) -> Result<TaskId, SchedulerError> {
        self.push(Priority::Immediate, job)
    }

    fn push(&mut self, priority: Priority, job: ReactorJob<C>) -> Result<TaskId, SchedulerError> {
        if self.closed {
            return Err(SchedulerError::Closed);
        }
        if self.queue.len() >= self.capacity {
            return Err(SchedulerError::Full(self.queue.len()));
        }
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.queue.push(ScheduledJob { id, priority, job });
        tracing::debug!("Scheduled {:?} callback {}", priority, id.0);
        Ok(id)
    }

    /// Take the next callback to run, if any.
    pub fn pop_next(&mut self) -> Option<(TaskId, Priority, ReactorJob<C>)> {
        self.queue.pop().map(|s| (s.id, s.priority, s.job))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_immediate(&self) -> usize {
        self.queue
            .iter()
            .filter(|s| s.priority == Priority::Immediate)
            .count()
    }

    /// Refuse new work. Already queued callbacks can still be drained.
    pub fn shutdown(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<C> Default for Reactor<C> {
    fn default() -> Self {
        Self::new(DEFAULT_REACTOR_CAPACITY)
    }
}

impl<C> fmt::Debug for Reactor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("pending", &self.queue.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.closed)
            .finish()
    }
}
