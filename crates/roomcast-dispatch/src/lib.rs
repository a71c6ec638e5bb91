//! Single-writer task queue for Roomcast.
//!
//! Every mutation of room state and every event publication runs inside a
//! task drained from this queue, on one owning execution context. The
//! network receive loop and any caller on a foreign thread only ever
//! [`enqueue`](Dispatcher::enqueue); they never touch shared state
//! themselves. That one rule replaces per-field locking everywhere else.
//!
//! # Integration
//!
//! The owner pumps the queue in a plain loop:
//!
//! ```ignore
//! loop {
//!     dispatcher.wait().await;
//!     dispatcher.drain();
//! }
//! ```
//!
//! A host application with its own frame loop can skip `wait` and call
//! [`drain`](Dispatcher::drain) once per frame instead.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;
use tracing::{error, trace};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO queue of deferred units of work, drained in batches.
///
/// One instance per process, constructed explicitly and handed to the
/// components that need it. Never a global.
#[derive(Default)]
pub struct Dispatcher {
    queue: Mutex<VecDeque<Task>>,
    bell: Notify,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task to the queue. Callable from any thread, never blocks.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.push_back(Box::new(task));
        }
        self.bell.notify_one();
    }

    /// Runs every task that was queued at the moment this call began.
    ///
    /// Tasks enqueued *during* the drain land in the queue for the next
    /// drain, so a task that keeps scheduling follow-ups cannot stall the
    /// owner forever. A panicking task is caught and logged; the rest of
    /// the batch still runs. Returns the number of tasks executed.
    ///
    /// Must only be called from the owning context. Nothing enforces that
    /// here; the single-caller discipline is the whole contract.
    pub fn drain(&self) -> usize {
        let batch: Vec<Task> = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.drain(..).collect()
        };
        let count = batch.len();

        for task in batch {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
                error!(reason = panic_message(&panic), "dispatched task panicked");
            }
        }

        if count > 0 {
            trace!(count, "drained dispatch queue");
        }
        count
    }

    /// Resolves once the queue is non-empty. Never consumes tasks itself.
    pub async fn wait(&self) {
        loop {
            if !self.is_empty() {
                return;
            }
            self.bell.notified().await;
        }
    }

    /// Number of tasks currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` if no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
