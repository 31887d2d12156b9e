//! Thread-safe FIFO of pending tasks.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Unbounded FIFO shared by every producer and every worker.
///
/// Once [`shutdown`](TaskQueue::shutdown) has been called the queue refuses
/// new tasks and [`dequeue`](TaskQueue::dequeue) returns `None` to every
/// caller, even if tasks were still pending.
#[derive(Debug)]
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

#[derive(Debug)]
struct QueueState<T> {
    tasks: VecDeque<T>,
    shutdown: bool,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends `task` and wakes one waiting worker.
    ///
    /// Returns `false` (dropping the task) if the queue has been shut down.
    pub fn enqueue(&self, task: T) -> bool {
        let mut state = self.lock();
        if state.shutdown {
            return false;
        }
        state.tasks.push_back(task);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Blocks until a task is available or the queue is shut down.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes the next task without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        if state.shutdown {
            return None;
        }
        state.tasks.pop_front()
    }

    /// Sets the shutdown flag, wakes every waiter and discards pending tasks.
    ///
    /// Returns the number of tasks that were discarded unexecuted.  Calling
    /// this more than once is harmless.
    pub fn shutdown(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            state.shutdown = true;
            std::mem::take(&mut state.tasks)
        };
        self.available.notify_all();
        discarded.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    // Tasks never run under this lock, so a poisoned guard still holds a
    // consistent queue.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
