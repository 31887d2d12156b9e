//! WorkerPool: a fixed set of OS threads executing tasks from a [`TaskQueue`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error, info};

use super::queue::TaskQueue;

/// Error type for worker pool construction.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A pool needs at least one worker to make progress.
    #[error("worker pool needs at least one thread")]
    NoWorkers,

    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Executes one task on a worker thread.
///
/// Implementations are shared by every worker, so they must be `Sync`, and
/// they run without any pool lock held.
pub trait TaskHandler<T>: Send + Sync + 'static {
    fn handle(&self, task: T);
}

impl<T, F> TaskHandler<T> for F
where
    F: Fn(T) + Send + Sync + 'static,
{
    fn handle(&self, task: T) {
        self(task)
    }
}

/// Owns N worker threads and the queue they drain.
///
/// Dropping the pool shuts it down and joins every worker.  Tasks that are
/// already running finish; tasks still queued are discarded.
pub struct WorkerPool<T: Send + 'static> {
    queue: Arc<TaskQueue<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `thread_count` workers that pull from `queue` and run each task
    /// through `handler`.
    ///
    /// The queue is passed in rather than created here so that the handler
    /// itself can hold a clone of it and enqueue follow-up tasks.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NoWorkers`] if `thread_count` is zero.
    /// - [`PoolError::Spawn`] if a thread cannot be created; any workers that
    ///   did start are shut down and joined before returning.
    pub fn spawn<H>(
        thread_count: usize,
        queue: Arc<TaskQueue<T>>,
        handler: H,
    ) -> Result<Self, PoolError>
    where
        H: TaskHandler<T>,
    {
        if thread_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let handler = Arc::new(handler);
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(thread_count),
        };

        for index in 0..thread_count {
            let queue = Arc::clone(&pool.queue);
            let handler = Arc::clone(&handler);
            let spawned = std::thread::Builder::new()
                .name(format!("gdmp-worker-{index}"))
                .spawn(move || worker_loop(index, &queue, handler.as_ref()));
            match spawned {
                Ok(worker) => pool.workers.push(worker),
                Err(source) => {
                    pool.shutdown_and_join();
                    return Err(PoolError::Spawn { index, source });
                }
            }
        }

        info!("worker pool started with {thread_count} threads");
        Ok(pool)
    }

    /// Enqueues a task.  Returns `false` once the pool is shutting down.
    pub fn submit(&self, task: T) -> bool {
        self.queue.enqueue(task)
    }

    /// Number of worker threads still owned by the pool.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Requests shutdown without waiting for the workers to exit.
    pub fn shutdown(&self) {
        let discarded = self.queue.shutdown();
        if discarded > 0 {
            debug!("discarded {discarded} queued task(s) at shutdown");
        }
    }

    /// Requests shutdown and joins every worker thread.
    pub fn shutdown_and_join(&mut self) {
        self.shutdown();
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("gdmp-worker").to_string();
            if worker.join().is_err() {
                error!("{name} terminated by panic");
            }
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// Loop executed by every worker: take a task, run it with no lock held,
/// repeat until the queue reports shutdown.
fn worker_loop<T, H>(index: usize, queue: &TaskQueue<T>, handler: &H)
where
    H: TaskHandler<T> + ?Sized,
{
    debug!("worker {index} started");
    while let Some(task) = queue.dequeue() {
        if catch_unwind(AssertUnwindSafe(|| handler.handle(task))).is_err() {
            error!("worker {index}: task panicked; continuing");
        }
    }
    debug!("worker {index} exiting");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier, Mutex};
    use std::time::Duration;

    #[test]
    fn test_spawn_rejects_zero_threads() {
        let result = WorkerPool::spawn(0, Arc::new(TaskQueue::new()), |_: u32| {});
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_spawn_creates_requested_thread_count() {
        let pool = WorkerPool::spawn(4, Arc::new(TaskQueue::new()), |_: u32| {}).unwrap();
        assert_eq!(pool.thread_count(), 4);
    }

    #[test]
    fn test_every_submitted_task_runs_exactly_once() {
        // Arrange
        let executed = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        let counter = Arc::clone(&executed);
        let pool = WorkerPool::spawn(3, Arc::new(TaskQueue::new()), move |n: usize| {
            counter.fetch_add(1, Ordering::SeqCst);
            done_tx.lock().unwrap().send(n).unwrap();
        })
        .unwrap();

        // Act
        for n in 0..100 {
            assert!(pool.submit(n));
        }
        let mut seen: Vec<usize> = (0..100)
            .map(|_| done_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();

        // Assert
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert_eq!(executed.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_single_worker_executes_in_fifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        let sink = Arc::clone(&order);
        let pool = WorkerPool::spawn(1, Arc::new(TaskQueue::new()), move |n: u32| {
            sink.lock().unwrap().push(n);
            done_tx.lock().unwrap().send(()).unwrap();
        })
        .unwrap();

        for n in 0..10 {
            pool.submit(n);
        }
        for _ in 0..10 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_tasks_run_without_queue_lock_held() {
        // Two tasks rendezvous on a barrier: this only completes if both run
        // concurrently on different workers.
        let barrier = Arc::new(Barrier::new(2));
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        let shared = Arc::clone(&barrier);
        let pool = WorkerPool::spawn(2, Arc::new(TaskQueue::new()), move |_: u32| {
            shared.wait();
            done_tx.lock().unwrap().send(()).unwrap();
        })
        .unwrap();

        pool.submit(1);
        pool.submit(2);

        for _ in 0..2 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        let pool = WorkerPool::spawn(1, Arc::new(TaskQueue::new()), move |n: u32| {
            if n == 0 {
                panic!("task failure");
            }
            done_tx.lock().unwrap().send(n).unwrap();
        })
        .unwrap();

        pool.submit(0);
        pool.submit(7);

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_shutdown_and_join_discards_queued_tasks() {
        // Arrange: one worker blocked inside a task while more tasks queue up
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executed);
        let mut pool = WorkerPool::spawn(1, Arc::new(TaskQueue::new()), move |_: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            started_tx.lock().unwrap().send(()).unwrap();
            let _ = release_rx.lock().unwrap().recv();
        })
        .unwrap();
        pool.submit(1);
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.submit(2);
        pool.submit(3);

        // Act: request shutdown, then let the in-flight task finish
        pool.shutdown();
        release_tx.send(()).unwrap();
        pool.shutdown_and_join();

        // Assert: only the in-flight task ran
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.thread_count(), 0);
        assert!(!pool.submit(4));
    }

    #[test]
    fn test_drop_joins_idle_workers() {
        let queue = Arc::new(TaskQueue::new());
        let pool = WorkerPool::spawn(3, Arc::clone(&queue), |_: u32| {}).unwrap();

        drop(pool);

        assert!(queue.is_shutdown());
    }
}
