/// Worker pool - fixed worker threads fed by a bounded lock-free queue
///
/// Workers poll the shared queue. After `idle_spins_before_sleep` empty
/// polls in a row a worker sleeps `idle_sleep` between polls until work
/// shows up again. Shutdown is cooperative: `stop()` clears the running flag
/// and joins, letting in-flight tasks finish but not draining the queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::{self, BoundedRingQueue};
use crate::{engine_bail, engine_error, engine_info, engine_warn};

/// A unit of work executed by a worker thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of queued, not yet started tasks
    pub queue_capacity: usize,
    /// Consecutive empty polls before a worker starts sleeping
    pub idle_spins_before_sleep: u32,
    /// Sleep between polls once idle
    pub idle_sleep: Duration,
    /// Worker thread names are `{prefix}-{index}`
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            idle_spins_before_sleep: 64,
            idle_sleep: Duration::from_millis(1),
            thread_name_prefix: "nebula-worker".to_string(),
        }
    }
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<BoundedRingQueue<Task>>,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a stopped pool
    pub fn new(config: WorkerPoolConfig) -> Self {
        let queue = Arc::new(BoundedRingQueue::new(config.queue_capacity));
        Self {
            config,
            queue,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `thread_count` workers
    ///
    /// # Errors
    ///
    /// - `InitializationFailed` if the pool is already running or a thread
    ///   could not be spawned (already spawned workers are stopped)
    pub fn start(&self, thread_count: usize) -> Result<()> {
        let mut workers = sync::lock(&self.workers, "WorkerPool workers")?;

        if self.running.swap(true, Ordering::AcqRel) {
            engine_bail!("nebula::WorkerPool", Error::InitializationFailed => "WorkerPool is already running");
        }

        for index in 0..thread_count {
            let queue = self.queue.clone();
            let running = self.running.clone();
            let idle_threshold = self.config.idle_spins_before_sleep;
            let idle_sleep = self.config.idle_sleep;

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.config.thread_name_prefix, index))
                .spawn(move || worker_loop(&queue, &running, idle_threshold, idle_sleep));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    self.running.store(false, Ordering::Release);
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    engine_bail!("nebula::WorkerPool", Error::InitializationFailed => "Failed to spawn worker {}: {}", index, e);
                }
            }
        }

        engine_info!("nebula::WorkerPool", "Started {} workers (queue capacity {})", thread_count, self.queue.capacity());
        Ok(())
    }

    /// Signal termination and join every worker
    ///
    /// Tasks still queued are not executed; they are dropped with the pool.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);

        let handles: Vec<_> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        if handles.is_empty() {
            return;
        }

        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                engine_error!("nebula::WorkerPool", "Worker thread terminated abnormally");
            }
        }
        engine_info!("nebula::WorkerPool", "Stopped {} workers", count);
    }

    /// Enqueue a task, handing it back if the queue is full
    pub fn try_submit(&self, task: Task) -> std::result::Result<(), Task> {
        self.queue.enqueue(task)
    }

    /// Enqueue a task
    ///
    /// Returns `false` if the queue is full; the task is dropped and the
    /// caller decides whether to retry.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.try_submit(Box::new(task)).is_ok() {
            true
        } else {
            engine_warn!("nebula::WorkerPool", "Job queue full ({} tasks), task rejected", self.queue.capacity());
            false
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of live worker threads
    pub fn thread_count(&self) -> usize {
        self.workers.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Best-effort number of tasks waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}

fn worker_loop(
    queue: &BoundedRingQueue<Task>,
    running: &AtomicBool,
    idle_threshold: u32,
    idle_sleep: Duration,
) {
    let mut idle_passes: u32 = 0;

    while running.load(Ordering::Acquire) {
        match queue.dequeue() {
            Some(task) => {
                idle_passes = 0;
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    engine_error!("nebula::WorkerPool", "Task panicked on {:?}", thread::current().name());
                }
            }
            None => {
                idle_passes = idle_passes.saturating_add(1);
                if idle_passes > idle_threshold {
                    thread::sleep(idle_sleep);
                } else {
                    thread::yield_now();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
