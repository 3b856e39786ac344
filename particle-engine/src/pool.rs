// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Fixed-size worker pool with a blocking range dispatch
//!
//! The pool owns a set of OS threads that pull boxed tasks from a shared
//! queue. It offers three primitives:
//!
//! - [`WorkerPool::submit`]: fire-and-forget enqueue of a `'static` task
//! - [`WorkerPool::dispatch`]: split `[0, n)` into one contiguous slice per
//!   worker, run the remainder slice on the caller, and block until all
//!   slices are done
//! - [`WorkerPool::wait_for_completion`]: block until every submitted task
//!   has finished
//!
//! Idle workers sleep on a condition variable and the completion barrier is a
//! counter guarded by a mutex with its own condition variable, so neither an
//! idle pool nor a waiting caller burns CPU.
//!
//! # Panics in tasks
//!
//! A panicking task does not take its worker down. The payload of the first
//! panic is kept and re-raised on the thread that next calls `dispatch` or
//! `wait_for_completion`, after the barrier has been reached.

use crate::error::{EngineError, Result};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;
type PanicPayload = Box<dyn Any + Send + 'static>;

/// Configuration for worker pool construction
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads to spawn (must be at least 1)
    pub thread_count: usize,
    /// Prefix for worker thread names; the worker index is appended
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            thread_count: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            thread_name: "particle-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with an explicit thread count
    pub fn new(thread_count: usize) -> Self {
        PoolConfig {
            thread_count,
            ..PoolConfig::default()
        }
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Counters for monitoring pool activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks handed to the queue, including dispatch slices
    pub tasks_submitted: usize,
    /// Tasks that ran to completion or panicked
    pub tasks_completed: usize,
    /// Tasks that panicked
    pub tasks_panicked: usize,
    /// Calls to `dispatch`
    pub dispatches: usize,
}

struct Queue {
    tasks: VecDeque<Task>,
    running: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    task_available: Condvar,
    outstanding: Mutex<usize>,
    all_done: Condvar,
    first_panic: Mutex<Option<PanicPayload>>,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    panicked: AtomicUsize,
    dispatches: AtomicUsize,
}

// Tasks run outside every lock and their panics are caught, so a poisoned
// mutex can only come from a panic inside this module's own bookkeeping.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn push(&self, task: Task) {
        *lock(&self.outstanding) += 1;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        lock(&self.queue).tasks.push_back(task);
        self.task_available.notify_one();
    }

    fn finish(&self, outcome: std::result::Result<(), PanicPayload>) {
        if let Err(payload) = outcome {
            self.panicked.fetch_add(1, Ordering::Relaxed);
            let mut slot = lock(&self.first_panic);
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
        self.completed.fetch_add(1, Ordering::Relaxed);

        let mut outstanding = lock(&self.outstanding);
        *outstanding -= 1;
        if *outstanding == 0 {
            self.all_done.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut outstanding = lock(&self.outstanding);
        while *outstanding > 0 {
            outstanding = self
                .all_done
                .wait(outstanding)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn take_panic(&self) -> Option<PanicPayload> {
        lock(&self.first_panic).take()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut queue = lock(&shared.queue);
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                if !queue.running {
                    return;
                }
                queue = shared
                    .task_available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        shared.finish(outcome);
    }
}

/// A fixed set of worker threads consuming a shared task queue
///
/// # Examples
///
/// ```
/// use particle_engine::WorkerPool;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let pool = WorkerPool::new(2).unwrap();
/// let sum = AtomicUsize::new(0);
/// pool.dispatch(100, |start, end| {
///     sum.fetch_add((start..end).sum::<usize>(), Ordering::Relaxed);
/// });
/// assert_eq!(sum.load(Ordering::Relaxed), 4950);
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    thread_count: usize,
}

impl WorkerPool {
    /// Create a pool with `thread_count` workers
    pub fn new(thread_count: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(thread_count))
    }

    /// Create a pool from a configuration
    ///
    /// Fails with [`EngineError::ZeroThreads`] for an empty pool and with
    /// [`EngineError::ThreadSpawn`] if the OS refuses a thread. Workers that
    /// did start are joined before the error is returned.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        if config.thread_count == 0 {
            log::warn!("rejecting worker pool with zero threads");
            return Err(EngineError::ZeroThreads);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                running: true,
            }),
            task_available: Condvar::new(),
            outstanding: Mutex::new(0),
            all_done: Condvar::new(),
            first_panic: Mutex::new(None),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
            dispatches: AtomicUsize::new(0),
        });

        let mut pool = WorkerPool {
            shared,
            workers: Vec::with_capacity(config.thread_count),
            thread_count: config.thread_count,
        };

        for index in 0..config.thread_count {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || worker_loop(&shared))
                .map_err(|err| EngineError::ThreadSpawn {
                    index,
                    reason: err.to_string(),
                })?;
            pool.workers.push(handle);
        }

        log::debug!("worker pool started with {} threads", pool.thread_count);
        Ok(pool)
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Enqueue a task and return immediately
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.push(Box::new(task));
    }

    /// Block until every submitted task has finished
    ///
    /// Must not be called from inside a pool task: the caller would wait for
    /// itself.
    ///
    /// # Panics
    ///
    /// Re-raises the first panic caught in a task since the last barrier.
    pub fn wait_for_completion(&self) {
        self.shared.wait_idle();
        if let Some(payload) = self.shared.take_panic() {
            panic::resume_unwind(payload);
        }
    }

    /// Run `f` over `[0, count)` split into contiguous slices
    ///
    /// Each of the `thread_count` workers receives one slice of
    /// `count / thread_count` elements; the remainder
    /// `[batch * thread_count, count)` runs on the calling thread. Every index
    /// is covered exactly once. Returns only after all slices have finished,
    /// which is what allows `f` to borrow from the caller.
    pub fn dispatch<F>(&self, count: usize, f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        self.dispatch_dyn(count, &f);
    }

    pub(crate) fn dispatch_dyn(&self, count: usize, f: &(dyn Fn(usize, usize) + Sync)) {
        self.shared.dispatches.fetch_add(1, Ordering::Relaxed);
        let threads = self.thread_count;
        let batch = count / threads;

        // SAFETY: the lifetime is only widened for the submitted slices, and
        // this function does not return (or unwind) before `wait_idle` has
        // observed every one of them finish. No copy of the reference
        // outlives the borrow of `f`.
        let f_static: &'static (dyn Fn(usize, usize) + Sync) =
            unsafe { std::mem::transmute(f) };

        if batch > 0 {
            for i in 0..threads {
                let start = batch * i;
                let end = start + batch;
                self.shared.push(Box::new(move || f_static(start, end)));
            }
        }

        let tail_start = batch * threads;
        let inline = if tail_start < count {
            panic::catch_unwind(AssertUnwindSafe(|| f(tail_start, count)))
        } else {
            Ok(())
        };

        self.shared.wait_idle();

        if let Err(payload) = inline {
            panic::resume_unwind(payload);
        }
        if let Some(payload) = self.shared.take_panic() {
            panic::resume_unwind(payload);
        }
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            tasks_submitted: self.shared.submitted.load(Ordering::Relaxed),
            tasks_completed: self.shared.completed.load(Ordering::Relaxed),
            tasks_panicked: self.shared.panicked.load(Ordering::Relaxed),
            dispatches: self.shared.dispatches.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    /// Stop and join every worker
    ///
    /// Tasks still queued are drained first. A task that never returns
    /// blocks the drop forever.
    fn drop(&mut self) {
        lock(&self.shared.queue).running = false;
        self.shared.task_available.notify_all();
        for handle in self.workers.drain(..) {
            // Task panics are caught inside the loop; a join error would mean
            // the loop itself failed and there is nothing left to clean up.
            let _ = handle.join();
        }
        log::debug!("worker pool with {} threads stopped", self.thread_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert!(config.thread_count >= 1);
        assert_eq!(config.thread_name, "particle-worker");

        let config = PoolConfig::new(3).with_thread_name("physics");
        assert_eq!(config.thread_count, 3);
        assert_eq!(config.thread_name, "physics");
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(EngineError::ZeroThreads)));
    }

    #[test]
    fn test_submit_and_wait() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_for_completion();

        assert_eq!(counter.load(Ordering::SeqCst), 100);
        let stats = pool.stats();
        assert_eq!(stats.tasks_submitted, 100);
        assert_eq!(stats.tasks_completed, 100);
    }

    #[test]
    fn test_wait_on_idle_pool_returns() {
        let pool = WorkerPool::new(2).unwrap();
        pool.wait_for_completion();
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn test_dispatch_covers_range_exactly_once() {
        for threads in 1..=5 {
            let pool = WorkerPool::new(threads).unwrap();
            for count in [0usize, 1, 3, 4, 7, 64, 101] {
                let hits: Vec<AtomicUsize> = (0..count).map(|_| AtomicUsize::new(0)).collect();
                pool.dispatch(count, |start, end| {
                    assert!(start <= end && end <= count);
                    for hit in &hits[start..end] {
                        hit.fetch_add(1, Ordering::SeqCst);
                    }
                });
                assert!(
                    hits.iter().all(|h| h.load(Ordering::SeqCst) == 1),
                    "threads={} count={}",
                    threads,
                    count
                );
            }
        }
    }

    #[test]
    fn test_dispatch_borrows_caller_data() {
        let pool = WorkerPool::new(3).unwrap();
        let values: Vec<u64> = (1..=10).collect();
        let total = AtomicUsize::new(0);
        pool.dispatch(values.len(), |start, end| {
            let part: u64 = values[start..end].iter().sum();
            total.fetch_add(part as usize, Ordering::SeqCst);
        });
        assert_eq!(total.load(Ordering::SeqCst), 55);
        assert_eq!(pool.stats().dispatches, 1);
    }

    #[test]
    fn test_dispatch_is_a_barrier() {
        let pool = WorkerPool::new(4).unwrap();
        let done = AtomicUsize::new(0);
        pool.dispatch(4, |_, _| {
            thread::sleep(std::time::Duration::from_millis(5));
            done.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_task_panic_is_reraised_and_pool_survives() {
        let pool = WorkerPool::new(2).unwrap();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.dispatch(2, |start, _| {
                if start == 0 {
                    panic!("slice failed");
                }
            });
        }));
        assert!(result.is_err());
        assert_eq!(pool.stats().tasks_panicked, 1);

        let ran = AtomicBool::new(false);
        pool.dispatch(2, |_, _| ran.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_drains_queued_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(1).unwrap();
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
