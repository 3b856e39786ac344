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
//! Parallel-for backends used by the solver
//!
//! The solver only needs two things from its thread pool: how many threads
//! there are, and a blocking range dispatch. [`Executor`] captures exactly
//! that contract so the solver can run on the crate's own [`WorkerPool`] or,
//! with the `parallel` feature, on a Rayon thread pool.

use crate::pool::WorkerPool;

/// A blocking parallel-for over an index range
///
/// Implementations must call `f(start, end)` on disjoint, contiguous slices
/// that together cover `[0, count)` exactly once, and must not return until
/// every slice has finished.
pub trait Executor: Sync {
    /// Number of threads work is spread over
    fn thread_count(&self) -> usize;

    /// Run `f` over `[0, count)` and wait for it to finish
    fn dispatch(&self, count: usize, f: &(dyn Fn(usize, usize) + Sync));
}

impl Executor for WorkerPool {
    fn thread_count(&self) -> usize {
        WorkerPool::thread_count(self)
    }

    fn dispatch(&self, count: usize, f: &(dyn Fn(usize, usize) + Sync)) {
        self.dispatch_dyn(count, f);
    }
}

impl<E: Executor + ?Sized> Executor for &E {
    fn thread_count(&self) -> usize {
        (**self).thread_count()
    }

    fn dispatch(&self, count: usize, f: &(dyn Fn(usize, usize) + Sync)) {
        (**self).dispatch(count, f);
    }
}

#[cfg(feature = "parallel")]
pub use self::rayon_backend::RayonExecutor;

#[cfg(feature = "parallel")]
mod rayon_backend {
    use super::Executor;
    use crate::error::{EngineError, Result};
    use rayon::{ThreadPool, ThreadPoolBuilder};

    /// [`Executor`] backed by a dedicated Rayon thread pool
    ///
    /// Slices are laid out exactly like [`WorkerPool::dispatch`](crate::WorkerPool::dispatch):
    /// one per thread plus an inline remainder.
    pub struct RayonExecutor {
        pool: ThreadPool,
    }

    impl RayonExecutor {
        /// Build a Rayon pool with `thread_count` threads
        pub fn new(thread_count: usize) -> Result<Self> {
            if thread_count == 0 {
                return Err(EngineError::ZeroThreads);
            }
            let pool = ThreadPoolBuilder::new()
                .num_threads(thread_count)
                .thread_name(|i| format!("particle-rayon-{}", i))
                .build()
                .map_err(|err| EngineError::ThreadSpawn {
                    index: 0,
                    reason: err.to_string(),
                })?;
            Ok(RayonExecutor { pool })
        }
    }

    impl Executor for RayonExecutor {
        fn thread_count(&self) -> usize {
            self.pool.current_num_threads()
        }

        fn dispatch(&self, count: usize, f: &(dyn Fn(usize, usize) + Sync)) {
            let threads = self.thread_count();
            let batch = count / threads;
            self.pool.scope(|scope| {
                if batch > 0 {
                    for i in 0..threads {
                        let start = batch * i;
                        scope.spawn(move |_| f(start, start + batch));
                    }
                }
                let tail_start = batch * threads;
                if tail_start < count {
                    f(tail_start, count);
                }
            });
        }
    }
}
