//! Worker pool used by every parallel phase of the engine.
//!
//! The engine never lets tasks synchronize with each other directly: work is
//! fanned out, and the return of `install` (or the end of a `scope`) is the
//! barrier after which all worker writes are visible. Rayon gives us both
//! operations, with the calling thread participating as one of the workers.

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Fixed-size pool of `workers` threads (the caller counts as one of them).
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool with exactly `num_threads` workers. Zero is treated as one.
    pub fn new(num_threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let workers = num_threads.max(1);
        let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
        debug!("worker pool ready with {} threads", workers);
        Ok(WorkerPool { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `op` inside the pool and block until every task it spawned has
    /// finished. This is the fan-out/fan-in barrier of the engine.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Scoped spawns with the scope end as the barrier; the calling thread
    /// joins in on queued work while it waits.
    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&rayon::Scope<'scope>) -> R,
    {
        self.pool.in_place_scope(op)
    }
}
