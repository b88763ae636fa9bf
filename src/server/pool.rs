//! The worker pool: a fixed number of threads sharing one reactor.
//!
//! Tokio's multi-threaded runtime is exactly this shape. Every worker parks on
//! the same I/O driver, and whichever worker is free runs the next ready task,
//! so two sessions can make progress on two threads at once while each
//! session's own steps stay sequential.

use std::future::Future;

use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::error::ServerError;

pub struct WorkerPool {
    runtime: Runtime,
    threads: usize,
}

impl WorkerPool {
    /// Starts `threads` workers. Zero is rejected.
    pub fn new(threads: usize) -> Result<Self, ServerError> {
        if threads == 0 {
            return Err(ServerError::InvalidWorkerCount);
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("beacon-worker")
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;

        debug!(threads, "worker pool started");
        Ok(Self { runtime, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `future` to completion on the pool, blocking the calling thread.
    ///
    /// Tasks the future spawns keep running on the workers until the pool is
    /// dropped.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
