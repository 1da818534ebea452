//! Bounded worker pool for CPU-heavy crypto.
//!
//! RSA keygen, wrap/unwrap and signing run on tokio's blocking threads, at
//! most `workers` at a time. Nothing asymmetric runs on the reactor.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::CoreError;

#[derive(Clone)]
pub struct CryptoPool {
    permits: Arc<Semaphore>,
}

impl CryptoPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run `job` on a blocking thread once a permit is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::WorkerUnavailable)?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|_| CoreError::WorkerUnavailable)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
