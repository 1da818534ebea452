//! Store retry policy: transient failures only, linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use hl_store::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    warn!(operation = what, attempt, error = %err, "transient store failure, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, 1);
        let out = policy
            .run("append", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Unavailable("busy".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let res: Result<(), _> = RetryPolicy::new(2, 1)
            .run("append", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Unavailable("busy".into()))
            })
            .await;
        assert!(matches!(res, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let res: Result<(), _> = RetryPolicy::new(5, 1)
            .run("get", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::NotFound("m".into()))
            })
            .await;
        assert!(matches!(res, Err(StoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
