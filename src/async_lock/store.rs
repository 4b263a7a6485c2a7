use std::{fmt::Debug, future::Future, time::Duration};

use async_trait::async_trait;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{ManagerOptions, StoreError};

/// The primitives a lock needs from the key-value store.
///
/// Every method must be a single atomic step on the store side. In particular, the `compare_and_*` methods must never be implemented as a read followed by a separate write.
#[async_trait]
pub trait LockStore: Debug + Send + Sync {
    /// Sets `key` to `token` with the given TTL only if `key` does not exist. Returns whether the key has been set.
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Gets the current value of `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes `key` only if its value equals `token`. Returns whether the key has been deleted.
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError>;

    /// Resets the TTL of `key` only if its value equals `token`. Returns whether the TTL has been reset.
    async fn compare_and_extend(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}

/// Bounded retry of store commands which failed to communicate with the store.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StoreRetry {
    attempts: u32,
    interval: Duration,
}

impl StoreRetry {
    #[inline]
    pub(crate) fn new(options: &ManagerOptions) -> Self {
        Self {
            attempts: options.store_retry_attempts,
            interval: options.store_retry_interval,
        }
    }

    /// Runs `operation` until it succeeds or the retries are used up. Waiting between attempts stops early when `cancel` is cancelled, and the last error is returned.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        cancel: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>, {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.attempts => {
                    attempt += 1;

                    tracing::warn!(attempt, "a store command failed, retry it later: {error}");

                    match cancel {
                        Some(cancel) => {
                            tokio::select! {
                                _ = cancel.cancelled() => return Err(error),
                                _ = time::sleep(self.interval) => (),
                            }
                        },
                        None => time::sleep(self.interval).await,
                    }
                },
                Err(error) => return Err(error),
            }
        }
    }
}

/// Deletes the lock only if it is still owned by `token`.
///
/// A token mismatch is reported as `Ok(false)` and never retried. Only communication failures are retried.
pub(crate) async fn release_remote(
    store: &dyn LockStore,
    retry: &StoreRetry,
    key: &str,
    token: &str,
) -> Result<bool, StoreError> {
    retry.run(None, move || store.compare_and_delete(key, token)).await
}
