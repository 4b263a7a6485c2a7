use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use tokio::{
    sync::mpsc::error::TrySendError,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use super::{
    LockManager,
    registry::{Decrement, Reentry},
    renewer::{Renewal, spawn_renewal_task},
    store::release_remote,
};
use crate::{
    AcquireError, AcquireOptions, BlockingPolicy, HolderId, ReleaseError, StoreError,
    generate_token, release_request::ReleaseRequest,
};

/// A guard object representing one acquisition of a lock.
///
/// # Behavior
///
/// * Every successful [`LockManager::acquire`] returns its own guard, including reentrant ones. The lock is released in the store when the outermost guard is released.
/// * Dropping the guard gives back its acquisition immediately. If it was the outermost one, the lock is deleted from the store by the lock release manager, unless its buffer is full (in that case, the lock is released after its TTL expires in the store).
/// * Call [`LockHandle::release`] instead of dropping the guard to learn whether the lease was kept until the end.
#[derive(Debug)]
pub struct LockHandle {
    manager:     LockManager,
    is_released: bool,
    holder:      HolderId,
    key:         Arc<String>,
    token:       Arc<String>,
}

impl LockHandle {
    /// Releases this acquisition.
    ///
    /// # Errors
    ///
    /// * [`ReleaseError::NotOwner`] if the holder no longer owns the lock through this token.
    /// * [`ReleaseError::LeaseLost`] if the lease expired and was possibly taken over. The critical section may have run partly unprotected.
    /// * [`ReleaseError::StoreUnavailable`] if the store could not confirm the delete. The lock is released after its TTL expires.
    ///
    /// Calling it again after a release returns `Ok(())`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use relock::{HolderId, async_lock::LockManager};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let manager = LockManager::new("redis://127.0.0.1:6379/0").await.unwrap();
    /// let holder = HolderId::new();
    ///
    /// let mut lock = manager.acquire(holder, "stock:1001").await.unwrap();
    ///
    /// // critical section
    ///
    /// lock.release().await.unwrap();
    /// # }
    /// ```
    pub async fn release(&mut self) -> Result<(), ReleaseError> {
        if self.is_released {
            return Ok(());
        }

        // the local count is given back whatever the store says
        self.is_released = true;

        self.manager.release_inner(self.holder, &self.key, Some(self.token.as_str())).await
    }

    /// Determines whether the lock is released.
    #[inline]
    pub const fn is_released(&self) -> bool {
        self.is_released
    }

    /// The holder which owns this acquisition.
    #[inline]
    pub const fn holder(&self) -> HolderId {
        self.holder
    }

    /// The lock key.
    #[inline]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// The token stored as the value of the lock key. Reentrant acquisitions share the token of the outermost one.
    #[inline]
    pub fn token(&self) -> &str {
        self.token.as_str()
    }
}

impl Drop for LockHandle {
    #[inline]
    fn drop(&mut self) {
        if self.is_released {
            return;
        }

        let token = match self.manager.inner.registry.decrement(
            self.holder,
            &self.key,
            Some(self.token.as_str()),
        ) {
            Decrement::Released {
                token,
                lost: false,
            } => token,
            Decrement::Released { lost: true, .. } => {
                tracing::warn!(
                    token = %self.token,
                    key = %self.key,
                    "the lease of the dropped lock had expired before it was released"
                );

                return;
            },
            Decrement::Held { .. } | Decrement::NotOwner => return,
        };

        if let Err(error) = self.manager.request_tx.try_send(Some(ReleaseRequest {
            key: self.key.clone(),
            token,
        })) {
            if matches!(error, TrySendError::Full(_)) {
                tracing::warn!(
                    token = %self.token,
                    "the lock release manager is full, the lock will be released after its \
                     TTL expires"
                );
            } else {
                tracing::warn!(
                    token = %self.token,
                    "cannot send a lock release request: {error}",
                );
            }
        }
    }
}

impl LockManager {
    /// Acquires a lock with a key for a holder, waiting until it is available.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use relock::{HolderId, async_lock::LockManager};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let manager = LockManager::new("redis://127.0.0.1:6379/0").await.unwrap();
    /// let holder = HolderId::new();
    ///
    /// let lock = manager.acquire(holder, "stock:1001").await.unwrap();
    ///
    /// // the same holder can enter again without blocking on itself
    /// let inner_lock = manager.acquire(holder, "stock:1001").await.unwrap();
    ///
    /// // critical section
    ///
    /// // drop(inner_lock);
    /// // drop(lock);
    /// # }
    /// ```
    #[inline]
    pub async fn acquire(
        &self,
        holder: HolderId,
        key: impl AsRef<str>,
    ) -> Result<LockHandle, AcquireError> {
        self.acquire_with_options(holder, key, AcquireOptions::default()).await
    }

    /// Acquires a lock with a key for a holder, using the given options.
    ///
    /// # Errors
    ///
    /// * [`AcquireError::Busy`] if the lock is held by someone else and the blocking policy is [`BlockingPolicy::NonBlocking`].
    /// * [`AcquireError::Timeout`] if the lock is still held by someone else when the [`BlockingPolicy::WaitFor`] duration elapses.
    /// * [`AcquireError::LeaseLost`] if the holder re-enters a lock whose lease has been lost.
    /// * [`AcquireError::Shutdown`] if the manager is shut down.
    /// * [`AcquireError::StoreUnavailable`] if the store keeps failing.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::time::Duration;
    ///
    /// use relock::{AcquireError, AcquireOptions, HolderId, async_lock::LockManager};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let manager = LockManager::new("redis://127.0.0.1:6379/0").await.unwrap();
    ///
    /// match manager
    ///     .acquire_with_options(
    ///         HolderId::new(),
    ///         "stock:1001",
    ///         AcquireOptions::new().ttl(Duration::from_secs(2)).non_blocking(),
    ///     )
    ///     .await
    /// {
    ///     Ok(lock) => {
    ///         // critical section
    ///     },
    ///     Err(AcquireError::Busy) => {
    ///         // someone else is in the critical section
    ///     },
    ///     Err(error) => panic!("{error}"),
    /// }
    /// # }
    /// ```
    pub async fn acquire_with_options(
        &self,
        holder: HolderId,
        key: impl AsRef<str>,
        options: AcquireOptions,
    ) -> Result<LockHandle, AcquireError> {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(AcquireError::Shutdown);
        }

        let key: &str = key.as_ref();

        match self.inner.registry.try_reenter(holder, key) {
            Reentry::Reentered {
                token,
                count,
            } => {
                tracing::debug!(token = %token, count, "re-entered the lock");

                return Ok(self.new_handle(holder, Arc::new(String::from(key)), token));
            },
            Reentry::Lost => return Err(AcquireError::LeaseLost),
            Reentry::Vacant => (),
        }

        let token = Arc::new(generate_token());

        let start_time = Instant::now();
        let mut retry_interval = options.retry_interval;
        let max_retry_interval = options.max_retry_interval.max(options.retry_interval);

        loop {
            if self.try_set(key, token.as_str(), options.ttl).await? {
                break;
            }

            // a lock with the same key exists, so we cannot acquire

            let wait = match options.blocking {
                BlockingPolicy::NonBlocking => return Err(AcquireError::Busy),
                BlockingPolicy::Wait => retry_interval,
                BlockingPolicy::WaitFor(lock_timeout) => {
                    let elapsed = start_time.elapsed();

                    if elapsed >= lock_timeout {
                        return Err(AcquireError::Timeout);
                    }

                    retry_interval.min(lock_timeout - elapsed)
                },
            };

            // sleep to allow other tasks to run
            time::sleep(wait).await;

            if self.inner.is_shutdown.load(Ordering::Relaxed) {
                return Err(AcquireError::Shutdown);
            }

            retry_interval = retry_interval.saturating_mul(2).min(max_retry_interval);
        }

        let key = Arc::new(String::from(key));

        // a new lock has been created

        tracing::debug!(token = %token, key = %key, "acquired the lock");

        let cancel = CancellationToken::new();

        if !self.inner.registry.insert(holder, String::clone(&key), token.clone(), cancel.clone()) {
            // the manager was shut down while the key was being set
            if let Err(error) =
                release_remote(&*self.inner.store, &self.inner.retry, &key, token.as_str()).await
            {
                tracing::error!(
                    token = %token,
                    "an error occurred when releasing the lock acquired during shutdown: {error}"
                );
            }

            return Err(AcquireError::Shutdown);
        }

        if let Some(interval) = options.effective_renew_interval() {
            spawn_renewal_task(Renewal {
                store: self.inner.store.clone(),
                registry: self.inner.registry.clone(),
                retry: self.inner.retry,
                holder,
                key: key.clone(),
                token: token.clone(),
                ttl: options.ttl,
                interval,
                cancel,
            });
        }

        Ok(self.new_handle(holder, key, token))
    }

    /// Releases a lock through its guard. See [`LockHandle::release`].
    #[inline]
    pub async fn release(&self, mut handle: LockHandle) -> Result<(), ReleaseError> {
        handle.release().await
    }

    /// Releases one acquisition of `key` by `holder`, for callers which keep track of keys rather than guards.
    ///
    /// A guard of that acquisition which is still alive afterwards does nothing when dropped.
    ///
    /// # Errors
    ///
    /// See [`LockHandle::release`]. Releasing a key that `holder` does not hold fails with [`ReleaseError::NotOwner`] and never touches the store.
    #[inline]
    pub async fn release_key(
        &self,
        holder: HolderId,
        key: impl AsRef<str>,
    ) -> Result<(), ReleaseError> {
        self.release_inner(holder, key.as_ref(), None).await
    }

    async fn release_inner(
        &self,
        holder: HolderId,
        key: &str,
        token: Option<&str>,
    ) -> Result<(), ReleaseError> {
        let token = match self.inner.registry.decrement(holder, key, token) {
            Decrement::NotOwner => return Err(ReleaseError::NotOwner),
            Decrement::Held {
                count,
            } => {
                tracing::debug!(key = %key, count, "left a reentrant acquisition of the lock");

                return Ok(());
            },
            Decrement::Released { lost: true, .. } => return Err(ReleaseError::LeaseLost),
            Decrement::Released {
                token,
                lost: false,
            } => token,
        };

        match release_remote(&*self.inner.store, &self.inner.retry, key, token.as_str()).await {
            Ok(true) => {
                tracing::debug!(token = %token, "released the lock");

                Ok(())
            },
            Ok(false) => {
                tracing::warn!(
                    token = %token,
                    key = %key,
                    "the lease of the lock had expired before it was released"
                );

                Err(ReleaseError::LeaseLost)
            },
            Err(error) => {
                tracing::error!(token = %token, "an error occurred when releasing the lock: {error}");

                Err(ReleaseError::StoreUnavailable(error))
            },
        }
    }

    /// One `set_if_absent` round, retrying communication failures.
    ///
    /// When a failed attempt is followed by a rejected one, the failed attempt may have set the key without its reply arriving, so the current value is checked against `token`.
    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        let store = &*self.inner.store;
        let mut attempted = false;

        let acquired = self
            .inner
            .retry
            .run(None, || {
                let first = !attempted;
                attempted = true;

                async move { store.set_if_absent(key, token, ttl).await.map(|set| (set, first)) }
            })
            .await;

        match acquired {
            Ok((true, _)) => Ok(true),
            Ok((false, true)) => Ok(false),
            Ok((false, false)) => Ok(store.get(key).await?.as_deref() == Some(token)),
            Err(error) => Err(error),
        }
    }

    #[inline]
    fn new_handle(&self, holder: HolderId, key: Arc<String>, token: Arc<String>) -> LockHandle {
        LockHandle {
            manager: self.clone(),
            is_released: false,
            holder,
            key,
            token,
        }
    }
}
