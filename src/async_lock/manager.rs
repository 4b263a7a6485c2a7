use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use redis::{IntoConnectionInfo, aio::ConnectionManager};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use super::{
    LockStore, RedisStore,
    registry::OwnershipRegistry,
    store::{StoreRetry, release_remote},
};
use crate::{HolderId, ManagerOptions, StoreError, release_request::ReleaseRequest};

async fn release_dropped_lock(store: &dyn LockStore, retry: &StoreRetry, req: ReleaseRequest) {
    match release_remote(store, retry, req.key.as_str(), req.token.as_str()).await {
        Ok(true) => {
            tracing::debug!(token = %req.token, "released the dropped lock");
        },
        Ok(false) => {
            tracing::warn!(
                token = %req.token,
                key = %req.key,
                "the lease of the dropped lock had expired before it was released"
            );
        },
        Err(error) => {
            tracing::error!(
                "an error occurred when releasing the lock {token}: {error}",
                token = req.token
            );
        },
    }
}

#[derive(Debug)]
pub(crate) struct LockManagerInner {
    pub(crate) store:       Arc<dyn LockStore>,
    pub(crate) registry:    Arc<OwnershipRegistry>,
    pub(crate) retry:       StoreRetry,
    lock_release_manager:   Mutex<Option<JoinHandle<()>>>,
    pub(crate) is_shutdown: AtomicBool,
}

/// A manager for creating reentrant locks in a store.
///
/// Clones share the same store, the same ownership registry and the same background release task.
#[derive(Debug, Clone)]
pub struct LockManager {
    pub(crate) request_tx: mpsc::Sender<Option<ReleaseRequest>>,
    pub(crate) inner:      Arc<LockManagerInner>,
}

impl LockManager {
    /// Initializes a Redis connection manager and a lock manager on top of it.
    ///
    /// # Behavior
    ///
    /// 1. Parsing the input Redis URL (`redis_url`) and building a Redis connection manager.
    /// 2. Spawning a background task (aka the lock release manager) responsible for releasing the locks whose guards are dropped.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use relock::async_lock::LockManager;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let manager = LockManager::new("redis://127.0.0.1:6379/0").await.unwrap();
    /// # }
    /// ```
    #[inline]
    pub async fn new(redis_url: impl IntoConnectionInfo) -> Result<Self, StoreError> {
        Self::new_with_options(redis_url, ManagerOptions::default()).await
    }

    /// See [`LockManager::new`].
    #[inline]
    pub async fn new_with_options(
        redis_url: impl IntoConnectionInfo,
        options: ManagerOptions,
    ) -> Result<Self, StoreError> {
        let store = RedisStore::new(redis_url).await?;

        Ok(Self::with_store_and_options(store, options).await)
    }

    /// See [`LockManager::new`].
    #[inline]
    pub async fn with_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self::with_store(RedisStore::with_connection_manager(connection_manager)).await
    }

    /// Creates a lock manager on top of any [`LockStore`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use relock::async_lock::{LockManager, MemoryStore};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let manager = LockManager::with_store(MemoryStore::new()).await;
    ///
    /// manager.shutdown().await;
    /// # }
    /// ```
    #[inline]
    pub async fn with_store(store: impl LockStore + 'static) -> Self {
        Self::with_store_and_options(store, ManagerOptions::default()).await
    }

    /// See [`LockManager::with_store`].
    pub async fn with_store_and_options(
        store: impl LockStore + 'static,
        options: ManagerOptions,
    ) -> Self {
        let store: Arc<dyn LockStore> = Arc::new(store);
        let retry = StoreRetry::new(&options);

        let (request_tx, mut request_rx) =
            mpsc::channel::<Option<ReleaseRequest>>(options.release_buffer.max(1));
        let store_for_lock_release = store.clone();

        // background task for releasing locks asynchronously
        let lock_release_manager = tokio::spawn(async move {
            tracing::trace!("spawned a task in order to release locks in the store");

            while let Some(Some(req)) = request_rx.recv().await {
                release_dropped_lock(&*store_for_lock_release, &retry, req).await;
            }

            // guards dropped while shutting down may have queued requests behind the stop signal
            request_rx.close();

            while let Ok(message) = request_rx.try_recv() {
                if let Some(req) = message {
                    release_dropped_lock(&*store_for_lock_release, &retry, req).await;
                }
            }
        });

        Self {
            request_tx,
            inner: Arc::new(LockManagerInner {
                store,
                registry: Arc::new(OwnershipRegistry::default()),
                retry,
                lock_release_manager: Mutex::new(Some(lock_release_manager)),
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// How many times `holder` currently holds `key` in this process. `0` if it does not hold it.
    #[inline]
    pub fn hold_count(&self, holder: HolderId, key: impl AsRef<str>) -> usize {
        self.inner.registry.count(holder, key.as_ref())
    }

    /// Determines whether the manager is shut down.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Shuts down the lock manager.
    ///
    /// # Behavior
    ///
    /// 1. Marking the manager as shutdown. Further acquisitions fail with [`AcquireError::Shutdown`](crate::AcquireError::Shutdown).
    /// 2. Stopping every renewal task. Locks which are still held expire after their TTL unless they are released.
    /// 3. Stopping the lock release manager after the queued release requests are handled, and waiting for it.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use relock::async_lock::LockManager;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let manager = LockManager::new("redis://127.0.0.1:6379/0").await.unwrap();
    ///
    /// // do something
    ///
    /// manager.shutdown().await;
    /// # }
    /// ```
    pub async fn shutdown(&self) {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return;
        }

        self.inner.registry.close();

        if let Some(lock_release_manager) = self.inner.lock_release_manager.lock().await.take() {
            // stop the recv loop
            if self.request_tx.send(None).await.is_err() {
                tracing::warn!("the lock release manager has already stopped");
            }

            if let Err(error) = lock_release_manager.await {
                tracing::error!("the lock release manager cannot be stopped normally: {error}");
            }
        }
    }
}
