use std::{sync::Arc, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::{LockStore, registry::OwnershipRegistry, store::StoreRetry};
use crate::HolderId;

/// Everything a renewal task needs to keep one lease alive.
#[derive(Debug)]
pub(crate) struct Renewal {
    pub(crate) store:    Arc<dyn LockStore>,
    pub(crate) registry: Arc<OwnershipRegistry>,
    pub(crate) retry:    StoreRetry,
    pub(crate) holder:   HolderId,
    pub(crate) key:      Arc<String>,
    pub(crate) token:    Arc<String>,
    pub(crate) ttl:      Duration,
    pub(crate) interval: Duration,
    pub(crate) cancel:   CancellationToken,
}

/// Spawns a task which extends the lease every `interval` while the token still owns the key.
///
/// The task stops when `cancel` is cancelled, or when the store reports that the token no longer owns the key, in which case the ownership entry is marked as lost.
pub(crate) fn spawn_renewal_task(renewal: Renewal) {
    tokio::spawn(run_renewal_loop(renewal));
}

async fn run_renewal_loop(renewal: Renewal) {
    let Renewal {
        store,
        registry,
        retry,
        holder,
        key,
        token,
        ttl,
        interval,
        cancel,
    } = renewal;

    tracing::trace!(token = %token, "spawned a task in order to automatically renew the lock");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::trace!(token = %token, "a spawned renewal task for the lock is stopped because the lock is being released");

                break;
            },
            _ = time::sleep(interval) => (),
        }

        if cancel.is_cancelled() {
            continue;
        }

        let store_ref = &*store;
        let key_str = key.as_str();
        let token_str = token.as_str();

        let result = retry
            .run(Some(&cancel), move || store_ref.compare_and_extend(key_str, token_str, ttl))
            .await;

        // released in the meantime, the result does not matter anymore
        if cancel.is_cancelled() {
            tracing::trace!(token = %token, "discard the renewal result because the lock is being released");

            break;
        }

        match result {
            Ok(true) => {
                tracing::trace!(token = %token, "renewed the lock");
            },
            Ok(false) => {
                if registry.mark_lost(holder, key_str, token_str) {
                    tracing::warn!(
                        token = %token,
                        key = %key,
                        "the lease of the lock has expired and the lock is not owned anymore"
                    );
                }

                tracing::trace!(token = %token, "close the renewal task for the lock");

                break;
            },
            Err(error) => {
                tracing::error!(token = %token, "an error occurred when renewing the lock: {error}");
            },
        }
    }
}
