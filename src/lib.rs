/*!
# Relock

A reentrant distributed lock on top of Redis (or any store offering atomic conditional writes with TTLs).

* A lock is a key in the store whose value is a token unique to one acquisition. It is created with `SET NX PX`, so at most one token owns a key at any time.
* The same logical holder ([`HolderId`]) can acquire a key it already holds without blocking on itself. Only the outermost release deletes the key.
* Every lock has a lease (TTL). A crashed process cannot keep a lock longer than its lease. A background task renews the lease of a held lock, checking the token before extending it.
* Release deletes the key only if it still carries the token of the acquisition, so nobody else's lock is ever deleted. If the lease was lost in the meantime, the release says so.

## Examples

```rust
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use relock::{HolderId, async_lock::{LockManager, MemoryStore}};
use tokio::task::JoinSet;

# #[tokio::main(flavor = "current_thread")]
# async fn main() {
// use `LockManager::new("redis://127.0.0.1:6379/0")` to coordinate across processes
let manager = LockManager::with_store(MemoryStore::new()).await;

let stock = Arc::new(AtomicU32::new(10));

async fn submit_order(manager: LockManager, stock: Arc<AtomicU32>) {
    let holder = HolderId::new();

    let mut lock = manager.acquire(holder, "stock:1001").await.unwrap();

    // ----- critical section -----

    let current = stock.load(Ordering::SeqCst);

    tokio::task::yield_now().await;

    stock.store(current - 1, Ordering::SeqCst);

    // ----------------------------

    lock.release().await.unwrap();
}

let mut tasks = JoinSet::new();

for _ in 0..10 {
    tasks.spawn(submit_order(manager.clone(), stock.clone()));
}

tasks.join_all().await;

assert_eq!(0, stock.load(Ordering::SeqCst));

manager.shutdown().await;
# }
```
*/

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[cfg(feature = "async")]
/// This module provides an async API based on **Tokio**.
pub mod async_lock;
#[cfg(feature = "async")]
mod errors;
mod functions;
#[cfg(feature = "async")]
mod options;
#[cfg(feature = "async")]
mod release_request;
#[cfg(feature = "async")]
mod scripts;
mod token;

#[cfg(feature = "async")]
pub use errors::*;
pub use functions::*;
#[cfg(feature = "async")]
pub use options::*;
#[cfg(feature = "async")]
pub use redis::{ConnectionInfo, IntoConnectionInfo};
pub use token::*;
