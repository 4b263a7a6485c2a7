#![cfg(feature = "async")]

use std::{collections::HashMap, sync::Arc, time::Duration};

use relock::{
    AcquireError, AcquireOptions, HolderId, build_lock_key_with_prefix,
    async_lock::{LockManager, MemoryStore},
};
use tokio::{sync::Mutex, task::JoinSet, time};

const PRODUCT_ID: &str = "1001";

#[derive(Debug, PartialEq, Eq)]
enum OrderError {
    OutOfStock,
    Busy,
}

/// Stock kept outside of the lock, read and written in two separate steps like a remote counter.
#[derive(Debug, Clone, Default)]
struct StockRepository {
    stock: Arc<Mutex<HashMap<String, u32>>>,
}

impl StockRepository {
    async fn get(&self, product_id: &str) -> Option<u32> {
        self.stock.lock().await.get(product_id).copied()
    }

    async fn set(&self, product_id: &str, stock: u32) {
        self.stock.lock().await.insert(String::from(product_id), stock);
    }
}

async fn submit_order(
    manager: &LockManager,
    repository: &StockRepository,
    options: AcquireOptions,
) -> Result<u32, OrderError> {
    let key = build_lock_key_with_prefix("stock", PRODUCT_ID);

    let mut lock = match manager.acquire_with_options(HolderId::new(), key, options).await {
        Ok(lock) => lock,
        Err(AcquireError::Busy) => return Err(OrderError::Busy),
        Err(error) => panic!("{error}"),
    };

    let result = match repository.get(PRODUCT_ID).await {
        Some(stock) if stock > 0 => {
            // give other orders a chance to interleave
            time::sleep(Duration::from_millis(2)).await;

            repository.set(PRODUCT_ID, stock - 1).await;

            Ok(stock - 1)
        },
        _ => Err(OrderError::OutOfStock),
    };

    lock.release().await.unwrap();

    result
}

#[tokio::test(start_paused = true)]
async fn orders_never_oversell() {
    let manager = LockManager::with_store(MemoryStore::new()).await;
    let repository = StockRepository::default();

    repository.set(PRODUCT_ID, 30).await;

    let mut tasks = JoinSet::new();

    for _ in 0..40 {
        let manager = manager.clone();
        let repository = repository.clone();

        tasks.spawn(async move {
            submit_order(
                &manager,
                &repository,
                AcquireOptions::new().retry_interval(Duration::from_millis(1)),
            )
            .await
        });
    }

    let results = tasks.join_all().await;

    assert_eq!(30, results.iter().filter(|result| result.is_ok()).count());
    assert_eq!(10, results.iter().filter(|result| **result == Err(OrderError::OutOfStock)).count());
    assert_eq!(Some(0), repository.get(PRODUCT_ID).await);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn non_blocking_orders_fail_fast_while_the_stock_is_locked() {
    let store = MemoryStore::new();
    let manager = LockManager::with_store(store.clone()).await;
    let repository = StockRepository::default();

    repository.set(PRODUCT_ID, 5).await;

    let holder = HolderId::new();
    let lock = manager.acquire(holder, "stock:1001").await.unwrap();

    assert_eq!(
        Err(OrderError::Busy),
        submit_order(&manager, &repository, AcquireOptions::new().non_blocking()).await
    );

    drop(lock);
    time::sleep(Duration::from_millis(1)).await;

    assert_eq!(
        Ok(4),
        submit_order(&manager, &repository, AcquireOptions::new().non_blocking()).await
    );
    assert_eq!(None, store.peek("stock:1001"));

    manager.shutdown().await;
}
