use std::{
    fmt::{self, Formatter},
    time::Duration,
};

use async_trait::async_trait;
use educe::Educe;
use redis::{Client, IntoConnectionInfo, RedisResult, aio, aio::ConnectionManager};

use super::LockStore;
use crate::{StoreError, scripts::*};

/// TTL in milliseconds. Redis rejects a zero TTL, so it is at least 1.
#[inline]
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[inline]
pub(crate) async fn set_lock_async(
    conn: &mut impl aio::ConnectionLike,
    key: &str,
    token: &str,
    ttl: Duration,
) -> RedisResult<Option<String>> {
    redis::cmd("SET")
        .arg(key)
        .arg(token)
        .arg("NX")
        .arg("PX")
        .arg(ttl_millis(ttl))
        // we cannot use exec_async here because we use "NX" in order to know whether the key already exists
        .query_async(conn)
        .await
}

#[inline]
pub(crate) async fn get_lock_async(
    conn: &mut impl aio::ConnectionLike,
    key: &str,
) -> RedisResult<Option<String>> {
    redis::cmd("GET").arg(key).query_async(conn).await
}

#[inline]
pub(crate) async fn renew_lock_async(
    conn: &mut impl aio::ConnectionLike,
    key: &str,
    token: &str,
    ttl: Duration,
) -> RedisResult<bool> {
    SCRIPT_COMPARE_AND_EXTEND.key(key).arg(token).arg(ttl_millis(ttl)).invoke_async(conn).await
}

#[inline]
pub(crate) async fn release_lock_async(
    conn: &mut impl aio::ConnectionLike,
    key: &str,
    token: &str,
) -> RedisResult<bool> {
    SCRIPT_COMPARE_AND_DELETE.key(key).arg(token).invoke_async(conn).await
}

#[inline]
fn fmt_connection_manager(_s: &ConnectionManager, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str("ConnectionManager")
}

/// A [`LockStore`] backed by Redis.
///
/// Locks are plain string keys set with `SET NX PX`. Renewal and release are Lua scripts, so the token check and the write happen in one step on the server.
#[derive(Educe, Clone)]
#[educe(Debug)]
pub struct RedisStore {
    #[educe(Debug(method(fmt_connection_manager)))]
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Parses the input Redis URL (`redis_url`) and builds a Redis connection manager.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use relock::async_lock::RedisStore;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let store = RedisStore::new("redis://127.0.0.1:6379/0").await.unwrap();
    /// # }
    /// ```
    #[inline]
    pub async fn new(redis_url: impl IntoConnectionInfo) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let connection_manager = client.get_connection_manager().await?;

        Ok(Self::with_connection_manager(connection_manager))
    }

    /// See [`RedisStore::new`].
    #[inline]
    pub fn with_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_manager,
        }
    }
}

#[async_trait]
impl LockStore for RedisStore {
    #[inline]
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let result = set_lock_async(&mut self.connection_manager.clone(), key, token, ttl).await?;

        Ok(result.is_some())
    }

    #[inline]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(get_lock_async(&mut self.connection_manager.clone(), key).await?)
    }

    #[inline]
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        Ok(release_lock_async(&mut self.connection_manager.clone(), key, token).await?)
    }

    #[inline]
    async fn compare_and_extend(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        Ok(renew_lock_async(&mut self.connection_manager.clone(), key, token, ttl).await?)
    }
}
