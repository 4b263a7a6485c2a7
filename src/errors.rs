use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use redis::RedisError;

/// Errors raised by a [`LockStore`](crate::async_lock::LockStore) when the store cannot be reached or fails to execute a command.
#[derive(Debug)]
pub enum StoreError {
    /// Error that occurred when interacting with Redis.
    Redis(RedisError),
    /// The store could not be reached.
    Unavailable(String),
}

impl From<RedisError> for StoreError {
    #[inline]
    fn from(value: RedisError) -> Self {
        Self::Redis(value)
    }
}

impl Display for StoreError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis(error) => Display::fmt(error, f),
            Self::Unavailable(reason) => write!(f, "the lock store is unavailable: {reason}"),
        }
    }
}

impl Error for StoreError {
    #[inline]
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Redis(error) => Some(error),
            Self::Unavailable(_) => None,
        }
    }
}

/// Errors for handling lock acquisition failures.
#[derive(Debug)]
pub enum AcquireError {
    /// The lock is held by someone else and the acquisition was non-blocking.
    Busy,
    /// Error indicating that acquiring a lock has timed out.
    Timeout,
    /// The holder re-entered a lock whose lease has already been lost.
    ///
    /// The outer acquisition is still alive in this process, and its critical section may be running while another holder owns the key. Taking a fresh lease here would hide that from the outer code, so acquire refuses until the outer acquisition is released (and reports [`ReleaseError::LeaseLost`]).
    LeaseLost,
    /// Error indicating that the `LockManager` is shutting down.
    Shutdown,
    /// The store kept failing after the bounded retries.
    StoreUnavailable(StoreError),
}

impl From<StoreError> for AcquireError {
    #[inline]
    fn from(value: StoreError) -> Self {
        Self::StoreUnavailable(value)
    }
}

impl Display for AcquireError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("the lock is held by another holder"),
            Self::Timeout => {
                f.write_str("attempted to get a lock but the provided timeout was exceeded")
            },
            Self::LeaseLost => f.write_str(
                "the lease of the outer acquisition has been lost, release it before acquiring \
                 again",
            ),
            Self::Shutdown => f.write_str("the lock manager is shutting down"),
            Self::StoreUnavailable(error) => Display::fmt(error, f),
        }
    }
}

impl Error for AcquireError {
    #[inline]
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(error) => Some(error),
            _ => None,
        }
    }
}

/// Errors for handling lock release failures.
#[derive(Debug)]
pub enum ReleaseError {
    /// The caller does not hold the lock. Nothing was deleted.
    NotOwner,
    /// The lease expired before the release and the key may have been taken over. The critical section may have run partly unprotected.
    LeaseLost,
    /// The final delete could not be confirmed. The lock will be released after its TTL expires.
    StoreUnavailable(StoreError),
}

impl From<StoreError> for ReleaseError {
    #[inline]
    fn from(value: StoreError) -> Self {
        Self::StoreUnavailable(value)
    }
}

impl Display for ReleaseError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOwner => f.write_str("the lock is not owned by this holder"),
            Self::LeaseLost => f.write_str("the lease of the lock expired before it was released"),
            Self::StoreUnavailable(error) => Display::fmt(error, f),
        }
    }
}

impl Error for ReleaseError {
    #[inline]
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(error) => Some(error),
            _ => None,
        }
    }
}
