use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(30);
const DEFAULT_BLOCKING: BlockingPolicy = BlockingPolicy::Wait;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_RENEW_INTERVAL: Option<Option<Duration>> = Some(None);

const DEFAULT_STORE_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_STORE_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_RELEASE_BUFFER: usize = 1024;

/// What to do when the lock is held by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingPolicy {
    /// Fail with [`AcquireError::Busy`](crate::AcquireError::Busy) right away.
    NonBlocking,
    /// Keep retrying until the lock is acquired.
    Wait,
    /// Keep retrying until the lock is acquired or the duration elapses, then fail with [`AcquireError::Timeout`](crate::AcquireError::Timeout).
    WaitFor(Duration),
}

/// Options used when acquiring a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Time-to-live (TTL) of the lease.
    ///
    /// This defines how long the lock will remain valid in the store if it is neither renewed nor released.
    ///
    /// Default: **30 seconds**.
    pub ttl:                Duration,
    /// Whether and how long to wait for a lock held by someone else.
    ///
    /// Default: [`BlockingPolicy::Wait`].
    pub blocking:           BlockingPolicy,
    /// Initial time interval between retry attempts when the lock is held by someone else.
    ///
    /// Default: **100 milliseconds**.
    pub retry_interval:     Duration,
    /// Upper bound of the retry interval. The interval doubles after every failed attempt until it reaches this value. Set it equal to `retry_interval` for a fixed interval.
    ///
    /// Default: **100 milliseconds**.
    pub max_retry_interval: Duration,
    /// Time interval for automatic lease renewal.
    ///
    /// * `Some(Some(duration))`: Renew using the given interval `duration`. It must be shorter than the TTL, otherwise a third of the TTL is used.
    /// * `Some(None)`: Renew at a third of the TTL.
    /// * `None`: Disable lease renewal entirely.
    ///
    /// Default: `Some(None)`.
    pub renew_interval:     Option<Option<Duration>>,
}

impl Default for AcquireOptions {
    /// ```rust
    /// use std::time::Duration;
    ///
    /// use relock::{AcquireOptions, BlockingPolicy};
    ///
    /// let options = AcquireOptions::default();
    ///
    /// // equals to
    ///
    /// let options_2 = AcquireOptions {
    ///     ttl:                Duration::from_secs(30),
    ///     blocking:           BlockingPolicy::Wait,
    ///     retry_interval:     Duration::from_millis(100),
    ///     max_retry_interval: Duration::from_millis(100),
    ///     renew_interval:     Some(None),
    /// };
    ///
    /// # assert_eq!(options, options_2);
    /// ```
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl AcquireOptions {
    /// See [`AcquireOptions::default`].
    #[inline]
    pub const fn new() -> Self {
        Self {
            ttl:                DEFAULT_TTL,
            blocking:           DEFAULT_BLOCKING,
            retry_interval:     DEFAULT_RETRY_INTERVAL,
            max_retry_interval: DEFAULT_MAX_RETRY_INTERVAL,
            renew_interval:     DEFAULT_RENEW_INTERVAL,
        }
    }

    /// Time-to-live (TTL) of the lease.
    #[inline]
    pub const fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = duration;

        self
    }

    /// Whether and how long to wait for a lock held by someone else.
    #[inline]
    pub const fn blocking(mut self, blocking: BlockingPolicy) -> Self {
        self.blocking = blocking;

        self
    }

    /// Shorthand for `blocking(BlockingPolicy::NonBlocking)`.
    #[inline]
    pub const fn non_blocking(self) -> Self {
        self.blocking(BlockingPolicy::NonBlocking)
    }

    /// Shorthand for `blocking(BlockingPolicy::WaitFor(duration))`.
    #[inline]
    pub const fn lock_timeout(self, duration: Duration) -> Self {
        self.blocking(BlockingPolicy::WaitFor(duration))
    }

    /// Initial time interval between retry attempts.
    #[inline]
    pub const fn retry_interval(mut self, duration: Duration) -> Self {
        self.retry_interval = duration;

        self
    }

    /// Upper bound of the retry interval.
    #[inline]
    pub const fn max_retry_interval(mut self, duration: Duration) -> Self {
        self.max_retry_interval = duration;

        self
    }

    /// Time interval for automatic lease renewal.
    ///
    /// * `Some(Some(duration))`: Renew using the given interval `duration`.
    /// * `Some(None)`: Renew at a third of the TTL.
    /// * `None`: Disable lease renewal entirely.
    #[inline]
    pub const fn renew_interval(mut self, duration: Option<Option<Duration>>) -> Self {
        self.renew_interval = duration;

        self
    }

    /// The interval the renewal task actually sleeps between renewals, if renewal is enabled.
    ///
    /// ```rust
    /// use std::time::Duration;
    ///
    /// use relock::AcquireOptions;
    ///
    /// let options = AcquireOptions::new().ttl(Duration::from_secs(3));
    ///
    /// assert_eq!(Some(Duration::from_secs(1)), options.effective_renew_interval());
    ///
    /// // an interval which is not shorter than the TTL falls back to a third of it
    /// let options = options.renew_interval(Some(Some(Duration::from_secs(5))));
    ///
    /// assert_eq!(Some(Duration::from_secs(1)), options.effective_renew_interval());
    /// ```
    pub fn effective_renew_interval(&self) -> Option<Duration> {
        let fallback = self.ttl / 3;

        self.renew_interval.map(|interval| match interval {
            Some(interval) if !interval.is_zero() && interval < self.ttl => interval,
            Some(interval) => {
                tracing::warn!(
                    ?interval,
                    ttl = ?self.ttl,
                    "the renew interval must be shorter than the TTL, use a third of the TTL \
                     instead"
                );

                fallback
            },
            None => fallback,
        })
    }
}

/// Options of a [`LockManager`](crate::async_lock::LockManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// How many more times a store command is attempted after a communication failure.
    ///
    /// Default: **3**.
    pub store_retry_attempts: u32,
    /// Time interval between attempts of a failed store command.
    ///
    /// Default: **50 milliseconds**.
    pub store_retry_interval: Duration,
    /// Capacity of the queue of the background task which releases dropped guards.
    ///
    /// Default: **1024**.
    pub release_buffer:       usize,
}

impl Default for ManagerOptions {
    /// ```rust
    /// use std::time::Duration;
    ///
    /// let options = relock::ManagerOptions::default();
    ///
    /// // equals to
    ///
    /// let options_2 = relock::ManagerOptions {
    ///     store_retry_attempts: 3,
    ///     store_retry_interval: Duration::from_millis(50),
    ///     release_buffer:       1024,
    /// };
    ///
    /// # assert_eq!(options, options_2);
    /// ```
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerOptions {
    /// See [`ManagerOptions::default`].
    #[inline]
    pub const fn new() -> Self {
        Self {
            store_retry_attempts: DEFAULT_STORE_RETRY_ATTEMPTS,
            store_retry_interval: DEFAULT_STORE_RETRY_INTERVAL,
            release_buffer:       DEFAULT_RELEASE_BUFFER,
        }
    }

    /// How many more times a store command is attempted after a communication failure.
    #[inline]
    pub const fn store_retry_attempts(mut self, attempts: u32) -> Self {
        self.store_retry_attempts = attempts;

        self
    }

    /// Time interval between attempts of a failed store command.
    #[inline]
    pub const fn store_retry_interval(mut self, duration: Duration) -> Self {
        self.store_retry_interval = duration;

        self
    }

    /// Capacity of the queue of the background release task.
    #[inline]
    pub const fn release_buffer(mut self, capacity: usize) -> Self {
        self.release_buffer = capacity;

        self
    }
}
