use std::{
    fmt::{self, Display, Formatter},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use once_cell::sync::Lazy;
use uuid::Uuid;

static INSTANCE_ID: Lazy<Uuid> = Lazy::new(Uuid::new_v4);
static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);
static HOLDER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a token which is written to the store as the value of a lock key to prove which acquisition owns it.
///
/// The format is `<instance>:<pid>:<counter>`. `<instance>` is a random UUID generated once per process, so tokens from different processes or hosts do not collide, and `<counter>` makes every token of this process distinct.
///
/// ```rust
/// let a = relock::generate_token();
/// let b = relock::generate_token();
///
/// assert_ne!(a, b);
/// ```
pub fn generate_token() -> String {
    let counter = TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{}:{}:{counter}", *INSTANCE_ID, process::id())
}

/// Identity of a logical lock holder (a request, a worker, a task...).
///
/// A holder which already owns a key can acquire it again without blocking on itself. Ownership is bound to this value rather than to the thread which happens to run the code, so it can be passed between tasks freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(u64);

impl HolderId {
    /// Creates a holder identity which is unique in this process.
    #[inline]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(HOLDER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value of this identity.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for HolderId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "holder-{}", self.0)
    }
}
