//! Injectable wall-clock source.
//!
//! Interval selection, certificate ages, issuance expiry, and verification
//! cutoffs all read the clock through [`TimeProvider`] so they can be pinned
//! in tests.
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait TimeProvider: Send + Sync {
    /// Current Unix timestamp in seconds.
    fn now_unix_secs(&self) -> i64;
}

/// Production provider backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_unix_secs(&self) -> i64 {
        // A clock set before the epoch clamps to zero rather than panicking.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_secs() as i64
    }
}

/// Manually driven provider; clones share the same instant.
///
/// ```rust
/// use anontoken_keys::{ManualTimeProvider, TimeProvider};
///
/// let time = ManualTimeProvider::new(1_000);
/// time.advance_secs(5);
/// assert_eq!(time.now_unix_secs(), 1_005);
/// ```
#[derive(Debug, Clone)]
pub struct ManualTimeProvider {
    now: Arc<AtomicI64>,
}

impl ManualTimeProvider {
    pub fn new(now_unix_secs: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_unix_secs)),
        }
    }

    pub fn set_secs(&self, now_unix_secs: i64) {
        self.now.store(now_unix_secs, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_unix_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
