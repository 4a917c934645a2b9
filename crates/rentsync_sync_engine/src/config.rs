//! Configuration for the sync engine.

use std::time::Duration;

/// Default path of the pull endpoint.
pub const DEFAULT_PULL_PATH: &str = "/cars/sync/pull";

/// Default path of the push endpoint.
pub const DEFAULT_PUSH_PATH: &str = "/users/sync";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server URL, e.g. `http://192.168.0.10:3333`.
    pub base_url: String,
    /// Path of the pull endpoint.
    pub pull_path: String,
    /// Path of the push endpoint.
    pub push_path: String,
    /// Most coalesced entries sent in one push request.
    pub max_push_batch: usize,
    /// Retry configuration used by `synchronize_with_retry`.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            pull_path: DEFAULT_PULL_PATH.to_string(),
            push_path: DEFAULT_PUSH_PATH.to_string(),
            max_push_batch: 500,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the pull endpoint path.
    pub fn with_pull_path(mut self, path: impl Into<String>) -> Self {
        self.pull_path = path.into();
        self
    }

    /// Sets the push endpoint path.
    pub fn with_push_path(mut self, path: impl Into<String>) -> Self {
        self.push_path = path.into();
        self
    }

    /// Sets the push batch size. Should not exceed the server's limit.
    pub fn with_max_push_batch(mut self, max: usize) -> Self {
        self.max_push_batch = max;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the full pull URL for a query string.
    #[must_use]
    pub fn pull_url(&self, query: &str) -> String {
        format!("{}{}?{query}", self.base_url, self.pull_path)
    }

    /// Returns the full push URL.
    #[must_use]
    pub fn push_url(&self) -> String {
        format!("{}{}", self.base_url, self.push_path)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Backoff schedule for [`SyncEngine::synchronize_with_retry`].
///
/// The delay before retry `n` is `initial_delay * multiplier^(n-1)`, capped
/// at `max_delay`, plus up to a quarter of that when jitter is on.
///
/// [`SyncEngine::synchronize_with_retry`]: crate::SyncEngine::synchronize_with_retry
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts in total, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay, before jitter.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Spread retries of many devices apart.
    pub jitter: bool,
}

impl RetryConfig {
    /// Creates a schedule with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::new(1).with_initial_delay(Duration::ZERO).with_jitter(false)
    }

    /// Sets the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Turns jitter on or off.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns how long to wait before attempt `attempt` (0 is the first
    /// attempt and never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(retry) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay = if factor.is_finite() {
            self.initial_delay.mul_f64(factor.min(u32::MAX.into())).min(self.max_delay)
        } else {
            self.max_delay
        };

        if self.jitter {
            delay + delay.mul_f64(0.25 * clock_fraction())
        } else {
            delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// A value in `[0, 1)` taken from the clock's sub-second nanos.
fn clock_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    f64::from(nanos % 1000) / 1000.0
}
