use std::time::Duration;

/// Smallest byte size a plugin archive can plausibly have. Anything at or
/// below this is a mirror error page or a truncated write, not a plugin.
pub const MIN_PLUGIN_SIZE: u64 = 1000;

/// Upper bound on download concurrency.
pub const MAX_PARALLEL: usize = 16;

/// How long a cached update-center document stays fresh before a refresh
/// is attempted.
pub const UPDATE_CENTER_MAX_AGE: Duration = Duration::from_secs(4 * 3600);

const DEFAULT_USER_AGENT: &str = concat!("hpicache/", env!("CARGO_PKG_VERSION"));

/// Configurable options for HTTP fetches.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Overall timeout for one HTTP request
    pub timeout: Duration,

    /// Connection timeout (time to establish the initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl FetchConfig {
    pub fn builder() -> crate::builder::FetchConfigBuilder {
        crate::builder::FetchConfigBuilder::new()
    }
}

/// Retry budget for network operations: `attempts` full passes over the
/// mirror list, with exponential backoff between passes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of full passes over the mirror list
    pub attempts: u32,

    /// Delay before the second pass; doubles on every subsequent pass
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff slept after the given 1-based attempt: `initial_delay * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Bounds enforced by eviction.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Maximum artifact age in days
    pub max_age_days: u64,

    /// Maximum total size of the plugin store in bytes
    pub max_size_bytes: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            max_size_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

impl RetentionPolicy {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days * 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = RetryPolicy {
            attempts: 4,
            initial_delay: Duration::from_secs(5),
        };
        assert_eq!(retry.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(retry.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(retry.backoff_delay(3), Duration::from_secs(20));
    }

    #[test]
    fn retention_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_age_days, 30);
        assert_eq!(policy.max_size_bytes, 10 * 1024 * 1024 * 1024);
        assert_eq!(policy.max_age(), Duration::from_secs(30 * 86_400));
    }
}
