//! Configuration for the sync engine.

use lexis_sync_protocol::{MergePolicy, SyncStream};
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote API (e.g. "https://api.example.com").
    pub base_url: String,
    /// Value of the `x-api-key` header.
    pub api_key: Option<String>,
    /// Value of the `x-secret-key` header.
    pub secret_key: Option<String>,
    /// Stream this engine synchronizes.
    pub stream: SyncStream,
    /// Retry behavior for each record upload.
    pub push_retry: RetryConfig,
    /// Retry behavior for each page fetch.
    pub pull_retry: RetryConfig,
    /// Fixed pause between pull pages.
    pub pull_page_delay: Duration,
    /// Wall-clock budget of one pull run, measured from its start.
    pub pull_time_budget: Duration,
    /// How pulled records are applied over local ones.
    pub merge_policy: MergePolicy,
    /// Number of concurrent local store operations.
    pub store_workers: usize,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Delay between a local edit and the push it triggers.
    pub edit_debounce: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            secret_key: None,
            stream: SyncStream::Words,
            push_retry: RetryConfig::push_default(),
            pull_retry: RetryConfig::pull_default(),
            pull_page_delay: Duration::from_millis(2000),
            pull_time_budget: Duration::from_secs(30),
            merge_policy: MergePolicy::default(),
            store_workers: 4,
            request_timeout: Duration::from_secs(30),
            edit_debounce: Duration::from_secs(10),
        }
    }

    /// Sets the API credentials.
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.api_key = Some(api_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Sets the stream.
    pub fn with_stream(mut self, stream: SyncStream) -> Self {
        self.stream = stream;
        self
    }

    /// Sets the push retry configuration.
    pub fn with_push_retry(mut self, retry: RetryConfig) -> Self {
        self.push_retry = retry;
        self
    }

    /// Sets the pull retry configuration.
    pub fn with_pull_retry(mut self, retry: RetryConfig) -> Self {
        self.pull_retry = retry;
        self
    }

    /// Sets the pause between pull pages.
    pub fn with_pull_page_delay(mut self, delay: Duration) -> Self {
        self.pull_page_delay = delay;
        self
    }

    /// Sets the pull time budget.
    pub fn with_pull_time_budget(mut self, budget: Duration) -> Self {
        self.pull_time_budget = budget;
        self
    }

    /// Sets the merge policy.
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Sets the store worker count. Zero is treated as one.
    pub fn with_store_workers(mut self, workers: usize) -> Self {
        self.store_workers = workers.max(1);
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the edit debounce.
    pub fn with_edit_debounce(mut self, delay: Duration) -> Self {
        self.edit_debounce = delay;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Configuration for retry behavior.
///
/// Backoff is exponential without jitter: the delay after the Nth
/// consecutive failure is `min(initial_delay * multiplier^(N-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: u32,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2,
        }
    }

    /// Record uploads: 10 attempts, 2s doubling up to 30s.
    pub fn push_default() -> Self {
        Self::new(10)
            .with_initial_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(30))
    }

    /// Page fetches: 3 attempts, 1s doubling up to 10s.
    pub fn pull_default() -> Self {
        Self::new(3)
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the delay to wait after `failures` consecutive failures.
    pub fn delay_after_failure(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let factor = self
            .backoff_multiplier
            .checked_pow(failures - 1)
            .unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
