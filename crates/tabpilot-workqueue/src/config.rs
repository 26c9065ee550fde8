//! Queue and scheduler configuration.

use serde::{Deserialize, Serialize};

/// Retry policy for the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum retries for retryable failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay; doubled before each retry.
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    /// Upper bound for the backoff delay.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay_ms() -> u64 {
    10_000
}

fn default_max_retry_delay_ms() -> u64 {
    300_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl QueueConfig {
    /// Delay a freshly enqueued task starts with.
    pub fn initial_delay_ms(&self) -> u64 {
        self.base_retry_delay_ms.min(self.max_retry_delay_ms)
    }

    /// Next backoff delay after `current`.
    pub fn next_delay_ms(&self, current: u64) -> u64 {
        current.saturating_mul(2).min(self.max_retry_delay_ms)
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of tasks running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Sleep between ticks when nothing can be claimed.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
