use serde::Deserialize;

use crate::{core::time::Duration, t};

#[derive(Debug, Clone, Deserialize)]
pub struct WriteQueueConfig {
    /// Minimum spacing between two calls to the remote API, across all devices.
    #[serde(default = "default_interval")]
    pub interval: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: Duration,
    #[serde(default = "default_verification_delay")]
    pub verification_delay: Duration,
    /// Verification rounds that may re-issue writes before giving up, per consumer write.
    #[serde(default = "default_max_reconciliation_attempts")]
    pub max_reconciliation_attempts: u32,
}

impl Default for WriteQueueConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_retries: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            verification_delay: default_verification_delay(),
            max_reconciliation_attempts: default_max_reconciliation_attempts(),
        }
    }
}

fn default_interval() -> Duration {
    t!(2000 millis)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    t!(1 seconds)
}

fn default_retry_max_delay() -> Duration {
    t!(10 seconds)
}

fn default_verification_delay() -> Duration {
    t!(30 seconds)
}

fn default_max_reconciliation_attempts() -> u32 {
    5
}
