use serde::Deserialize;

use crate::{core::time::Duration, t};

#[derive(Debug, Clone, Deserialize)]
pub struct StatusCacheConfig {
    #[serde(default = "default_ttl")]
    pub ttl: Duration,
    #[serde(default = "default_backoff_floor")]
    pub backoff_floor: Duration,
    #[serde(default = "default_backoff_ceiling")]
    pub backoff_ceiling: Duration,
}

impl Default for StatusCacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            backoff_floor: default_backoff_floor(),
            backoff_ceiling: default_backoff_ceiling(),
        }
    }
}

fn default_ttl() -> Duration {
    t!(1 seconds)
}

fn default_backoff_floor() -> Duration {
    t!(5 seconds)
}

fn default_backoff_ceiling() -> Duration {
    t!(5 minutes)
}
