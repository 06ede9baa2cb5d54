//! Scheduler configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::TaskPriority;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Max concurrent API calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Max requests per rate window
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: u32,

    /// Rate limit window duration in seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Default priority for new requests
    #[serde(default)]
    pub default_priority: TaskPriority,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_requests_per_window() -> u32 {
    50
}

fn default_rate_window_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_requests_per_window: 50,
            rate_window_secs: 60,
            default_priority: TaskPriority::default(),
        }
    }
}

impl SchedulerConfig {
    /// Get the rate window as a Duration
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}
