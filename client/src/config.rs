//! Configuration for the todo client.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::reducer::DEFAULT_MAX_TEXT_LEN;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use todo_sync_runtime::DEFAULT_BROADCAST_CAPACITY;

/// Log filter used when neither `RUST_LOG` nor `TODO_SYNC_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "todo_sync_client=info,todo_sync_runtime=info";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum length of a new item's text, in characters (default: 100)
    pub max_text_len: usize,
    /// How long an operation waits for its flow to finish (default: no limit)
    pub wait_timeout: Option<Duration>,
    /// Number of actions buffered for observers (default: 64)
    pub broadcast_capacity: usize,
    /// `tracing` filter directive, used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable values fall back to the defaults.
    ///
    /// - `TODO_SYNC_MAX_TEXT_LEN`
    /// - `TODO_SYNC_WAIT_TIMEOUT_MS` (0 means no limit)
    /// - `TODO_SYNC_BROADCAST_CAPACITY`
    /// - `TODO_SYNC_LOG`
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_text_len: env::var("TODO_SYNC_MAX_TEXT_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_text_len),
            wait_timeout: env::var("TODO_SYNC_WAIT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            broadcast_capacity: env::var("TODO_SYNC_BROADCAST_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.broadcast_capacity),
            log_filter: env::var("TODO_SYNC_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Set the maximum text length
    #[must_use]
    pub fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len;
        self
    }

    /// Set the wait timeout
    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Set the broadcast capacity
    #[must_use]
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            wait_timeout: None,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}
