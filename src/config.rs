//! Feed configuration from environment variables

use crate::core::Backoff;
use std::time::Duration;

/// Default feed endpoint of the results backend
pub const DEFAULT_SSE_URL: &str = "http://localhost:5050/api/events";

pub const ENV_SSE_URL: &str = "ELECTION_SSE_URL";
pub const ENV_BACKOFF_BASE_MS: &str = "ELECTION_BACKOFF_BASE_MS";
pub const ENV_BACKOFF_MAX_MS: &str = "ELECTION_BACKOFF_MAX_MS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveConfig {
    pub url: String,
    pub backoff: Backoff,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SSE_URL.to_string(),
            backoff: Backoff::default(),
        }
    }
}

impl LiveConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; unset or unparsable values fall
    /// back to the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Backoff::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        Self {
            url: lookup(ENV_SSE_URL).unwrap_or_else(|| DEFAULT_SSE_URL.to_string()),
            backoff: Backoff::new(
                millis(ENV_BACKOFF_BASE_MS, defaults.base),
                millis(ENV_BACKOFF_MAX_MS, defaults.max),
            ),
        }
    }
}
