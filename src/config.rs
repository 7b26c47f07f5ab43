//! Configuration management for the health monitor

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Hard timeout for a website probe
    pub website_timeout: Duration,

    /// Interval between website polls
    pub website_poll_interval: Duration,

    /// Interval between repository polls
    pub repo_poll_interval: Duration,

    /// Hard timeout for each source-hosting API request
    pub repo_timeout: Duration,

    /// Absolute response time a spike must exceed, in milliseconds
    pub spike_threshold_ms: u64,

    /// A spike must also exceed the previous response time times this factor
    pub spike_multiplier: u64,

    /// Number of uptime samples retained per website
    pub history_capacity: usize,

    /// Width of one uptime sample; polls within the same slot share an entry
    pub history_sample_interval: Duration,

    /// Upper bound of the random delay before a resource's first poll
    pub start_jitter: Duration,

    /// Base URL of the source-hosting API
    pub github_api_url: String,

    /// Optional API token, sent as `Authorization: token ...`
    #[serde(skip_serializing)]
    pub github_token: Option<String>,

    /// User agent for all outgoing requests
    pub user_agent: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            website_timeout: Duration::from_millis(30_000),
            website_poll_interval: Duration::from_secs(15),
            repo_poll_interval: Duration::from_secs(30),
            repo_timeout: Duration::from_secs(30),
            spike_threshold_ms: 2000,
            spike_multiplier: 3,
            history_capacity: 96,
            history_sample_interval: Duration::from_secs(15 * 60),
            start_jitter: Duration::from_secs(2),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            github_token: None,
            user_agent: format!("health_monitor/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Self {
        let mut config = MonitorConfig::default();

        if let Some(ms) = env_millis("WEBSITE_TIMEOUT_MS") {
            config.website_timeout = ms;
        }

        if let Some(ms) = env_millis("WEBSITE_POLL_INTERVAL_MS") {
            config.website_poll_interval = ms;
        }

        if let Some(ms) = env_millis("REPO_POLL_INTERVAL_MS") {
            config.repo_poll_interval = ms;
        }

        if let Some(ms) = env_millis("REPO_TIMEOUT_MS") {
            config.repo_timeout = ms;
        }

        if let Ok(threshold) = env::var("SPIKE_THRESHOLD_MS") {
            if let Ok(value) = threshold.parse() {
                config.spike_threshold_ms = value;
            }
        }

        if let Ok(multiplier) = env::var("SPIKE_MULTIPLIER") {
            if let Ok(value) = multiplier.parse() {
                config.spike_multiplier = value;
            }
        }

        if let Ok(capacity) = env::var("HISTORY_CAPACITY") {
            if let Ok(value) = capacity.parse() {
                config.history_capacity = value;
            }
        }

        if let Some(ms) = env_millis("HISTORY_SAMPLE_INTERVAL_MS") {
            config.history_sample_interval = ms;
        }

        if let Some(ms) = env_millis("START_JITTER_MS") {
            config.start_jitter = ms;
        }

        if let Ok(api_url) = env::var("GITHUB_API_URL") {
            config.github_api_url = api_url.trim_end_matches('/').to_string();
        }

        if let Ok(token) = env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                config.github_token = Some(token);
            }
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.website_timeout.is_zero() {
            return Err("website_timeout must be greater than 0".to_string());
        }

        if self.repo_timeout.is_zero() {
            return Err("repo_timeout must be greater than 0".to_string());
        }

        if self.website_poll_interval.is_zero() {
            return Err("website_poll_interval must be greater than 0".to_string());
        }

        if self.repo_poll_interval.is_zero() {
            return Err("repo_poll_interval must be greater than 0".to_string());
        }

        if self.spike_multiplier == 0 {
            return Err("spike_multiplier must be greater than 0".to_string());
        }

        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than 0".to_string());
        }

        if self.github_api_url.is_empty() {
            return Err("github_api_url cannot be empty".to_string());
        }

        Ok(())
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_match_construction_parameters() {
        let config = MonitorConfig::default();
        assert_eq!(config.website_timeout, Duration::from_millis(30_000));
        assert_eq!(config.spike_threshold_ms, 2000);
        assert_eq!(config.spike_multiplier, 3);
        assert_eq!(config.history_capacity, 96);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = MonitorConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = MonitorConfig {
            website_poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "website_poll_interval must be greater than 0"
        );
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = MonitorConfig {
            github_token: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
