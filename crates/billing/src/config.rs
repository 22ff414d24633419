//! Billing configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! task_queue = "billing-prod"
//! allowed_currencies = ["USD", "GEL"]
//! mailbox_capacity = 32
//! history_dir = "/var/lib/billing/history"
//!
//! [retry]
//! max_attempts = 3
//! interval_ms = 0
//! ```

use crate::model::CurrencySet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use workflow_framework::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Work-queue name stamped on every run's history.
    pub task_queue: String,
    pub allowed_currencies: Vec<String>,
    pub retry: RetryConfig,
    /// Bound of each run's request and signal channels.
    pub mailbox_capacity: usize,
    /// Directory for JSON-lines run histories. In-memory history when unset.
    pub history_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            task_queue: "billing".to_string(),
            allowed_currencies: CurrencySet::default().iter().map(String::from).collect(),
            retry: RetryConfig::default(),
            mailbox_capacity: 32,
            history_dir: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            interval_ms: 0,
        }
    }
}

impl BillingConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_queue.trim().is_empty() {
            return Err(ConfigError::Invalid("task_queue must not be empty".into()));
        }
        if self.currency_set().is_empty() {
            return Err(ConfigError::Invalid(
                "allowed_currencies must name at least one currency".into(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mailbox_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts)
            .with_interval(Duration::from_millis(self.retry.interval_ms))
    }

    pub fn currency_set(&self) -> CurrencySet {
        CurrencySet::new(&self.allowed_currencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = BillingConfig::from_toml("").unwrap();
        assert_eq!(config, BillingConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.currency_set().contains("USD"));
        assert!(config.currency_set().contains("GEL"));
        assert!(!config.currency_set().contains("GEP"));
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = BillingConfig::from_toml(
            r#"
            task_queue = "billing-staging"
            allowed_currencies = ["USD", "GEL", "GEP"]
            history_dir = "/tmp/history"

            [retry]
            max_attempts = 5
            interval_ms = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.task_queue, "billing-staging");
        assert!(config.currency_set().contains("GEP"));
        assert_eq!(config.history_dir, Some(PathBuf::from("/tmp/history")));
        assert_eq!(config.mailbox_capacity, 32);
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.interval, Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for toml in [
            "allowed_currencies = []",
            "task_queue = \"  \"",
            "mailbox_capacity = 0",
        ] {
            assert!(
                matches!(BillingConfig::from_toml(toml), Err(ConfigError::Invalid(_))),
                "{toml} should be rejected"
            );
        }
        assert!(matches!(
            BillingConfig::from_toml("mailbox_capacity = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = BillingConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
