use crate::error::*;
use std::time::Duration;

/// Retry classification shared by every caller that decides whether to try again.
pub trait ErrorExt {
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
}

impl ErrorExt for CoreError {
    /// Remote and transport failures are transient; configuration and export
    /// failures need the user to change something first.
    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Network(_) | CoreError::Io(_) | CoreError::Serialization(_) => true,
            CoreError::Config(_) | CoreError::Export(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(e) => e.retry_after(),
            _ => None,
        }
    }
}

impl ErrorExt for RedditApiError {
    /// Everything the platform can answer differently on a second try counts
    /// as transient. A rejected token is re-requested on the next attempt; bad
    /// credentials are not.
    fn is_retryable(&self) -> bool {
        !matches!(self, RedditApiError::AuthenticationFailed { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }
}

impl ConfigError {
    pub fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' does not exist.", path)
            }
            ConfigError::ReadFailed { path, reason } => {
                format!("Configuration file '{}' could not be read: {}", path, reason)
            }
            ConfigError::MissingField { field } => {
                format!("Configuration is missing the required field '{}'.", field)
            }
            ConfigError::InvalidValue { field, value } => {
                format!("'{}' is not a valid value for '{}'.", value, field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Set {} (or the matching entry under [credentials]) before running.",
                var_name
            ),
            ConfigError::ValidationFailed { reason } => reason.clone(),
            ConfigError::Parse(e) => format!("Configuration file could not be parsed: {}", e),
        }
    }
}
