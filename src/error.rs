//! Crate-wide error types.

use std::time::Duration;

use thiserror::Error;

/// Top-level error for all fallible operations in the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Authentication failed and could not be recovered by a token refresh.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The reference feed asked us to back off.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Non-success status from the reference feed or the exchange.
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// A response parsed but did not carry the shape we require.
    #[error("Unexpected payload: {0}")]
    Payload(String),

    /// An internal invariant was violated. Fatal for the current cycle.
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// True when retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_5xx_is_transient() {
        let err = Error::Api {
            status: 503,
            body: "unavailable".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn api_4xx_is_not_transient() {
        let err = Error::Api {
            status: 404,
            body: "not found".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn invariant_is_not_transient() {
        let err = Error::Invariant("total_stake exceeds cap".into());
        assert!(!err.is_transient());
    }
}
