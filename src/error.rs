use std::time::Duration;
use thiserror::Error;

/// Main error type for the emissary execution core
#[derive(Error, Debug, Clone)]
pub enum EmissaryError {
    /// Invalid construction or configuration, raised before any request runs
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Transport-level failure (connection reset, refused, protocol error)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// An attempt exceeded its time budget
    #[error("Operation timed out after {duration:?}: {operation}")]
    Timeout {
        duration: Duration,
        operation: String,
    },

    /// Hostname resolution produced no usable address
    #[error("Resolution failed for {host}: {message}")]
    Resolution { host: String, message: String },

    /// Retry budget exhausted; the last transport failure is in the message
    #[error("Retry budget exhausted after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// Redirect chain exceeded the configured depth
    #[error("Redirect limit of {limit} exceeded")]
    RedirectLimit { limit: usize },

    /// A rule action or evaluation failed at request time
    #[error("Rule error in '{rule}': {message}")]
    Rule { rule: String, message: String },

    /// Body encoding/decoding failed or no codec was registered
    #[error("Codec error for '{content_type}': {message}")]
    Codec {
        content_type: String,
        message: String,
    },

    /// The caller cancelled the request before a new attempt was scheduled
    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invariant violations inside the execution core
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EmissaryError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(duration: Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution<H: Into<String>, S: Into<String>>(host: H, message: S) -> Self {
        Self::Resolution {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a retry-budget-exhausted error
    pub fn retry_exhausted<S: Into<String>>(attempts: u32, message: S) -> Self {
        Self::RetryExhausted {
            attempts,
            message: message.into(),
        }
    }

    /// Create a redirect-limit error
    pub fn redirect_limit(limit: usize) -> Self {
        Self::RedirectLimit { limit }
    }

    /// Create a rule error
    pub fn rule<R: Into<String>, S: Into<String>>(rule: R, message: S) -> Self {
        Self::Rule {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Create a codec error
    pub fn codec<C: Into<String>, S: Into<String>>(content_type: C, message: S) -> Self {
        Self::Codec {
            content_type: content_type.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if the error is a recoverable transport-level failure.
    ///
    /// Resolution failures are deliberately excluded: an empty address set is
    /// not attempt-worthy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmissaryError::Transport { .. } | EmissaryError::Timeout { .. }
        )
    }

    /// Check if the error is a terminal policy violation, as opposed to the
    /// server or network failing
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            EmissaryError::RetryExhausted { .. } | EmissaryError::RedirectLimit { .. }
        )
    }
}

/// Result type alias for emissary operations
pub type EmissaryResult<T> = Result<T, EmissaryError>;

/// Convert from std::io::Error to EmissaryError
impl From<std::io::Error> for EmissaryError {
    fn from(err: std::io::Error) -> Self {
        EmissaryError::transport(format!("I/O error: {}", err))
    }
}

/// Convert from hyper::Error to EmissaryError
impl From<hyper::Error> for EmissaryError {
    fn from(err: hyper::Error) -> Self {
        if err.is_timeout() {
            EmissaryError::timeout(Duration::from_secs(30), "HTTP request")
        } else if err.is_connect() {
            EmissaryError::transport(format!("Connection error: {}", err))
        } else {
            EmissaryError::transport(format!("HTTP error: {}", err))
        }
    }
}

/// Convert from hyper::http::Error to EmissaryError
impl From<hyper::http::Error> for EmissaryError {
    fn from(err: hyper::http::Error) -> Self {
        EmissaryError::transport(format!("HTTP error: {}", err))
    }
}

/// Convert from hyper::http::uri::InvalidUri to EmissaryError
impl From<hyper::http::uri::InvalidUri> for EmissaryError {
    fn from(err: hyper::http::uri::InvalidUri) -> Self {
        EmissaryError::config(format!("Invalid URI: {}", err))
    }
}

/// Convert from toml::de::Error to EmissaryError
impl From<toml::de::Error> for EmissaryError {
    fn from(err: toml::de::Error) -> Self {
        EmissaryError::config(format!("TOML parsing error: {}", err))
    }
}

/// Convert from serde_json::Error to EmissaryError
impl From<serde_json::Error> for EmissaryError {
    fn from(err: serde_json::Error) -> Self {
        EmissaryError::config(format!("JSON parsing error: {}", err))
    }
}

/// Convert from notify::Error to EmissaryError
impl From<notify::Error> for EmissaryError {
    fn from(err: notify::Error) -> Self {
        EmissaryError::config(format!("File watching error: {}", err))
    }
}

/// Convert from tokio::time::Elapsed to EmissaryError
impl From<tokio::time::error::Elapsed> for EmissaryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        EmissaryError::timeout(Duration::from_secs(30), "operation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = EmissaryError::config("missing transmitter");
        assert!(matches!(config_err, EmissaryError::Config { .. }));
        assert_eq!(
            config_err.to_string(),
            "Configuration error: missing transmitter"
        );

        let transport_err = EmissaryError::transport("connection refused");
        assert!(matches!(transport_err, EmissaryError::Transport { .. }));
        assert_eq!(
            transport_err.to_string(),
            "Transport error: connection refused"
        );

        let timeout_err = EmissaryError::timeout(Duration::from_secs(10), "attempt");
        assert_eq!(
            timeout_err.to_string(),
            "Operation timed out after 10s: attempt"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EmissaryError::transport("reset").is_retryable());
        assert!(EmissaryError::timeout(Duration::from_secs(1), "x").is_retryable());

        assert!(!EmissaryError::config("bad").is_retryable());
        assert!(!EmissaryError::resolution("example.com", "empty set").is_retryable());
        assert!(!EmissaryError::retry_exhausted(4, "gave up").is_retryable());
        assert!(!EmissaryError::cancelled("retry").is_retryable());
    }

    #[test]
    fn test_policy_violation_classification() {
        assert!(EmissaryError::retry_exhausted(4, "gave up").is_policy_violation());
        assert!(EmissaryError::redirect_limit(5).is_policy_violation());
        assert!(!EmissaryError::transport("reset").is_policy_violation());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: EmissaryError = io_error.into();
        assert!(matches!(err, EmissaryError::Transport { .. }));

        let uri_error = "http://[".parse::<hyper::Uri>().unwrap_err();
        let err: EmissaryError = uri_error.into();
        assert!(matches!(err, EmissaryError::Config { .. }));
    }
}
