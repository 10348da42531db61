//! Error types and handling for psegli
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting. The variants follow the
//! failure taxonomy of the bridge: authentication rejections trigger a cookie
//! refresh, navigation timeouts abort a login attempt, malformed data points
//! are skipped, and storage query failures degrade to a zero anchor.

use thiserror::Error;

/// Result type alias for psegli operations
pub type Result<T> = std::result::Result<T, PsegError>;

/// Main error type for psegli
#[derive(Debug, Error)]
pub enum PsegError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Cookie rejected or expired upstream
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// A UI element or URL transition did not happen in time
    #[error("Navigation timeout during {step}: {message}")]
    NavigationTimeout { step: String, message: String },

    /// Browser driver or page navigation failures that are not timeouts
    #[error("Navigation error: {message}")]
    Navigation { message: String },

    /// A single reading could not be interpreted
    #[error("Malformed data point {index}: {message}")]
    MalformedDataPoint { index: usize, message: String },

    /// No gateway candidate answered its health check
    #[error("Gateway unreachable: {message}")]
    UnreachableGateway { message: String },

    /// Continuity anchor lookup failed
    #[error("Statistics query error: {message}")]
    StorageQuery { message: String },

    /// Statistics import or store connection failed
    #[error("Statistics store error: {message}")]
    Storage { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Upstream API returned something unexpected
    #[error("API error: {message}")]
    Api { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// HTTP server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Timeout errors outside of browser navigation
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl PsegError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        PsegError::Config {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        PsegError::Auth {
            message: message.into(),
        }
    }

    /// Create a new navigation timeout for the given flow step
    pub fn navigation_timeout<S: Into<String>, M: Into<String>>(step: S, message: M) -> Self {
        PsegError::NavigationTimeout {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a new navigation error
    pub fn navigation<S: Into<String>>(message: S) -> Self {
        PsegError::Navigation {
            message: message.into(),
        }
    }

    /// Create a new malformed data point error
    pub fn malformed<S: Into<String>>(index: usize, message: S) -> Self {
        PsegError::MalformedDataPoint {
            index,
            message: message.into(),
        }
    }

    /// Create a new unreachable gateway error
    pub fn unreachable<S: Into<String>>(message: S) -> Self {
        PsegError::UnreachableGateway {
            message: message.into(),
        }
    }

    /// Create a new statistics query error
    pub fn storage_query<S: Into<String>>(message: S) -> Self {
        PsegError::StorageQuery {
            message: message.into(),
        }
    }

    /// Create a new statistics store error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        PsegError::Storage {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        PsegError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        PsegError::Api {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        PsegError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        PsegError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        PsegError::Web {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        PsegError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        PsegError::Generic {
            message: message.into(),
        }
    }

    /// True when the upstream rejected our cookie
    pub fn is_auth(&self) -> bool {
        matches!(self, PsegError::Auth { .. })
    }

    /// True for failures a browser flow step can recover from by navigating directly
    pub fn is_navigation_timeout(&self) -> bool {
        matches!(self, PsegError::NavigationTimeout { .. })
    }
}

impl From<std::io::Error> for PsegError {
    fn from(err: std::io::Error) -> Self {
        PsegError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PsegError {
    fn from(err: serde_yaml::Error) -> Self {
        PsegError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PsegError {
    fn from(err: serde_json::Error) -> Self {
        PsegError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PsegError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PsegError::timeout(err.to_string())
        } else {
            PsegError::network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PsegError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        PsegError::storage(err.to_string())
    }
}

impl From<chrono::ParseError> for PsegError {
    fn from(err: chrono::ParseError) -> Self {
        PsegError::validation("datetime".to_string(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PsegError::config("test config error");
        assert!(matches!(err, PsegError::Config { .. }));

        let err = PsegError::navigation_timeout("login_button", "not found");
        assert!(err.is_navigation_timeout());

        let err = PsegError::malformed(3, "not a number");
        assert!(matches!(err, PsegError::MalformedDataPoint { index: 3, .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PsegError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = PsegError::validation("test_field", "invalid value");
        assert_eq!(
            format!("{}", err),
            "Validation error: test_field - invalid value"
        );

        let err = PsegError::navigation_timeout("submit", "LOG IN button missing");
        assert_eq!(
            format!("{}", err),
            "Navigation timeout during submit: LOG IN button missing"
        );
    }

    #[test]
    fn auth_predicate_only_matches_auth() {
        assert!(PsegError::auth("expired").is_auth());
        assert!(!PsegError::network("down").is_auth());
        assert!(!PsegError::api("500").is_auth());
    }
}
