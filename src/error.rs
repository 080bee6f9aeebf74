//! Error types for Roomkey
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling.
//!
//! The request pipeline uses small typed enums ([`TransportError`],
//! [`RefreshError`], [`RequestError`], [`AccountError`]) so that callers can
//! match on the outcome of a dispatch. Ambient code (configuration, session
//! persistence, the CLI) returns [`Result`], an `anyhow` alias wrapping
//! [`RoomkeyError`].

use thiserror::Error;

/// Ambient error type for Roomkey operations
///
/// Covers configuration loading, session persistence, and the conversions
/// from the serialization and I/O crates the library depends on.
#[derive(Error, Debug)]
pub enum RoomkeyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session persistence errors (file backend, incomplete records)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure of a single HTTP exchange, as reported by a
/// [`Transport`](crate::transport::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered `401 Unauthorized`
    #[error("unauthorized{}", fmt_challenge(.www_authenticate))]
    Unauthorized {
        /// Value of the `WWW-Authenticate` response header, if any
        www_authenticate: Option<String>,
    },

    /// The server answered with any other non-success status
    #[error("HTTP {status}: {body}")]
    Status {
        /// Numeric HTTP status code
        status: u16,
        /// Response body as text (possibly empty)
        body: String,
    },

    /// Connection, TLS, or protocol failure before a status was received
    #[error("network failure: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// The request could not be built (bad URL, bad header value)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn fmt_challenge(challenge: &Option<String>) -> String {
    match challenge {
        Some(c) if !c.is_empty() => format!(" ({c})"),
        _ => String::new(),
    }
}

/// Terminal outcome of a token refresh attempt.
///
/// Every waiter of a failed attempt receives a clone of the same value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is stored; the user must log in again
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The authentication service refused the refresh token, or its answer
    /// could not be used
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The refresh call never produced a response (includes timeouts)
    #[error("refresh network failure: {0}")]
    NetworkFailure(String),
}

/// Error returned by
/// [`RequestAuthenticator::dispatch`](crate::auth::authenticator::RequestAuthenticator::dispatch).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Any transport failure other than the one handled by refresh, passed
    /// through unchanged. A retried request that is still unauthorized also
    /// lands here.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session could not be refreshed; the caller should route to login
    #[error("authentication required: {0}")]
    Authentication(#[from] RefreshError),

    /// The response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RequestError {
    /// Returns `true` when the error means the session is gone and the user
    /// has to authenticate again.
    pub fn is_authentication(&self) -> bool {
        matches!(self, RequestError::Authentication(_))
    }
}

/// Error returned by login, registration, and logout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// The authentication service refused the credentials or the payload
    #[error("authentication service returned {status}: {message}")]
    Rejected {
        /// Numeric HTTP status code
        status: u16,
        /// Server-provided message, or the raw body
        message: String,
    },

    /// The request never got an answer
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body did not match the expected shape
    #[error("failed to decode authentication response: {0}")]
    Decode(String),

    /// The session could not be persisted
    #[error("failed to persist session: {0}")]
    Storage(String),
}

/// Result type alias for Roomkey operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = RoomkeyError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_storage_error_display() {
        let error = RoomkeyError::Storage("session file is read-only".to_string());
        assert_eq!(
            error.to_string(),
            "Storage error: session file is read-only"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: RoomkeyError = io_error.into();
        assert!(matches!(error, RoomkeyError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: RoomkeyError = json_error.into();
        assert!(matches!(error, RoomkeyError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: RoomkeyError = yaml_error.into();
        assert!(matches!(error, RoomkeyError::Yaml(_)));
    }

    #[test]
    fn test_unauthorized_display_includes_challenge() {
        let error = TransportError::Unauthorized {
            www_authenticate: Some("Bearer error=\"invalid_token\"".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "unauthorized (Bearer error=\"invalid_token\")"
        );
    }

    #[test]
    fn test_unauthorized_display_without_challenge() {
        let error = TransportError::Unauthorized {
            www_authenticate: None,
        };
        assert_eq!(error.to_string(), "unauthorized");
    }

    #[test]
    fn test_status_error_display() {
        let error = TransportError::Status {
            status: 404,
            body: "room not found".to_string(),
        };
        assert_eq!(error.to_string(), "HTTP 404: room not found");
    }

    #[test]
    fn test_request_error_passes_transport_error_through() {
        let error: RequestError = TransportError::Timeout.into();
        assert_eq!(error, RequestError::Transport(TransportError::Timeout));
        assert!(!error.is_authentication());
    }

    #[test]
    fn test_request_error_from_refresh_is_authentication() {
        let error: RequestError = RefreshError::NoRefreshToken.into();
        assert!(error.is_authentication());
        assert_eq!(
            error.to_string(),
            "authentication required: no refresh token available"
        );
    }

    #[test]
    fn test_account_rejected_display() {
        let error = AccountError::Rejected {
            status: 401,
            message: "Invalid credentials".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "authentication service returned 401: Invalid credentials"
        );
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RoomkeyError>();
        assert_send_sync::<RefreshError>();
        assert_send_sync::<RequestError>();
        assert_send_sync::<AccountError>();
    }
}
