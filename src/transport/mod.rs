//! HTTP transport abstraction
//!
//! This module defines the [`Transport`] trait that carries a single
//! [`ApiRequest`] to the booking API and returns an [`ApiResponse`] or a
//! typed [`TransportError`]. The concrete implementation is
//! [`http::HttpTransport`], built on `reqwest`.
//!
//! # Design
//!
//! The trait is intentionally minimal: one request in, one response out. It
//! performs no authentication of its own; bearer credentials are attached by
//! [`RequestAuthenticator`](crate::auth::authenticator::RequestAuthenticator)
//! and the refresh call. Any non-success status is surfaced as an error, with
//! `401 Unauthorized` given its own variant because it is the one status the
//! authentication pipeline reacts to.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::TransportError;

pub use reqwest::Method;

/// Name of the header carrying bearer credentials.
pub const AUTHORIZATION: &str = "Authorization";

// ---------------------------------------------------------------------------
// ApiRequest
// ---------------------------------------------------------------------------

/// A single HTTP request, addressed relative to the API base URL.
///
/// Requests are plain data so that the same request can be sent a second
/// time after a token refresh.
///
/// # Examples
///
/// ```
/// use roomkey::transport::{ApiRequest, Method};
///
/// let request = ApiRequest::post("/bookings")
///     .json(serde_json::json!({"room_id": 12, "nights": 2}))
///     .header("X-Client", "roomkey");
///
/// assert_eq!(request.method, Method::POST);
/// assert_eq!(request.path, "/bookings");
/// assert!(request.body.is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the API base URL (e.g. `/rooms`), or an absolute URL
    pub path: String,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Shorthand for a `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Shorthand for a `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets the JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns a copy of this request carrying `Authorization: Bearer <token>`.
    ///
    /// Any existing `Authorization` header is replaced, whatever its casing.
    ///
    /// # Examples
    ///
    /// ```
    /// use roomkey::transport::ApiRequest;
    ///
    /// let request = ApiRequest::get("/rooms").with_bearer("A1");
    /// assert_eq!(request.bearer_token(), Some("A1"));
    /// ```
    pub fn with_bearer(&self, token: &str) -> Self {
        let mut request = self.clone();
        request
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION));
        request
            .headers
            .insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
        request
    }

    /// Returns the bearer token carried by this request, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION))
            .and_then(|(_, value)| value.strip_prefix("Bearer "))
    }
}

// ---------------------------------------------------------------------------
// ApiResponse
// ---------------------------------------------------------------------------

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// Numeric HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Response body as text
    pub body: String,
}

impl ApiResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Looks up a response header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Sends one HTTP request to the booking API.
///
/// Implementations map `401` to [`TransportError::Unauthorized`], every other
/// non-2xx status to [`TransportError::Status`], and timeouts to
/// [`TransportError::Timeout`]. They never retry.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Sends `request` and waits for the complete response.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for any non-success outcome.
    async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError>;
}

pub mod http;
