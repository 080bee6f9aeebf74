//! `reqwest`-backed HTTP transport
//!
//! [`HttpTransport`] resolves each [`ApiRequest`] path against the configured
//! API base URL, sends it with a per-request timeout, and classifies the
//! outcome into an [`ApiResponse`] or a [`TransportError`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Result, RoomkeyError, TransportError};
use crate::transport::{ApiRequest, ApiResponse, Transport, AUTHORIZATION};

/// HTTP transport for the booking API.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use url::Url;
/// use roomkey::transport::http::HttpTransport;
///
/// let transport = HttpTransport::new(
///     Url::parse("http://localhost:5000/api").unwrap(),
///     Duration::from_secs(30),
/// )
/// .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Underlying reqwest HTTP client.
    http_client: Arc<reqwest::Client>,
    /// Base URL every relative path is appended to.
    base_url: Url,
}

impl HttpTransport {
    /// Construct a new [`HttpTransport`] for `base_url`.
    ///
    /// The `timeout` applies to each individual HTTP request, including the
    /// token refresh call.
    ///
    /// # Errors
    ///
    /// Returns [`RoomkeyError::Http`] if the TLS backend cannot be
    /// initialised.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("roomkey/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RoomkeyError::Http)?;

        Ok(Self::with_client(Arc::new(http_client), base_url))
    }

    /// Construct a transport around an existing client.
    pub fn with_client(http_client: Arc<reqwest::Client>, base_url: Url) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL.
    ///
    /// Relative paths are appended to the base path (so `/rooms` on
    /// `http://host/api` becomes `http://host/api/rooms`). Absolute `http(s)`
    /// URLs are used as given; [`Transport::send`] strips credentials from
    /// those that leave the API origin.
    pub fn resolve(&self, path: &str) -> std::result::Result<Url, TransportError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).map_err(|e| TransportError::InvalidRequest(e.to_string()));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    /// Sends the request and reads the whole body.
    ///
    /// - `2xx`: returned as [`ApiResponse`].
    /// - `401 Unauthorized`: [`TransportError::Unauthorized`] carrying the
    ///   `WWW-Authenticate` header.
    /// - any other status: [`TransportError::Status`] with the body text.
    async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
        let url = self.resolve(&request.path)?;
        let foreign_host = (url.origin() != self.base_url.origin())
            .then(|| url.host_str().unwrap_or_default().to_string());
        tracing::trace!(method = %request.method, url = %url, "Sending HTTP request");

        let mut req = self
            .http_client
            .request(request.method.clone(), url)
            .header("Accept", "application/json");

        for (k, v) in &request.headers {
            if let Some(ref host) = foreign_host {
                if k.eq_ignore_ascii_case(AUTHORIZATION) {
                    tracing::debug!(host = %host, "Not sending credentials to foreign origin");
                    continue;
                }
            }
            req = req.header(k.as_str(), v.as_str());
        }

        if let Some(ref body) = request.body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(classify)?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            let www_authenticate = response
                .headers()
                .get("WWW-Authenticate")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            return Err(TransportError::Unauthorized { www_authenticate });
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
