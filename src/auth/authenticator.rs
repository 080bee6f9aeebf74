//! Authenticated request dispatch
//!
//! [`RequestAuthenticator::dispatch`] is the single entry point for every
//! call to the booking API. It attaches the current access token, and when
//! the server answers `401 Unauthorized` it waits for the
//! [`RefreshCoordinator`] and replays the request once with the new token.
//!
//! The replay is bounded to one attempt per dispatch: if the retried request
//! is rejected again, that rejection is returned to the caller as-is.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::refresh::{RefreshCoordinator, RefreshSettings};
use crate::error::{RequestError, TransportError};
use crate::session::SessionStore;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// Sends API requests with bearer credentials and recovers from expired
/// access tokens.
///
/// Cloning is cheap; clones share the transport, store, and coordinator.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use url::Url;
/// use roomkey::auth::authenticator::RequestAuthenticator;
/// use roomkey::auth::refresh::RefreshSettings;
/// use roomkey::session::backend::MemoryBackend;
/// use roomkey::session::SessionStore;
/// use roomkey::transport::http::HttpTransport;
/// use roomkey::transport::ApiRequest;
///
/// # async fn example() -> anyhow::Result<()> {
/// let transport = Arc::new(HttpTransport::new(
///     Url::parse("http://localhost:5000/api")?,
///     Duration::from_secs(30),
/// )?);
/// let store = Arc::new(SessionStore::load(Arc::new(MemoryBackend::new()))?);
/// let client = RequestAuthenticator::from_parts(transport, store, RefreshSettings::default());
///
/// let response = client.dispatch(ApiRequest::get("/rooms")).await?;
/// println!("{}", response.body);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    coordinator: RefreshCoordinator,
}

impl RequestAuthenticator {
    /// Creates an authenticator around an existing coordinator.
    ///
    /// `coordinator` should have been built over the same `store`; requests
    /// read their token from `store` and the coordinator writes refreshed
    /// tokens back into it.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
        }
    }

    /// Creates an authenticator and its coordinator over one transport and
    /// store.
    pub fn from_parts(
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        settings: RefreshSettings,
    ) -> Self {
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&transport), Arc::clone(&store), settings);
        Self::new(transport, store, coordinator)
    }

    /// The refresh coordinator used by this authenticator.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// The session store tokens are read from.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Sends `request` with the current access token.
    ///
    /// 1. The stored access token, if any, is attached as a bearer
    ///    credential. No refresh is attempted up front.
    /// 2. Any outcome other than `401 Unauthorized` is returned unchanged.
    /// 3. On `401`, waits for [`RefreshCoordinator::ensure_fresh_token`].
    /// 4. With the new token the request is sent exactly once more and that
    ///    outcome is returned, whatever it is.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Transport`] for every transport failure, including a
    ///   retried request that is still unauthorized.
    /// - [`RequestError::Authentication`] when the session could not be
    ///   refreshed; the session has been cleared and the user must log in.
    pub async fn dispatch(
        &self,
        request: ApiRequest,
    ) -> std::result::Result<ApiResponse, RequestError> {
        let span = tracing::info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );
        self.dispatch_once_with_retry(request).instrument(span).await
    }

    async fn dispatch_once_with_retry(
        &self,
        request: ApiRequest,
    ) -> std::result::Result<ApiResponse, RequestError> {
        let first = match self.store.access_token() {
            Some(token) => request.with_bearer(&token),
            None => request.clone(),
        };

        match self.transport.send(first).await {
            Err(TransportError::Unauthorized { .. }) => {}
            other => return other.map_err(RequestError::from),
        }

        tracing::debug!("Access token rejected; waiting for refresh");
        let token = self.coordinator.ensure_fresh_token().await.map_err(|e| {
            tracing::warn!(error = %e, "Session could not be refreshed");
            RequestError::from(e)
        })?;

        tracing::debug!("Retrying request with refreshed token");
        self.transport
            .send(request.with_bearer(&token))
            .await
            .map_err(RequestError::from)
    }

    /// Dispatches a `GET` and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// As [`dispatch`](Self::dispatch), plus [`RequestError::Decode`] when
    /// the body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> std::result::Result<T, RequestError> {
        let response = self.dispatch(ApiRequest::get(path)).await?;
        response
            .json()
            .map_err(|e| RequestError::Decode(e.to_string()))
    }

    /// Dispatches `body` as JSON with `method` and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// As [`get_json`](Self::get_json). A body that cannot be serialized is
    /// reported as [`TransportError::InvalidRequest`].
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| TransportError::InvalidRequest(format!("unencodable body: {e}")))?;
        let response = self
            .dispatch(ApiRequest::new(method, path).json(body))
            .await?;
        response
            .json()
            .map_err(|e| RequestError::Decode(e.to_string()))
    }
}
