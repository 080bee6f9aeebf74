//! Test utilities for Roomkey
//!
//! This module provides in-process fakes for the [`Transport`] and
//! [`SessionBackend`] seams so that unit tests can drive the authentication
//! pipeline deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::auth::refresh::DEFAULT_REFRESH_PATH;
use crate::error::{Result, RoomkeyError, TransportError};
use crate::session::backend::{SessionBackend, SessionRecords};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// A fake API server.
///
/// - Requests to the refresh path answer with the configured refresh body or
///   error, optionally after waiting on a gate.
/// - Every other request succeeds with `{"ok":true}` when it carries
///   `Bearer <valid_token>` and fails with `Unauthorized` otherwise.
///
/// Every request is recorded.
#[derive(Debug)]
pub struct ScriptedTransport {
    valid_token: String,
    refresh_result: Mutex<std::result::Result<String, TransportError>>,
    api_override: Mutex<Option<TransportError>>,
    gate: Option<Arc<Notify>>,
    requests: Mutex<Vec<ApiRequest>>,
    refresh_calls: AtomicUsize,
}

impl ScriptedTransport {
    /// Creates a fake that accepts `valid_token` on API requests.
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: valid_token.to_string(),
            refresh_result: Mutex::new(Ok(format!(r#"{{"access_token":"{valid_token}"}}"#))),
            api_override: Mutex::new(None),
            gate: None,
            requests: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    /// Answers refresh calls with `body`.
    pub fn refresh_body(self, body: &str) -> Self {
        *self.refresh_result.lock().unwrap() = Ok(body.to_string());
        self
    }

    /// Fails refresh calls with `error`.
    pub fn refresh_error(self, error: TransportError) -> Self {
        *self.refresh_result.lock().unwrap() = Err(error);
        self
    }

    /// Fails every non-refresh request with `error`, whatever its token.
    pub fn api_error(self, error: TransportError) -> Self {
        *self.api_override.lock().unwrap() = Some(error);
        self
    }

    /// Holds every refresh call until the returned gate is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Number of refresh calls received.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// All requests received, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Refresh requests received, in order.
    pub fn refresh_requests(&self) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == DEFAULT_REFRESH_PATH)
            .collect()
    }

    /// Non-refresh requests received, in order.
    pub fn api_requests(&self) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path != DEFAULT_REFRESH_PATH)
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        if request.path == DEFAULT_REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            let result = self.refresh_result.lock().unwrap().clone();
            return result.map(|body| ApiResponse::new(200, body));
        }

        let api_override = self.api_override.lock().unwrap().clone();
        if let Some(error) = api_override {
            return Err(error);
        }

        if request.bearer_token() == Some(self.valid_token.as_str()) {
            Ok(ApiResponse::new(200, r#"{"ok":true}"#))
        } else {
            Err(TransportError::Unauthorized {
                www_authenticate: Some("Bearer error=\"invalid_token\"".to_string()),
            })
        }
    }
}

/// A backend whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingBackend;

impl SessionBackend for FailingBackend {
    fn load(&self) -> Result<SessionRecords> {
        Err(RoomkeyError::Storage("backend unavailable".to_string()).into())
    }

    fn store(&self, _records: &SessionRecords) -> Result<()> {
        Err(RoomkeyError::Storage("backend unavailable".to_string()).into())
    }

    fn clear(&self) -> Result<()> {
        Err(RoomkeyError::Storage("backend unavailable".to_string()).into())
    }
}
