//! Single-flight access token refresh
//!
//! [`RefreshCoordinator`] guarantees that, however many requests discover an
//! expired access token at the same time, exactly one call is made to the
//! refresh endpoint and every one of those requests receives its outcome.
//!
//! # State machine
//!
//! ```text
//!            first caller (refresh token present)
//!   Idle  ─────────────────────────────────────────▶  Refreshing { waiters }
//!    ▲                                                  │   ▲
//!    │        refresh settled: store updated or         │   │ later callers
//!    └────────cleared, every waiter resolved once ◀─────┘   └─ push a waiter
//! ```
//!
//! The check of the current state, the read of the refresh token, and the
//! switch to `Refreshing` happen under one mutex, so two callers can never
//! both start a refresh. Waiters are `oneshot` senders held in arrival order.
//!
//! The refresh call itself runs on a spawned task. Dropping the future of
//! the caller that started it therefore neither cancels the refresh nor
//! strands the other waiters. If the task is torn down before it settles
//! (runtime shutdown, panic), a guard returns the state to `Idle` and drops
//! the pending senders, so every waiter observes an error instead of hanging.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::error::{RefreshError, TransportError};
use crate::session::{Session, SessionStore, TokenPair};
use crate::transport::{ApiRequest, Transport};

/// Default path of the refresh endpoint, relative to the API base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Outcome delivered to every waiter of one refresh attempt.
pub type RefreshOutcome = std::result::Result<String, RefreshError>;

type Waiter = oneshot::Sender<RefreshOutcome>;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// What to do when a refresh response carries no new refresh token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Adopt a rotated refresh token when one is returned; otherwise keep
    /// using the current one.
    #[default]
    Optional,
    /// The server must rotate the refresh token on every refresh. A response
    /// without one is treated as a rejected refresh and ends the session.
    Required,
}

/// Settings for [`RefreshCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Refresh endpoint path, relative to the API base URL
    pub refresh_path: String,
    /// Refresh token rotation policy
    pub rotation: RotationPolicy,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            rotation: RotationPolicy::default(),
        }
    }
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

// ---------------------------------------------------------------------------
// RefreshState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
enum RefreshState {
    /// No refresh call is outstanding.
    #[default]
    Idle,
    /// One refresh call is outstanding; `waiters` receive its outcome.
    Refreshing { waiters: Vec<Waiter> },
}

/// Role of a caller after the state check.
enum Entry {
    /// The caller started the refresh and waits like everyone else.
    Driver(oneshot::Receiver<RefreshOutcome>, String),
    /// A refresh was already running; the caller joined it.
    Joined(oneshot::Receiver<RefreshOutcome>),
}

/// Settles one refresh attempt exactly once.
///
/// Created before the refresh task is spawned and moved into it.
/// [`InFlight::settle`] resolves every waiter with the outcome; dropping the
/// guard without settling resets the state and drops the senders.
struct InFlight {
    state: Arc<Mutex<RefreshState>>,
    settled: bool,
}

impl InFlight {
    fn new(state: Arc<Mutex<RefreshState>>) -> Self {
        Self {
            state,
            settled: false,
        }
    }

    fn take_waiters(&self) -> Vec<Waiter> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::take(&mut *state) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }

    fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        let waiters = self.take_waiters();
        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away has dropped its receiver; its
            // result is discarded.
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.take_waiters().len();
            tracing::warn!(waiters = abandoned, "Token refresh abandoned before settling");
        }
    }
}

// ---------------------------------------------------------------------------
// RefreshCoordinator
// ---------------------------------------------------------------------------

/// Coordinates access token refreshes across concurrent requests.
///
/// Cloning is cheap; clones share the same state, store, and transport.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use url::Url;
/// use roomkey::auth::refresh::{RefreshCoordinator, RefreshSettings};
/// use roomkey::session::backend::MemoryBackend;
/// use roomkey::session::SessionStore;
/// use roomkey::transport::http::HttpTransport;
///
/// # async fn example() -> anyhow::Result<()> {
/// let transport = Arc::new(HttpTransport::new(
///     Url::parse("http://localhost:5000/api")?,
///     Duration::from_secs(30),
/// )?);
/// let store = Arc::new(SessionStore::load(Arc::new(MemoryBackend::new()))?);
/// let coordinator = RefreshCoordinator::new(transport, store, RefreshSettings::default());
///
/// match coordinator.ensure_fresh_token().await {
///     Ok(token) => println!("new access token issued ({} bytes)", token.len()),
///     Err(e) => println!("log in again: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
    settings: RefreshSettings,
    state: Arc<Mutex<RefreshState>>,
}

impl RefreshCoordinator {
    /// Creates an idle coordinator.
    ///
    /// # Arguments
    ///
    /// * `transport` - Transport used for the refresh call.
    /// * `store` - Session store holding the refresh token; updated on
    ///   success, cleared on failure.
    /// * `settings` - Refresh endpoint and rotation policy.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<SessionStore>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            transport,
            store,
            settings,
            state: Arc::new(Mutex::new(RefreshState::Idle)),
        }
    }

    /// Returns a fresh access token, refreshing it or joining a refresh that
    /// is already running.
    ///
    /// - If a refresh is in flight, waits for its outcome without any network
    ///   call of its own.
    /// - Otherwise starts exactly one refresh using the stored refresh token.
    ///   On success the new token pair is stored and returned to every
    ///   waiter. On failure the session is cleared and every waiter receives
    ///   the same error.
    ///
    /// Every call made while idle performs one refresh; nothing is cached
    /// beyond the token itself.
    ///
    /// # Errors
    ///
    /// - [`RefreshError::NoRefreshToken`] immediately, with no network call
    ///   and no state change, when no refresh token is stored.
    /// - [`RefreshError::Rejected`] when the service refuses the refresh
    ///   token or answers with something unusable.
    /// - [`RefreshError::NetworkFailure`] when the call fails or times out.
    pub async fn ensure_fresh_token(&self) -> RefreshOutcome {
        let entry = {
            let mut state = self.lock_state();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    tracing::debug!(waiters = waiters.len(), "Joining in-flight token refresh");
                    Entry::Joined(rx)
                }
                RefreshState::Idle => {
                    let Some(refresh_token) = self.store.refresh_token() else {
                        tracing::debug!("No refresh token stored; not refreshing");
                        return Err(RefreshError::NoRefreshToken);
                    };
                    let (tx, rx) = oneshot::channel();
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    Entry::Driver(rx, refresh_token)
                }
            }
        };

        let receiver = match entry {
            Entry::Joined(rx) => rx,
            Entry::Driver(rx, refresh_token) => {
                self.spawn_refresh(refresh_token);
                rx
            }
        };

        receiver.await.unwrap_or_else(|_| {
            Err(RefreshError::NetworkFailure(
                "token refresh was abandoned".to_string(),
            ))
        })
    }

    /// Returns `true` while a refresh call is outstanding.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Number of callers currently waiting on the in-flight refresh,
    /// including the one that started it.
    pub fn waiter_count(&self) -> usize {
        match &*self.lock_state() {
            RefreshState::Refreshing { waiters } => waiters.len(),
            RefreshState::Idle => 0,
        }
    }

    /// The store this coordinator updates.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_refresh(&self, refresh_token: String) {
        let this = self.clone();
        let span = tracing::info_span!("token_refresh", path = %self.settings.refresh_path);
        // Owned by the task from the start, so dropping the task before its
        // first poll still releases the waiters.
        let flight = InFlight::new(Arc::clone(&self.state));

        tokio::spawn(
            async move {
                let outcome = this.request_new_tokens(&refresh_token).await;
                let outcome = this.apply(outcome, &refresh_token);
                let failed = outcome.as_ref().err().cloned();
                let resolved = flight.settle(outcome);

                match failed {
                    None => tracing::info!(waiters = resolved, "Token refresh succeeded"),
                    Some(e) => tracing::warn!(waiters = resolved, error = %e, "Token refresh failed"),
                }
            }
            .instrument(span),
        );
    }

    /// Performs the refresh call and interprets the answer.
    async fn request_new_tokens(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<TokenPair, RefreshError> {
        let request = ApiRequest::post(self.settings.refresh_path.clone()).with_bearer(refresh_token);

        let response = self.transport.send(request).await.map_err(|e| match e {
            TransportError::Unauthorized { .. } => {
                RefreshError::Rejected("refresh token was not accepted".to_string())
            }
            TransportError::Status { status, body } if status < 500 => {
                RefreshError::Rejected(format!("refresh endpoint returned {status}: {body}"))
            }
            TransportError::Status { status, .. } => {
                RefreshError::NetworkFailure(format!("refresh endpoint returned {status}"))
            }
            TransportError::Timeout => {
                RefreshError::NetworkFailure("refresh request timed out".to_string())
            }
            TransportError::Network(msg) | TransportError::InvalidRequest(msg) => {
                RefreshError::NetworkFailure(msg)
            }
        })?;

        let body: RefreshResponse = response
            .json()
            .map_err(|e| RefreshError::Rejected(format!("malformed refresh response: {e}")))?;

        if body.access_token.is_empty() {
            return Err(RefreshError::Rejected(
                "refresh response carried an empty access token".to_string(),
            ));
        }

        let refresh = match (body.refresh_token, self.settings.rotation) {
            (Some(rotated), _) if !rotated.is_empty() => rotated,
            (_, RotationPolicy::Optional) => refresh_token.to_string(),
            (_, RotationPolicy::Required) => {
                return Err(RefreshError::Rejected(
                    "refresh response did not rotate the refresh token".to_string(),
                ))
            }
        };

        Ok(TokenPair::new(body.access_token, refresh))
    }

    /// Applies a refresh outcome to the session store.
    ///
    /// Only the session the refresh was made for is touched: if the stored
    /// refresh token changed meanwhile (logout, or a new login), new tokens
    /// are discarded and a failure leaves the replacement session alone. The
    /// check and the write are one store operation.
    fn apply(
        &self,
        outcome: std::result::Result<TokenPair, RefreshError>,
        used_refresh_token: &str,
    ) -> RefreshOutcome {
        let same_session = |s: &Session| s.tokens.refresh == used_refresh_token;

        match outcome {
            Ok(tokens) => {
                let access = tokens.access.clone();
                match self
                    .store
                    .replace_if(same_session, |s| s.with_tokens(tokens))
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!("Session changed while refreshing; discarding new tokens");
                        return Err(RefreshError::Rejected(
                            "session changed while refreshing".to_string(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Refreshed tokens could not be persisted");
                    }
                }
                Ok(access)
            }
            Err(e) => {
                match self.store.clear_if(same_session) {
                    Ok(true) => tracing::info!("Cleared session after failed token refresh"),
                    Ok(false) => {}
                    Err(err) => tracing::warn!(error = %err, "Session could not be cleared"),
                }
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
