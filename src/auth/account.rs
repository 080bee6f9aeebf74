//! Login, registration, and logout
//!
//! [`AccountService`] talks to the authentication endpoints directly (they
//! take credentials, not bearer tokens) and turns a successful answer into a
//! [`Session`] in the [`SessionStore`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AccountError, TransportError};
use crate::session::claims::decode_claims;
use crate::session::types::deserialize_id;
use crate::session::{Role, Session, SessionStore, TokenPair, UserIdentity};
use crate::transport::{ApiRequest, Transport};

/// Login endpoint path, relative to the API base URL.
pub const LOGIN_PATH: &str = "/auth/login";

/// Registration endpoint path, relative to the API base URL.
pub const REGISTER_PATH: &str = "/auth/register";

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Body returned by login and registration.
#[derive(Deserialize)]
struct AuthResponse {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    role: Option<Role>,
}

/// Error body shapes the authentication service uses.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Account operations against the authentication service.
#[derive(Debug, Clone)]
pub struct AccountService {
    transport: Arc<dyn Transport>,
    store: Arc<SessionStore>,
}

impl AccountService {
    /// Creates a service writing sessions into `store`.
    pub fn new(transport: Arc<dyn Transport>, store: Arc<SessionStore>) -> Self {
        Self { transport, store }
    }

    /// Logs in with a username and password and stores the new session.
    ///
    /// # Errors
    ///
    /// - [`AccountError::Rejected`] when the service refuses the credentials.
    /// - [`AccountError::Transport`] when the service cannot be reached.
    /// - [`AccountError::Decode`] when the answer is not a session.
    /// - [`AccountError::Storage`] when the session cannot be persisted.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AccountError> {
        let body = serde_json::to_value(LoginBody { username, password })
            .map_err(|e| AccountError::Decode(e.to_string()))?;
        let session = self.authenticate(LOGIN_PATH, body).await?;
        tracing::info!(user_id = %session.user_id(), role = %session.role(), "Logged in");
        Ok(session)
    }

    /// Creates an account and stores the session issued for it.
    ///
    /// # Errors
    ///
    /// As [`login`](Self::login).
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, AccountError> {
        let body = serde_json::to_value(RegisterBody {
            username,
            email,
            password,
        })
        .map_err(|e| AccountError::Decode(e.to_string()))?;
        let session = self.authenticate(REGISTER_PATH, body).await?;
        tracing::info!(user_id = %session.user_id(), "Registered account");
        Ok(session)
    }

    /// Forgets the current session.
    ///
    /// Logging out while logged out is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Storage`] if the persisted session cannot be
    /// removed. The in-memory session is gone regardless.
    pub fn logout(&self) -> Result<(), AccountError> {
        let was_authenticated = self.store.is_authenticated();
        self.store
            .clear()
            .map_err(|e| AccountError::Storage(e.to_string()))?;
        if was_authenticated {
            tracing::info!("Logged out");
        }
        Ok(())
    }

    /// Identity of the logged-in user.
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.store.snapshot().map(|s| s.user.clone())
    }

    /// Role of the logged-in user.
    pub fn role(&self) -> Option<Role> {
        self.store.role()
    }

    async fn authenticate(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Session, AccountError> {
        let response = self
            .transport
            .send(ApiRequest::post(path).json(body))
            .await
            .map_err(rejection)?;

        let answer: AuthResponse = response
            .json()
            .map_err(|e| AccountError::Decode(e.to_string()))?;
        let session = into_session(answer);

        self.store
            .save(session.clone())
            .map_err(|e| AccountError::Storage(e.to_string()))?;
        Ok(session)
    }
}

fn into_session(answer: AuthResponse) -> Session {
    let role = answer
        .user
        .role
        .or_else(|| decode_claims(&answer.access_token).and_then(|c| c.role))
        .unwrap_or_default();

    Session::new(
        TokenPair::new(answer.access_token, answer.refresh_token),
        UserIdentity {
            id: answer.user.id,
            username: answer.user.username,
            email: answer.user.email,
            role,
        },
    )
}

fn rejection(err: TransportError) -> AccountError {
    match err {
        TransportError::Unauthorized { .. } => AccountError::Rejected {
            status: 401,
            message: "invalid credentials".to_string(),
        },
        TransportError::Status { status, body } => AccountError::Rejected {
            status,
            message: error_message(&body),
        },
        other => AccountError::Transport(other),
    }
}

/// Picks the `message` or `error` field out of a JSON error body, falling
/// back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::backend::MemoryBackend;
    use crate::transport::ApiResponse;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use std::sync::Mutex;

    /// Answers every request with one canned result and records the requests.
    #[derive(Debug)]
    struct CannedTransport {
        result: std::result::Result<ApiResponse, TransportError>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl CannedTransport {
        fn ok(body: &str) -> Self {
            Self::new(Ok(ApiResponse::new(200, body)))
        }

        fn new(result: std::result::Result<ApiResponse, TransportError>) -> Self {
            Self {
                result,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for CannedTransport {
        async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.result.clone()
        }
    }

    fn make_service(transport: CannedTransport) -> (AccountService, Arc<CannedTransport>, Arc<SessionStore>) {
        let transport = Arc::new(transport);
        let store = Arc::new(SessionStore::empty(Arc::new(MemoryBackend::new())));
        let service = AccountService::new(transport.clone(), store.clone());
        (service, transport, store)
    }

    fn jwt_with_payload(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    #[tokio::test]
    async fn test_login_posts_credentials_and_stores_session() {
        let (service, transport, store) = make_service(CannedTransport::ok(
            r#"{"access_token":"A1","refresh_token":"R1",
                "user":{"id":7,"username":"alice","email":"alice@example.com","role":"customer"}}"#,
        ));

        let session = service.login("alice", "s3cret").await.expect("login");

        let sent = transport.requests.lock().unwrap().clone();
        assert_eq!(sent[0].path, LOGIN_PATH);
        assert_eq!(
            sent[0].body,
            Some(serde_json::json!({"username": "alice", "password": "s3cret"}))
        );
        assert!(sent[0].bearer_token().is_none());

        assert_eq!(session.tokens, TokenPair::new("A1", "R1"));
        assert_eq!(session.user_id(), "7");
        assert_eq!(store.get(), Some(session));
    }

    #[tokio::test]
    async fn test_register_posts_email() {
        let (service, transport, store) = make_service(CannedTransport::ok(
            r#"{"access_token":"A1","refresh_token":"R1","user":{"id":"u-9","username":"bob"}}"#,
        ));

        service
            .register("bob", "bob@example.com", "pw")
            .await
            .expect("register");

        let sent = transport.requests.lock().unwrap().clone();
        assert_eq!(sent[0].path, REGISTER_PATH);
        assert_eq!(sent[0].body.as_ref().unwrap()["email"], "bob@example.com");
        assert_eq!(store.get().expect("session").user.email, "");
    }

    #[tokio::test]
    async fn test_role_falls_back_to_token_claim() {
        let access = jwt_with_payload(r#"{"sub":"3","role":"admin"}"#);
        let body = format!(
            r#"{{"access_token":"{access}","refresh_token":"R1","user":{{"id":3,"username":"ops"}}}}"#
        );
        let (service, _, _) = make_service(CannedTransport::ok(&body));

        let session = service.login("ops", "pw").await.expect("login");

        assert_eq!(session.role(), &Role::Admin);
        assert!(service.role().expect("role").is_admin());
    }

    #[tokio::test]
    async fn test_role_defaults_to_customer() {
        let (service, _, _) = make_service(CannedTransport::ok(
            r#"{"access_token":"opaque","refresh_token":"R1","user":{"id":1,"username":"guest"}}"#,
        ));

        let session = service.login("guest", "pw").await.expect("login");
        assert_eq!(session.role(), &Role::Customer);
    }

    #[tokio::test]
    async fn test_explicit_role_wins_over_claim() {
        let access = jwt_with_payload(r#"{"role":"admin"}"#);
        let body = format!(
            r#"{{"access_token":"{access}","refresh_token":"R1","user":{{"id":1,"username":"x","role":"customer"}}}}"#
        );
        let (service, _, _) = make_service(CannedTransport::ok(&body));

        let session = service.login("x", "pw").await.expect("login");
        assert_eq!(session.role(), &Role::Customer);
    }

    #[tokio::test]
    async fn test_rejection_uses_server_message() {
        let (service, _, store) = make_service(CannedTransport::new(Err(TransportError::Status {
            status: 400,
            body: r#"{"message":"Username already taken"}"#.to_string(),
        })));

        let err = service.register("alice", "a@b.c", "pw").await.unwrap_err();

        assert_eq!(
            err,
            AccountError::Rejected {
                status: 400,
                message: "Username already taken".to_string(),
            }
        );
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_login_is_rejected() {
        let (service, _, _) = make_service(CannedTransport::new(Err(TransportError::Unauthorized {
            www_authenticate: None,
        })));

        let err = service.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AccountError::Rejected { status: 401, .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let (service, _, _) = make_service(CannedTransport::new(Err(TransportError::Timeout)));

        let err = service.login("alice", "pw").await.unwrap_err();
        assert_eq!(err, AccountError::Transport(TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_malformed_answer_is_decode_error() {
        let (service, _, store) = make_service(CannedTransport::ok(r#"{"token":"A1"}"#));

        let err = service.login("alice", "pw").await.unwrap_err();
        assert!(matches!(err, AccountError::Decode(_)), "got: {err:?}");
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_is_idempotent() {
        let (service, _, store) = make_service(CannedTransport::ok(
            r#"{"access_token":"A1","refresh_token":"R1","user":{"id":1,"username":"a"}}"#,
        ));
        service.login("a", "pw").await.expect("login");
        assert!(service.current_user().is_some());

        service.logout().expect("logout");
        service.logout().expect("second logout");

        assert!(store.get().is_none());
        assert!(service.current_user().is_none());
    }

    #[test]
    fn test_error_message_prefers_message_then_error_then_body() {
        assert_eq!(error_message(r#"{"message":"m","error":"e"}"#), "m");
        assert_eq!(error_message(r#"{"error":"e"}"#), "e");
        assert_eq!(error_message("Service Unavailable\n"), "Service Unavailable");
    }
}
