/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `account`: login, register, logout, whoami
- `request`: send an authenticated request through the refresh pipeline

Handlers share a [`Context`] built once from configuration, so every
command in a process sees the same session store and transport.
*/

use std::sync::Arc;

use crate::auth::{AccountService, RequestAuthenticator};
use crate::config::{Config, SessionBackendKind, SessionConfig};
use crate::error::Result;
use crate::session::backend::{FileBackend, KeyringBackend, MemoryBackend, SessionBackend};
use crate::session::SessionStore;
use crate::transport::http::HttpTransport;
use crate::transport::Transport;

pub mod account;
pub mod request;

/// Components shared by all command handlers.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration
    pub config: Config,
    /// Session store loaded from the configured backend
    pub store: Arc<SessionStore>,
    /// Transport used for every call to the API
    pub transport: Arc<dyn Transport>,
}

impl Context {
    /// Builds the transport and loads the session store described by
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid, the HTTP client cannot be
    /// built, or the stored session cannot be read.
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.base_url()?, config.timeout())?);
        let backend = open_backend(&config.session)?;
        let store = Arc::new(SessionStore::load(backend)?);

        Ok(Self::new(config, store, transport))
    }

    /// Assembles a context from existing parts.
    pub fn new(config: Config, store: Arc<SessionStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            store,
            transport,
        }
    }

    /// Account operations over this context's store.
    pub fn accounts(&self) -> AccountService {
        AccountService::new(Arc::clone(&self.transport), Arc::clone(&self.store))
    }

    /// Authenticated dispatch over this context's store.
    pub fn authenticator(&self) -> RequestAuthenticator {
        RequestAuthenticator::from_parts(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            self.config.refresh_settings(),
        )
    }
}

/// Opens the session backend selected in `config`.
///
/// # Errors
///
/// Returns an error when the file backend has no usable location.
pub fn open_backend(config: &SessionConfig) -> Result<Arc<dyn SessionBackend>> {
    let backend: Arc<dyn SessionBackend> = match config.backend {
        SessionBackendKind::File => {
            let path = config.resolved_path()?;
            tracing::debug!(path = %path.display(), "Using file session backend");
            Arc::new(FileBackend::new(path))
        }
        SessionBackendKind::Keyring => {
            tracing::debug!(service = %config.keyring_service, "Using keyring session backend");
            Arc::new(KeyringBackend::new(config.keyring_service.clone()))
        }
        SessionBackendKind::Memory => {
            tracing::debug!("Using in-memory session backend");
            Arc::new(MemoryBackend::new())
        }
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, TokenPair, UserIdentity};

    #[test]
    fn test_file_backend_round_trips_through_context() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut config = Config::default();
        config.session.path = Some(dir.path().join("session.json"));

        let ctx = Context::from_config(config.clone()).expect("context");
        assert!(!ctx.store.is_authenticated());
        ctx.store
            .save(Session::new(
                TokenPair::new("A1", "R1"),
                UserIdentity {
                    id: "1".to_string(),
                    username: "alice".to_string(),
                    email: String::new(),
                    role: Default::default(),
                },
            ))
            .expect("save");

        let reopened = Context::from_config(config).expect("context");
        assert_eq!(reopened.store.access_token().as_deref(), Some("A1"));
    }

    #[test]
    fn test_memory_backend_starts_empty() {
        let mut config = Config::default();
        config.session.backend = SessionBackendKind::Memory;

        let ctx = Context::from_config(config).expect("context");
        assert!(!ctx.store.is_authenticated());
    }

    #[test]
    fn test_invalid_base_url_fails_context() {
        let mut config = Config::default();
        config.session.backend = SessionBackendKind::Memory;
        config.api.base_url = "::not a url::".to_string();

        assert!(Context::from_config(config).is_err());
    }
}
