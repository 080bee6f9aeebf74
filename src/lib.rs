//! Roomkey - hotel booking API client library
//!
//! This library keeps a login session for the hotel booking API and sends
//! authenticated requests on its behalf. When the server rejects an expired
//! access token, concurrent requests share a single refresh call and are
//! each replayed once with the new token.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session data model, persistence backends, and the store
//! - `transport`: HTTP transport abstraction and the `reqwest` implementation
//! - `auth`: Login/logout, single-flight token refresh, authenticated dispatch
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface definition and handlers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use roomkey::auth::{AccountService, RequestAuthenticator};
//! use roomkey::session::backend::FileBackend;
//! use roomkey::session::SessionStore;
//! use roomkey::transport::http::HttpTransport;
//! use roomkey::transport::ApiRequest;
//! use roomkey::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let transport = Arc::new(HttpTransport::new(config.base_url()?, config.timeout())?);
//!     let store = Arc::new(SessionStore::load(Arc::new(FileBackend::new("session.json")))?);
//!
//!     AccountService::new(transport.clone(), store.clone())
//!         .login("alice", "s3cret")
//!         .await?;
//!
//!     let client = RequestAuthenticator::from_parts(transport, store, config.refresh_settings());
//!     let bookings = client.dispatch(ApiRequest::get("/bookings")).await?;
//!     println!("{}", bookings.body);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use auth::{AccountService, RefreshCoordinator, RequestAuthenticator};
pub use config::Config;
pub use error::{Result, RoomkeyError};
pub use session::{Session, SessionStore};

#[cfg(test)]
pub mod test_utils;
