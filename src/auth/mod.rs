//! Authentication pipeline
//!
//! - [`account`]: login, registration, logout
//! - [`refresh`]: single-flight access token refresh
//! - [`authenticator`]: bearer injection and one-shot retry after refresh

pub mod account;
pub mod authenticator;
pub mod refresh;

pub use account::AccountService;
pub use authenticator::RequestAuthenticator;
pub use refresh::{RefreshCoordinator, RefreshSettings, RotationPolicy};
