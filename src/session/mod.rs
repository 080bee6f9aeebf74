//! Session ownership and persistence
//!
//! - [`types`] -- [`TokenPair`], [`UserIdentity`], [`Role`], [`Session`]
//! - [`store`] -- [`SessionStore`], the in-memory owner of the session
//! - [`backend`] -- durable keyed-record backends (file, keyring, memory)
//! - [`claims`] -- unverified JWT payload decoding for the role fallback

pub mod backend;
pub mod claims;
pub mod store;
pub mod types;

pub use store::SessionStore;
pub use types::{Role, Session, TokenPair, UserIdentity};
