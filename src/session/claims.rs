//! Unverified JWT payload inspection
//!
//! The authentication service issues JWT access tokens. The client never
//! validates them (that is the server's job) but reads a few claims from the
//! payload: the `role` claim fills in the user's role when the login response
//! omits it, and `exp` is shown by `roomkey whoami`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::session::Role;

/// Claims read from an access token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Subject (user identifier), if present
    #[serde(default, deserialize_with = "deserialize_subject")]
    pub sub: Option<String>,
    /// Role claim, if present
    #[serde(default)]
    pub role: Option<Role>,
    /// Expiry as seconds since the Unix epoch
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Returns the expiry as a UTC timestamp, if the token carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

fn deserialize_subject<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Decodes the payload segment of a JWT without verifying its signature.
///
/// Returns `None` when `token` is not a three-segment JWT or its payload is
/// not base64url-encoded JSON. Opaque tokens are therefore tolerated.
///
/// # Examples
///
/// ```
/// use roomkey::session::claims::decode_claims;
///
/// // {"role":"admin"}
/// let token = "eyJhbGciOiJub25lIn0.eyJyb2xlIjoiYWRtaW4ifQ.sig";
/// let claims = decode_claims(token).expect("claims");
/// assert!(claims.role.expect("role").is_admin());
///
/// assert!(decode_claims("opaque-token").is_none());
/// ```
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}
