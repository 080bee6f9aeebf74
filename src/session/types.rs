//! Session data model
//!
//! A [`Session`] is the pair of credentials issued by the authentication
//! service together with the identity they belong to. It is only ever
//! replaced as a whole; see [`SessionStore`](crate::session::SessionStore).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// TokenPair
// ---------------------------------------------------------------------------

/// Access and refresh credentials.
///
/// The access token is attached to every outgoing API request. The refresh
/// token is only ever sent to the refresh endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer credential for ordinary API requests.
    pub access: String,
    /// Longer-lived credential used to obtain a new access token.
    pub refresh: String,
}

impl TokenPair {
    /// Creates a token pair from owned or borrowed strings.
    ///
    /// # Examples
    ///
    /// ```
    /// use roomkey::session::TokenPair;
    ///
    /// let tokens = TokenPair::new("A1", "R1");
    /// assert_eq!(tokens.access, "A1");
    /// assert_eq!(tokens.refresh, "R1");
    /// ```
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

// Tokens are credentials; keep them out of logs and panic messages.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Role of the authenticated user.
///
/// Serialized as its lowercase name. Unknown role strings from the server are
/// preserved in [`Role::Other`] rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Hotel staff with access to the admin console
    Admin,
    /// Guest making bookings
    #[default]
    Customer,
    /// Any role this client does not know about
    Other(String),
}

impl Role {
    /// Returns the wire name of the role.
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
            Role::Other(name) => name,
        }
    }

    /// Returns `true` for [`Role::Admin`].
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "customer" => Role::Customer,
            _ => Role::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UserIdentity
// ---------------------------------------------------------------------------

/// Identity of the logged-in user, as returned by login and registration.
///
/// Stored under the `user` record as `{id, username, email, role}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Server-side user identifier; numeric ids are accepted and kept as text
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Login name
    pub username: String,
    /// Contact address; may be empty when the server omits it
    #[serde(default)]
    pub email: String,
    /// Role used for admin/customer routing
    #[serde(default)]
    pub role: Role,
}

pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The current authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Credentials for this session
    pub tokens: TokenPair,
    /// Identity the credentials were issued to
    pub user: UserIdentity,
}

impl Session {
    /// Creates a session from its parts.
    pub fn new(tokens: TokenPair, user: UserIdentity) -> Self {
        Self { tokens, user }
    }

    /// Server-side identifier of the session's user.
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Role of the session's user.
    pub fn role(&self) -> &Role {
        &self.user.role
    }

    /// Returns a copy of this session carrying `tokens` instead, keeping the
    /// identity.
    pub fn with_tokens(&self, tokens: TokenPair) -> Self {
        Self {
            tokens,
            user: self.user.clone(),
        }
    }
}
