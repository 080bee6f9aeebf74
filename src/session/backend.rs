//! Durable session persistence
//!
//! A session is persisted as four keyed records:
//!
//! | key             | value                                        |
//! |-----------------|----------------------------------------------|
//! | `token`         | current access token                         |
//! | `refresh_token` | current refresh token                        |
//! | `user`          | JSON identity `{id, username, email, role}`  |
//! | `role`          | copy of the identity's role for fast checks  |
//!
//! Three backends implement [`SessionBackend`]:
//!
//! - [`FileBackend`] -- a JSON file on disk, replaced atomically on write
//! - [`KeyringBackend`] -- one OS keyring entry per record
//! - [`MemoryBackend`] -- process-local, for tests and ephemeral runs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomkeyError};
use crate::session::{Role, Session, TokenPair, UserIdentity};

/// Record key for the access token.
pub const RECORD_TOKEN: &str = "token";
/// Record key for the refresh token.
pub const RECORD_REFRESH_TOKEN: &str = "refresh_token";
/// Record key for the serialized identity.
pub const RECORD_USER: &str = "user";
/// Record key for the denormalized role.
pub const RECORD_ROLE: &str = "role";

// ---------------------------------------------------------------------------
// SessionRecords
// ---------------------------------------------------------------------------

/// The keyed records a backend reads and writes.
///
/// Every field is optional so that a backend can report exactly what it
/// found; [`SessionRecords::into_session`] decides whether that amounts to a
/// usable session.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecords {
    /// Access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Identity serialized as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Role name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl fmt::Debug for SessionRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecords")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("user", &self.user)
            .field("role", &self.role)
            .finish()
    }
}

impl SessionRecords {
    /// Builds the record set for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomkeyError::Serialization`] if the identity cannot be
    /// serialized.
    pub fn from_session(session: &Session) -> Result<Self> {
        Ok(Self {
            token: Some(session.tokens.access.clone()),
            refresh_token: Some(session.tokens.refresh.clone()),
            user: Some(serde_json::to_string(&session.user).map_err(RoomkeyError::from)?),
            role: Some(session.user.role.to_string()),
        })
    }

    /// Returns `true` when no record is present at all.
    pub fn is_empty(&self) -> bool {
        self.token.is_none()
            && self.refresh_token.is_none()
            && self.user.is_none()
            && self.role.is_none()
    }

    /// Reassembles a [`Session`] from the records.
    ///
    /// A partial record set (for example a token without an identity, left
    /// behind by an older client) yields `Ok(None)` so that the user is asked
    /// to log in again instead of running with half a session. The `role`
    /// record wins over the role embedded in `user` when both are present.
    ///
    /// # Errors
    ///
    /// Returns [`RoomkeyError::Storage`] when the `user` record is not valid
    /// identity JSON.
    pub fn into_session(self) -> Result<Option<Session>> {
        let (Some(access), Some(refresh), Some(user_json)) =
            (self.token, self.refresh_token, self.user)
        else {
            return Ok(None);
        };

        let mut user: UserIdentity = serde_json::from_str(&user_json).map_err(|e| {
            RoomkeyError::Storage(format!("stored user record is malformed: {e}"))
        })?;
        if let Some(role) = self.role {
            user.role = Role::from(role);
        }

        Ok(Some(Session::new(TokenPair::new(access, refresh), user)))
    }
}

// ---------------------------------------------------------------------------
// SessionBackend
// ---------------------------------------------------------------------------

/// Durable storage for [`SessionRecords`].
///
/// Backends are synchronous: they are called once at startup and then only
/// on login, refresh, and logout, never on the read path.
pub trait SessionBackend: Send + Sync + fmt::Debug {
    /// Reads whatever records are stored. Missing storage is an empty set,
    /// not an error.
    fn load(&self) -> Result<SessionRecords>;

    /// Replaces all stored records with `records`.
    fn store(&self, records: &SessionRecords) -> Result<()>;

    /// Removes all stored records. Clearing an empty backend succeeds.
    fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileBackend
// ---------------------------------------------------------------------------

/// Stores the records as one JSON object in a file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so readers never see a half-written record set. On Unix the file
/// is created readable by the owner only.
///
/// # Examples
///
/// ```no_run
/// use roomkey::session::backend::{FileBackend, SessionBackend};
///
/// let backend = FileBackend::new("/tmp/roomkey/session.json");
/// let records = backend.load().unwrap();
/// assert!(records.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend rooted at `path`. No I/O happens until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        use std::io::Write;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(contents)?;
        file.sync_all()
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<SessionRecords> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionRecords::default())
            }
            Err(e) => return Err(RoomkeyError::Io(e).into()),
        };

        if contents.trim().is_empty() {
            return Ok(SessionRecords::default());
        }

        serde_json::from_str(&contents).map_err(|e| {
            RoomkeyError::Storage(format!(
                "session file {} is malformed: {e}",
                self.path.display()
            ))
            .into()
        })
    }

    fn store(&self, records: &SessionRecords) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(RoomkeyError::Io)?;
            }
        }

        let json = serde_json::to_vec_pretty(records).map_err(RoomkeyError::from)?;
        let temp = self.temp_path();
        Self::write_private(&temp, &json).map_err(RoomkeyError::Io)?;
        std::fs::rename(&temp, &self.path).map_err(RoomkeyError::Io)?;

        tracing::debug!(path = %self.path.display(), "Session records written");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RoomkeyError::Io(e).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyringBackend
// ---------------------------------------------------------------------------

/// Stores each record as a separate entry in the OS native keyring
/// (Keychain on macOS, Secret Service on Linux, Windows Credential Manager on
/// Windows).
///
/// Entries live under one service name with the record key as the account
/// name, e.g. service `roomkey`, account `refresh_token`.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    /// Default keyring service name.
    pub const DEFAULT_SERVICE: &'static str = "roomkey";

    /// Creates a backend using `service` as the keyring service name.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Keyring service name used for every record.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| RoomkeyError::Keyring(e).into())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(RoomkeyError::Keyring(e).into()),
        }
    }

    fn write(&self, key: &str, value: Option<&String>) -> Result<()> {
        match value {
            Some(value) => self
                .entry(key)?
                .set_password(value)
                .map_err(|e| RoomkeyError::Keyring(e).into()),
            None => self.remove(key),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(RoomkeyError::Keyring(e).into()),
        }
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SERVICE)
    }
}

impl SessionBackend for KeyringBackend {
    fn load(&self) -> Result<SessionRecords> {
        Ok(SessionRecords {
            token: self.read(RECORD_TOKEN)?,
            refresh_token: self.read(RECORD_REFRESH_TOKEN)?,
            user: self.read(RECORD_USER)?,
            role: self.read(RECORD_ROLE)?,
        })
    }

    fn store(&self, records: &SessionRecords) -> Result<()> {
        // Identity first, tokens last: an interrupted write leaves an
        // incomplete set, which loads as "no session".
        self.write(RECORD_USER, records.user.as_ref())?;
        self.write(RECORD_ROLE, records.role.as_ref())?;
        self.write(RECORD_REFRESH_TOKEN, records.refresh_token.as_ref())?;
        self.write(RECORD_TOKEN, records.token.as_ref())
    }

    fn clear(&self) -> Result<()> {
        self.remove(RECORD_TOKEN)?;
        self.remove(RECORD_REFRESH_TOKEN)?;
        self.remove(RECORD_USER)?;
        self.remove(RECORD_ROLE)
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// Keeps the records in process memory only.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<SessionRecords>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with `records`.
    pub fn with_records(records: SessionRecords) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Returns a copy of what is currently stored.
    pub fn snapshot(&self) -> SessionRecords {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<SessionRecords> {
        Ok(self.snapshot())
    }

    fn store(&self, records: &SessionRecords) -> Result<()> {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = SessionRecords::default();
        Ok(())
    }
}
