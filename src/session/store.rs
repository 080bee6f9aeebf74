//! In-memory session cache with write-through persistence
//!
//! [`SessionStore`] is the single owner of the current [`Session`]. It is
//! loaded once from a [`SessionBackend`] at startup; after that every read is
//! served from memory and every mutation replaces the cached value as a whole
//! before writing it through to the backend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::error::{Result, RoomkeyError};
use crate::session::backend::{SessionBackend, SessionRecords};
use crate::session::{Role, Session};

/// Owner of the current session.
///
/// Shared between the request authenticator, the refresh coordinator, and the
/// account service as an `Arc<SessionStore>`. The cache lock is never held
/// across an `.await`.
///
/// Mutations are serialized: each one holds a writer lock across the
/// in-memory swap and the backend write, so memory and backend always end
/// up describing the same session. Reads never wait on the backend.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use roomkey::session::backend::MemoryBackend;
/// use roomkey::session::{Role, Session, SessionStore, TokenPair, UserIdentity};
///
/// let store = SessionStore::load(Arc::new(MemoryBackend::new())).unwrap();
/// assert!(store.get().is_none());
///
/// let user = UserIdentity {
///     id: "1".to_string(),
///     username: "alice".to_string(),
///     email: String::new(),
///     role: Role::Customer,
/// };
/// store.save(Session::new(TokenPair::new("A1", "R1"), user)).unwrap();
/// assert_eq!(store.access_token().as_deref(), Some("A1"));
///
/// store.clear().unwrap();
/// assert!(!store.is_authenticated());
/// ```
#[derive(Debug)]
pub struct SessionStore {
    current: RwLock<Option<Arc<Session>>>,
    backend: Arc<dyn SessionBackend>,
    writer: Mutex<()>,
}

impl SessionStore {
    /// Loads the persisted session from `backend` into memory.
    ///
    /// An incomplete record set is treated as "logged out" and removed from
    /// the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or its `user` record
    /// is malformed.
    pub fn load(backend: Arc<dyn SessionBackend>) -> Result<Self> {
        let records = backend.load()?;
        let had_records = !records.is_empty();
        let session = records.into_session()?;

        if session.is_none() && had_records {
            tracing::warn!("Discarding incomplete stored session");
            backend.clear()?;
        }
        if let Some(ref s) = session {
            tracing::debug!(user_id = %s.user_id(), role = %s.role(), "Loaded stored session");
        }

        Ok(Self {
            current: RwLock::new(session.map(Arc::new)),
            backend,
            writer: Mutex::new(()),
        })
    }

    /// Creates a store with no session over `backend`, ignoring whatever the
    /// backend holds.
    pub fn empty(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            current: RwLock::new(None),
            backend,
            writer: Mutex::new(()),
        }
    }

    /// Returns the current session, if any.
    pub fn get(&self) -> Option<Session> {
        self.snapshot().map(|s| (*s).clone())
    }

    /// Returns the current session without cloning its contents.
    pub fn snapshot(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current session with `session` and persists it.
    ///
    /// The in-memory swap happens first, so readers observe either the old
    /// or the new session, never a mix. A persistence failure is returned to
    /// the caller but the new session stays active for this process.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn save(&self, session: Session) -> Result<()> {
        let _writer = self.lock_writer();
        self.write_through(session)
    }

    /// Replaces the current session only if `accept` holds for it.
    ///
    /// `update` builds the replacement from the current session. The check
    /// and the write happen under the writer lock, so no other mutation can
    /// land between them. Returns `false`, changing nothing, when there is no
    /// session or `accept` rejects it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails; the replacement is still
    /// active in memory.
    pub fn replace_if<P, U>(&self, accept: P, update: U) -> Result<bool>
    where
        P: FnOnce(&Session) -> bool,
        U: FnOnce(&Session) -> Session,
    {
        let _writer = self.lock_writer();
        let Some(current) = self.snapshot().filter(|s| accept(s)) else {
            return Ok(false);
        };
        self.write_through(update(&current))?;
        Ok(true)
    }

    /// Removes all session state, in memory and in the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be cleared. The in-memory
    /// session is gone regardless.
    pub fn clear(&self) -> Result<()> {
        let _writer = self.lock_writer();
        self.clear_through()
    }

    /// Clears the session only if `accept` holds for it.
    ///
    /// Returns `false`, changing nothing, when there is no session or
    /// `accept` rejects it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be cleared.
    pub fn clear_if<P>(&self, accept: P) -> Result<bool>
    where
        P: FnOnce(&Session) -> bool,
    {
        let _writer = self.lock_writer();
        if !self.snapshot().is_some_and(|s| accept(&s)) {
            return Ok(false);
        }
        self.clear_through()?;
        Ok(true)
    }

    /// Current access token.
    pub fn access_token(&self) -> Option<String> {
        self.snapshot().map(|s| s.tokens.access.clone())
    }

    /// Current refresh token.
    pub fn refresh_token(&self) -> Option<String> {
        self.snapshot().map(|s| s.tokens.refresh.clone())
    }

    /// Role of the current user.
    pub fn role(&self) -> Option<Role> {
        self.snapshot().map(|s| s.role().clone())
    }

    /// Returns `true` when a session is present.
    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_some()
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the writer lock.
    fn write_through(&self, session: Session) -> Result<()> {
        let records = SessionRecords::from_session(&session)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(session));
        self.backend
            .store(&records)
            .map_err(|e| RoomkeyError::Storage(format!("failed to persist session: {e}")).into())
    }

    /// Caller holds the writer lock.
    fn clear_through(&self) -> Result<()> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.backend
            .clear()
            .map_err(|e| RoomkeyError::Storage(format!("failed to clear session: {e}")).into())
    }
}
