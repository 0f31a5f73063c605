//! Session cache with durable storage and cross-context sync
//!
//! A [`SessionStore`] is one browsing context's view of the login. It keeps
//! the `{token, user}` pair in memory for synchronous reads and writes it
//! through to a [`SessionStorage`] backend under two well-known keys that
//! are always written and removed together.
//!
//! Contexts that share a [`SessionBus`] see each other's changes: every
//! `set`/`clear` is published as a [`SessionEvent`] tagged with the
//! originating context, and subscribers [`apply`](SessionStore::apply) them.

use crate::error::{LockerError, Result};
use crate::types::User;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage key for the bearer token
pub const TOKEN_KEY: &str = "token";

/// Storage key for the serialized user record
pub const USER_KEY: &str = "user";

/// Authenticated identity held by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

// =============================================================================
// Durable storage
// =============================================================================

/// Key/value backend that survives restarts
pub trait SessionStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl SessionStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash never leaves a torn value
        let tmp = self.path_for(&format!(".{}.tmp", key));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage, shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

// =============================================================================
// Cross-context bus
// =============================================================================

/// Change published by a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Updated { origin: Uuid, session: Session },
    Cleared { origin: Uuid },
}

impl SessionEvent {
    pub fn origin(&self) -> Uuid {
        match self {
            SessionEvent::Updated { origin, .. } | SessionEvent::Cleared { origin } => *origin,
        }
    }
}

/// Broadcast channel connecting the contexts of one application
#[derive(Debug, Clone)]
pub struct SessionBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

// =============================================================================
// Store
// =============================================================================

/// One context's session cache
pub struct SessionStore {
    context_id: Uuid,
    storage: Arc<dyn SessionStorage>,
    cache: RwLock<Option<Session>>,
    bus: SessionBus,
}

impl SessionStore {
    /// Attach a new context to `storage` and `bus`, loading any persisted
    /// session.
    pub fn open(storage: Arc<dyn SessionStorage>, bus: SessionBus) -> Self {
        let store = Self {
            context_id: Uuid::new_v4(),
            storage,
            cache: RwLock::new(None),
            bus,
        };
        store.reload();
        store
    }

    /// Standalone in-memory store, mostly for tests and tooling
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStorage::new()), SessionBus::new())
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    pub fn bus(&self) -> &SessionBus {
        &self.bus
    }

    /// Current session, if any
    pub fn get(&self) -> Option<Session> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.get().map(|s| s.token)
    }

    pub fn user(&self) -> Option<User> {
        self.get().map(|s| s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    /// Persist and publish a new session.
    pub fn set(&self, token: impl Into<String>, user: User) -> Result<Session> {
        let session = Session {
            token: token.into(),
            user,
        };
        let user_json = serde_json::to_string(&session.user)?;

        self.storage.write(TOKEN_KEY, &session.token)?;
        if let Err(e) = self.storage.write(USER_KEY, &user_json) {
            // Never leave a token without its user
            let _ = self.storage.remove(TOKEN_KEY);
            return Err(e);
        }

        self.replace_cache(Some(session.clone()));
        info!(user_id = %session.user.id, "Session established");
        self.bus.publish(SessionEvent::Updated {
            origin: self.context_id,
            session: session.clone(),
        });
        Ok(session)
    }

    /// Remove token and user together and publish the teardown.
    ///
    /// The in-memory copy is dropped even if the backend fails.
    pub fn clear(&self) -> Result<()> {
        self.replace_cache(None);
        let token_result = self.storage.remove(TOKEN_KEY);
        let user_result = self.storage.remove(USER_KEY);

        info!("Session cleared");
        self.bus.publish(SessionEvent::Cleared {
            origin: self.context_id,
        });
        token_result.and(user_result)
    }

    /// Re-read durable storage into the cache.
    ///
    /// A half-written pair or an unreadable user record counts as no session
    /// and is wiped.
    pub fn reload(&self) -> Option<Session> {
        let loaded = match self.load_persisted() {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding persisted session: {}", e);
                let _ = self.storage.remove(TOKEN_KEY);
                let _ = self.storage.remove(USER_KEY);
                None
            }
        };
        self.replace_cache(loaded.clone());
        loaded
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Apply an event published by another context.
    ///
    /// Returns `true` if the cache changed. Own events are ignored.
    pub fn apply(&self, event: &SessionEvent) -> bool {
        if event.origin() == self.context_id {
            return false;
        }

        let next = match event {
            SessionEvent::Updated { session, .. } => Some(session.clone()),
            SessionEvent::Cleared { .. } => None,
        };
        if self.get() == next {
            return false;
        }

        debug!(origin = %event.origin(), "Applying session change from another context");
        self.replace_cache(next);
        true
    }

    fn load_persisted(&self) -> Result<Option<Session>> {
        let token = self.storage.read(TOKEN_KEY)?;
        let user = self.storage.read(USER_KEY)?;

        match (token, user) {
            (Some(token), Some(user)) => {
                let user: User = serde_json::from_str(&user)?;
                Ok(Some(Session { token, user }))
            }
            (None, None) => Ok(None),
            _ => Err(LockerError::Storage(
                "token and user must be stored together".into(),
            )),
        }
    }

    fn replace_cache(&self, session: Option<Session>) {
        *self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }
}
