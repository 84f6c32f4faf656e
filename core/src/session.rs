//! Session state owned by a client instance.
//!
//! # Design
//! The session lives in an explicit `SessionContext` rather than ambient
//! global storage, so independent clients (and tests) never share one.
//! Persistence goes through `SessionStorage`, a string key/value store with
//! the two keys `token` and `username` and no client-side expiry.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use tracing::warn;

use crate::error::StorageError;

pub const TOKEN_KEY: &str = "token";
pub const USERNAME_KEY: &str = "username";

/// An authenticated user context: bearer token plus display name.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
}

impl Session {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// String key/value persistence for the session keys.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage. Lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Storage backed by a JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        apply(&mut entries);
        self.store(&entries)
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.load() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read session storage: {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// The single active session of a client, mirrored into storage.
pub struct SessionContext {
    current: RwLock<Option<Session>>,
    storage: Box<dyn SessionStorage>,
}

impl SessionContext {
    /// Wrap `storage`, restoring a session if both keys are present.
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        let restored = match (storage.get(TOKEN_KEY), storage.get(USERNAME_KEY)) {
            (Some(token), Some(username)) if !token.is_empty() => Some(Session { token, username }),
            _ => None,
        };
        Self {
            current: RwLock::new(restored),
            storage: Box::new(storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Make `session` the active one, replacing any previous session.
    ///
    /// Both keys are written before memory changes. If either write fails
    /// the stored keys are put back the way they were.
    pub fn begin(&self, session: Session) -> Result<(), StorageError> {
        if session.token.trim().is_empty() {
            return Err(StorageError::EmptyToken);
        }
        let previous = [
            (TOKEN_KEY, self.storage.get(TOKEN_KEY)),
            (USERNAME_KEY, self.storage.get(USERNAME_KEY)),
        ];
        let written = self
            .storage
            .set(TOKEN_KEY, &session.token)
            .and_then(|()| self.storage.set(USERNAME_KEY, &session.username));
        if let Err(e) = written {
            self.restore(&previous);
            return Err(e);
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Drop the active session. Clearing an empty context is a no-op.
    ///
    /// Memory is only cleared once the stored keys are gone.
    pub fn end(&self) -> Result<(), StorageError> {
        self.storage.remove(TOKEN_KEY)?;
        self.storage.remove(USERNAME_KEY)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn restore(&self, previous: &[(&str, Option<String>)]) {
        for (key, value) in previous {
            let result = match value {
                Some(value) => self.storage.set(key, value),
                None => self.storage.remove(key),
            };
            if let Err(e) = result {
                warn!(key = *key, "failed to roll back session storage: {e}");
            }
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("social-core-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn new_context_is_unauthenticated() {
        let ctx = SessionContext::in_memory();
        assert!(!ctx.is_authenticated());
        assert!(ctx.current().is_none());
    }

    #[test]
    fn begin_and_end_round_trip_through_storage() {
        let ctx = SessionContext::in_memory();
        ctx.begin(Session::new("tok", "ada")).unwrap();
        assert_eq!(ctx.current(), Some(Session::new("tok", "ada")));
        assert_eq!(ctx.storage.get(TOKEN_KEY).as_deref(), Some("tok"));
        assert_eq!(ctx.storage.get(USERNAME_KEY).as_deref(), Some("ada"));

        ctx.end().unwrap();
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.storage.get(TOKEN_KEY), None);
        assert_eq!(ctx.storage.get(USERNAME_KEY), None);
    }

    #[test]
    fn restores_session_from_existing_keys() {
        let storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok").unwrap();
        storage.set(USERNAME_KEY, "ada").unwrap();
        let ctx = SessionContext::new(storage);
        assert_eq!(ctx.current(), Some(Session::new("tok", "ada")));
    }

    #[test]
    fn partial_keys_do_not_restore() {
        let storage = MemoryStorage::new();
        storage.set(USERNAME_KEY, "ada").unwrap();
        let ctx = SessionContext::new(storage);
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn contexts_are_independent() {
        let a = SessionContext::in_memory();
        let b = SessionContext::in_memory();
        a.begin(Session::new("tok", "ada")).unwrap();
        assert!(a.is_authenticated());
        assert!(!b.is_authenticated());
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let path = temp_path("persist");
        let _ = fs::remove_file(&path);

        let ctx = SessionContext::new(FileStorage::new(&path));
        ctx.begin(Session::new("tok", "ada")).unwrap();

        let reopened = SessionContext::new(FileStorage::new(&path));
        assert_eq!(reopened.current(), Some(Session::new("tok", "ada")));

        reopened.end().unwrap();
        let cleared = SessionContext::new(FileStorage::new(&path));
        assert!(!cleared.is_authenticated());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let path = temp_path("corrupt");
        fs::write(&path, "not json").unwrap();
        let storage = FileStorage::new(&path);
        assert_eq!(storage.get(TOKEN_KEY), None);
        assert!(matches!(storage.set(TOKEN_KEY, "tok"), Err(StorageError::Corrupt(_))));
        let _ = fs::remove_file(&path);
    }

    /// Memory storage that refuses writes or removals of one key.
    struct FailingStorage {
        inner: MemoryStorage,
        fail_set: Option<&'static str>,
        fail_remove: Option<&'static str>,
    }

    impl FailingStorage {
        fn with_session(token: &str, username: &str) -> Self {
            let inner = MemoryStorage::new();
            inner.set(TOKEN_KEY, token).unwrap();
            inner.set(USERNAME_KEY, username).unwrap();
            Self {
                inner,
                fail_set: None,
                fail_remove: None,
            }
        }

        fn refused(key: &str) -> StorageError {
            StorageError::Io(std::io::Error::other(format!("write to {key} refused")))
        }
    }

    impl SessionStorage for FailingStorage {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_set == Some(key) {
                return Err(Self::refused(key));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            if self.fail_remove == Some(key) {
                return Err(Self::refused(key));
            }
            self.inner.remove(key)
        }
    }

    #[test]
    fn begin_rejects_empty_token() {
        let ctx = SessionContext::in_memory();
        assert!(matches!(ctx.begin(Session::new("", "ada")), Err(StorageError::EmptyToken)));
        assert!(matches!(ctx.begin(Session::new("  ", "ada")), Err(StorageError::EmptyToken)));
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.storage.get(TOKEN_KEY), None);
    }

    #[test]
    fn failed_begin_rolls_back_stored_keys() {
        let storage = FailingStorage {
            fail_set: Some(USERNAME_KEY),
            ..FailingStorage::with_session("old-tok", "bob")
        };
        let ctx = SessionContext::new(storage);

        assert!(ctx.begin(Session::new("new-tok", "ada")).is_err());
        assert_eq!(ctx.current(), Some(Session::new("old-tok", "bob")));
        assert_eq!(ctx.storage.get(TOKEN_KEY).as_deref(), Some("old-tok"));
        assert_eq!(ctx.storage.get(USERNAME_KEY).as_deref(), Some("bob"));
    }

    #[test]
    fn failed_end_keeps_memory_and_storage_in_step() {
        let storage = FailingStorage {
            fail_remove: Some(TOKEN_KEY),
            ..FailingStorage::with_session("tok", "ada")
        };
        let ctx = SessionContext::new(storage);

        assert!(ctx.end().is_err());
        assert_eq!(ctx.current(), Some(Session::new("tok", "ada")));
        assert_eq!(ctx.storage.get(TOKEN_KEY).as_deref(), Some("tok"));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", Session::new("secret-token", "ada"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("ada"));
    }
}
