//! Response cache store with snapshot persistence.
//!
//! The store keeps every entry in memory. When a [`StorageBackend`] is bound,
//! each mutation rewrites the full snapshot under [`PERSISTENCE_KEY`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{
    clock::{Clock, SystemClock},
    entry::{CacheEntry, HttpResponse},
    lock::mutex_lock,
    persistence::{LocalStorage, PersistenceError, SessionStorage, StorageBackend},
};
use crate::config::{CacheSettings, PersistenceKind};

/// Backend key the snapshot is stored under.
pub const PERSISTENCE_KEY: &str = "httpCache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to persist cache snapshot: {0}")]
    Persistence(#[from] PersistenceError),
}

type Entries = HashMap<String, CacheEntry>;

struct Inner {
    entries: Entries,
    backend: Option<Arc<dyn StorageBackend>>,
}

/// Keyed store of cached responses.
///
/// All state sits behind one lock, so a mutation and its write-back are never
/// interleaved with another writer.
pub struct CacheStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// In-memory store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(None, Arc::new(SystemClock))
    }

    /// Store bound to `backend`, loaded from its current snapshot.
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_clock(Some(backend), Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Option<Arc<dyn StorageBackend>>, clock: Arc<dyn Clock>) -> Self {
        let entries = load_snapshot(backend.as_deref());
        Self {
            inner: Mutex::new(Inner { entries, backend }),
            clock,
        }
    }

    /// Build a store from resolved settings.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::with_clock(backend_for(&settings.persistence), Arc::new(SystemClock))
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn get(&self, key: &str) -> Option<HttpResponse> {
        mutex_lock(&self.inner, "store.get")
            .entries
            .get(key)
            .map(|entry| entry.data.clone())
    }

    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        mutex_lock(&self.inner, "store.get_entry")
            .entries
            .get(key)
            .cloned()
    }

    /// Insert or replace the entry for `key`, stamped with the current time.
    pub fn set(&self, key: impl Into<String>, data: HttpResponse) -> Result<(), CacheError> {
        self.set_at(key, data, self.now())
    }

    pub fn set_at(
        &self,
        key: impl Into<String>,
        data: HttpResponse,
        last_updated: OffsetDateTime,
    ) -> Result<(), CacheError> {
        let mut inner = mutex_lock(&self.inner, "store.set");
        inner
            .entries
            .insert(key.into(), CacheEntry { last_updated, data });
        inner.save()
    }

    /// Remove the entry for `key`. Missing keys are not an error.
    pub fn clear(&self, key: &str) -> Result<(), CacheError> {
        let mut inner = mutex_lock(&self.inner, "store.clear");
        inner.entries.remove(key);
        inner.save()
    }

    /// Remove entries last updated at or before `expiration`, or all of them.
    pub fn clean(&self, expiration: Option<OffsetDateTime>) -> Result<(), CacheError> {
        let mut inner = mutex_lock(&self.inner, "store.clean");
        match expiration {
            Some(cutoff) => inner
                .entries
                .retain(|_, entry| entry.last_updated > cutoff),
            None => inner.entries.clear(),
        }
        inner.save()
    }

    /// Rebind persistence. The current cache is discarded.
    ///
    /// The old backend is left holding an empty snapshot, then entries are
    /// reloaded from the new one. The switch always completes; a failure to
    /// write the old backend is returned afterwards.
    pub fn set_persistence(
        &self,
        backend: Option<Arc<dyn StorageBackend>>,
    ) -> Result<(), CacheError> {
        let mut inner = mutex_lock(&self.inner, "store.set_persistence");

        inner.entries.clear();
        let purged = inner.save();
        if let Err(err) = &purged {
            warn!(error = %err, "failed to purge previous cache storage");
        }

        inner.entries = load_snapshot(backend.as_deref());
        debug!(
            backend = backend.as_deref().map(|b| b.kind()).unwrap_or("memory"),
            entries = inner.entries.len(),
            "cache persistence switched"
        );
        inner.backend = backend;

        purged
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner, "store.len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        mutex_lock(&self.inner, "store.keys")
            .entries
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = mutex_lock(&self.inner, "store.debug");
        f.debug_struct("CacheStore")
            .field("entries", &inner.entries.len())
            .field(
                "backend",
                &inner.backend.as_deref().map(|b| b.kind()).unwrap_or("memory"),
            )
            .finish()
    }
}

impl Inner {
    fn save(&self) -> Result<(), CacheError> {
        let Some(backend) = self.backend.as_deref() else {
            return Ok(());
        };
        let snapshot = serde_json::to_string(&self.entries).map_err(|err| {
            PersistenceError::rejected(PERSISTENCE_KEY, format!("serialize snapshot: {err}"))
        })?;
        backend.set(PERSISTENCE_KEY, &snapshot)?;
        Ok(())
    }
}

/// Read the snapshot from `backend`, treating anything unreadable as empty.
fn load_snapshot(backend: Option<&dyn StorageBackend>) -> Entries {
    let Some(backend) = backend else {
        return Entries::new();
    };

    let raw = match backend.get(PERSISTENCE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Entries::new(),
        Err(err) => {
            warn!(
                backend = backend.kind(),
                error = %err,
                "cache snapshot unreadable, starting empty"
            );
            return Entries::new();
        }
    };

    match serde_json::from_str::<Option<Entries>>(&raw) {
        Ok(entries) => entries.unwrap_or_default(),
        Err(err) => {
            warn!(
                backend = backend.kind(),
                error = %err,
                "cache snapshot malformed, starting empty"
            );
            Entries::new()
        }
    }
}

fn backend_for(kind: &PersistenceKind) -> Option<Arc<dyn StorageBackend>> {
    match kind {
        PersistenceKind::None => None,
        PersistenceKind::Session => Some(Arc::new(SessionStorage::new())),
        PersistenceKind::Local { directory } => Some(Arc::new(LocalStorage::new(directory))),
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::cache::clock::ManualClock;

    const T0: OffsetDateTime = datetime!(2024-05-01 09:00 UTC);

    struct FailingStorage;

    impl StorageBackend for FailingStorage {
        fn kind(&self) -> &'static str {
            "failing"
        }

        fn get(&self, _name: &str) -> Result<Option<String>, PersistenceError> {
            Ok(None)
        }

        fn set(&self, name: &str, _value: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::rejected(name, "quota exceeded"))
        }
    }

    fn store_at(start: OffsetDateTime) -> (CacheStore, ManualClock) {
        let clock = ManualClock::new(start);
        let store = CacheStore::with_clock(None, Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn set_stamps_clock_time_and_replaces() {
        let (store, clock) = store_at(T0);

        store.set("/api/x", HttpResponse::new(200, "v1")).unwrap();
        clock.advance(Duration::minutes(1));
        store.set("/api/x", HttpResponse::new(200, "v2")).unwrap();

        let entry = store.get_entry("/api/x").expect("entry");
        assert_eq!(entry.data.body, "v2");
        assert_eq!(entry.last_updated, T0 + Duration::minutes(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_ignores_age() {
        let (store, clock) = store_at(T0);
        store.set("/a", HttpResponse::new(200, "a")).unwrap();

        clock.advance(Duration::days(365));

        assert_eq!(store.get("/a").map(|r| r.body), Some("a".into()));
    }

    #[test]
    fn clear_missing_key_is_noop() {
        let store = CacheStore::new();
        store.set("/a", HttpResponse::new(200, "a")).unwrap();

        store.clear("/missing").unwrap();
        store.clear("/a").unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn clean_removes_entries_at_or_before_cutoff() {
        let store = CacheStore::new();
        let ok = || HttpResponse::new(200, "");
        store.set_at("/old", ok(), T0 - Duration::minutes(1)).unwrap();
        store.set_at("/edge", ok(), T0).unwrap();
        store.set_at("/new", ok(), T0 + Duration::seconds(1)).unwrap();

        store.clean(Some(T0)).unwrap();

        assert_eq!(store.keys(), vec!["/new".to_string()]);
    }

    #[test]
    fn clean_without_cutoff_removes_everything() {
        let store = CacheStore::new();
        store.set("/a", HttpResponse::new(200, "")).unwrap();
        store.set("/b", HttpResponse::new(200, "")).unwrap();

        store.clean(None).unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn malformed_snapshot_loads_empty() {
        let storage = SessionStorage::new();
        storage.set(PERSISTENCE_KEY, "{not json").unwrap();

        let store = CacheStore::with_backend(Arc::new(storage));

        assert!(store.is_empty());
    }

    #[test]
    fn null_snapshot_loads_empty() {
        let storage = SessionStorage::new();
        storage.set(PERSISTENCE_KEY, "null").unwrap();

        let store = CacheStore::with_backend(Arc::new(storage));

        assert!(store.is_empty());
    }

    #[test]
    fn write_failure_propagates_but_keeps_memory() {
        let store = CacheStore::with_backend(Arc::new(FailingStorage));

        let err = store.set("/a", HttpResponse::new(200, "a")).unwrap_err();

        assert!(matches!(err, CacheError::Persistence(_)));
        assert!(store.get("/a").is_some());
    }

    #[test]
    fn switch_completes_even_when_old_backend_fails() {
        let store = CacheStore::with_backend(Arc::new(FailingStorage));
        let _ = store.set("/a", HttpResponse::new(200, "a"));

        let next = SessionStorage::new();
        let result = store.set_persistence(Some(Arc::new(next.clone())));

        assert!(result.is_err());
        assert!(store.is_empty());
        store.set("/b", HttpResponse::new(200, "b")).unwrap();
        assert!(next.get(PERSISTENCE_KEY).unwrap().is_some());
    }

    #[test]
    fn from_settings_binds_requested_backend() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings {
            persistence: PersistenceKind::Local {
                directory: dir.path().to_path_buf(),
            },
            ..CacheSettings::default()
        };

        let store = CacheStore::from_settings(&settings);
        store.set("/a", HttpResponse::new(200, "a")).unwrap();

        assert!(dir.path().join("httpCache.json").exists());
    }
}
