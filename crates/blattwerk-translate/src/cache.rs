// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Translation cache: a flat source→translation map persisted as a JSON
// object.
//
// One logical cache is shared by every task of a run. Clones share the same
// map; reads run concurrently, writes to the same key are last-writer-wins.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use blattwerk_core::error::{BlattwerkError, Result};
use tracing::{debug, info, instrument, warn};

struct Inner {
    store_path: Option<PathBuf>,
    entries: RwLock<HashMap<String, String>>,
    /// Serialises flushes so concurrent writers never interleave on disk.
    flush_lock: Mutex<()>,
}

/// Concurrency-safe translation cache with an optional backing file.
#[derive(Clone)]
pub struct TranslationCache {
    inner: Arc<Inner>,
}

impl TranslationCache {
    /// A cache with no backing store.
    pub fn in_memory() -> Self {
        Self::with_store(None)
    }

    fn with_store(store_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store_path,
                entries: RwLock::new(HashMap::new()),
                flush_lock: Mutex::new(()),
            }),
        }
    }

    /// Open the cache backed by `path`, loading whatever it holds.
    ///
    /// A missing or unreadable store yields an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let cache = Self::with_store(Some(path.into()));
        cache.load_from_store();
        cache
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.inner.store_path.as_deref()
    }

    /// Look up the translation for an already-trimmed key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Record a translation. An empty translation is stored as the key
    /// itself so every cached entry has visible text.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let value = if value.trim().is_empty() { key.clone() } else { value };
        self.write().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Merge the backing store into memory. Returns the number of entries
    /// read; corrupt or missing stores read as empty.
    #[instrument(skip(self))]
    pub fn load_from_store(&self) -> usize {
        let Some(path) = self.store_path() else {
            return 0;
        };
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache store at {}; starting empty", path.display());
                return 0;
            }
            Err(err) => {
                warn!(error = %err, "Cache store unreadable; starting empty");
                return 0;
            }
        };
        let stored: HashMap<String, String> = match serde_json::from_str(&data) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "Cache store corrupt; starting empty");
                return 0;
            }
        };

        let count = stored.len();
        self.write().extend(stored);
        info!(entries = count, "Translation cache loaded from {}", path.display());
        count
    }

    /// Persist the whole map, atomically replacing the store file.
    ///
    /// Keys are written sorted so the file diffs cleanly between runs.
    #[instrument(skip(self))]
    pub fn flush_to_store(&self) -> Result<()> {
        let Some(path) = self.store_path() else {
            return Ok(());
        };
        let _guard = self.inner.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot: BTreeMap<String, String> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, path))
            .map_err(|err| {
                BlattwerkError::CacheStore(format!("failed to write {}: {err}", path.display()))
            })?;
        debug!(entries = snapshot.len(), "Translation cache flushed");
        Ok(())
    }

    /// Flush, logging instead of returning a failure.
    pub fn flush_logged(&self) {
        if let Err(err) = self.flush_to_store() {
            warn!(error = %err, "Translation cache flush failed; continuing without persistence");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, String>> {
        self.inner.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.inner.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("store_path", &self.inner.store_path)
            .field("entries", &self.len())
            .finish()
    }
}
