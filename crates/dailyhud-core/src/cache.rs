//! Time-bounded, file-backed key/value cache.
//!
//! One JSON object per namespace lives in `<directory>/<namespace>.json`.
//! The file's modification time is the only expiry signal: the whole
//! namespace expires as a unit once `now - mtime > max_age`. Every failure
//! (missing directory, unreadable or malformed file, failed write) degrades
//! to an empty cache and is never surfaced to the caller.
//!
//! The cache assumes a single writer per namespace. Each probe owns its own
//! namespace and is dispatched once per run, so no locking is done here.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::config::{expand_tilde, CacheConfig};

/// Request-scoped handle that hands out cache namespaces.
///
/// Built once per invocation and passed to probes through their context;
/// a disabled store hands out nothing.
#[derive(Debug, Clone)]
pub struct CacheStore {
    enabled: bool,
    directory: PathBuf,
}

impl CacheStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            directory: directory.into(),
        }
    }

    /// A store that never caches
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::new(),
        }
    }

    /// Build from configuration; `force_disabled` is the `--no-cache` switch
    pub fn from_config(config: &CacheConfig, force_disabled: bool) -> Self {
        if force_disabled || !config.enabled {
            return Self::disabled();
        }
        Self::new(expand_tilde(&config.directory))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Open a namespace, or `None` when caching is disabled
    pub fn open(&self, namespace: &str) -> Option<TtlCache> {
        if !self.enabled {
            return None;
        }
        Some(TtlCache::open(namespace, &self.directory))
    }
}

/// A single cache namespace backed by one file
#[derive(Debug, Clone)]
pub struct TtlCache {
    /// `None` when the directory could not be prepared; behaves as empty
    path: Option<PathBuf>,
}

impl TtlCache {
    /// Resolve `directory/namespace.json`, creating the directory if needed
    pub fn open(namespace: &str, directory: &Path) -> Self {
        match fs::create_dir_all(directory) {
            Ok(()) => Self {
                path: Some(directory.join(format!("{}.json", namespace))),
            },
            Err(e) => {
                debug!(
                    "Cache directory {} unavailable, caching disabled for {}: {}",
                    directory.display(),
                    namespace,
                    e
                );
                Self { path: None }
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the namespace if it exists, parses as an object and is no older
    /// than `max_age`; otherwise an empty map.
    pub fn load(&self, max_age: Duration) -> Map<String, Value> {
        let Some(path) = &self.path else {
            return Map::new();
        };

        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return Map::new(),
        };

        let age = metadata
            .modified()
            .ok()
            .map(|mtime| {
                SystemTime::now()
                    .duration_since(mtime)
                    .unwrap_or(Duration::ZERO)
            })
            .unwrap_or(Duration::MAX);

        if age > max_age {
            debug!("Cache {} expired ({:?} old)", path.display(), age);
            return Map::new();
        }

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("Failed to read cache {}: {}", path.display(), e);
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                debug!("Cache {} is not a JSON object, ignoring", path.display());
                Map::new()
            }
            Err(e) => {
                debug!("Cache {} is malformed, ignoring: {}", path.display(), e);
                Map::new()
            }
        }
    }

    /// Overwrite the namespace. Written to a sibling temp file first and
    /// renamed into place. Errors are logged and dropped.
    pub fn save(&self, data: &Map<String, Value>) {
        let Some(path) = &self.path else {
            return;
        };

        let content = match serde_json::to_string(data) {
            Ok(c) => c,
            Err(e) => {
                debug!("Failed to serialize cache {}: {}", path.display(), e);
                return;
            }
        };

        let tmp = path.with_extension("json.tmp");
        let result = fs::write(&tmp, content).and_then(|_| fs::rename(&tmp, path));
        if let Err(e) = result {
            debug!("Failed to write cache {}: {}", path.display(), e);
            let _ = fs::remove_file(&tmp);
        }
    }
}
