//! # Cache Store
//!
//! Named JSON documents on disk, aged by file modification time. Writes go to
//! a hidden temporary file first and are renamed into place, so a reader never
//! observes a half-written document.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Local};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheError;

/// Age after which documents are reported as stale by [`CacheStore::info`].
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Per-document summary returned by [`CacheStore::info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryInfo {
    pub file: String,
    pub last_modified: DateTime<Local>,
    pub age_hours: f64,
    pub size_kb: f64,
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Opens (and creates, if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|source| CacheError::Io { key: dir.display().to_string(), source })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Whether `key` exists and was modified less than `max_age` ago.
    pub fn is_valid(&self, key: &str, max_age: Duration) -> bool {
        match age_of(&self.path_for(key)) {
            Some(age) if age <= max_age => true,
            Some(age) => {
                log::info!("Cache expired for {} (age: {}s)", key, age.as_secs());
                false
            }
            None => false,
        }
    }

    /// Reads a document regardless of its age. `Ok(None)` when it does not exist.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|source| CacheError::Io { key: key.to_string(), source })?;
        let value = serde_json::from_str(&content)
            .map_err(|source| CacheError::Json { key: key.to_string(), source })?;
        log::debug!("Loaded cache: {}", key);
        Ok(Some(value))
    }

    /// Reads a document only if it is younger than `max_age`. Read failures are
    /// logged and reported as a miss.
    pub fn load_valid<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
        if !self.is_valid(key, max_age) {
            return None;
        }
        match self.load(key) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Error loading cache {}: {}", key, e);
                None
            }
        }
    }

    /// Writes a document atomically: temp file in the same directory, then rename.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|source| CacheError::Json { key: key.to_string(), source })?;
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        let io = |source| CacheError::Io { key: key.to_string(), source };

        fs::write(&tmp, content).map_err(io)?;
        fs::rename(&tmp, self.path_for(key)).map_err(io)?;
        log::debug!("Saved cache: {}", key);
        Ok(())
    }

    /// Deletes one document, or every `*.json` document when `key` is `None`.
    pub fn invalidate(&self, key: Option<&str>) -> Result<(), CacheError> {
        let io = |source| CacheError::Io { key: key.unwrap_or("*").to_string(), source };
        match key {
            Some(key) => {
                let path = self.path_for(key);
                if path.exists() {
                    fs::remove_file(path).map_err(io)?;
                    log::info!("Invalidated cache: {}", key);
                }
            }
            None => {
                for path in self.documents().map_err(io)? {
                    fs::remove_file(path).map_err(io)?;
                }
                log::info!("Invalidated all caches");
            }
        }
        Ok(())
    }

    /// Summary of every document in the store, keyed by name.
    pub fn info(&self) -> BTreeMap<String, CacheEntryInfo> {
        let mut info = BTreeMap::new();
        let Ok(documents) = self.documents() else {
            return info;
        };

        for path in documents {
            let stem = path.file_stem().and_then(|s| s.to_str());
            let (Some(stem), Ok(meta)) = (stem, fs::metadata(&path)) else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            let age = SystemTime::now().duration_since(modified).unwrap_or_default();
            info.insert(
                stem.to_string(),
                CacheEntryInfo {
                    file: format!("{}.json", stem),
                    last_modified: DateTime::<Local>::from(modified),
                    age_hours: age.as_secs_f64() / 3600.0,
                    size_kb: (meta.len() as f64 / 1024.0 * 100.0).round() / 100.0,
                    valid: age <= DEFAULT_MAX_AGE,
                },
            );
        }
        info
    }

    fn documents(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let hidden =
                path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('.'));
            if !hidden && path.extension().is_some_and(|e| e == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn age_of(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(SystemTime::now().duration_since(modified).unwrap_or_default())
}
