//! Per-connection metadata index.
//!
//! One JSON file per connection maps cache keys to when they were written
//! and how long they live:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "photos/cat.jpg@@9f86...@@e": {
//!       "created_at": 1760000000,
//!       "ttl_seconds": 3600,
//!       "size": 18231
//!     }
//!   }
//! }
//! ```
//!
//! A missing, unreadable or older-version file loads as an empty index; the
//! next audit rebuilds it from the backend listing where one exists. Saves
//! go through a temp file and a rename, so a crash never leaves a torn
//! index behind.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Bump when the index format changes.
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Unix seconds.
    pub created_at: u64,
    /// `-1` never expires.
    pub ttl_seconds: i64,
    pub size: u64,
}

impl EntryMeta {
    pub fn is_expired(&self, now: u64) -> bool {
        self.ttl_seconds > 0 && now.saturating_sub(self.created_at) > self.ttl_seconds as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub version: u32,
    pub entries: BTreeMap<String, EntryMeta>,
}

impl CacheIndex {
    pub fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
        }
    }

    pub fn path_for(state_dir: &Path, connection: &str) -> PathBuf {
        let safe: String = connection
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        state_dir.join(format!("{safe}.index.json"))
    }

    /// Load from disk. Missing, corrupt or version-mismatched files give an
    /// empty index.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(index) if index.version == INDEX_VERSION => {
                debug!("Loaded {} index entries from {}", index.entries.len(), path.display());
                index
            }
            Ok(index) => {
                warn!(
                    "Index {} has version {}, expected {INDEX_VERSION}; starting empty",
                    path.display(),
                    index.version
                );
                Self::empty()
            }
            Err(e) => {
                warn!("Index {} is unreadable ({e}); starting empty", path.display());
                Self::empty()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }

    pub fn get(&self, key: &str) -> Option<&EntryMeta> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, meta: EntryMeta) {
        self.entries.insert(key.into(), meta);
    }

    pub fn remove(&mut self, key: &str) -> Option<EntryMeta> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys that start with `prefix`, in key order.
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .map(|(k, _)| k.as_str())
            .take_while(move |k| k.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(created_at: u64, ttl_seconds: i64) -> EntryMeta {
        EntryMeta {
            created_at,
            ttl_seconds,
            size: 10,
        }
    }

    #[test]
    fn expiry() {
        assert!(!meta(100, -1).is_expired(u64::MAX));
        assert!(!meta(100, 10).is_expired(110));
        assert!(meta(100, 10).is_expired(111));
        // clock skew never expires a fresh entry
        assert!(!meta(100, 10).is_expired(50));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = CacheIndex::path_for(tmp.path(), "local");
        let mut index = CacheIndex::empty();
        index.insert("a@@x@@p", meta(1, -1));
        index.insert("b@@y@@e", meta(2, 60));
        index.save(&path).unwrap();

        let loaded = CacheIndex::load(&path);
        assert_eq!(loaded, index);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let loaded = CacheIndex::load(&tmp.path().join("none.index.json"));
        assert!(loaded.is_empty());
        assert_eq!(loaded.version, INDEX_VERSION);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.index.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(CacheIndex::load(&path).is_empty());
    }

    #[test]
    fn version_mismatch_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old.index.json");
        let mut index = CacheIndex::empty();
        index.version = INDEX_VERSION + 1;
        index.insert("k", meta(1, -1));
        index.save(&path).unwrap();
        assert!(CacheIndex::load(&path).is_empty());
    }

    #[test]
    fn connection_names_are_sanitized() {
        let path = CacheIndex::path_for(Path::new("/state"), "../evil name");
        assert_eq!(path, Path::new("/state/___evil_name.index.json"));
    }

    #[test]
    fn prefix_lookup() {
        let mut index = CacheIndex::empty();
        for key in ["a/x.jpg@@1@@p", "a/x.jpg@@2@@e", "a/x.jpgz@@3@@p", "a/y.jpg@@4@@p", "0@@5@@p"] {
            index.insert(key, meta(0, -1));
        }
        let hits: Vec<_> = index.keys_with_prefix("a/x.jpg@@").collect();
        assert_eq!(hits, ["a/x.jpg@@1@@p", "a/x.jpg@@2@@e"]);
    }

    #[test]
    fn record_serializes_to_three_fields() {
        let value = serde_json::to_value(meta(1_760_000_000, 3600)).unwrap();
        let mut fields: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        fields.sort();
        assert_eq!(fields, ["created_at", "size", "ttl_seconds"]);
    }
}
