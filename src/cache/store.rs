//! The cache store: connections, expiry, audits and per-key leases.
//!
//! # Consistency
//!
//! A stored file is visible to readers only once its index record exists.
//! `put` marks the key as in flight, writes the file, records it, and only
//! then clears the in-flight mark, so at every moment a file written by
//! `put` is either in flight or indexed. Audits and expiry removals check
//! both under the index lock before deleting anything, which keeps them
//! from deleting an entry that is mid-write.
//!
//! Lock order is always index, then in-flight set. Backend I/O for removals
//! happens under the index lock; writes happen outside it.
//!
//! # Expiry
//!
//! An expired entry is a miss on `get`; its removal is scheduled on the
//! rayon pool so the caller does not wait for it. Audits remove whatever
//! expired entries remain.

use super::backends::StorageBackend;
use super::index::{CacheIndex, EntryMeta};
use super::key::SEPARATOR;
use super::{Connection, ConnectionInfo, StoreError};
use crate::config::ImgforgeConfig;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// ============================================================================
// Clocks
// ============================================================================

/// Source of "now" in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Settings and reports
// ============================================================================

/// Audit treatment of stored files that have no index record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Adopt never-expiring (`p`) files into the index. Expiring (`e`)
    /// files are removed since their lifetime is unknown.
    #[default]
    Index,
    Remove,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub state_dir: PathBuf,
    pub default_connection: String,
    pub orphans: OrphanPolicy,
    pub lock_wait: Duration,
}

impl StoreSettings {
    pub fn from_config(config: &ImgforgeConfig) -> Self {
        Self {
            state_dir: config.cache.state_dir.clone(),
            default_connection: config.cache.default_connection.clone(),
            orphans: config.cache.orphans,
            lock_wait: Duration::from_millis(config.cache.lock_wait_ms),
        }
    }
}

/// What one audit pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub connection: String,
    /// Whether the backend listing was available.
    pub listed: bool,
    pub records_checked: usize,
    pub files_checked: usize,
    pub expired_removed: usize,
    pub stale_records_purged: usize,
    pub orphans_indexed: usize,
    pub orphans_removed: usize,
    pub skipped_in_flight: usize,
    pub cancelled: bool,
    pub errors: Vec<String>,
}

// ============================================================================
// Per-connection state
// ============================================================================

struct Slot {
    connection: Connection,
    backend: Option<Arc<dyn StorageBackend>>,
    index_path: PathBuf,
    index: Mutex<CacheIndex>,
    writing: Mutex<HashSet<String>>,
    leases: Mutex<HashSet<String>>,
    released: Condvar,
}

impl Slot {
    fn backend(&self) -> Result<&Arc<dyn StorageBackend>, StoreError> {
        self.backend.as_ref().ok_or_else(|| StoreError::InvalidConnection {
            name: self.connection.name.clone(),
            reason: self
                .connection
                .problem
                .clone()
                .unwrap_or_else(|| "backend unavailable".into()),
        })
    }

    fn persist(&self, index: &CacheIndex) {
        if let Err(e) = index.save(&self.index_path) {
            warn!("Failed to save index {}: {e}", self.index_path.display());
        }
    }

    fn begin_write(&self, key: &str) -> WriteGuard<'_> {
        self.writing.lock().insert(key.to_string());
        WriteGuard {
            slot: self,
            key: key.to_string(),
        }
    }

    /// Remove `key` if it is still expired at `now` and not being rewritten.
    fn remove_if_expired(&self, key: &str, now: u64) -> Result<bool, StoreError> {
        let backend = self.backend()?;
        let mut index = self.index.lock();
        let still_expired = index.get(key).is_some_and(|m| m.is_expired(now));
        if !still_expired || self.writing.lock().contains(key) {
            return Ok(false);
        }
        backend.remove(key)?;
        index.remove(key);
        self.persist(&index);
        debug!("Removed expired {}:{key}", self.connection.name);
        Ok(true)
    }
}

struct WriteGuard<'a> {
    slot: &'a Slot,
    key: String,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.slot.writing.lock().remove(&self.key);
    }
}

/// Exclusive right to build one key, released on drop.
///
/// A lease that could not be acquired within the wait bound is returned
/// unheld; the caller then builds anyway and last writer wins.
pub struct Lease {
    slot: Option<Arc<Slot>>,
    key: String,
}

impl Lease {
    pub fn is_held(&self) -> bool {
        self.slot.is_some()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.leases.lock().remove(&self.key);
            slot.released.notify_all();
        }
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct CacheStore {
    slots: BTreeMap<String, Arc<Slot>>,
    default: RwLock<String>,
    orphans: OrphanPolicy,
    lock_wait: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Open every connection and load its index. Connections that cannot be
    /// opened stay listed as invalid; only an undefined default is an error.
    pub fn open(connections: Vec<Connection>, settings: StoreSettings) -> Result<Self, StoreError> {
        let mut slots = BTreeMap::new();
        for mut connection in connections {
            let backend = match connection.open() {
                Ok(backend) => Some(backend),
                Err(e) => {
                    warn!("Connection '{}' unavailable: {e}", connection.name);
                    connection.problem.get_or_insert_with(|| e.to_string());
                    None
                }
            };
            let index_path = CacheIndex::path_for(&settings.state_dir, &connection.name);
            let index = CacheIndex::load(&index_path);
            slots.insert(
                connection.name.clone(),
                Arc::new(Slot {
                    connection,
                    backend,
                    index_path,
                    index: Mutex::new(index),
                    writing: Mutex::new(HashSet::new()),
                    leases: Mutex::new(HashSet::new()),
                    released: Condvar::new(),
                }),
            );
        }
        if !slots.contains_key(&settings.default_connection) {
            return Err(StoreError::UnknownConnection(settings.default_connection));
        }
        Ok(Self {
            slots,
            default: RwLock::new(settings.default_connection),
            orphans: settings.orphans,
            lock_wait: settings.lock_wait,
            clock: Arc::new(SystemClock),
        })
    }

    /// Open the connections declared in `config`.
    pub fn from_config(config: &ImgforgeConfig) -> Result<Self, StoreError> {
        let connections = config
            .connections
            .iter()
            .map(|(name, c)| Connection::new(name.clone(), c.clone()))
            .collect();
        Self::open(connections, StoreSettings::from_config(config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn default_connection(&self) -> String {
        self.default.read().clone()
    }

    fn slot(&self, connection: Option<&str>) -> Result<Arc<Slot>, StoreError> {
        let name = match connection {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.default_connection(),
        };
        self.slots
            .get(&name)
            .cloned()
            .ok_or(StoreError::UnknownConnection(name))
    }

    /// Cached bytes for `key`, or `None` on a miss. Expired and unindexed
    /// entries are misses.
    pub fn get(&self, connection: Option<&str>, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let slot = self.slot(connection)?;
        let backend = slot.backend()?;
        let now = self.clock.now();

        let Some(meta) = slot.index.lock().get(key).copied() else {
            debug!("Cache miss {}:{key}", slot.connection.name);
            return Ok(None);
        };
        if meta.is_expired(now) {
            debug!("Cache entry {}:{key} expired; scheduling removal", slot.connection.name);
            let slot = Arc::clone(&slot);
            let key = key.to_string();
            rayon::spawn(move || {
                if let Err(e) = slot.remove_if_expired(&key, now) {
                    warn!("Failed to remove expired {}:{key}: {e}", slot.connection.name);
                }
            });
            return Ok(None);
        }

        match backend.read(key)? {
            Some(bytes) => {
                debug!("Cache hit {}:{key}", slot.connection.name);
                Ok(Some(bytes))
            }
            None => {
                // Indexed but gone from storage.
                let mut index = slot.index.lock();
                if index.get(key) == Some(&meta) && !slot.writing.lock().contains(key) {
                    index.remove(key);
                    slot.persist(&index);
                }
                Ok(None)
            }
        }
    }

    /// Store `bytes` under `key` for `ttl_seconds` (`-1` forever). A ttl of
    /// zero stores nothing and returns `Ok(false)`.
    pub fn put(
        &self,
        connection: Option<&str>,
        key: &str,
        bytes: &[u8],
        ttl_seconds: i64,
        content_type: &str,
    ) -> Result<bool, StoreError> {
        if ttl_seconds == 0 {
            return Ok(false);
        }
        let slot = self.slot(connection)?;
        let backend = slot.backend()?;
        let _in_flight = slot.begin_write(key);
        backend.write(key, bytes, content_type)?;

        let meta = EntryMeta {
            created_at: self.clock.now(),
            ttl_seconds: ttl_seconds.max(-1),
            size: bytes.len() as u64,
        };
        let mut index = slot.index.lock();
        index.insert(key, meta);
        slot.persist(&index);
        debug!("Cached {}:{key} ({} bytes, ttl {ttl_seconds})", slot.connection.name, bytes.len());
        Ok(true)
    }

    /// Remove one entry. `Ok(false)` when nothing was stored.
    pub fn delete(&self, connection: Option<&str>, key: &str) -> Result<bool, StoreError> {
        let slot = self.slot(connection)?;
        let backend = slot.backend()?;
        let mut index = slot.index.lock();
        let removed_file = backend.remove(key)?;
        let removed_record = index.remove(key).is_some();
        if removed_record {
            slot.persist(&index);
        }
        Ok(removed_file || removed_record)
    }

    pub fn entry(&self, connection: Option<&str>, key: &str) -> Result<Option<EntryMeta>, StoreError> {
        Ok(self.slot(connection)?.index.lock().get(key).copied())
    }

    pub fn url(&self, connection: Option<&str>, key: &str) -> Result<Option<String>, StoreError> {
        let slot = self.slot(connection)?;
        Ok(slot.backend()?.url(key))
    }

    /// Remove every entry whose key starts with `prefix`, on every usable
    /// connection. Returns how many entries went away; the first failure is
    /// returned after all connections were tried.
    ///
    /// Prefixes come from normalized sources, so distinct references with
    /// one normal form (`a b.jpg` and `a_b.jpg`) are removed together.
    pub fn invalidate_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        let mut first_error = None;
        for slot in self.slots.values() {
            let Some(backend) = &slot.backend else {
                continue;
            };
            let mut keys: Vec<String> = slot
                .index
                .lock()
                .keys_with_prefix(prefix)
                .map(str::to_string)
                .collect();
            if let Ok(listing) = backend.list() {
                let mut known: HashSet<String> = keys.iter().cloned().collect();
                for object in listing {
                    if object.key.starts_with(prefix) && known.insert(object.key.clone()) {
                        keys.push(object.key);
                    }
                }
            }

            let mut index = slot.index.lock();
            for key in keys {
                match backend.remove(&key) {
                    Ok(_) => {
                        index.remove(&key);
                        removed += 1;
                    }
                    Err(e) => {
                        warn!("Failed to invalidate {}:{key}: {e}", slot.connection.name);
                        first_error.get_or_insert(e);
                    }
                }
            }
            slot.persist(&index);
        }
        info!("Invalidated {removed} entries under '{prefix}'");
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Remove every entry derived from `source_ref`, including entries of
    /// other references that normalize to the same form.
    pub fn invalidate_source(&self, source_ref: &str, max_source_len: usize) -> Result<usize, StoreError> {
        self.invalidate_prefix(&super::key::source_prefix(source_ref, max_source_len))
    }

    pub fn audit(&self, connection: Option<&str>) -> Result<AuditReport, StoreError> {
        self.audit_with_cancel(connection, &AtomicBool::new(false))
    }

    /// Reconcile the index with the backend:
    ///
    /// 1. expired entries are removed;
    /// 2. records whose file is gone are purged;
    /// 3. files with no record are adopted or removed per [`OrphanPolicy`].
    ///
    /// Setting `cancel` stops the pass between entries. Each step is atomic,
    /// so a cancelled pass leaves a consistent store and the next pass picks
    /// up where it stopped.
    pub fn audit_with_cancel(
        &self,
        connection: Option<&str>,
        cancel: &AtomicBool,
    ) -> Result<AuditReport, StoreError> {
        let slot = self.slot(connection)?;
        let backend = slot.backend()?;
        let now = self.clock.now();
        let mut report = AuditReport {
            connection: slot.connection.name.clone(),
            ..AuditReport::default()
        };

        let listing = match backend.list() {
            Ok(objects) => Some(objects),
            Err(StoreError::Unsupported { .. }) => None,
            Err(e) => return Err(e),
        };
        report.listed = listing.is_some();
        let stored: Option<HashSet<&str>> = listing
            .as_ref()
            .map(|objects| objects.iter().map(|o| o.key.as_str()).collect());

        let records: Vec<(String, EntryMeta)> = slot
            .index
            .lock()
            .entries
            .iter()
            .map(|(k, m)| (k.clone(), *m))
            .collect();

        for (key, meta) in records {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            report.records_checked += 1;
            if slot.writing.lock().contains(&key) {
                report.skipped_in_flight += 1;
                continue;
            }
            if meta.is_expired(now) {
                match slot.remove_if_expired(&key, now) {
                    Ok(true) => report.expired_removed += 1,
                    Ok(false) => {}
                    Err(e) => report.errors.push(format!("{key}: {e}")),
                }
                continue;
            }
            let listed = stored.as_ref().map(|set| set.contains(key.as_str()));
            if listed == Some(true) {
                continue;
            }
            match backend.exists(&key) {
                Ok(true) => {}
                Ok(false) => {
                    let mut index = slot.index.lock();
                    if index.get(&key) == Some(&meta) && !slot.writing.lock().contains(&key) {
                        index.remove(&key);
                        report.stale_records_purged += 1;
                    }
                }
                Err(e) => report.errors.push(format!("{key}: {e}")),
            }
        }

        if let Some(objects) = &listing {
            for object in objects {
                if report.cancelled || cancel.load(Ordering::Relaxed) {
                    report.cancelled = true;
                    break;
                }
                report.files_checked += 1;
                let mut index = slot.index.lock();
                if index.get(&object.key).is_some() {
                    continue;
                }
                if slot.writing.lock().contains(&object.key) {
                    report.skipped_in_flight += 1;
                    continue;
                }
                let permanent = object.key.ends_with(&format!("{SEPARATOR}p"));
                if self.orphans == OrphanPolicy::Index && permanent {
                    index.insert(
                        object.key.clone(),
                        EntryMeta {
                            created_at: object.modified.unwrap_or(now),
                            ttl_seconds: -1,
                            size: object.size,
                        },
                    );
                    report.orphans_indexed += 1;
                    continue;
                }
                match backend.remove(&object.key) {
                    Ok(_) => report.orphans_removed += 1,
                    Err(e) => report.errors.push(format!("{}: {e}", object.key)),
                }
            }
        }

        slot.persist(&slot.index.lock());
        info!(
            "Audit {}: {} expired, {} stale, {} adopted, {} orphans removed{}",
            report.connection,
            report.expired_removed,
            report.stale_records_purged,
            report.orphans_indexed,
            report.orphans_removed,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    pub fn list_connections(&self) -> Vec<ConnectionInfo> {
        let default = self.default_connection();
        self.slots
            .values()
            .map(|slot| ConnectionInfo {
                name: slot.connection.name.clone(),
                kind: slot.connection.kind,
                is_default: slot.connection.name == default,
                is_valid: slot.backend.is_some(),
                problem: slot.connection.problem.clone(),
            })
            .collect()
    }

    /// Make `name` the connection used when a request names none. Only a
    /// usable connection can become the default.
    pub fn set_default_connection(&self, name: &str) -> Result<(), StoreError> {
        let slot = self.slot(Some(name))?;
        slot.backend()?;
        *self.default.write() = slot.connection.name.clone();
        info!("Default connection is now '{name}'");
        Ok(())
    }

    /// Wait up to the configured bound for exclusive build rights on `key`.
    pub fn lease(&self, connection: Option<&str>, key: &str) -> Result<Lease, StoreError> {
        let slot = self.slot(connection)?;
        let deadline = Instant::now() + self.lock_wait;
        let mut held = slot.leases.lock();
        while held.contains(key) {
            if slot.released.wait_until(&mut held, deadline).timed_out() && held.contains(key) {
                debug!("Lease on {key} still held after {:?}; building anyway", self.lock_wait);
                return Ok(Lease {
                    slot: None,
                    key: key.to_string(),
                });
            }
        }
        held.insert(key.to_string());
        drop(held);
        Ok(Lease {
            slot: Some(slot),
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BackendKind, LocalBackend};
    use crate::config::ConnectionConfig;
    use std::thread;
    use tempfile::TempDir;

    const KEY: &str = "photos/a.jpg@@abc@@e";
    const PNG: &str = "image/png";

    struct Fixture {
        tmp: TempDir,
        clock: Arc<ManualClock>,
        store: CacheStore,
    }

    fn fixture_with(orphans: OrphanPolicy, lock_wait: Duration) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let store = open_store(&tmp, orphans, lock_wait, &clock);
        Fixture { tmp, clock, store }
    }

    fn fixture() -> Fixture {
        fixture_with(OrphanPolicy::Index, Duration::from_millis(200))
    }

    fn open_store(
        tmp: &TempDir,
        orphans: OrphanPolicy,
        lock_wait: Duration,
        clock: &Arc<ManualClock>,
    ) -> CacheStore {
        let mut broken = ConnectionConfig::local("x");
        broken.kind = BackendKind::S3;
        let connections = vec![
            Connection::new("local", ConnectionConfig::local(tmp.path().join("local"))),
            Connection::new("other", ConnectionConfig::local(tmp.path().join("other"))),
            Connection::new("broken", broken),
        ];
        let settings = StoreSettings {
            state_dir: tmp.path().join("state"),
            default_connection: "local".into(),
            orphans,
            lock_wait,
        };
        CacheStore::open(connections, settings)
            .unwrap()
            .with_clock(clock.clone())
    }

    fn local(f: &Fixture) -> LocalBackend {
        LocalBackend::new(f.tmp.path().join("local"))
    }

    // =========================================================================
    // get / put / delete
    // =========================================================================

    #[test]
    fn put_then_get_roundtrips() {
        let f = fixture();
        for ttl in [-1, 60] {
            assert!(f.store.put(None, KEY, b"img", ttl, PNG).unwrap());
            assert_eq!(f.store.get(None, KEY).unwrap().as_deref(), Some(&b"img"[..]));
        }
    }

    #[test]
    fn zero_ttl_is_not_stored() {
        let f = fixture();
        assert!(!f.store.put(None, KEY, b"img", 0, PNG).unwrap());
        assert_eq!(f.store.get(None, KEY).unwrap(), None);
        assert!(!local(&f).exists(KEY).unwrap());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let f = fixture();
        f.store.put(None, KEY, b"img", 10, PNG).unwrap();
        f.clock.advance(10);
        assert!(f.store.get(None, KEY).unwrap().is_some());
        f.clock.advance(10);
        assert_eq!(f.store.get(None, KEY).unwrap(), None);
    }

    #[test]
    fn expired_entry_is_gone_after_audit() {
        let f = fixture();
        f.store.put(None, KEY, b"img", 10, PNG).unwrap();
        f.clock.advance(20);
        assert_eq!(f.store.get(None, KEY).unwrap(), None);

        let report = f.store.audit(None).unwrap();
        assert!(report.errors.is_empty());
        assert!(!local(&f).exists(KEY).unwrap());
        assert_eq!(f.store.entry(None, KEY).unwrap(), None);
        assert_eq!(f.store.get(None, KEY).unwrap(), None);
    }

    #[test]
    fn delete_removes_file_and_record() {
        let f = fixture();
        f.store.put(None, KEY, b"img", -1, PNG).unwrap();
        assert!(f.store.delete(None, KEY).unwrap());
        assert!(!f.store.delete(None, KEY).unwrap());
        assert_eq!(f.store.get(None, KEY).unwrap(), None);
    }

    #[test]
    fn connections_are_separate() {
        let f = fixture();
        f.store.put(Some("other"), KEY, b"img", -1, PNG).unwrap();
        assert_eq!(f.store.get(None, KEY).unwrap(), None);
        assert!(f.store.get(Some("other"), KEY).unwrap().is_some());
        assert!(matches!(
            f.store.get(Some("nowhere"), KEY),
            Err(StoreError::UnknownConnection(_))
        ));
        assert!(matches!(
            f.store.put(Some("broken"), KEY, b"img", -1, PNG),
            Err(StoreError::InvalidConnection { .. })
        ));
    }

    #[test]
    fn index_survives_reopen() {
        let f = fixture();
        f.store.put(None, KEY, b"img", -1, PNG).unwrap();
        let reopened = open_store(&f.tmp, OrphanPolicy::Index, Duration::ZERO, &f.clock);
        assert_eq!(reopened.get(None, KEY).unwrap().as_deref(), Some(&b"img"[..]));
    }

    #[test]
    fn unindexed_files_are_not_served() {
        let f = fixture();
        local(&f).write(KEY, b"stray", PNG).unwrap();
        assert_eq!(f.store.get(None, KEY).unwrap(), None);
    }

    // =========================================================================
    // invalidate
    // =========================================================================

    #[test]
    fn invalidate_prefix_spans_connections() {
        let f = fixture();
        f.store.put(None, "photos/a.jpg@@1@@p", b"1", -1, PNG).unwrap();
        f.store.put(None, "photos/a.jpg@@2@@e", b"2", 60, PNG).unwrap();
        f.store.put(Some("other"), "photos/a.jpg@@3@@p", b"3", -1, PNG).unwrap();
        f.store.put(None, "photos/a.jpgx@@4@@p", b"4", -1, PNG).unwrap();
        // unindexed file with the prefix is found through the listing
        local(&f).write("photos/a.jpg@@5@@p", b"5", PNG).unwrap();

        assert_eq!(f.store.invalidate_prefix("photos/a.jpg@@").unwrap(), 4);
        assert_eq!(f.store.get(None, "photos/a.jpg@@1@@p").unwrap(), None);
        assert!(f.store.get(None, "photos/a.jpgx@@4@@p").unwrap().is_some());
        assert!(!local(&f).exists("photos/a.jpg@@5@@p").unwrap());
    }

    // =========================================================================
    // audit
    // =========================================================================

    #[test]
    fn audit_purges_records_without_files() {
        let f = fixture();
        f.store.put(None, KEY, b"img", -1, PNG).unwrap();
        local(&f).remove(KEY).unwrap();
        let report = f.store.audit(None).unwrap();
        assert_eq!(report.stale_records_purged, 1);
        assert_eq!(f.store.entry(None, KEY).unwrap(), None);
    }

    #[test]
    fn audit_adopts_permanent_orphans_and_removes_expiring_ones() {
        let f = fixture();
        local(&f).write("x@@1@@p", b"p", PNG).unwrap();
        local(&f).write("y@@2@@e", b"e", PNG).unwrap();
        let report = f.store.audit(None).unwrap();
        assert!(report.listed);
        assert_eq!(report.orphans_indexed, 1);
        assert_eq!(report.orphans_removed, 1);
        assert_eq!(f.store.entry(None, "x@@1@@p").unwrap().map(|m| m.ttl_seconds), Some(-1));
        assert!(!local(&f).exists("y@@2@@e").unwrap());
    }

    #[test]
    fn audit_remove_policy_deletes_orphans() {
        let f = fixture_with(OrphanPolicy::Remove, Duration::ZERO);
        local(&f).write("x@@1@@p", b"p", PNG).unwrap();
        let report = f.store.audit(None).unwrap();
        assert_eq!(report.orphans_removed, 1);
        assert!(!local(&f).exists("x@@1@@p").unwrap());
    }

    #[test]
    fn audit_counts_expired_entries() {
        let f = fixture();
        f.store.put(None, "a@@1@@e", b"a", 10, PNG).unwrap();
        f.store.put(None, "b@@2@@p", b"b", -1, PNG).unwrap();
        f.clock.advance(60);
        let report = f.store.audit(None).unwrap();
        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.records_checked, 2);
        assert!(f.store.get(None, "b@@2@@p").unwrap().is_some());
    }

    #[test]
    fn audit_skips_in_flight_writes() {
        let f = fixture();
        let slot = f.store.slot(None).unwrap();
        local(&f).write(KEY, b"half", PNG).unwrap();
        let _guard = slot.begin_write(KEY);
        let report = f.store.audit(None).unwrap();
        assert_eq!(report.skipped_in_flight, 1);
        assert_eq!(report.orphans_removed + report.orphans_indexed, 0);
        assert!(local(&f).exists(KEY).unwrap());
    }

    #[test]
    fn cancelled_audit_stops_early() {
        let f = fixture();
        f.store.put(None, "a@@1@@e", b"a", 10, PNG).unwrap();
        f.clock.advance(60);
        let report = f.store.audit_with_cancel(None, &AtomicBool::new(true)).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.expired_removed, 0);
        assert!(local(&f).exists("a@@1@@e").unwrap());
    }

    // =========================================================================
    // connections
    // =========================================================================

    #[test]
    fn list_and_switch_connections() {
        let f = fixture();
        let listed = f.store.list_connections();
        let names: Vec<_> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["broken", "local", "other"]);
        assert!(listed.iter().find(|c| c.name == "local").unwrap().is_default);
        let broken = listed.iter().find(|c| c.name == "broken").unwrap();
        assert!(!broken.is_valid);
        assert!(broken.problem.is_some());

        f.store.set_default_connection("other").unwrap();
        assert_eq!(f.store.default_connection(), "other");
        assert!(f.store.set_default_connection("broken").is_err());
        assert!(f.store.set_default_connection("nowhere").is_err());
        assert_eq!(f.store.default_connection(), "other");
    }

    #[test]
    fn undefined_default_fails_open() {
        let tmp = TempDir::new().unwrap();
        let settings = StoreSettings {
            state_dir: tmp.path().to_path_buf(),
            default_connection: "missing".into(),
            orphans: OrphanPolicy::Index,
            lock_wait: Duration::ZERO,
        };
        assert!(matches!(
            CacheStore::open(Vec::new(), settings),
            Err(StoreError::UnknownConnection(_))
        ));
    }

    // =========================================================================
    // leases
    // =========================================================================

    #[test]
    fn second_lease_times_out_while_first_is_held() {
        let f = fixture_with(OrphanPolicy::Index, Duration::from_millis(20));
        let first = f.store.lease(None, KEY).unwrap();
        assert!(first.is_held());
        let second = f.store.lease(None, KEY).unwrap();
        assert!(!second.is_held());
        drop(first);
        assert!(f.store.lease(None, KEY).unwrap().is_held());
    }

    #[test]
    fn waiting_lease_is_granted_on_release() {
        let f = fixture_with(OrphanPolicy::Index, Duration::from_secs(5));
        let store = Arc::new(f.store);
        let first = store.lease(None, KEY).unwrap();
        let waiter = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.lease(None, KEY).unwrap().is_held())
        };
        thread::sleep(Duration::from_millis(20));
        drop(first);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn different_keys_do_not_contend() {
        let f = fixture_with(OrphanPolicy::Index, Duration::ZERO);
        let _a = f.store.lease(None, "a").unwrap();
        assert!(f.store.lease(None, "b").unwrap().is_held());
    }
}
