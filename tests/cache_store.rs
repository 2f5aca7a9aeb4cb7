//! The public `CacheStore` API over real directories, driven by a manual
//! clock.

use imgforge::cache::{
    BackendKind, CacheStore, Connection, ManualClock, OrphanPolicy, StoreError, StoreSettings,
    derive_key, TtlMarker,
};
use imgforge::config::ConnectionConfig;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PNG: &str = "image/png";
const START: u64 = 1_700_000_000;

struct Fixture {
    tmp: TempDir,
    clock: Arc<ManualClock>,
    store: CacheStore,
}

impl Fixture {
    fn cache_dir(&self) -> PathBuf {
        self.tmp.path().join("cache")
    }
}

fn open(tmp: &TempDir, orphans: OrphanPolicy, clock: Arc<ManualClock>) -> CacheStore {
    let mut broken = ConnectionConfig::local("unused");
    broken.kind = BackendKind::S3;
    CacheStore::open(
        vec![
            Connection::new("local", ConnectionConfig::local(tmp.path().join("cache"))),
            Connection::new("cdn", broken),
        ],
        StoreSettings {
            state_dir: tmp.path().join("state"),
            default_connection: "local".into(),
            orphans,
            lock_wait: Duration::from_millis(300),
        },
    )
    .unwrap()
    .with_clock(clock)
}

fn fixture(orphans: OrphanPolicy) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let store = open(&tmp, orphans, clock.clone());
    Fixture { tmp, clock, store }
}

fn key(source: &str, ttl: i64) -> String {
    derive_key(source, "w=10", "", TtlMarker::for_duration(ttl), 160)
}

// =========================================================================
// Connections
// =========================================================================

#[test]
fn lists_valid_and_invalid_connections() {
    let f = fixture(OrphanPolicy::Index);
    let connections = f.store.list_connections();
    let local = connections.iter().find(|c| c.name == "local").unwrap();
    let cdn = connections.iter().find(|c| c.name == "cdn").unwrap();
    assert!(local.is_default && local.is_valid);
    assert!(!cdn.is_default && !cdn.is_valid);
    assert!(cdn.problem.as_deref().unwrap().contains("bucket"));
}

#[test]
fn invalid_connection_cannot_become_default() {
    let f = fixture(OrphanPolicy::Index);
    assert!(matches!(
        f.store.set_default_connection("cdn"),
        Err(StoreError::InvalidConnection { .. })
    ));
    assert!(matches!(
        f.store.set_default_connection("nowhere"),
        Err(StoreError::UnknownConnection(_))
    ));
    assert_eq!(f.store.default_connection(), "local");
}

#[test]
fn requests_to_an_invalid_connection_fail() {
    let f = fixture(OrphanPolicy::Index);
    let k = key("a.png", -1);
    assert!(f.store.put(Some("cdn"), &k, b"x", -1, PNG).is_err());
    assert!(f.store.get(Some("cdn"), &k).is_err());
}

// =========================================================================
// Lifetime
// =========================================================================

#[test]
fn expiring_entry_lifecycle() {
    let f = fixture(OrphanPolicy::Index);
    let k = key("photos/a.jpg", 10);
    f.store.put(None, &k, b"img", 10, PNG).unwrap();

    f.clock.advance(5);
    assert_eq!(f.store.get(None, &k).unwrap().as_deref(), Some(&b"img"[..]));

    f.clock.advance(15);
    assert_eq!(f.store.get(None, &k).unwrap(), None);

    let report = f.store.audit(None).unwrap();
    assert!(report.listed);
    assert!(report.expired_removed <= 1);
    assert!(!f.cache_dir().join(&k).exists());
    assert_eq!(f.store.entry(None, &k).unwrap(), None);
}

#[test]
fn permanent_entries_outlive_any_clock() {
    let f = fixture(OrphanPolicy::Index);
    let k = key("a.png", -1);
    f.store.put(None, &k, b"img", -1, PNG).unwrap();
    f.clock.advance(100 * 365 * 24 * 3600);
    assert!(f.store.get(None, &k).unwrap().is_some());
    assert_eq!(f.store.audit(None).unwrap().expired_removed, 0);
}

#[test]
fn index_persists_across_reopen() {
    let f = fixture(OrphanPolicy::Index);
    let k = key("a.png", 60);
    f.store.put(None, &k, b"img", 60, PNG).unwrap();
    let Fixture { tmp, clock, store } = f;
    drop(store);

    let reopened = open(&tmp, OrphanPolicy::Index, clock);
    let meta = reopened.entry(None, &k).unwrap().unwrap();
    assert_eq!(meta.created_at, START);
    assert_eq!(meta.ttl_seconds, 60);
    assert_eq!(meta.size, 3);
}

// =========================================================================
// Audit
// =========================================================================

#[test]
fn audit_purges_records_whose_file_vanished() {
    let f = fixture(OrphanPolicy::Index);
    let k = key("a.png", -1);
    f.store.put(None, &k, b"img", -1, PNG).unwrap();
    fs::remove_file(f.cache_dir().join(&k)).unwrap();

    let report = f.store.audit(None).unwrap();
    assert_eq!(report.stale_records_purged, 1);
    assert_eq!(f.store.entry(None, &k).unwrap(), None);
}

#[test]
fn audit_adopts_permanent_orphans_and_drops_expiring_ones() {
    let f = fixture(OrphanPolicy::Index);
    let permanent = key("kept.png", -1);
    let expiring = key("gone.png", 30);
    fs::create_dir_all(f.cache_dir()).unwrap();
    fs::write(f.cache_dir().join(&permanent), b"p").unwrap();
    fs::write(f.cache_dir().join(&expiring), b"e").unwrap();

    let report = f.store.audit(None).unwrap();
    assert_eq!(report.files_checked, 2);
    assert_eq!(report.orphans_indexed, 1);
    assert_eq!(report.orphans_removed, 1);
    assert_eq!(f.store.get(None, &permanent).unwrap().as_deref(), Some(&b"p"[..]));
    assert!(!f.cache_dir().join(&expiring).exists());
}

#[test]
fn remove_policy_deletes_every_orphan() {
    let f = fixture(OrphanPolicy::Remove);
    let permanent = key("kept.png", -1);
    fs::create_dir_all(f.cache_dir()).unwrap();
    fs::write(f.cache_dir().join(&permanent), b"p").unwrap();

    let report = f.store.audit(None).unwrap();
    assert_eq!(report.orphans_removed, 1);
    assert_eq!(report.orphans_indexed, 0);
    assert!(!f.cache_dir().join(&permanent).exists());
}

#[test]
fn second_audit_finds_nothing_to_do() {
    let f = fixture(OrphanPolicy::Index);
    let k = key("a.png", 10);
    f.store.put(None, &k, b"img", 10, PNG).unwrap();
    fs::write(f.cache_dir().join(key("b.png", -1)), b"orphan").unwrap();
    f.clock.advance(60);

    f.store.audit(None).unwrap();
    let again = f.store.audit(None).unwrap();
    assert_eq!(again.expired_removed, 0);
    assert_eq!(again.stale_records_purged, 0);
    assert_eq!(again.orphans_indexed, 0);
    assert_eq!(again.orphans_removed, 0);
}

// =========================================================================
// Invalidation and leases
// =========================================================================

#[test]
fn invalidate_source_removes_indexed_and_unindexed_variants() {
    let f = fixture(OrphanPolicy::Index);
    let a = derive_key("photos/a.jpg", "w=10", "", TtlMarker::Permanent, 160);
    let b = derive_key("photos/a.jpg", "w=20", "", TtlMarker::Expiring, 160);
    let other = derive_key("photos/b.jpg", "w=10", "", TtlMarker::Permanent, 160);
    f.store.put(None, &a, b"a", -1, PNG).unwrap();
    f.store.put(None, &other, b"o", -1, PNG).unwrap();
    fs::write(f.cache_dir().join(&b), b"stray").unwrap();

    assert_eq!(f.store.invalidate_source("photos/a.jpg", 160).unwrap(), 2);
    assert!(!f.cache_dir().join(&a).exists());
    assert!(!f.cache_dir().join(&b).exists());
    assert!(f.store.get(None, &other).unwrap().is_some());
}

#[test]
fn lease_blocks_until_released() {
    let f = fixture(OrphanPolicy::Index);
    let store = Arc::new(f.store);
    let k = key("a.png", -1);

    let first = store.lease(None, &k).unwrap();
    assert!(first.is_held());

    let waiter = {
        let store = Arc::clone(&store);
        let k = k.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let lease = store.lease(None, &k).unwrap();
            (lease.is_held(), started.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(50));
    drop(first);

    let (held, waited) = waiter.join().unwrap();
    assert!(held);
    assert!(waited < Duration::from_millis(300));
}

#[test]
fn lease_wait_is_bounded() {
    let f = fixture(OrphanPolicy::Index);
    let k = key("a.png", -1);
    let _first = f.store.lease(None, &k).unwrap();

    let started = Instant::now();
    let second = f.store.lease(None, &k).unwrap();
    assert!(!second.is_held());
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[test]
fn invalidate_source_covers_references_with_the_same_normal_form() {
    let f = fixture(OrphanPolicy::Index);
    let k = derive_key("a_b.jpg", "w=10", "", TtlMarker::Permanent, 160);
    f.store.put(None, &k, b"img", -1, PNG).unwrap();

    assert_eq!(f.store.invalidate_source("a b.jpg", 160).unwrap(), 1);
    assert!(!f.cache_dir().join(&k).exists());
}
