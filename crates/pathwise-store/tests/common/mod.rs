//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use pathwise_store::{ManualClock, Store, StoreSettings};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

/// Private in-memory store on a manual clock frozen at [`t0`].
pub fn store() -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Store::open_in_memory().unwrap().with_clock(clock.clone());
    (store, clock)
}

/// File-backed store in a fresh temp dir. Keep the dir alive for the test.
pub fn file_store(pool_size: u32) -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let settings = StoreSettings {
        database_path: dir.path().join("pathwise.db").to_string_lossy().into_owned(),
        pool_size,
        ..StoreSettings::default()
    };
    let store = Store::open(&settings).unwrap();
    (dir, store)
}
