//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::store::Store;
use crate::time::ManualClock;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// In-memory store driven by a manual clock frozen at [`t0`].
pub(crate) fn store() -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Store::open_in_memory().unwrap().with_clock(clock.clone());
    (store, clock)
}
