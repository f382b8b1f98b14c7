//! Property tests for encodings and repo invariants.

#![allow(unused_results)]

mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pathwise_store::entities::{Activity, ActivityRepo, UserEvent, UserEventRepo};
use pathwise_store::sqlite::query::clamp_limit;
use pathwise_store::{new_id, time};
use proptest::prelude::*;

fn instant() -> impl Strategy<Value = DateTime<Utc>> {
    // 1970..2100 with nanosecond precision.
    (0_i64..4_102_444_800, 0_u32..1_000_000_000)
        .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap())
}

proptest! {
    #[test]
    fn encoded_instants_sort_chronologically(a in instant(), b in instant()) {
        let (ea, eb) = (time::encode(&a), time::encode(&b));
        prop_assert_eq!(ea.len(), eb.len());
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        prop_assert_eq!(time::decode(&ea), Some(a));
    }

    #[test]
    fn limits_are_clamped(limit in proptest::option::of(any::<i64>())) {
        let clamped = clamp_limit(limit);
        prop_assert!((1..=1000).contains(&clamped));
        match limit {
            Some(n) if (1..=1000).contains(&n) => prop_assert_eq!(clamped, n),
            Some(n) if n > 1000 => prop_assert_eq!(clamped, 1000),
            _ => prop_assert_eq!(clamped, 500),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn ignore_duplicates_counts_only_new_tuples(present in 0_usize..6, total in 1_usize..12) {
        let present = present.min(total);
        let (store, _) = common::store();
        let repo = UserEventRepo::with_store(store.clone());
        let dbc = store.dbc();
        let user = new_id();
        let batch = |n: usize| -> Vec<UserEvent> {
            (0..n)
                .map(|i| UserEvent::new(user, format!("c-{i}"), "x", common::t0()))
                .collect()
        };

        repo.create(&dbc, batch(present)).unwrap();
        let inserted = repo.create_ignore_duplicates(&dbc, batch(total)).unwrap();
        prop_assert_eq!(inserted, total - present);
        prop_assert_eq!(repo.count_by_user(&dbc, user).unwrap(), i64::try_from(total).unwrap());
    }

    #[test]
    fn upsert_is_idempotent_on_identity(step_secs in 0_i64..3600, title in "[a-z]{1,12}") {
        let (store, clock) = common::store();
        let repo = ActivityRepo::with_store(store.clone());
        let dbc = store.dbc();

        let mut first = Activity::new(new_id(), "quiz", "original");
        repo.upsert(&dbc, &mut first).unwrap();

        clock.advance(Duration::seconds(step_secs));
        let mut second = first.clone();
        second.title = title.clone();
        repo.upsert(&dbc, &mut second).unwrap();

        prop_assert_eq!(second.base.id, first.base.id);
        prop_assert_eq!(second.base.created_at, first.base.created_at);
        prop_assert_eq!(second.base.updated_at, store.now());
        let stored = repo.get_by_id(&dbc, first.base.id).unwrap().unwrap();
        prop_assert_eq!(stored.title, title);
        prop_assert!(stored.base.updated_at >= stored.base.created_at);
    }

    #[test]
    fn cursor_paging_visits_each_event_once(n in 0_usize..15, page in 1_i64..6) {
        let (store, clock) = common::store();
        let repo = UserEventRepo::with_store(store.clone());
        let dbc = store.dbc();
        let user = new_id();
        for i in 0..n {
            // Pairs of events share an ingestion instant.
            if i % 2 == 0 {
                clock.advance(Duration::milliseconds(1));
            }
            repo.create(&dbc, vec![UserEvent::new(user, format!("c-{i}"), "x", common::t0())]).unwrap();
        }

        let mut after = (None, None);
        let mut seen = Vec::new();
        loop {
            let batch = repo.list_after_cursor(&dbc, user, after.0, after.1, Some(page)).unwrap();
            let Some(last) = batch.last() else { break };
            after = (Some(last.base.created_at), Some(last.base.id));
            seen.extend(batch.iter().map(|e| (e.base.created_at, e.base.id)));
        }

        prop_assert_eq!(seen.len(), n);
        prop_assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
