//! End-to-end scenarios across repos, transactions and the event stream.

#![allow(unused_results)]

mod common;

use std::thread;

use assert_matches::assert_matches;
use chrono::Duration;
use pathwise_store::entities::{
    Activity, ActivityRepo, Concept, ConceptEdge, ConceptEdgeRepo, ConceptRepo, Path, PathNode,
    PathNodeRepo, PathRepo, ScopeKind, UserEvent, UserEventCursor, UserEventCursorRepo,
    UserEventRepo,
};
use pathwise_store::{ErrorKind, EventConsumer, Fields, Id, StoreError, TxOptions, new_id};
use tokio_util::sync::CancellationToken;

#[test]
fn activity_crud_with_owner_scoping() {
    let (store, clock) = common::store();
    let repo = ActivityRepo::with_store(store.clone());
    let dbc = store.dbc();
    let (alice, bob) = (new_id(), new_id());

    let created = repo
        .create(
            &dbc,
            vec![
                Activity::new(alice, "reading", "Lifetimes"),
                Activity::new(alice, "quiz", "Lifetimes quiz"),
                Activity::new(bob, "reading", "Generics"),
            ],
        )
        .unwrap();
    assert!(created.iter().all(|a| !a.base.id.is_nil()));

    let mine = repo.list_by_owner(&dbc, alice, None).unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|a| a.owner_id == alice));

    clock.advance(Duration::seconds(10));
    let quiz = created[1].base.id;
    repo.update_fields(&dbc, quiz, Fields::new().set_text("status", "ready").set("estimated_minutes", 20_i64))
        .unwrap();
    let stored = repo.get_by_id(&dbc, quiz).unwrap().unwrap();
    assert_eq!(stored.status, "ready");
    assert_eq!(stored.estimated_minutes, Some(20));
    assert!(stored.base.updated_at > stored.base.created_at);

    repo.soft_delete_by_ids(&dbc, &[quiz]).unwrap();
    assert!(repo.get_by_id(&dbc, quiz).unwrap().is_none());
    assert_eq!(repo.list_by_owner(&dbc, alice, None).unwrap().len(), 1);
    let deleted_at: Option<String> = store
        .pool()
        .get()
        .unwrap()
        .query_row("SELECT deleted_at FROM activities WHERE id = ?1", [quiz.to_string()], |r| r.get(0))
        .unwrap();
    assert!(deleted_at.is_some());

    // Updates never touch deleted rows.
    let mut ghost = stored.clone();
    ghost.title = "resurrected".into();
    repo.update(&dbc, &mut ghost).unwrap();
    let raw = repo.get_by_ids_unscoped(&dbc, &[quiz]).unwrap();
    assert_eq!(raw[0].title, "Lifetimes quiz");

    assert_eq!(repo.full_delete_by_ids(&dbc, &[quiz]).unwrap(), 1);
    assert!(repo.get_by_ids_unscoped(&dbc, &[quiz]).unwrap().is_empty());
    assert_eq!(repo.full_delete_by_owner(&dbc, bob).unwrap(), 1);
}

#[test]
fn path_views_are_deduplicated() {
    let (store, clock) = common::store();
    let repo = PathRepo::with_store(store.clone());
    let dbc = store.dbc();
    let owner = new_id();
    let path = repo.create(&dbc, vec![Path::new(owner, "Async Rust", "ready")]).unwrap().remove(0);
    let window = Duration::minutes(30);

    let counts: Vec<i64> = [0, 10, 25, 31, 1]
        .into_iter()
        .map(|minutes| {
            clock.advance(Duration::minutes(minutes));
            repo.record_view(&dbc, owner, path.base.id, window).unwrap().view_count
        })
        .collect();
    // t=0 counts, t=10 and t=35 are within 30m of the last view, t=66 counts,
    // t=67 does not.
    assert_eq!(counts, vec![1, 1, 1, 2, 2]);

    let stored = repo.get_by_id(&dbc, path.base.id).unwrap().unwrap();
    assert_eq!(stored.view_count, 2);
    assert_eq!(stored.last_viewed_at, Some(store.now()));
}

#[test]
fn event_stream_resumes_across_timestamp_ties() {
    let (store, clock) = common::store();
    let events = UserEventRepo::with_store(store.clone());
    let cursors = UserEventCursorRepo::with_store(store.clone());
    let dbc = store.dbc();
    let user = new_id();

    // Three events ingested at the same instant, two more later.
    let batch = (0..3)
        .map(|i| UserEvent::new(user, format!("tie-{i}"), "answer", common::t0()))
        .collect();
    events.create(&dbc, batch).unwrap();
    clock.advance(Duration::seconds(1));
    let later = (0..2)
        .map(|i| UserEvent::new(user, format!("late-{i}"), "answer", common::t0()))
        .collect();
    events.create(&dbc, later).unwrap();

    let mut cursor = UserEventCursor::new(user, "projector");
    let mut seen = Vec::new();
    loop {
        let page = events
            .list_after_cursor(&dbc, user, cursor.last_created_at, cursor.last_event_id, Some(2))
            .unwrap();
        let Some(last) = page.last() else { break };
        cursor.advance_to(last.base.created_at, last.base.id);
        cursors.upsert(&dbc, &mut cursor).unwrap();
        seen.extend(page.into_iter().map(|e| e.client_event_id));
    }

    assert_eq!(seen.len(), 5);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);
    assert!(seen[..3].iter().all(|k| k.starts_with("tie-")));

    let stored = cursors.get(&dbc, user, "projector").unwrap();
    assert_eq!(stored.last_created_at, Some(store.now()));

    // A consumer picking up from the stored cursor finds nothing new.
    let consumer = EventConsumer::new(store.clone(), "projector");
    assert_eq!(consumer.drain(&dbc, user, |_, _| Ok(())).unwrap(), 0);
}

#[test]
fn event_stream_picks_up_tie_inserted_after_cursor() {
    let (store, clock) = common::store();
    let events = UserEventRepo::with_store(store.clone());
    let dbc = store.dbc();
    let user = new_id();

    let mut stream = Vec::new();
    for key in ["e1", "e2", "e3"] {
        clock.advance(Duration::seconds(1));
        let event = UserEvent::new(user, key, "answer", common::t0());
        stream.extend(events.create(&dbc, vec![event]).unwrap());
    }
    let (e2_at, e3_id) = (stream[1].base.created_at, stream[2].base.id);

    let first = events.list_after_cursor(&dbc, user, None, None, Some(2)).unwrap();
    let keys: Vec<_> = first.iter().map(|e| e.client_event_id.as_str()).collect();
    assert_eq!(keys, vec!["e1", "e2"]);
    let mut cursor = UserEventCursor::new(user, "mastery");
    cursor.advance_to(first[1].base.created_at, first[1].base.id);

    // A late event stamped with the cursor's own instant.
    clock.advance(Duration::seconds(1));
    let mut late = UserEvent::new(user, "e4", "answer", common::t0());
    late.base.created_at = e2_at;
    late.base.id = Id::from_u128(first[1].base.id.as_u128() + 1);
    let e4 = events.create(&dbc, vec![late]).unwrap().remove(0);
    assert_eq!(e4.base.created_at, e2_at);

    let next = events
        .list_after_cursor(&dbc, user, cursor.last_created_at, cursor.last_event_id, Some(10))
        .unwrap();
    let ids: Vec<Id> = next.iter().map(|e| e.base.id).collect();
    assert_eq!(ids, vec![e4.base.id, e3_id]);
    assert!(next.windows(2).all(|w| (w[0].base.created_at, w[0].base.id) < (w[1].base.created_at, w[1].base.id)));
}

#[test]
fn concept_edge_upsert_on_composite_tuple() {
    let (store, clock) = common::store();
    let concepts = ConceptRepo::with_store(store.clone());
    let edges = ConceptEdgeRepo::with_store(store.clone());
    let dbc = store.dbc();
    let ids: Vec<Id> = concepts
        .create(
            &dbc,
            vec![
                Concept::new(ScopeKind::Global, None, "borrowing", "Borrowing"),
                Concept::new(ScopeKind::Global, None, "lifetimes", "Lifetimes"),
            ],
        )
        .unwrap()
        .iter()
        .map(|c| c.base.id)
        .collect();

    let mut first = ConceptEdge::new(ids[0], ids[1], "prerequisite");
    first.strength = 0.3;
    edges.upsert(&dbc, &mut first).unwrap();

    clock.advance(Duration::seconds(5));
    let mut second = ConceptEdge::new(ids[0], ids[1], "prerequisite");
    second.strength = 0.9;
    second.evidence = serde_json::json!({"source": "co-occurrence"});
    edges.upsert(&dbc, &mut second).unwrap();

    assert_eq!(second.base.id, first.base.id);
    assert_eq!(second.base.created_at, common::t0());
    assert_eq!(second.base.updated_at, store.now());

    let stored = edges.get_by_from_ids(&dbc, &[ids[0]]).unwrap();
    assert_eq!(stored.len(), 1);
    assert!((stored[0].strength - 0.9).abs() < f64::EPSILON);
    assert_eq!(stored[0].evidence["source"], "co-occurrence");

    // A different edge type is a different tuple.
    let mut related = ConceptEdge::new(ids[0], ids[1], "related");
    edges.upsert(&dbc, &mut related).unwrap();
    assert_ne!(related.base.id, first.base.id);

    // After a soft delete the tuple is free again.
    edges.soft_delete_by_ids(&dbc, &[first.base.id]).unwrap();
    let mut reborn = ConceptEdge::new(ids[0], ids[1], "prerequisite");
    edges.upsert(&dbc, &mut reborn).unwrap();
    assert_ne!(reborn.base.id, first.base.id);
    assert_eq!(edges.get_by_concept_ids(&dbc, &[ids[1]]).unwrap().len(), 2);
}

#[test]
fn scoped_concepts_use_null_distinct_equality() {
    let (store, _) = common::store();
    let repo = ConceptRepo::with_store(store.clone());
    let dbc = store.dbc();
    let course = new_id();

    let inserted = repo
        .create_ignore_duplicates(
            &dbc,
            vec![
                Concept::new(ScopeKind::Global, None, "traits", "Traits"),
                Concept::new(ScopeKind::Course, Some(course), "traits", "Traits (course)"),
                Concept::new(ScopeKind::Global, None, "traits", "Traits again"),
            ],
        )
        .unwrap();
    assert_eq!(inserted, 2);

    let global = repo.get_by_scope(&dbc, ScopeKind::Global, None).unwrap();
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].name, "Traits");
    assert_eq!(global[0].scope_id, None);

    let scoped = repo.get_by_scope(&dbc, ScopeKind::Course, Some(course)).unwrap();
    assert_eq!(scoped.len(), 1);
    assert!(repo.get_by_scope(&dbc, ScopeKind::Course, None).unwrap().is_empty());

    let mut renamed = Concept::new(ScopeKind::Global, None, "traits", "Traits & bounds");
    repo.upsert(&dbc, &mut renamed).unwrap();
    assert_eq!(renamed.base.id, global[0].base.id);
}

#[test]
fn transaction_rolls_back_every_repo_write() {
    let (store, _) = common::store();
    let paths = PathRepo::with_store(store.clone());
    let nodes = PathNodeRepo::with_store(store.clone());
    let dbc = store.dbc();
    let owner = new_id();

    let mut rolled_back = None;
    let err = store
        .transact(&dbc, TxOptions::default(), |tx| {
            let path = paths.create(tx, vec![Path::new(owner, "Draft", "draft")])?.remove(0);
            rolled_back = Some(path.base.id);
            nodes.create(tx, vec![PathNode::new(path.base.id, 0, "Intro")])?;
            // Same position again: the whole unit fails.
            nodes.create(tx, vec![PathNode::new(path.base.id, 0, "Intro again")])?;
            Ok(())
        })
        .unwrap_err();
    assert_matches!(err, StoreError::UniqueViolation(_));
    assert!(paths.list_by_owner(&dbc, owner, None).unwrap().is_empty());
    let rolled_back = rolled_back.unwrap();
    assert!(paths.get_by_id(&dbc, rolled_back).unwrap().is_none());
    assert!(paths.get_by_ids_unscoped(&dbc, &[rolled_back]).unwrap().is_empty());

    // The primary key is free again.
    let mut reused = Path::new(owner, "Reused", "draft");
    reused.base.id = rolled_back;
    let stored = paths.create(&dbc, vec![reused]).unwrap();
    assert_eq!(stored[0].base.id, rolled_back);
    assert!(paths.get_by_id(&dbc, rolled_back).unwrap().is_some());

    let committed = store
        .transact(&dbc, TxOptions::serializable(), |tx| {
            let path = paths.create(tx, vec![Path::new(owner, "Real", "draft")])?.remove(0);
            nodes.create(tx, vec![PathNode::new(path.base.id, 0, "Intro")])?;
            Ok(path.base.id)
        })
        .unwrap();
    assert_eq!(nodes.get_by_path_ids(&dbc, &[committed]).unwrap().len(), 1);
}

#[test]
fn canceled_context_stops_repo_calls() {
    let (store, _) = common::store();
    let repo = PathRepo::with_store(store.clone());
    let token = CancellationToken::new();
    let dbc = store.dbc().with_cancel(token.clone());
    token.cancel();

    let err = repo
        .create(&dbc, vec![Path::new(new_id(), "x", "draft")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert!(!err.is_retryable());
    assert!(repo.list_by_owner(&store.dbc(), new_id(), None).unwrap().is_empty());
}

#[test]
fn concurrent_ingestion_stores_each_event_once() {
    let (_dir, store) = common::file_store(8);
    let user = new_id();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let repo = UserEventRepo::with_store(store.clone());
                let rows = (0..20)
                    .map(|i| UserEvent::new(user, format!("evt-{i}"), "answer", common::t0()))
                    .collect();
                repo.create_ignore_duplicates(&store.dbc(), rows).unwrap()
            })
        })
        .collect();
    let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(inserted, 20);
    let repo = UserEventRepo::with_store(store.clone());
    assert_eq!(repo.count_by_user(&store.dbc(), user).unwrap(), 20);
}
