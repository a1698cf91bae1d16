mod common;

use cardinal_core::{Endpoint, Properties, Relationship};
use cardinal_engine::{Engine, EngineConfig, Error, TxState};
use cardinal_storage::{GraphStore, MemoryStore, RedbStore};
use common::{engine, nodes, pairs, relate, schema, FlakyStore};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_source_one_keeps_single_outgoing_edge() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 4).await;

    for y in &ys {
        relate(&engine, "XYManyToOne", xs[0], *y).await;
    }

    let out = store
        .find_relationships("XYManyToOne", &Endpoint::source(xs[0]))
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].target, ys[3]);
}

#[tokio::test]
async fn test_target_one_keeps_single_incoming_edge() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 3).await;
    let ys = nodes(&engine, "Y", 1).await;

    for x in &xs {
        relate(&engine, "XYOneToMany", *x, ys[0]).await;
    }

    let inc = store
        .find_relationships("XYOneToMany", &Endpoint::target(ys[0]))
        .await
        .unwrap();
    assert_eq!(inc.len(), 1);
    assert_eq!(inc[0].source, xs[2]);
}

#[tokio::test]
async fn test_one_to_many_leaves_sources_unconstrained() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;

    relate(&engine, "XYOneToMany", xs[0], ys[0]).await;
    relate(&engine, "XYOneToMany", xs[0], ys[1]).await;

    let all = store.relationships_of_type("XYOneToMany").await.unwrap();
    assert_eq!(pairs(&all), {
        let mut expected = vec![(xs[0], ys[0]), (xs[0], ys[1])];
        expected.sort();
        expected
    });
}

#[tokio::test]
async fn test_many_to_one_three_nodes_keeps_newest_target() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;

    relate(&engine, "XYManyToOne", xs[0], ys[0]).await;
    relate(&engine, "XYManyToOne", xs[0], ys[1]).await;

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(pairs(&all), vec![(xs[0], ys[1])]);
}

#[tokio::test]
async fn test_one_to_one_three_nodes_keeps_newest_target() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;

    relate(&engine, "XYOneToOne", xs[0], ys[0]).await;
    relate(&engine, "XYOneToOne", xs[0], ys[1]).await;

    let all = store.relationships_of_type("XYOneToOne").await.unwrap();
    assert_eq!(pairs(&all), vec![(xs[0], ys[1])]);
}

#[tokio::test]
async fn test_create_or_replace_is_idempotent() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    let first = relate(&engine, "XYManyToOne", xs[0], ys[0]).await;
    let second = relate(&engine, "XYManyToOne", xs[0], ys[0]).await;

    assert_eq!(first.id, second.id);
    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, first.id);
}

#[tokio::test]
async fn test_idempotent_within_one_transaction() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    let mut tx = engine.begin();
    let a = tx
        .create_or_replace("XYOneToOne", xs[0], ys[0], Properties::new())
        .await
        .unwrap();
    let b = tx
        .create_or_replace("XYOneToOne", xs[0], ys[0], Properties::new())
        .await
        .unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(tx.pending_mutations(), 1);
    tx.commit().await.unwrap();

    assert_eq!(store.relationships_of_type("XYOneToOne").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_replacement_moves_edge_to_new_target() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;

    relate(&engine, "XYManyToOne", xs[0], ys[0]).await;
    relate(&engine, "XYManyToOne", xs[0], ys[1]).await;

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(pairs(&all), vec![(xs[0], ys[1])]);
}

#[tokio::test]
async fn test_one_to_one_replaces_on_both_sides() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 2).await;
    let ys = nodes(&engine, "Y", 2).await;

    relate(&engine, "XYOneToOne", xs[0], ys[0]).await;
    relate(&engine, "XYOneToOne", xs[1], ys[1]).await;
    // conflicts with x0's outgoing and y1's incoming edge
    relate(&engine, "XYOneToOne", xs[0], ys[1]).await;

    let all = store.relationships_of_type("XYOneToOne").await.unwrap();
    assert_eq!(pairs(&all), vec![(xs[0], ys[1])]);
}

#[tokio::test]
async fn test_many_to_many_keeps_every_edge() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    relate(&engine, "XYManyToMany", xs[0], ys[0]).await;
    relate(&engine, "XYManyToMany", xs[0], ys[0]).await;

    assert_eq!(store.relationships_of_type("XYManyToMany").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sequence_within_one_transaction_sees_own_writes() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 3).await;
    relate(&engine, "XYManyToOne", xs[0], ys[0]).await;

    let mut tx = engine.begin();
    for y in &ys[1..] {
        tx.create_or_replace("XYManyToOne", xs[0], *y, Properties::new())
            .await
            .unwrap();
    }
    let visible = tx
        .relationships("XYManyToOne", &Endpoint::source(xs[0]))
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].target, ys[2]);

    // committed state is untouched until commit
    let committed = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(pairs(&committed), vec![(xs[0], ys[0])]);

    let outcome = tx.commit().await.unwrap();
    // staged y1 edge was cancelled, not written then deleted
    assert_eq!(outcome.receipt.relationships_created, 1);
    assert_eq!(outcome.receipt.relationships_deleted, 1);

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(pairs(&all), vec![(xs[0], ys[2])]);
}

#[tokio::test]
async fn test_corrupt_state_heals_by_deleting_all_conflicts() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 3).await;
    store
        .insert_raw_relationship(Relationship::new("XYManyToOne", xs[0], ys[0]))
        .unwrap();
    store
        .insert_raw_relationship(Relationship::new("XYManyToOne", xs[0], ys[1]))
        .unwrap();

    relate(&engine, "XYManyToOne", xs[0], ys[2]).await;

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(pairs(&all), vec![(xs[0], ys[2])]);
}

#[tokio::test]
async fn test_exact_match_heals_duplicate_conflicts() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;
    let keep = Relationship::new("XYManyToOne", xs[0], ys[0]);
    store.insert_raw_relationship(keep.clone()).unwrap();
    store
        .insert_raw_relationship(Relationship::new("XYManyToOne", xs[0], ys[1]))
        .unwrap();

    let rel = relate(&engine, "XYManyToOne", xs[0], ys[0]).await;
    assert_eq!(rel.id, keep.id);

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, keep.id);
}

#[tokio::test]
async fn test_validation_errors_stage_nothing() {
    let (engine, _store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    let mut tx = engine.begin();
    let err = tx
        .create_or_replace("Nope", xs[0], ys[0], Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownType(ref t) if t == "Nope"));

    let err = tx
        .create_or_replace("XYManyToOne", xs[0], cardinal_core::NodeId::new(), Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EndpointNotFound { .. }));
    assert!(err.is_validation());

    // endpoints swapped: Y on the source side
    let err = tx
        .create_or_replace("XYManyToOne", ys[0], xs[0], Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EndpointTypeMismatch { .. }));

    let mut props = Properties::new();
    props.insert("weight".into(), json!("heavy"));
    let err = tx
        .create_or_replace("XYManyToOne", xs[0], ys[0], props)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidProperty { ref key, .. } if key == "weight"));

    assert_eq!(tx.state(), TxState::Open);
    assert_eq!(tx.pending_mutations(), 0);
    assert_eq!(tx.touched().count(), 0);
}

#[tokio::test]
async fn test_wildcard_endpoints_accept_any_type() {
    let (engine, store) = engine();
    let ys = nodes(&engine, "Y", 2).await;

    relate(&engine, "Linked", ys[0], ys[1]).await;
    assert_eq!(store.relationships_of_type("Linked").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_auto_create_missing_endpoint() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let file_id = cardinal_core::NodeId::new();

    let rel = relate(&engine, "Attachment", xs[0], file_id).await;
    assert_eq!(rel.target, file_id);

    let file = store.get_node(&file_id).await.unwrap().unwrap();
    assert_eq!(file.node_type.as_str(), "File");
    assert!(file.has_capability("file"));
}

#[tokio::test]
async fn test_rollback_restores_edge_set_on_store_failure() {
    let store = Arc::new(FlakyStore::default());
    let engine = Engine::new(store.clone(), schema());
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;
    let original = relate(&engine, "XYManyToOne", xs[0], ys[0]).await;

    let mut tx = engine.begin();
    tx.create_or_replace("XYManyToOne", xs[0], ys[1], Properties::new())
        .await
        .unwrap();
    assert_eq!(tx.pending_mutations(), 2);

    store.fail_next_commit();
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, Error::Store(_)));
    assert_eq!(tx.state(), TxState::RolledBack);

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(all, vec![original]);
}

#[tokio::test]
async fn test_losing_committer_re_resolves() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;

    let mut first = engine.begin();
    let mut second = engine.begin();
    first
        .create_or_replace("XYManyToOne", xs[0], ys[0], Properties::new())
        .await
        .unwrap();
    let planned = second
        .create_or_replace("XYManyToOne", xs[0], ys[1], Properties::new())
        .await
        .unwrap();

    let (a, b) = futures::future::join(first.commit(), second.commit()).await;
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.attempts + b.attempts, 3);

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(all.len(), 1);
    if b.attempts == 2 {
        // replayed with its original id
        assert_eq!(all[0].id, planned.id);
        assert_eq!(b.receipt.relationships_deleted, 1);
    }
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let store = Arc::new(FlakyStore::default());
    let config = EngineConfig::default().with_max_conflict_retries(2);
    let engine = Engine::with_config(store.clone(), schema(), config);
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    let mut tx = engine.begin();
    tx.create_or_replace("XYOneToOne", xs[0], ys[0], Properties::new())
        .await
        .unwrap();

    store.conflict_next(10);
    let before = store.commits.load(std::sync::atomic::Ordering::SeqCst);
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, Error::ConcurrentModification { attempts: 3 }));
    assert_eq!(tx.state(), TxState::RolledBack);
    assert_eq!(store.commits.load(std::sync::atomic::Ordering::SeqCst) - before, 3);
    assert!(store.relationships_of_type("XYOneToOne").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_conflict_then_success() {
    let store = Arc::new(FlakyStore::default());
    let engine = Engine::new(store.clone(), schema());
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    let mut tx = engine.begin();
    tx.create_or_replace("XYOneToOne", xs[0], ys[0], Properties::new())
        .await
        .unwrap();
    store.conflict_next(1);
    let outcome = tx.commit().await.unwrap();
    assert_eq!(outcome.attempts, 2);
    assert_eq!(store.relationships_of_type("XYOneToOne").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_never_break_source_one() {
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig::default().with_max_conflict_retries(32);
    let engine = Engine::with_config(store.clone(), schema(), config);
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 8).await;

    // every transaction resolves against the same committed state
    let mut staged = Vec::new();
    for y in &ys {
        let mut tx = engine.begin();
        tx.create_or_replace("XYManyToOne", xs[0], *y, Properties::new())
            .await
            .unwrap();
        staged.push(tx);
    }

    let handles: Vec<_> = staged
        .into_iter()
        .map(|mut tx| tokio::spawn(async move { tx.commit().await.map(|o| o.attempts) }))
        .collect();

    let mut attempts = Vec::new();
    for handle in handles {
        attempts.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(attempts.len(), ys.len());
    assert_eq!(attempts.iter().filter(|a| **a == 1).count(), 1);
    assert!(attempts.iter().any(|a| *a > 1));

    let out = store
        .find_relationships("XYManyToOne", &Endpoint::source(xs[0]))
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
}

#[tokio::test]
async fn test_redb_backed_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbStore::open(dir.path().join("cardinal.redb")).unwrap());
    let engine = Engine::new(store.clone(), schema());
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;

    relate(&engine, "XYManyToOne", xs[0], ys[0]).await;
    relate(&engine, "XYManyToOne", xs[0], ys[0]).await;
    relate(&engine, "XYManyToOne", xs[0], ys[1]).await;

    let all = store.relationships_of_type("XYManyToOne").await.unwrap();
    assert_eq!(pairs(&all), vec![(xs[0], ys[1])]);
}
