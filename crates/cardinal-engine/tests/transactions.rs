mod common;

use cardinal_core::{NodeId, Properties};
use cardinal_engine::{EntityRef, Error, TxState};
use cardinal_storage::GraphStore;
use common::{engine, nodes, relate};
use serde_json::json;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, label: &str) -> impl FnOnce(&EntityRef) -> Result<(), cardinal_engine::BoxError> + Send + Sync + 'static {
    let log = log.clone();
    let label = label.to_string();
    move |_| {
        log.lock().unwrap().push(label);
        Ok(())
    }
}

#[tokio::test]
async fn test_callbacks_run_in_registration_order_after_commit() {
    let (engine, store) = engine();
    let log: Log = Arc::default();

    let mut tx = engine.begin();
    let file = tx
        .create_node("File", Properties::from([("size".to_string(), json!(12))]))
        .await
        .unwrap();
    for label in ["open-receiver", "notify", "index"] {
        tx.register_callback(file.id, recorder(&log, label)).unwrap();
    }
    assert_eq!(tx.callback_count(), 3);
    assert!(log.lock().unwrap().is_empty());

    let outcome = tx.commit().await.unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.callbacks_run, 3);
    assert_eq!(*log.lock().unwrap(), vec!["open-receiver", "notify", "index"]);
    assert_eq!(tx.state(), TxState::Committed);
    assert!(store.get_node(&file.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_callback_sees_committed_entity() {
    let (engine, store) = engine();
    let seen = Arc::new(Mutex::new(None));

    let mut tx = engine.begin();
    let node = tx.create_node("X", Properties::new()).await.unwrap();
    let slot = seen.clone();
    tx.register_callback(node.id, move |entity| {
        *slot.lock().unwrap() = Some(*entity);
        Ok(())
    })
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(EntityRef::Node(node.id)));
    assert!(store.get_node(&node.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_callback_does_not_undo_commit() {
    let (engine, store) = engine();
    let log: Log = Arc::default();

    let mut tx = engine.begin();
    let node = tx.create_node("X", Properties::new()).await.unwrap();
    tx.register_callback(node.id, recorder(&log, "first")).unwrap();
    tx.register_callback(node.id, |_| Err("receiver unavailable".into()))
        .unwrap();
    tx.register_callback(node.id, recorder(&log, "third")).unwrap();

    let outcome = tx.commit().await.unwrap();
    assert_eq!(outcome.callback_failures.len(), 1);
    assert_eq!(outcome.callback_failures[0].order, 1);
    assert_eq!(*log.lock().unwrap(), vec!["first", "third"]);
    assert_eq!(tx.state(), TxState::Committed);
    assert!(store.get_node(&node.id).await.unwrap().is_some());

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, Error::Callback(_)));
}

#[tokio::test]
async fn test_rollback_discards_staged_work_and_callbacks() {
    let (engine, store) = engine();
    let log: Log = Arc::default();

    let mut tx = engine.begin();
    let node = tx.create_node("X", Properties::new()).await.unwrap();
    tx.register_callback(node.id, recorder(&log, "never")).unwrap();
    tx.rollback().unwrap();

    assert_eq!(tx.state(), TxState::RolledBack);
    assert!(log.lock().unwrap().is_empty());
    assert!(store.get_node(&node.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_terminal_states_reject_operations() {
    let (engine, _store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    let mut tx = engine.begin();
    tx.commit().await.unwrap();

    let err = tx
        .create_or_replace("XYManyToOne", xs[0], ys[0], Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::TransactionClosed {
            state: TxState::Committed,
            ..
        }
    ));
    assert!(tx.register_callback(xs[0], |_| Ok(())).is_err());
    assert!(tx.commit().await.is_err());
    assert!(tx.rollback().is_err());
    assert!(tx.begin().is_err());

    let mut tx = engine.begin();
    tx.rollback().unwrap();
    let err = tx.create_node("X", Properties::new()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::TransactionClosed {
            state: TxState::RolledBack,
            ..
        }
    ));
}

#[tokio::test]
async fn test_nested_scope_joins_outer_transaction() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;
    let log: Log = Arc::default();

    let mut tx = engine.begin();
    tx.register_callback(xs[0], recorder(&log, "outer")).unwrap();
    {
        let mut inner = tx.begin().unwrap();
        let rel = inner
            .create_or_replace("XYManyToOne", xs[0], ys[0], Properties::new())
            .await
            .unwrap();
        inner
            .register_callback(rel.id, recorder(&log, "inner"))
            .unwrap();
        inner.commit().unwrap();
    }

    // the nested commit is not a commit point
    assert_eq!(tx.state(), TxState::Open);
    assert!(log.lock().unwrap().is_empty());
    assert!(store.relationships_of_type("XYManyToOne").await.unwrap().is_empty());

    tx.commit().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    assert_eq!(store.relationships_of_type("XYManyToOne").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_nested_rollback_rolls_back_outer() {
    let (engine, store) = engine();
    let mut tx = engine.begin();
    let node = tx.create_node("X", Properties::new()).await.unwrap();

    let inner = tx.begin().unwrap();
    inner.rollback().unwrap();

    assert_eq!(tx.state(), TxState::RolledBack);
    assert!(tx.commit().await.is_err());
    assert!(store.get_node(&node.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_dropping_open_transaction_applies_nothing() {
    let (engine, store) = engine();
    let log: Log = Arc::default();
    let id;
    {
        let mut tx = engine.begin();
        id = tx.create_node("X", Properties::new()).await.unwrap().id;
        tx.register_callback(id, recorder(&log, "never")).unwrap();
    }
    assert!(log.lock().unwrap().is_empty());
    assert!(store.get_node(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_node_validates_type_and_properties() {
    let (engine, _store) = engine();
    let mut tx = engine.begin();

    let err = tx.create_node("Ghost", Properties::new()).await.unwrap_err();
    assert!(matches!(err, Error::UnknownType(_)));

    let props = Properties::from([("name".to_string(), json!(42))]);
    let err = tx.create_node("Y", props).await.unwrap_err();
    assert!(err.is_validation());

    let props = Properties::from([("name".to_string(), json!("y"))]);
    let node = tx.create_node("Y", props).await.unwrap();
    assert_eq!(node.property("name"), Some(&json!("y")));
    assert!(tx.has_touched(&EntityRef::Node(node.id)));
    assert_eq!(tx.get_node(&node.id).await.unwrap(), Some(node));
}

#[tokio::test]
async fn test_delete_relationship() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;
    let rel = relate(&engine, "XYManyToMany", xs[0], ys[0]).await;

    let mut tx = engine.begin();
    assert!(tx.delete_relationship(rel.id).await.unwrap());
    assert!(!tx.delete_relationship(rel.id).await.unwrap());
    assert!(tx.get_relationship(&rel.id).await.unwrap().is_none());
    let outcome = tx.commit().await.unwrap();
    assert_eq!(outcome.receipt.relationships_deleted, 1);

    assert!(store.get_relationship(&rel.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_of_staged_relationship_cancels_it() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 1).await;

    let mut tx = engine.begin();
    let rel = tx
        .create_or_replace("XYManyToMany", xs[0], ys[0], Properties::new())
        .await
        .unwrap();
    assert!(tx.delete_relationship(rel.id).await.unwrap());
    assert_eq!(tx.pending_mutations(), 0);
    assert!(!tx.has_touched(&EntityRef::Relationship(rel.id)));
    tx.commit().await.unwrap();

    assert!(store.relationships_of_type("XYManyToMany").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_engine_listings_reject_unknown_types() {
    let (engine, _store) = engine();
    nodes(&engine, "X", 2).await;

    assert_eq!(engine.nodes_of_type("X").await.unwrap().len(), 2);
    assert!(engine.nodes_of_type("XYManyToOne").await.is_err());
    assert!(engine.relationships_of_type("X").await.is_err());
    assert!(engine
        .relationships_of_type("XYManyToOne")
        .await
        .unwrap()
        .is_empty());
    assert!(engine.get_node(&NodeId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transaction_ids_are_distinct() {
    let (engine, _store) = engine();
    let a = engine.begin();
    let b = engine.begin();
    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn test_replaced_staged_relationship_drops_its_callbacks() {
    let (engine, store) = engine();
    let xs = nodes(&engine, "X", 1).await;
    let ys = nodes(&engine, "Y", 2).await;
    let log: Log = Arc::default();

    let mut tx = engine.begin();
    let first = tx
        .create_or_replace("XYManyToOne", xs[0], ys[0], Properties::new())
        .await
        .unwrap();
    tx.register_callback(first.id, recorder(&log, "first")).unwrap();
    let second = tx
        .create_or_replace("XYManyToOne", xs[0], ys[1], Properties::new())
        .await
        .unwrap();
    tx.register_callback(second.id, recorder(&log, "second")).unwrap();
    assert_eq!(tx.callback_count(), 1);

    let outcome = tx.commit().await.unwrap();
    assert_eq!(outcome.callbacks_run, 1);
    assert_eq!(*log.lock().unwrap(), vec!["second"]);
    assert!(store.get_relationship(&first.id).await.unwrap().is_none());
    assert!(store.get_relationship(&second.id).await.unwrap().is_some());
}
