#![allow(dead_code)]

use async_trait::async_trait;
use cardinal_core::{
    Cardinality, Endpoint, Node, NodeId, NodeTypeDescriptor, Properties, PropertyKind,
    Relationship, RelationshipId, RelationshipTypeDescriptor, Schema,
};
use cardinal_engine::Engine;
use cardinal_storage::{
    CommitReceipt, GraphStore, MemoryStore, StorageError, StorageResult, WriteBatch,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .node(NodeTypeDescriptor::new("X"))
        .node(NodeTypeDescriptor::new("Y").with_property("name", PropertyKind::String))
        .node(
            NodeTypeDescriptor::new("File")
                .with_capability("file")
                .with_property("size", PropertyKind::Integer),
        )
        .relationship(RelationshipTypeDescriptor::new(
            "XYOneToOne",
            "X",
            "Y",
            Cardinality::OneToOne,
        ))
        .relationship(RelationshipTypeDescriptor::new(
            "XYOneToMany",
            "X",
            "Y",
            Cardinality::OneToMany,
        ))
        .relationship(
            RelationshipTypeDescriptor::new("XYManyToOne", "X", "Y", Cardinality::ManyToOne)
                .with_property("weight", PropertyKind::Float),
        )
        .relationship(RelationshipTypeDescriptor::new(
            "XYManyToMany",
            "X",
            "Y",
            Cardinality::ManyToMany,
        ))
        .relationship(
            RelationshipTypeDescriptor::new("Attachment", "X", "File", Cardinality::OneToMany)
                .with_auto_create(true),
        )
        .relationship(RelationshipTypeDescriptor::new(
            "Linked",
            "*",
            "*",
            Cardinality::ManyToMany,
        ))
        .build()
        .unwrap();
    Arc::new(schema)
}

pub fn engine() -> (Engine<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Engine::new(store.clone(), schema()), store)
}

/// Commit nodes of the given type in their own transaction
pub async fn nodes<S: GraphStore>(engine: &Engine<S>, node_type: &str, count: usize) -> Vec<NodeId> {
    let mut tx = engine.begin();
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(tx.create_node(node_type, Properties::new()).await.unwrap().id);
    }
    tx.commit().await.unwrap();
    ids
}

/// Commit a single relationship in its own transaction
pub async fn relate<S: GraphStore>(
    engine: &Engine<S>,
    rel_type: &str,
    source: NodeId,
    target: NodeId,
) -> Relationship {
    let mut tx = engine.begin();
    let rel = tx
        .create_or_replace(rel_type, source, target, Properties::new())
        .await
        .unwrap();
    tx.commit().await.unwrap();
    rel
}

pub fn pairs(rels: &[Relationship]) -> Vec<(NodeId, NodeId)> {
    let mut pairs: Vec<_> = rels.iter().map(|r| (r.source, r.target)).collect();
    pairs.sort();
    pairs
}

/// Memory store whose next commit can be made to fail or conflict
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_next: AtomicBool,
    conflicts_left: AtomicUsize,
    pub commits: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn conflict_next(&self, times: usize) {
        self.conflicts_left.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    async fn initialize(&self) -> StorageResult<()> {
        self.inner.initialize().await
    }

    async fn health_check(&self) -> StorageResult<bool> {
        self.inner.health_check().await
    }

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        self.inner.get_node(id).await
    }

    async fn get_relationship(&self, id: &RelationshipId) -> StorageResult<Option<Relationship>> {
        self.inner.get_relationship(id).await
    }

    async fn find_relationships(
        &self,
        rel_type: &str,
        endpoint: &Endpoint,
    ) -> StorageResult<Vec<Relationship>> {
        self.inner.find_relationships(rel_type, endpoint).await
    }

    async fn nodes_of_type(&self, node_type: &str) -> StorageResult<Vec<Node>> {
        self.inner.nodes_of_type(node_type).await
    }

    async fn relationships_of_type(&self, rel_type: &str) -> StorageResult<Vec<Relationship>> {
        self.inner.relationships_of_type(rel_type).await
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitReceipt> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Database("injected failure".into()));
        }
        let left = self.conflicts_left.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts_left.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::Conflict("injected conflict".into()));
        }
        self.inner.commit(batch).await
    }
}
