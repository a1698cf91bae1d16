//! In-memory graph store for testing

use crate::batch::{CommitReceipt, Mutation, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::traits::GraphStore;
use async_trait::async_trait;
use cardinal_core::{Endpoint, EndpointRole, Node, NodeId, Relationship, RelationshipId};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

type AdjacencyKey = (String, NodeId);

#[derive(Default)]
struct MemoryGraph {
    nodes: HashMap<NodeId, Node>,
    relationships: HashMap<RelationshipId, Relationship>,
    outgoing: HashMap<AdjacencyKey, BTreeSet<RelationshipId>>,
    incoming: HashMap<AdjacencyKey, BTreeSet<RelationshipId>>,
}

impl MemoryGraph {
    fn adjacency(&self, role: EndpointRole) -> &HashMap<AdjacencyKey, BTreeSet<RelationshipId>> {
        match role {
            EndpointRole::Source => &self.outgoing,
            EndpointRole::Target => &self.incoming,
        }
    }

    fn bump(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.version += 1;
        }
    }

    fn insert_relationship(&mut self, rel: Relationship) {
        self.outgoing
            .entry((rel.rel_type.clone(), rel.source))
            .or_default()
            .insert(rel.id);
        self.incoming
            .entry((rel.rel_type.clone(), rel.target))
            .or_default()
            .insert(rel.id);
        self.bump(&rel.source);
        self.bump(&rel.target);
        self.relationships.insert(rel.id, rel);
    }

    fn remove_relationship(&mut self, id: &RelationshipId) {
        let Some(rel) = self.relationships.remove(id) else {
            return;
        };
        if let Some(ids) = self.outgoing.get_mut(&(rel.rel_type.clone(), rel.source)) {
            ids.remove(id);
        }
        if let Some(ids) = self.incoming.get_mut(&(rel.rel_type.clone(), rel.target)) {
            ids.remove(id);
        }
        self.bump(&rel.source);
        self.bump(&rel.target);
    }

    fn apply(&mut self, batch: WriteBatch) -> StorageResult<CommitReceipt> {
        for (id, expected) in &batch.expected_versions {
            match self.nodes.get(id) {
                Some(node) if node.version == *expected => {}
                Some(node) => {
                    return Err(StorageError::Conflict(format!(
                        "node {} moved from version {} to {}",
                        id, expected, node.version
                    )))
                }
                None => return Err(StorageError::Conflict(format!("node {} disappeared", id))),
            }
        }

        let receipt = batch.check(
            |id| Ok(self.nodes.contains_key(id)),
            |id| Ok(self.relationships.contains_key(id)),
        )?;

        for mutation in batch.mutations {
            match mutation {
                Mutation::CreateNode(mut node) => {
                    node.version += 1;
                    self.nodes.insert(node.id, node);
                }
                Mutation::CreateRelationship(rel) => self.insert_relationship(rel),
                Mutation::DeleteRelationship(id) => self.remove_relationship(&id),
            }
        }

        Ok(receipt)
    }
}

/// In-memory graph store
///
/// Useful for testing and temporary storage. A single lock guards the whole
/// graph so that a commit is applied atomically with respect to readers.
pub struct MemoryStore {
    graph: RwLock<MemoryGraph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(MemoryGraph::default()),
        }
    }

    /// Insert a relationship directly, bypassing batches and version checks.
    ///
    /// Only meant for seeding fixtures, including deliberately corrupt ones.
    pub fn insert_raw_relationship(&self, relationship: Relationship) -> StorageResult<()> {
        let mut graph = self
            .graph
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        graph.insert_relationship(relationship);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(true)
    }

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let graph = self
            .graph
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        Ok(graph.nodes.get(id).cloned())
    }

    async fn get_relationship(&self, id: &RelationshipId) -> StorageResult<Option<Relationship>> {
        let graph = self
            .graph
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        Ok(graph.relationships.get(id).cloned())
    }

    async fn find_relationships(
        &self,
        rel_type: &str,
        endpoint: &Endpoint,
    ) -> StorageResult<Vec<Relationship>> {
        let graph = self
            .graph
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        let key = (rel_type.to_string(), endpoint.node);
        Ok(graph
            .adjacency(endpoint.role)
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| graph.relationships.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn nodes_of_type(&self, node_type: &str) -> StorageResult<Vec<Node>> {
        let graph = self
            .graph
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        let mut nodes: Vec<Node> = graph
            .nodes
            .values()
            .filter(|n| n.node_type.as_str() == node_type)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn relationships_of_type(&self, rel_type: &str) -> StorageResult<Vec<Relationship>> {
        let graph = self
            .graph
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        let mut relationships: Vec<Relationship> = graph
            .relationships
            .values()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect();
        relationships.sort_by_key(|r| r.id);
        Ok(relationships)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitReceipt> {
        let mut graph = self
            .graph
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        let receipt = graph.apply(batch)?;
        tracing::debug!(
            "Memory store committed: +{} nodes, +{} relationships, -{} relationships",
            receipt.nodes_created,
            receipt.relationships_created,
            receipt.relationships_deleted
        );
        Ok(receipt)
    }
}
