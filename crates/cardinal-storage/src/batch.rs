//! Write batches committed atomically by a [`GraphStore`](crate::GraphStore)

use crate::error::{StorageError, StorageResult};
use cardinal_core::{Node, NodeId, Relationship, RelationshipId};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// A single staged change
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateNode(Node),
    CreateRelationship(Relationship),
    DeleteRelationship(RelationshipId),
}

/// Ordered mutations plus the node versions they were computed against.
///
/// A store applies the mutations in order, all or nothing, and only if every
/// node in `expected_versions` still has the recorded version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub mutations: Vec<Mutation>,
    pub expected_versions: BTreeMap<NodeId, u64>,
}

/// Summary of an applied batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub nodes_created: usize,
    pub relationships_created: usize,
    pub relationships_deleted: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Record the version a node had when the batch was computed.
    /// The first observation wins.
    pub fn expect_version(&mut self, node: NodeId, version: u64) {
        self.expected_versions.entry(node).or_insert(version);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Walk the mutations against committed state without applying them.
    ///
    /// `node_exists` and `relationship_exists` answer for committed state;
    /// effects of earlier mutations in the batch are simulated here. Returns
    /// the receipt the batch would produce.
    pub fn check<N, R>(&self, mut node_exists: N, mut relationship_exists: R) -> StorageResult<CommitReceipt>
    where
        N: FnMut(&NodeId) -> StorageResult<bool>,
        R: FnMut(&RelationshipId) -> StorageResult<bool>,
    {
        let mut new_nodes: HashSet<NodeId> = HashSet::new();
        let mut new_relationships: HashSet<RelationshipId> = HashSet::new();
        let mut deleted: HashSet<RelationshipId> = HashSet::new();
        let mut receipt = CommitReceipt::default();

        for mutation in &self.mutations {
            match mutation {
                Mutation::CreateNode(node) => {
                    if new_nodes.contains(&node.id) || node_exists(&node.id)? {
                        return Err(StorageError::Integrity(format!(
                            "node {} already exists",
                            node.id
                        )));
                    }
                    new_nodes.insert(node.id);
                    receipt.nodes_created += 1;
                }
                Mutation::CreateRelationship(rel) => {
                    for endpoint in [&rel.source, &rel.target] {
                        if !new_nodes.contains(endpoint) && !node_exists(endpoint)? {
                            return Err(StorageError::Conflict(format!(
                                "endpoint {} of relationship {} no longer exists",
                                endpoint, rel.id
                            )));
                        }
                    }
                    if new_relationships.contains(&rel.id) || relationship_exists(&rel.id)? {
                        return Err(StorageError::Integrity(format!(
                            "relationship {} already exists",
                            rel.id
                        )));
                    }
                    new_relationships.insert(rel.id);
                    receipt.relationships_created += 1;
                }
                Mutation::DeleteRelationship(id) => {
                    let alive = !deleted.contains(id)
                        && (new_relationships.contains(id) || relationship_exists(id)?);
                    if !alive {
                        return Err(StorageError::Conflict(format!(
                            "relationship {} was already deleted",
                            id
                        )));
                    }
                    deleted.insert(*id);
                    receipt.relationships_deleted += 1;
                }
            }
        }

        Ok(receipt)
    }
}
