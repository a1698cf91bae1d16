//! Graph store adapter trait

use crate::batch::{CommitReceipt, WriteBatch};
use crate::error::StorageResult;
use async_trait::async_trait;
use cardinal_core::{Endpoint, Node, NodeId, Relationship, RelationshipId};

/// Capability interface of the underlying graph store.
///
/// Reads return committed state (read-committed). Writes only happen through
/// [`GraphStore::commit`], which applies a whole [`WriteBatch`] atomically and
/// rejects it with [`StorageError::Conflict`](crate::StorageError::Conflict)
/// when any expected node version has moved.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn initialize(&self) -> StorageResult<()>;

    /// Health check
    async fn health_check(&self) -> StorageResult<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Point Lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a node by id
    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    /// Get a relationship by id
    async fn get_relationship(&self, id: &RelationshipId) -> StorageResult<Option<Relationship>>;

    /// Relationships of `rel_type` incident to `endpoint` on its role's side
    async fn find_relationships(
        &self,
        rel_type: &str,
        endpoint: &Endpoint,
    ) -> StorageResult<Vec<Relationship>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Typed Listings
    // ─────────────────────────────────────────────────────────────────────────

    /// All nodes of a type
    async fn nodes_of_type(&self, node_type: &str) -> StorageResult<Vec<Node>>;

    /// All relationships of a type
    async fn relationships_of_type(&self, rel_type: &str) -> StorageResult<Vec<Relationship>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a batch atomically.
    ///
    /// Every node whose incident relationships change, and every created
    /// node, has its version bumped.
    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitReceipt>;
}
