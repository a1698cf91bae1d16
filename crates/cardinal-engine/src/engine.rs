//! Engine entry point

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::transaction::{TransactionContext, TxId};
use cardinal_core::{Node, NodeId, Relationship, RelationshipId, Schema};
use cardinal_storage::GraphStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hands out transactions over one store and one schema
pub struct Engine<S: GraphStore> {
    store: Arc<S>,
    schema: Arc<Schema>,
    config: EngineConfig,
    next_tx: AtomicU64,
}

impl<S: GraphStore> Engine<S> {
    pub fn new(store: Arc<S>, schema: Arc<Schema>) -> Self {
        Self::with_config(store, schema, EngineConfig::default())
    }

    pub fn with_config(store: Arc<S>, schema: Arc<Schema>, config: EngineConfig) -> Self {
        tracing::debug!(
            "Engine ready: {} node type(s), {} relationship type(s)",
            schema.node_types().len(),
            schema.relationship_types().len()
        );
        Self {
            store,
            schema,
            config,
            next_tx: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a new top-level transaction
    pub fn begin(&self) -> TransactionContext<S> {
        let id = TxId(self.next_tx.fetch_add(1, Ordering::Relaxed));
        TransactionContext::new(
            id,
            self.store.clone(),
            self.schema.clone(),
            self.config.clone(),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Committed reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(self.store.get_node(id).await?)
    }

    pub async fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>> {
        Ok(self.store.get_relationship(id).await?)
    }

    /// All committed nodes of a declared node type
    pub async fn nodes_of_type(&self, node_type: &str) -> Result<Vec<Node>> {
        if !self.schema.is_node_type(node_type) {
            return Err(Error::UnknownType(node_type.to_string()));
        }
        Ok(self.store.nodes_of_type(node_type).await?)
    }

    /// All committed relationships of a declared relationship type
    pub async fn relationships_of_type(&self, rel_type: &str) -> Result<Vec<Relationship>> {
        self.schema.describe(rel_type)?;
        Ok(self.store.relationships_of_type(rel_type).await?)
    }
}
