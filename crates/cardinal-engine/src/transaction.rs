//! Transaction context
//!
//! A [`TransactionContext`] owns everything staged by one unit of work: the
//! pending [`WriteBatch`], the node versions its decisions were based on, the
//! set of touched entities and the post-commit callbacks. Reads through the
//! context see committed state overlaid with the pending changes.
//!
//! Nothing is ambient. Code that wants to take part in a caller's transaction
//! receives the context explicitly, or a [`Joined`] scope from
//! [`TransactionContext::begin`].

use crate::callback::{BoxError, CallbackError, CallbackRegistry, EntityRef};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::materializer::{Materializer, RelateIntent};
use cardinal_core::{
    Endpoint, Node, NodeId, Properties, Relationship, RelationshipId, Schema,
};
use cardinal_storage::{CommitReceipt, GraphStore, Mutation, WriteBatch};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Transaction identifier, unique per [`Engine`](crate::Engine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Lifecycle of a transaction.
///
/// `Open -> Committing -> Committed`, or `RolledBack` from either of the
/// first two. Both terminal states reject further operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Open,
    Committing,
    Committed,
    RolledBack,
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Committing => f.write_str("committing"),
            Self::Committed => f.write_str("committed"),
            Self::RolledBack => f.write_str("rolled back"),
        }
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub tx_id: TxId,
    pub receipt: CommitReceipt,
    /// Entities created or changed, in id order
    pub touched: Vec<EntityRef>,
    /// Commit attempts, 1 unless a write conflict forced a re-resolution
    pub attempts: u32,
    pub callbacks_run: usize,
    pub callback_failures: Vec<CallbackError>,
}

impl CommitOutcome {
    /// True when every callback succeeded
    pub fn is_clean(&self) -> bool {
        self.callback_failures.is_empty()
    }

    /// Surface the first callback failure as an error
    pub fn into_result(self) -> Result<Self> {
        match self.callback_failures.first() {
            Some(failure) => Err(Error::Callback(failure.clone())),
            None => Ok(self),
        }
    }
}

/// Operation recorded so a conflicting commit can be recomputed
#[derive(Debug, Clone)]
pub(crate) enum Intent {
    CreateNode(Node),
    Relate(RelateIntent),
    DeleteRelationship(RelationshipId),
}

/// Staged changes and the overlay reads are served from
#[derive(Debug, Default)]
struct Pending {
    batch: WriteBatch,
    nodes: HashMap<NodeId, Node>,
    created: Vec<Relationship>,
    deleted: HashSet<RelationshipId>,
    touched: BTreeSet<EntityRef>,
}

/// A unit of work against the graph
pub struct TransactionContext<S: GraphStore> {
    id: TxId,
    store: Arc<S>,
    schema: Arc<Schema>,
    config: EngineConfig,
    state: TxState,
    pending: Pending,
    intents: Vec<Intent>,
    callbacks: CallbackRegistry,
}

impl<S: GraphStore> TransactionContext<S> {
    pub(crate) fn new(id: TxId, store: Arc<S>, schema: Arc<Schema>, config: EngineConfig) -> Self {
        tracing::debug!("Transaction {} opened", id);
        Self {
            id,
            store,
            schema,
            config,
            state: TxState::Open,
            pending: Pending::default(),
            intents: Vec::new(),
            callbacks: CallbackRegistry::new(),
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of staged mutations
    pub fn pending_mutations(&self) -> usize {
        self.pending.batch.len()
    }

    /// Entities created or changed so far
    pub fn touched(&self) -> impl Iterator<Item = &EntityRef> {
        self.pending.touched.iter()
    }

    /// Whether this transaction has created or changed `entity`
    pub fn has_touched(&self, entity: &EntityRef) -> bool {
        self.pending.touched.contains(entity)
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Join this transaction from a nested scope.
    ///
    /// The returned scope shares this transaction: its `commit` defers to the
    /// outer commit and its `rollback` rolls the outer transaction back.
    pub fn begin(&mut self) -> Result<Joined<'_, S>> {
        self.ensure_open()?;
        tracing::trace!("Nested scope joined transaction {}", self.id);
        Ok(Joined { outer: self })
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.state == TxState::Open {
            Ok(())
        } else {
            Err(Error::TransactionClosed {
                id: self.id,
                state: self.state,
            })
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a node, including nodes staged by this transaction
    pub async fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        self.ensure_open()?;
        if let Some(node) = self.pending.nodes.get(id) {
            return Ok(Some(node.clone()));
        }
        Ok(self.store.get_node(id).await?)
    }

    /// Get a relationship as this transaction sees it
    pub async fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>> {
        self.ensure_open()?;
        if self.pending.deleted.contains(id) {
            return Ok(None);
        }
        if let Some(rel) = self.pending.created.iter().find(|r| r.id == *id) {
            return Ok(Some(rel.clone()));
        }
        Ok(self.store.get_relationship(id).await?)
    }

    /// Relationships of `rel_type` incident to `endpoint`, as this
    /// transaction sees them: committed rows minus pending deletes plus
    /// pending creates.
    pub async fn relationships(
        &self,
        rel_type: &str,
        endpoint: &Endpoint,
    ) -> Result<Vec<Relationship>> {
        self.ensure_open()?;
        self.overlay_relationships(rel_type, endpoint).await
    }

    /// Overlay read without the state check, also used while re-resolving
    /// during commit
    pub(crate) async fn overlay_relationships(
        &self,
        rel_type: &str,
        endpoint: &Endpoint,
    ) -> Result<Vec<Relationship>> {
        let mut rels: Vec<Relationship> = self
            .store
            .find_relationships(rel_type, endpoint)
            .await?
            .into_iter()
            .filter(|r| !self.pending.deleted.contains(&r.id))
            .collect();
        rels.extend(
            self.pending
                .created
                .iter()
                .filter(|r| r.rel_type == rel_type && endpoint.matches(r))
                .cloned(),
        );
        Ok(rels)
    }

    /// Read a node and record its version as a precondition of the commit
    pub(crate) async fn observe_node(&mut self, id: &NodeId) -> Result<Option<Node>> {
        if let Some(node) = self.pending.nodes.get(id) {
            return Ok(Some(node.clone()));
        }
        let node = self.store.get_node(id).await?;
        if let Some(node) = &node {
            self.pending.batch.expect_version(node.id, node.version);
        }
        Ok(node)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Stage a new node of a declared node type
    pub async fn create_node(&mut self, node_type: &str, properties: Properties) -> Result<Node> {
        self.ensure_open()?;
        let node = self.schema.node_type(node_type)?.instantiate(properties)?;
        self.stage(vec![Mutation::CreateNode(node.clone())]);
        self.touch(EntityRef::Node(node.id));
        self.intents.push(Intent::CreateNode(node.clone()));
        tracing::debug!("Transaction {} staged {} node {}", self.id, node_type, node.id);
        Ok(node)
    }

    /// Create a relationship, replacing whatever its type's cardinality
    /// forbids. See [`Materializer::create_or_replace`].
    pub async fn create_or_replace(
        &mut self,
        rel_type: &str,
        source: NodeId,
        target: NodeId,
        properties: Properties,
    ) -> Result<Relationship> {
        Materializer::create_or_replace(self, rel_type, source, target, properties).await
    }

    /// Stage the deletion of a relationship. Returns false if it does not
    /// exist as far as this transaction can see.
    pub async fn delete_relationship(&mut self, id: RelationshipId) -> Result<bool> {
        self.ensure_open()?;
        let deleted = self.stage_delete(id).await?;
        if deleted {
            self.intents.push(Intent::DeleteRelationship(id));
        }
        Ok(deleted)
    }

    async fn stage_delete(&mut self, id: RelationshipId) -> Result<bool> {
        if self.pending.created.iter().any(|r| r.id == id) {
            self.stage(vec![Mutation::DeleteRelationship(id)]);
            return Ok(true);
        }
        if self.pending.deleted.contains(&id) {
            return Ok(false);
        }
        let Some(rel) = self.store.get_relationship(&id).await? else {
            return Ok(false);
        };
        self.observe_node(&rel.source).await?;
        self.observe_node(&rel.target).await?;
        self.stage(vec![Mutation::DeleteRelationship(id)]);
        self.touch(EntityRef::Node(rel.source));
        self.touch(EntityRef::Node(rel.target));
        Ok(true)
    }

    /// Append mutations to the batch and the read overlay.
    ///
    /// Deleting a relationship created earlier in the same transaction
    /// cancels the creation instead of queueing a delete, and drops the
    /// callbacks registered against it.
    pub(crate) fn stage(&mut self, mutations: Vec<Mutation>) {
        for mutation in mutations {
            match mutation {
                Mutation::CreateNode(node) => {
                    self.pending.nodes.insert(node.id, node.clone());
                    self.pending.batch.push(Mutation::CreateNode(node));
                }
                Mutation::CreateRelationship(rel) => {
                    self.pending.created.push(rel.clone());
                    self.pending.batch.push(Mutation::CreateRelationship(rel));
                }
                Mutation::DeleteRelationship(id) => {
                    if let Some(pos) = self.pending.created.iter().position(|r| r.id == id) {
                        self.pending.created.remove(pos);
                        self.pending.batch.mutations.retain(
                            |m| !matches!(m, Mutation::CreateRelationship(r) if r.id == id),
                        );
                        let entity = EntityRef::Relationship(id);
                        self.pending.touched.remove(&entity);
                        let dropped = self.callbacks.discard(&entity);
                        if dropped > 0 {
                            tracing::debug!(
                                "Transaction {} dropped {} callback(s) of cancelled {}",
                                self.id,
                                dropped,
                                entity
                            );
                        }
                    } else if self.pending.deleted.insert(id) {
                        self.pending.batch.push(Mutation::DeleteRelationship(id));
                    }
                }
            }
        }
    }

    pub(crate) fn touch(&mut self, entity: EntityRef) {
        self.pending.touched.insert(entity);
    }

    pub(crate) fn record_intent(&mut self, intent: Intent) {
        self.intents.push(intent);
    }

    /// Register work to run after a successful commit.
    ///
    /// Callbacks run in registration order. A failing callback is reported in
    /// [`CommitOutcome::callback_failures`] and does not undo the commit.
    pub fn register_callback<F>(&mut self, entity: impl Into<EntityRef>, action: F) -> Result<()>
    where
        F: FnOnce(&EntityRef) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let entity = entity.into();
        let order = self
            .callbacks
            .register(entity, action)
            .map_err(|e| Error::Validation(e.to_string()))?;
        tracing::trace!(
            "Transaction {} registered callback #{} for {}",
            self.id,
            order,
            entity
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Completion
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply everything staged as one atomic batch, then run callbacks.
    ///
    /// If the store reports that a node this transaction read has changed
    /// since, every recorded operation is resolved again against the new
    /// state and the commit retried, up to the configured bound. Any other
    /// store failure rolls the transaction back and nothing is applied.
    pub async fn commit(&mut self) -> Result<CommitOutcome> {
        self.ensure_open()?;
        self.state = TxState::Committing;

        let max_attempts = self.config.max_conflict_retries.saturating_add(1);
        let mut attempts = 0u32;
        let receipt = loop {
            attempts += 1;
            if self.pending.batch.is_empty() {
                break CommitReceipt::default();
            }
            match self.store.commit(self.pending.batch.clone()).await {
                Ok(receipt) => break receipt,
                Err(e) if e.is_conflict() && attempts < max_attempts => {
                    tracing::warn!(
                        "Transaction {} hit a write conflict (attempt {}/{}): {}",
                        self.id,
                        attempts,
                        max_attempts,
                        e
                    );
                    if let Err(replay_err) = self.replay().await {
                        self.abort();
                        return Err(replay_err);
                    }
                }
                Err(e) if e.is_conflict() => {
                    tracing::warn!(
                        "Transaction {} gave up after {} conflicting attempts",
                        self.id,
                        attempts
                    );
                    self.abort();
                    return Err(Error::ConcurrentModification { attempts });
                }
                Err(e) => {
                    tracing::error!("Transaction {} failed to commit: {}", self.id, e);
                    self.abort();
                    return Err(Error::Store(e));
                }
            }
        };

        self.state = TxState::Committed;
        let touched: Vec<EntityRef> = std::mem::take(&mut self.pending.touched)
            .into_iter()
            .collect();
        self.pending = Pending::default();
        self.intents.clear();

        let entries = self.callbacks.drain();
        let callbacks_run = entries.len();
        let mut callback_failures = Vec::new();
        for entry in entries {
            if let Err(e) = entry.run() {
                tracing::warn!("Transaction {}: {}", self.id, e);
                callback_failures.push(e);
            }
        }

        tracing::info!(
            "Transaction {} committed: +{} nodes, +{} relationships, -{} relationships",
            self.id,
            receipt.nodes_created,
            receipt.relationships_created,
            receipt.relationships_deleted
        );

        Ok(CommitOutcome {
            tx_id: self.id,
            receipt,
            touched,
            attempts,
            callbacks_run,
            callback_failures,
        })
    }

    /// Discard everything staged. Callbacks are dropped without running.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.abort();
        tracing::debug!("Transaction {} rolled back", self.id);
        Ok(())
    }

    fn abort(&mut self) {
        self.state = TxState::RolledBack;
        self.pending = Pending::default();
        self.intents.clear();
        self.callbacks.clear();
    }

    /// Recompute the batch from the recorded intents against fresh state.
    /// Pre-assigned ids are reused so callbacks stay attached.
    async fn replay(&mut self) -> Result<()> {
        let intents = std::mem::take(&mut self.intents);
        self.pending = Pending::default();
        for intent in &intents {
            match intent {
                Intent::CreateNode(node) => {
                    self.stage(vec![Mutation::CreateNode(node.clone())]);
                    self.touch(EntityRef::Node(node.id));
                }
                Intent::Relate(relate) => {
                    Materializer::apply(self, relate).await?;
                }
                Intent::DeleteRelationship(id) => {
                    self.stage_delete(*id).await?;
                }
            }
        }
        self.intents = intents;
        tracing::debug!(
            "Transaction {} re-resolved {} operation(s) into {} mutation(s)",
            self.id,
            self.intents.len(),
            self.pending.batch.len()
        );
        Ok(())
    }
}

impl<S: GraphStore> Drop for TransactionContext<S> {
    fn drop(&mut self) {
        if matches!(self.state, TxState::Open | TxState::Committing) {
            tracing::warn!(
                "Transaction {} dropped while {}, rolling back",
                self.id,
                self.state
            );
            self.abort();
        }
    }
}

impl<S: GraphStore> std::fmt::Debug for TransactionContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending_mutations", &self.pending.batch.len())
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

/// A nested scope participating in an outer transaction.
///
/// Dereferences to the outer [`TransactionContext`], so every operation
/// lands in the outer batch.
pub struct Joined<'a, S: GraphStore> {
    outer: &'a mut TransactionContext<S>,
}

impl<'a, S: GraphStore> Joined<'a, S> {
    /// End the nested scope. The outer transaction decides the outcome.
    pub fn commit(self) -> Result<()> {
        self.outer.ensure_open()?;
        tracing::trace!("Nested scope of transaction {} completed", self.outer.id);
        Ok(())
    }

    /// Roll back the outer transaction
    pub fn rollback(self) -> Result<()> {
        self.outer.rollback()
    }
}

impl<'a, S: GraphStore> Deref for Joined<'a, S> {
    type Target = TransactionContext<S>;

    fn deref(&self) -> &Self::Target {
        self.outer
    }
}

impl<'a, S: GraphStore> DerefMut for Joined<'a, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.outer
    }
}

