//! Post-commit callbacks
//!
//! Work that must only happen once the graph change is durable (opening an
//! upload slot, notifying a client) is registered against the transaction and
//! run after the store accepts the batch. A rolled back transaction discards
//! its callbacks without running them.

use cardinal_core::limits::{ValidationError, MAX_CALLBACKS_PER_TRANSACTION};
use cardinal_core::{NodeId, RelationshipId};
use serde::Serialize;
use thiserror::Error;

/// Error type callback actions may return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Deferred action run after commit
pub type CallbackAction = Box<dyn FnOnce(&EntityRef) -> Result<(), BoxError> + Send + Sync>;

/// Reference to an entity touched by a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityRef {
    Node(NodeId),
    Relationship(RelationshipId),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node {}", id),
            Self::Relationship(id) => write!(f, "relationship {}", id),
        }
    }
}

impl From<NodeId> for EntityRef {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<RelationshipId> for EntityRef {
    fn from(id: RelationshipId) -> Self {
        Self::Relationship(id)
    }
}

/// A failed post-commit callback. The commit itself stands.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Callback #{order} for {entity} failed: {message}")]
pub struct CallbackError {
    pub entity: EntityRef,
    pub order: usize,
    pub message: String,
}

/// A registered callback
pub struct CallbackEntry {
    pub entity: EntityRef,
    pub order: usize,
    pub action: CallbackAction,
}

impl CallbackEntry {
    /// Run the action, converting its failure into a [`CallbackError`]
    pub fn run(self) -> Result<(), CallbackError> {
        let Self {
            entity,
            order,
            action,
        } = self;
        action(&entity).map_err(|e| CallbackError {
            entity,
            order,
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("entity", &self.entity)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Per-transaction callback list, kept in registration order
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    entries: Vec<CallbackEntry>,
    next_order: usize,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. Returns its registration order.
    pub fn register<F>(&mut self, entity: EntityRef, action: F) -> Result<usize, ValidationError>
    where
        F: FnOnce(&EntityRef) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        if self.entries.len() >= MAX_CALLBACKS_PER_TRANSACTION {
            return Err(ValidationError::TooManyCallbacks {
                max: MAX_CALLBACKS_PER_TRANSACTION,
            });
        }
        let order = self.next_order;
        self.next_order += 1;
        self.entries.push(CallbackEntry {
            entity,
            order,
            action: Box::new(action),
        });
        Ok(order)
    }

    /// Take every callback, leaving the registry empty
    pub fn drain(&mut self) -> Vec<CallbackEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Drop the callbacks registered against `entity`. Returns how many.
    pub fn discard(&mut self, entity: &EntityRef) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.entity != *entity);
        before - self.entries.len()
    }

    /// Drop every callback without running it
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
