//! Cardinal Engine - Cardinality enforcement inside transactions
//!
//! A [`TransactionContext`] stages node and relationship changes against a
//! [`GraphStore`](cardinal_storage::GraphStore), enforcing each relationship
//! type's ONE sides through the [`Materializer`], and commits them as one
//! atomic batch. Callbacks registered during the transaction run after a
//! successful commit, in registration order.

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod materializer;
pub mod transaction;

pub use callback::{BoxError, CallbackEntry, CallbackError, CallbackRegistry, EntityRef};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use materializer::Materializer;
pub use transaction::{CommitOutcome, Joined, TransactionContext, TxId, TxState};
