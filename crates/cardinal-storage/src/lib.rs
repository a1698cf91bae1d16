//! Cardinal Storage - Graph store adapters
//!
//! The engine reaches the graph only through the [`GraphStore`] capability:
//! point lookups, edge lookup by type and endpoint, and an atomic commit of
//! a [`WriteBatch`]. This crate provides that trait plus an in-memory and a
//! redb-backed implementation.

#![allow(clippy::result_large_err)]

pub mod batch;
pub mod error;
pub mod migration;
pub mod traits;

#[cfg(feature = "redb")]
pub mod redb;

pub mod memory;

pub use batch::{CommitReceipt, Mutation, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use migration::{LayoutStep, LAYOUT_VERSION};
pub use traits::GraphStore;

#[cfg(feature = "redb")]
pub use redb::RedbStore;

pub use memory::MemoryStore;
