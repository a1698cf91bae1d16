//! Cardinal Core - Graph types and cardinality rules
//!
//! This crate provides the node and relationship records, the schema of
//! declared node and relationship types, and the cardinality resolver that
//! decides which existing edges a new relationship replaces.

pub mod cardinality;
pub mod error;
pub mod limits;
pub mod node;
pub mod relationship;
pub mod schema;

pub use cardinality::{resolve_replacements, Resolution};
pub use error::{Error, Result};
pub use node::{Node, NodeId, NodeType, Properties};
pub use relationship::{Endpoint, EndpointRole, Relationship, RelationshipId};
pub use schema::{
    Cardinality, Multiplicity, NodeTypeDescriptor, PropertyKind, RelationshipTypeDescriptor,
    Schema, SchemaBuilder,
};
