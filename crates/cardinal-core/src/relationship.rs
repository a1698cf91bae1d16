//! Relationship (edge) types and operations

use crate::node::{NodeId, Properties};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub Ulid);

impl RelationshipId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RelationshipId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

/// Which end of a directed relationship a node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Source,
    Target,
}

impl std::fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// A node seen from one side of a relationship type.
///
/// `Endpoint::source(n)` selects the relationships whose source is `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub role: EndpointRole,
    pub node: NodeId,
}

impl Endpoint {
    pub fn source(node: NodeId) -> Self {
        Self {
            role: EndpointRole::Source,
            node,
        }
    }

    pub fn target(node: NodeId) -> Self {
        Self {
            role: EndpointRole::Target,
            node,
        }
    }

    /// Check whether a relationship is incident to this endpoint
    pub fn matches(&self, relationship: &Relationship) -> bool {
        relationship.endpoint(self.role) == self.node
    }
}

/// A directed, typed relationship between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Unique identifier
    pub id: RelationshipId,

    /// Relationship type tag
    #[serde(rename = "type")]
    pub rel_type: String,

    /// Source node
    #[serde(rename = "sourceId")]
    pub source: NodeId,

    /// Target node
    #[serde(rename = "targetId")]
    pub target: NodeId,

    /// Arbitrary properties
    #[serde(default)]
    pub properties: Properties,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a new relationship with a fresh id
    pub fn new(rel_type: impl Into<String>, source: NodeId, target: NodeId) -> Self {
        Self::with_id(RelationshipId::new(), rel_type, source, target)
    }

    /// Create a new relationship with a caller-chosen id
    pub fn with_id(
        id: RelationshipId,
        rel_type: impl Into<String>,
        source: NodeId,
        target: NodeId,
    ) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            source,
            target,
            properties: Properties::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Node at the given end of this relationship
    pub fn endpoint(&self, role: EndpointRole) -> NodeId {
        match role {
            EndpointRole::Source => self.source,
            EndpointRole::Target => self.target,
        }
    }

    /// True if this relationship connects exactly `source` to `target`
    pub fn connects(&self, source: &NodeId, target: &NodeId) -> bool {
        self.source == *source && self.target == *target
    }
}
