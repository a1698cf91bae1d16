//! Node types and operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use ulid::Ulid;

/// Property mapping carried by nodes and relationships
pub type Properties = HashMap<String, serde_json::Value>;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Ulid);

impl NodeId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

/// Node type tag
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeType(pub String);

impl NodeType {
    /// Wildcard accepted by relationship endpoints that allow any node type
    pub const ANY: &'static str = "*";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,

    /// Type tag
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Capabilities inherited from the node type (e.g. "file")
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,

    /// Arbitrary properties
    #[serde(default)]
    pub properties: Properties,

    /// Store-maintained version, bumped whenever an incident edge changes
    #[serde(default)]
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with a fresh id
    pub fn new(node_type: impl Into<NodeType>) -> Self {
        Self::with_id(NodeId::new(), node_type)
    }

    /// Create a new node with a caller-chosen id
    pub fn with_id(id: NodeId, node_type: impl Into<NodeType>) -> Self {
        let now = Utc::now();
        Self {
            id,
            node_type: node_type.into(),
            capabilities: BTreeSet::new(),
            properties: Properties::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation() {
        let node = Node::new("TestOne")
            .with_capability("file")
            .with_property("name", serde_json::json!("report.pdf"));

        assert_eq!(node.node_type.as_str(), "TestOne");
        assert!(node.has_capability("file"));
        assert!(!node.has_capability("folder"));
        assert_eq!(node.property("name"), Some(&serde_json::json!("report.pdf")));
        assert_eq!(node.version, 0);
    }

    #[test]
    fn test_node_id_parse() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(NodeId::from_string("not-a-ulid").is_err());
    }

    #[test]
    fn test_node_serializes_type_tag() {
        let node = Node::new("TestTwo");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "TestTwo");
        assert!(json.get("capabilities").is_none());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
    }
}
