//! Schema of declared node and relationship types
//!
//! A [`Schema`] is built once, at startup, either programmatically through
//! [`SchemaBuilder`] or from a TOML document, and is immutable afterwards.
//! It is shared between transactions behind an `Arc` without locking.
//!
//! ```toml
//! [[node]]
//! name = "File"
//! capabilities = ["file"]
//!
//! [node.properties]
//! size = "integer"
//!
//! [[relationship]]
//! name = "FolderFileOneToMany"
//! source = "Folder"
//! target = "File"
//! cardinality = "one-to-many"
//! ```

use crate::error::{Error, Result};
use crate::limits::{
    validate_capability_count, validate_property_count, validate_property_key, validate_type_name,
};
use crate::node::{Node, NodeType, Properties};
use crate::relationship::EndpointRole;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// How many relationships of one type a node may have on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    One,
    Many,
}

/// Named pair of (source, target) multiplicities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    pub fn from_multiplicities(source: Multiplicity, target: Multiplicity) -> Self {
        match (source, target) {
            (Multiplicity::One, Multiplicity::One) => Self::OneToOne,
            (Multiplicity::Many, Multiplicity::One) => Self::OneToMany,
            (Multiplicity::One, Multiplicity::Many) => Self::ManyToOne,
            (Multiplicity::Many, Multiplicity::Many) => Self::ManyToMany,
        }
    }

    /// (source, target) multiplicities.
    ///
    /// A multiplicity limits how many edges of the type each node on that
    /// side may have. `one-to-many` reads "one source owns many targets", so
    /// every target has at most one incoming edge; `many-to-one` gives every
    /// source at most one outgoing edge.
    pub fn multiplicities(self) -> (Multiplicity, Multiplicity) {
        match self {
            Self::OneToOne => (Multiplicity::One, Multiplicity::One),
            Self::OneToMany => (Multiplicity::Many, Multiplicity::One),
            Self::ManyToOne => (Multiplicity::One, Multiplicity::Many),
            Self::ManyToMany => (Multiplicity::Many, Multiplicity::Many),
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        };
        f.write_str(s)
    }
}

/// Declared kind of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    Boolean,
    Any,
}

impl PropertyKind {
    /// Check a value against this kind. `null` clears a property and is always accepted.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

fn validate_properties(declared: &BTreeMap<String, PropertyKind>, props: &Properties) -> Result<()> {
    validate_property_count(props.len())?;
    for (key, value) in props {
        validate_property_key(key)?;
        if let Some(kind) = declared.get(key) {
            if !kind.accepts(value) {
                return Err(Error::InvalidProperty {
                    key: key.clone(),
                    reason: format!("expected {}, got {}", kind, value),
                });
            }
        }
    }
    Ok(())
}

/// Static description of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDescriptor {
    pub name: NodeType,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyKind>,
}

impl NodeTypeDescriptor {
    pub fn new(name: impl Into<NodeType>) -> Self {
        Self {
            name: name.into(),
            capabilities: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.insert(key.into(), kind);
        self
    }

    pub fn validate_properties(&self, props: &Properties) -> Result<()> {
        validate_properties(&self.properties, props)
    }

    /// Build a fresh node of this type carrying the type's capabilities
    pub fn instantiate(&self, properties: Properties) -> Result<Node> {
        self.validate_properties(&properties)?;
        let mut node = Node::new(self.name.clone());
        node.capabilities = self.capabilities.clone();
        node.properties = properties;
        Ok(node)
    }
}

/// Static description of a relationship type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipTypeDescriptor {
    pub name: String,
    pub source_type: NodeType,
    pub target_type: NodeType,
    pub source_multiplicity: Multiplicity,
    pub target_multiplicity: Multiplicity,
    #[serde(default)]
    pub auto_create: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyKind>,
}

impl RelationshipTypeDescriptor {
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<NodeType>,
        target_type: impl Into<NodeType>,
        cardinality: Cardinality,
    ) -> Self {
        let (source_multiplicity, target_multiplicity) = cardinality.multiplicities();
        Self {
            name: name.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
            source_multiplicity,
            target_multiplicity,
            auto_create: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.insert(key.into(), kind);
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        Cardinality::from_multiplicities(self.source_multiplicity, self.target_multiplicity)
    }

    pub fn multiplicity(&self, role: EndpointRole) -> Multiplicity {
        match role {
            EndpointRole::Source => self.source_multiplicity,
            EndpointRole::Target => self.target_multiplicity,
        }
    }

    /// True if at most one relationship of this type may touch a node on `role`
    pub fn is_constrained(&self, role: EndpointRole) -> bool {
        self.multiplicity(role) == Multiplicity::One
    }

    pub fn endpoint_type(&self, role: EndpointRole) -> &NodeType {
        match role {
            EndpointRole::Source => &self.source_type,
            EndpointRole::Target => &self.target_type,
        }
    }

    /// Check whether `node` may sit on the `role` end of this relationship type
    pub fn accepts(&self, role: EndpointRole, node: &Node) -> bool {
        let expected = self.endpoint_type(role);
        expected.is_any() || *expected == node.node_type
    }

    pub fn validate_properties(&self, props: &Properties) -> Result<()> {
        validate_properties(&self.properties, props)
    }
}

/// Registry of node and relationship types
#[derive(Debug, Clone, Default)]
pub struct Schema {
    node_types: HashMap<String, NodeTypeDescriptor>,
    relationship_types: HashMap<String, RelationshipTypeDescriptor>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up a relationship type descriptor
    pub fn describe(&self, type_tag: &str) -> Result<&RelationshipTypeDescriptor> {
        self.relationship_types
            .get(type_tag)
            .ok_or_else(|| Error::UnknownType(type_tag.to_string()))
    }

    /// Look up a node type descriptor
    pub fn node_type(&self, type_tag: &str) -> Result<&NodeTypeDescriptor> {
        self.node_types
            .get(type_tag)
            .ok_or_else(|| Error::UnknownType(type_tag.to_string()))
    }

    pub fn is_relationship_type(&self, type_tag: &str) -> bool {
        self.relationship_types.contains_key(type_tag)
    }

    pub fn is_node_type(&self, type_tag: &str) -> bool {
        self.node_types.contains_key(type_tag)
    }

    /// All relationship types, sorted by name
    pub fn relationship_types(&self) -> Vec<&RelationshipTypeDescriptor> {
        let mut types: Vec<_> = self.relationship_types.values().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    /// All node types, sorted by name
    pub fn node_types(&self) -> Vec<&NodeTypeDescriptor> {
        let mut types: Vec<_> = self.node_types.values().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    /// Parse and validate a schema from TOML
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: SchemaFile = toml::from_str(s)?;
        file.into_builder()?.build()
    }

    /// Load a schema from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let schema = Self::from_toml_str(&content)?;
        tracing::debug!(
            "Loaded schema from {:?}: {} node types, {} relationship types",
            path.as_ref(),
            schema.node_types.len(),
            schema.relationship_types.len()
        );
        Ok(schema)
    }
}

/// Incremental schema construction with validation at `build`
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    node_types: Vec<NodeTypeDescriptor>,
    relationship_types: Vec<RelationshipTypeDescriptor>,
}

impl SchemaBuilder {
    pub fn node(mut self, descriptor: NodeTypeDescriptor) -> Self {
        self.node_types.push(descriptor);
        self
    }

    pub fn relationship(mut self, descriptor: RelationshipTypeDescriptor) -> Self {
        self.relationship_types.push(descriptor);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let mut schema = Schema::default();

        for node in self.node_types {
            validate_type_name(node.name.as_str())?;
            validate_capability_count(node.capabilities.len())?;
            for key in node.properties.keys() {
                validate_property_key(key)?;
            }
            let name = node.name.as_str().to_string();
            if schema.node_types.insert(name.clone(), node).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "node type '{}' declared twice",
                    name
                )));
            }
        }

        for rel in self.relationship_types {
            validate_type_name(&rel.name)?;
            for key in rel.properties.keys() {
                validate_property_key(key)?;
            }
            if schema.node_types.contains_key(&rel.name) {
                return Err(Error::InvalidSchema(format!(
                    "'{}' is declared as both a node type and a relationship type",
                    rel.name
                )));
            }
            for role in [EndpointRole::Source, EndpointRole::Target] {
                let endpoint = rel.endpoint_type(role);
                if !endpoint.is_any() && !schema.node_types.contains_key(endpoint.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "relationship type '{}' references undeclared {} type '{}'",
                        rel.name, role, endpoint
                    )));
                }
            }
            if rel.auto_create
                && (rel.source_type.is_any() || rel.target_type.is_any())
            {
                return Err(Error::InvalidSchema(format!(
                    "relationship type '{}' cannot auto-create endpoints of type '*'",
                    rel.name
                )));
            }
            let name = rel.name.clone();
            if schema.relationship_types.insert(name.clone(), rel).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "relationship type '{}' declared twice",
                    name
                )));
            }
        }

        Ok(schema)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TOML representation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default, rename = "node")]
    nodes: Vec<NodeTypeDescriptor>,
    #[serde(default, rename = "relationship")]
    relationships: Vec<RelationshipTypeDef>,
}

#[derive(Debug, Deserialize)]
struct RelationshipTypeDef {
    name: String,
    source: String,
    target: String,
    cardinality: Option<Cardinality>,
    source_multiplicity: Option<Multiplicity>,
    target_multiplicity: Option<Multiplicity>,
    #[serde(default)]
    auto_create: bool,
    #[serde(default)]
    properties: BTreeMap<String, PropertyKind>,
}

impl RelationshipTypeDef {
    fn into_descriptor(self) -> Result<RelationshipTypeDescriptor> {
        let cardinality = match (self.cardinality, self.source_multiplicity, self.target_multiplicity) {
            (Some(c), None, None) => c,
            (None, Some(s), Some(t)) => Cardinality::from_multiplicities(s, t),
            (Some(c), Some(s), Some(t)) if c == Cardinality::from_multiplicities(s, t) => c,
            (Some(c), _, _) => {
                return Err(Error::InvalidSchema(format!(
                    "relationship type '{}' declares cardinality {} but conflicting multiplicities",
                    self.name, c
                )))
            }
            _ => {
                return Err(Error::InvalidSchema(format!(
                    "relationship type '{}' must declare a cardinality or both multiplicities",
                    self.name
                )))
            }
        };

        let mut descriptor =
            RelationshipTypeDescriptor::new(self.name, self.source, self.target, cardinality)
                .with_auto_create(self.auto_create);
        descriptor.properties = self.properties;
        Ok(descriptor)
    }
}

impl SchemaFile {
    fn into_builder(self) -> Result<SchemaBuilder> {
        let mut builder = SchemaBuilder::default();
        for node in self.nodes {
            builder = builder.node(node);
        }
        for rel in self.relationships {
            builder = builder.relationship(rel.into_descriptor()?);
        }
        Ok(builder)
    }
}
