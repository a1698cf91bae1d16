//! Relationship materialization
//!
//! Creating a relationship is never a plain insert. The relationship type's
//! descriptor says which ends are ONE; before the new edge is staged, every
//! edge it would push over that limit is staged for deletion in the same
//! transaction. Asking for an edge that already exists returns it unchanged.

use crate::callback::EntityRef;
use crate::error::{Error, Result};
use crate::transaction::{Intent, TransactionContext};
use cardinal_core::{
    resolve_replacements, Endpoint, EndpointRole, Node, NodeId, Properties, Relationship,
    RelationshipId, RelationshipTypeDescriptor, Schema,
};
use cardinal_storage::{GraphStore, Mutation};

/// A relationship request, kept so it can be resolved again after a conflict
#[derive(Debug, Clone)]
pub(crate) struct RelateIntent {
    pub id: RelationshipId,
    pub rel_type: String,
    pub source: NodeId,
    pub target: NodeId,
    pub properties: Properties,
}

/// Cardinality-enforcing relationship factory
pub struct Materializer;

impl Materializer {
    /// Create a `rel_type` relationship from `source` to `target`, deleting
    /// whatever existing relationships of the same type its cardinality
    /// forbids.
    ///
    /// - unknown `rel_type`: [`Error::UnknownType`], nothing staged
    /// - missing endpoint: auto-created when the type allows it, otherwise
    ///   [`Error::EndpointNotFound`]
    /// - an identical relationship already exists: it is returned and no
    ///   new one is staged
    ///
    /// Either every deletion plus the creation is staged, or nothing is.
    pub async fn create_or_replace<S: GraphStore>(
        tx: &mut TransactionContext<S>,
        rel_type: &str,
        source: NodeId,
        target: NodeId,
        properties: Properties,
    ) -> Result<Relationship> {
        tx.ensure_open()?;
        let intent = RelateIntent {
            id: RelationshipId::new(),
            rel_type: rel_type.to_string(),
            source,
            target,
            properties,
        };
        let relationship = Self::apply(tx, &intent).await?;
        tx.record_intent(Intent::Relate(intent));
        Ok(relationship)
    }

    pub(crate) async fn apply<S: GraphStore>(
        tx: &mut TransactionContext<S>,
        intent: &RelateIntent,
    ) -> Result<Relationship> {
        let schema = tx.schema().clone();
        let descriptor = schema.describe(&intent.rel_type)?;
        descriptor.validate_properties(&intent.properties)?;

        let mut mutations = Vec::new();
        let source = Self::endpoint(
            tx,
            &schema,
            descriptor,
            EndpointRole::Source,
            intent.source,
            &mut mutations,
        )
        .await?;
        let target = Self::endpoint(
            tx,
            &schema,
            descriptor,
            EndpointRole::Target,
            intent.target,
            &mut mutations,
        )
        .await?;

        let outgoing = if descriptor.is_constrained(EndpointRole::Source) {
            tx.overlay_relationships(&descriptor.name, &Endpoint::source(source.id)).await?
        } else {
            Vec::new()
        };
        let incoming = if descriptor.is_constrained(EndpointRole::Target) {
            tx.overlay_relationships(&descriptor.name, &Endpoint::target(target.id)).await?
        } else {
            Vec::new()
        };

        let resolution =
            resolve_replacements(descriptor, &source.id, &target.id, &outgoing, &incoming);

        // the far ends of replaced edges change too
        for id in &resolution.replacements {
            if let Some(rel) = outgoing.iter().chain(incoming.iter()).find(|r| r.id == *id) {
                for node in [rel.source, rel.target] {
                    tx.observe_node(&node).await?;
                }
            }
        }

        let existing = resolution.existing.and_then(|id| {
            outgoing
                .iter()
                .chain(incoming.iter())
                .find(|r| r.id == id)
                .cloned()
        });

        let mut touched = Vec::with_capacity(resolution.replacements.len() + 3);
        for id in &resolution.replacements {
            mutations.push(Mutation::DeleteRelationship(*id));
            if let Some(rel) = outgoing.iter().chain(incoming.iter()).find(|r| r.id == *id) {
                touched.push(EntityRef::Node(rel.source));
                touched.push(EntityRef::Node(rel.target));
            }
        }

        let relationship = match existing {
            Some(rel) => {
                if resolution.is_noop() {
                    tracing::debug!(
                        "{} {} -> {} already exists as {}",
                        descriptor.name,
                        source.id,
                        target.id,
                        rel.id
                    );
                }
                rel
            }
            None => {
                let rel = Relationship::with_id(intent.id, &descriptor.name, source.id, target.id)
                    .with_properties(intent.properties.clone());
                mutations.push(Mutation::CreateRelationship(rel.clone()));
                touched.push(EntityRef::Relationship(rel.id));
                touched.push(EntityRef::Node(source.id));
                touched.push(EntityRef::Node(target.id));
                rel
            }
        };

        if !mutations.is_empty() {
            tracing::debug!(
                "Transaction {} staged {} {} -> {} ({} replaced)",
                tx.id(),
                descriptor.name,
                source.id,
                target.id,
                resolution.replacements.len()
            );
        }
        tx.stage(mutations);
        for entity in touched {
            tx.touch(entity);
        }

        Ok(relationship)
    }

    /// Resolve one end of the requested relationship.
    ///
    /// A node auto-created for the source is pushed onto `mutations` and
    /// reused if the target names the same id.
    async fn endpoint<S: GraphStore>(
        tx: &mut TransactionContext<S>,
        schema: &Schema,
        descriptor: &RelationshipTypeDescriptor,
        role: EndpointRole,
        id: NodeId,
        mutations: &mut Vec<Mutation>,
    ) -> Result<Node> {
        let staged = mutations.iter().find_map(|m| match m {
            Mutation::CreateNode(node) if node.id == id => Some(node.clone()),
            _ => None,
        });
        let node = match staged {
            Some(node) => node,
            None => match tx.observe_node(&id).await? {
                Some(node) => node,
                None if descriptor.auto_create => {
                    let node = bare_node(schema, id, descriptor, role);
                    tracing::debug!(
                        "Auto-creating {} node {} for {}",
                        node.node_type,
                        id,
                        descriptor.name
                    );
                    mutations.push(Mutation::CreateNode(node.clone()));
                    node
                }
                None => return Err(Error::EndpointNotFound { role, id }),
            },
        };

        if !descriptor.accepts(role, &node) {
            return Err(Error::EndpointTypeMismatch {
                role,
                id,
                expected: descriptor.endpoint_type(role).to_string(),
                actual: node.node_type.to_string(),
            });
        }
        Ok(node)
    }
}

/// Node an auto-created endpoint starts as: the descriptor's endpoint type
/// with that type's capabilities and no properties
fn bare_node(
    schema: &Schema,
    id: NodeId,
    descriptor: &RelationshipTypeDescriptor,
    role: EndpointRole,
) -> Node {
    let node_type = descriptor.endpoint_type(role);
    let mut node = Node::with_id(id, node_type.clone());
    if let Ok(node_descriptor) = schema.node_type(node_type.as_str()) {
        node.capabilities = node_descriptor.capabilities.clone();
    }
    node
}
