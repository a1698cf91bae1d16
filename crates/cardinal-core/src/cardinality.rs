//! Cardinality resolution
//!
//! Given a relationship type and a requested `(source, target)` pair, decide
//! which existing relationships must go so that the type's ONE sides still
//! hold after the new edge is added.

use crate::node::NodeId;
use crate::relationship::{EndpointRole, Relationship, RelationshipId};
use crate::schema::RelationshipTypeDescriptor;
use std::collections::BTreeSet;

/// Outcome of resolving a requested relationship against existing edges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Existing relationship that already satisfies the request, if any
    pub existing: Option<RelationshipId>,

    /// Relationships that must be deleted
    pub replacements: BTreeSet<RelationshipId>,
}

impl Resolution {
    /// True when the request is already satisfied and nothing needs to change
    pub fn is_noop(&self) -> bool {
        self.existing.is_some() && self.replacements.is_empty()
    }

    /// True when a new relationship has to be created
    pub fn requires_create(&self) -> bool {
        self.existing.is_none()
    }
}

/// Compute the replacement set for a requested relationship.
///
/// `outgoing` holds the existing relationships of this type whose source is
/// `source` and `incoming` those whose target is `target`. Only the sides the
/// descriptor constrains to ONE are consulted; callers may pass an empty
/// slice for an unconstrained side.
///
/// On each constrained side every relationship is marked for deletion except
/// the ones already connecting `source` to `target`. Of those exact matches
/// the oldest is kept and reported as [`Resolution::existing`] when every
/// constrained side agrees on it; duplicate exact matches are deleted as
/// well. Rows not incident to the queried endpoint are ignored.
pub fn resolve_replacements(
    descriptor: &RelationshipTypeDescriptor,
    source: &NodeId,
    target: &NodeId,
    outgoing: &[Relationship],
    incoming: &[Relationship],
) -> Resolution {
    let mut replacements = BTreeSet::new();
    let mut kept_per_side: Vec<Option<RelationshipId>> = Vec::with_capacity(2);

    for (role, node, existing) in [
        (EndpointRole::Source, source, outgoing),
        (EndpointRole::Target, target, incoming),
    ] {
        if !descriptor.is_constrained(role) {
            continue;
        }

        let mut exact: Vec<&Relationship> = Vec::new();
        for rel in existing {
            if rel.rel_type != descriptor.name || rel.endpoint(role) != *node {
                continue;
            }
            if rel.connects(source, target) {
                exact.push(rel);
            } else {
                replacements.insert(rel.id);
            }
        }

        exact.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        let mut exact = exact.into_iter();
        let kept = exact.next().map(|rel| rel.id);
        replacements.extend(exact.map(|rel| rel.id));
        kept_per_side.push(kept);
    }

    let existing = match kept_per_side.split_first() {
        Some((Some(first), rest)) if rest.iter().all(|k| k.as_ref() == Some(first)) => {
            Some(*first)
        }
        _ => None,
    };

    match existing {
        Some(id) => {
            replacements.remove(&id);
        }
        None => {
            // no agreed survivor: every exact match goes too
            for kept in kept_per_side.into_iter().flatten() {
                replacements.insert(kept);
            }
        }
    }

    if !replacements.is_empty() {
        tracing::debug!(
            "Resolved {} replacement(s) for {} -[{}]-> {}",
            replacements.len(),
            source,
            descriptor.name,
            target
        );
    }

    Resolution {
        existing,
        replacements,
    }
}
