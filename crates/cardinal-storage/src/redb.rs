//! ReDB graph store

use crate::batch::{CommitReceipt, Mutation, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::migration::{camel_case_timestamps, plan, LayoutStep};
use crate::traits::GraphStore;
use async_trait::async_trait;
use cardinal_core::{Endpoint, EndpointRole, Node, NodeId, Relationship, RelationshipId};
use redb::{Database, ReadableTable, Table, TableDefinition, WriteTransaction};
use std::path::Path;

// Table definitions
const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
const RELATIONSHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("relationships");
/// `type:source:relationship` -> relationship id
const OUTGOING: TableDefinition<&str, &str> = TableDefinition::new("outgoing");
/// `type:target:relationship` -> relationship id
const INCOMING: TableDefinition<&str, &str> = TableDefinition::new("incoming");
/// `type:node` -> node id
const NODE_TYPES: TableDefinition<&str, &str> = TableDefinition::new("node_types");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Meta key holding the layout version
const LAYOUT_VERSION_KEY: &str = "schema_version";

/// ReDB graph store
///
/// redb serializes write transactions, so a batch is checked and applied
/// inside one write transaction and either commits whole or aborts.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a ReDB database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db };
        store.upgrade()?;
        Ok(store)
    }

    fn adjacency_prefix(rel_type: &str, node: &NodeId) -> String {
        format!("{}:{}:", rel_type, node)
    }

    fn adjacency_key(rel_type: &str, node: &NodeId, rel: &RelationshipId) -> String {
        format!("{}:{}:{}", rel_type, node, rel)
    }

    fn node_type_key(node: &Node) -> String {
        format!("{}:{}", node.node_type, node.id)
    }

    fn read_node(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        id: &NodeId,
    ) -> StorageResult<Option<Node>> {
        match table.get(id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn read_relationship(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        id: &str,
    ) -> StorageResult<Option<Relationship>> {
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Collect index values whose keys start with `prefix`
    fn scan_prefix(
        table: &impl ReadableTable<&'static str, &'static str>,
        prefix: &str,
    ) -> StorageResult<Vec<String>> {
        let mut values = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix) {
                break;
            }
            values.push(value.value().to_string());
        }
        Ok(values)
    }

    fn write_node(table: &mut Table<&'static str, &'static [u8]>, node: &Node) -> StorageResult<()> {
        let value = serde_json::to_vec(node)?;
        table.insert(node.id.to_string().as_str(), value.as_slice())?;
        Ok(())
    }

    fn bump(table: &mut Table<&'static str, &'static [u8]>, id: &NodeId) -> StorageResult<()> {
        if let Some(mut node) = Self::read_node(&*table, id)? {
            node.version += 1;
            Self::write_node(table, &node)?;
        }
        Ok(())
    }

    fn apply(txn: &WriteTransaction, batch: WriteBatch) -> StorageResult<CommitReceipt> {
        let mut nodes = txn.open_table(NODES)?;
        let mut relationships = txn.open_table(RELATIONSHIPS)?;
        let mut outgoing = txn.open_table(OUTGOING)?;
        let mut incoming = txn.open_table(INCOMING)?;
        let mut node_types = txn.open_table(NODE_TYPES)?;

        for (id, expected) in &batch.expected_versions {
            match Self::read_node(&nodes, id)? {
                Some(node) if node.version == *expected => {}
                Some(node) => {
                    return Err(StorageError::Conflict(format!(
                        "node {} moved from version {} to {}",
                        id, expected, node.version
                    )))
                }
                None => return Err(StorageError::Conflict(format!("node {} disappeared", id))),
            }
        }

        let receipt = batch.check(
            |id| Ok(nodes.get(id.to_string().as_str())?.is_some()),
            |id| Ok(relationships.get(id.to_string().as_str())?.is_some()),
        )?;

        for mutation in batch.mutations {
            match mutation {
                Mutation::CreateNode(mut node) => {
                    node.version += 1;
                    Self::write_node(&mut nodes, &node)?;
                    let id = node.id.to_string();
                    node_types.insert(Self::node_type_key(&node).as_str(), id.as_str())?;
                }
                Mutation::CreateRelationship(rel) => {
                    let id = rel.id.to_string();
                    let value = serde_json::to_vec(&rel)?;
                    relationships.insert(id.as_str(), value.as_slice())?;
                    outgoing.insert(
                        Self::adjacency_key(&rel.rel_type, &rel.source, &rel.id).as_str(),
                        id.as_str(),
                    )?;
                    incoming.insert(
                        Self::adjacency_key(&rel.rel_type, &rel.target, &rel.id).as_str(),
                        id.as_str(),
                    )?;
                    Self::bump(&mut nodes, &rel.source)?;
                    Self::bump(&mut nodes, &rel.target)?;
                }
                Mutation::DeleteRelationship(id) => {
                    let key = id.to_string();
                    let rel = Self::read_relationship(&relationships, &key)?.ok_or_else(|| {
                        StorageError::Conflict(format!("relationship {} was already deleted", id))
                    })?;
                    relationships.remove(key.as_str())?;
                    outgoing.remove(Self::adjacency_key(&rel.rel_type, &rel.source, &id).as_str())?;
                    incoming.remove(Self::adjacency_key(&rel.rel_type, &rel.target, &id).as_str())?;
                    Self::bump(&mut nodes, &rel.source)?;
                    Self::bump(&mut nodes, &rel.target)?;
                }
            }
        }

        Ok(receipt)
    }
}

impl RedbStore {
    /// Layout version recorded in the file, 0 for a fresh file
    pub fn layout_version(&self) -> StorageResult<u32> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(META) {
            Ok(table) => table,
            Err(::redb::TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let version = table.get(LAYOUT_VERSION_KEY)?.map(|v| v.value()).unwrap_or(0);
        u32::try_from(version)
            .map_err(|_| StorageError::Migration(format!("invalid layout version {}", version)))
    }

    fn upgrade(&self) -> StorageResult<()> {
        let current = self.layout_version()?;
        for step in plan(current)? {
            self.apply_step(step)?;
            tracing::info!(
                "Upgraded store layout to v{}: {}",
                step.version(),
                step.description()
            );
        }
        Ok(())
    }

    /// Apply one step and record its version in the same write transaction
    fn apply_step(&self, step: LayoutStep) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        match step {
            LayoutStep::CreateTables => {
                write_txn.open_table(NODES)?;
                write_txn.open_table(RELATIONSHIPS)?;
                write_txn.open_table(OUTGOING)?;
                write_txn.open_table(INCOMING)?;
                write_txn.open_table(NODE_TYPES)?;
            }
            LayoutStep::CamelCaseTimestamps => {
                for definition in [NODES, RELATIONSHIPS] {
                    let mut table = write_txn.open_table(definition)?;
                    let mut rewrites = Vec::new();
                    for entry in table.iter()? {
                        let (key, value) = entry?;
                        if let Some(raw) = camel_case_timestamps(value.value())? {
                            rewrites.push((key.value().to_string(), raw));
                        }
                    }
                    tracing::debug!("Rewriting {} stored record(s)", rewrites.len());
                    for (key, raw) in rewrites {
                        table.insert(key.as_str(), raw.as_slice())?;
                    }
                }
            }
        }
        {
            let mut meta = write_txn.open_table(META)?;
            meta.insert(LAYOUT_VERSION_KEY, u64::from(step.version()))?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl GraphStore for RedbStore {
    async fn initialize(&self) -> StorageResult<()> {
        self.upgrade()
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        read_txn.open_table(NODES)?;
        Ok(true)
    }

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODES)?;
        Self::read_node(&table, id)
    }

    async fn get_relationship(&self, id: &RelationshipId) -> StorageResult<Option<Relationship>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RELATIONSHIPS)?;
        Self::read_relationship(&table, &id.to_string())
    }

    async fn find_relationships(
        &self,
        rel_type: &str,
        endpoint: &Endpoint,
    ) -> StorageResult<Vec<Relationship>> {
        let read_txn = self.db.begin_read()?;
        let index = match endpoint.role {
            EndpointRole::Source => read_txn.open_table(OUTGOING)?,
            EndpointRole::Target => read_txn.open_table(INCOMING)?,
        };
        let table = read_txn.open_table(RELATIONSHIPS)?;

        let prefix = Self::adjacency_prefix(rel_type, &endpoint.node);
        let mut relationships = Vec::new();
        for id in Self::scan_prefix(&index, &prefix)? {
            if let Some(rel) = Self::read_relationship(&table, &id)? {
                relationships.push(rel);
            }
        }
        Ok(relationships)
    }

    async fn nodes_of_type(&self, node_type: &str) -> StorageResult<Vec<Node>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(NODE_TYPES)?;
        let table = read_txn.open_table(NODES)?;

        let prefix = format!("{}:", node_type);
        let mut nodes = Vec::new();
        for id in Self::scan_prefix(&index, &prefix)? {
            if let Some(value) = table.get(id.as_str())? {
                nodes.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(nodes)
    }

    async fn relationships_of_type(&self, rel_type: &str) -> StorageResult<Vec<Relationship>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OUTGOING)?;
        let table = read_txn.open_table(RELATIONSHIPS)?;

        let prefix = format!("{}:", rel_type);
        let mut relationships = Vec::new();
        for id in Self::scan_prefix(&index, &prefix)? {
            if let Some(rel) = Self::read_relationship(&table, &id)? {
                relationships.push(rel);
            }
        }
        relationships.sort_by_key(|r| r.id);
        Ok(relationships)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitReceipt> {
        let write_txn = self.db.begin_write()?;
        let receipt = match Self::apply(&write_txn, batch) {
            Ok(receipt) => receipt,
            Err(e) => {
                write_txn.abort()?;
                return Err(e);
            }
        };
        write_txn.commit()?;
        tracing::debug!(
            "ReDB store committed: +{} nodes, +{} relationships, -{} relationships",
            receipt.nodes_created,
            receipt.relationships_created,
            receipt.relationships_deleted
        );
        Ok(receipt)
    }
}
