//! Upload receivers for nodes with the `file` capability
//!
//! Creating a file node only reserves the node. The receiver that accepts
//! its bytes is opened by a post-commit callback, so a rolled back create
//! never leaves a receiver behind.

use cardinal_core::{Node, NodeId, Properties};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Capability marking node types that accept uploads
pub const FILE_CAPABILITY: &str = "file";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload receiver for {0} is already open")]
    AlreadyOpen(NodeId),

    #[error("Lock error: {0}")]
    Lock(String),
}

/// Fill in defaults for a file node before it is created.
///
/// A missing `size` becomes 0. A `name` that `taken` reports as already
/// used gets a timestamp suffix.
pub fn prepare_file_properties(properties: &mut Properties, taken: impl Fn(&str) -> bool) {
    properties
        .entry("size".to_string())
        .or_insert_with(|| Value::from(0u64));

    let renamed = match properties.get("name").and_then(Value::as_str) {
        Some(name) if taken(name) => format!("{}_{}", name, Utc::now().format("%Y%m%d%H%M%S%3f")),
        _ => return,
    };
    tracing::debug!("File name taken, storing as {}", renamed);
    properties.insert("name".to_string(), Value::String(renamed));
}

/// An open upload slot for one file node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceiver {
    pub node_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl UploadReceiver {
    /// Read name, size and content type from the node's properties
    pub fn for_node(node: &Node) -> Self {
        let text = |key: &str| {
            node.property(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            node_id: node.id,
            name: text("name"),
            size: node.property("size").and_then(|v| v.as_u64()).unwrap_or(0),
            content_type: text("contentType"),
        }
    }
}

/// Receivers opened so far, keyed by file node
#[derive(Debug, Default)]
pub struct UploadReceivers {
    receivers: RwLock<HashMap<NodeId, UploadReceiver>>,
}

impl UploadReceivers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, receiver: UploadReceiver) -> Result<(), UploadError> {
        let mut receivers = self
            .receivers
            .write()
            .map_err(|e| UploadError::Lock(e.to_string()))?;
        if receivers.contains_key(&receiver.node_id) {
            return Err(UploadError::AlreadyOpen(receiver.node_id));
        }
        tracing::info!(
            "Upload receiver opened for {} ({} bytes, {})",
            receiver.node_id,
            receiver.size,
            receiver.content_type.as_deref().unwrap_or("unknown type")
        );
        receivers.insert(receiver.node_id, receiver);
        Ok(())
    }

    pub fn get(&self, id: &NodeId) -> Result<Option<UploadReceiver>, UploadError> {
        let receivers = self
            .receivers
            .read()
            .map_err(|e| UploadError::Lock(e.to_string()))?;
        Ok(receivers.get(id).cloned())
    }

    /// Close the receiver for `id`, returning it if one was open
    pub fn close(&self, id: &NodeId) -> Result<Option<UploadReceiver>, UploadError> {
        let mut receivers = self
            .receivers
            .write()
            .map_err(|e| UploadError::Lock(e.to_string()))?;
        let closed = receivers.remove(id);
        if closed.is_some() {
            tracing::info!("Upload receiver closed for {}", id);
        }
        Ok(closed)
    }

    pub fn len(&self) -> usize {
        self.receivers.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
