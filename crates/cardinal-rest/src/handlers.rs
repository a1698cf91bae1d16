//! Request handlers

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::upload::{prepare_file_properties, UploadReceiver, FILE_CAPABILITY};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cardinal_core::{Node, NodeId, Properties, Relationship, RelationshipId};
use cardinal_engine::{BoxError, Error as EngineError};
use cardinal_storage::GraphStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Body of `POST /{relationshipType}`.
///
/// Endpoints may be given as `startNodeId`/`endNodeId` or
/// `sourceId`/`targetId`; every other key is a relationship property.
#[derive(Debug, Deserialize)]
pub struct RelationshipRequest {
    #[serde(rename = "startNodeId", alias = "sourceId")]
    pub source: NodeId,
    #[serde(rename = "endNodeId", alias = "targetId")]
    pub target: NodeId,
    #[serde(flatten)]
    pub properties: Properties,
}

/// Listing envelope
#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub result_count: usize,
    pub result: T,
}

impl<T> Listing<Vec<T>> {
    fn of(result: Vec<T>) -> Self {
        Self {
            result_count: result.len(),
            result,
        }
    }
}

fn object(body: Value) -> ApiResult<serde_json::Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(ApiError::Unprocessable(format!(
            "Expected a JSON object, got {}",
            other
        ))),
    }
}

fn created(type_name: &str, id: &str, result: Value) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/{}/{}", type_name, id)) {
        headers.insert(header::LOCATION, location);
    }
    (StatusCode::CREATED, headers, Json(json!({ "result": result }))).into_response()
}

/// `POST /{type}`
pub async fn create_entity<S: GraphStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(type_name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let schema = state.engine.schema();
    if schema.is_relationship_type(&type_name) {
        let request: RelationshipRequest = serde_json::from_value(Value::Object(object(body)?))
            .map_err(|e| ApiError::Unprocessable(format!("Invalid relationship body: {}", e)))?;
        let rel = relate(&state, &type_name, request).await?;
        Ok(created(&type_name, &rel.id.to_string(), serde_json::to_value(&rel)?))
    } else if schema.is_node_type(&type_name) {
        let properties: Properties = object(body)?.into_iter().collect();
        let node = create_node(&state, &type_name, properties).await?;
        Ok(created(&type_name, &node.id.to_string(), serde_json::to_value(&node)?))
    } else {
        Err(EngineError::UnknownType(type_name).into())
    }
}

async fn relate<S: GraphStore + 'static>(
    state: &AppState<S>,
    rel_type: &str,
    request: RelationshipRequest,
) -> ApiResult<Relationship> {
    let mut tx = state.engine.begin();
    let rel = match tx
        .create_or_replace(rel_type, request.source, request.target, request.properties)
        .await
    {
        Ok(rel) => rel,
        Err(e) => {
            tx.rollback()?;
            return Err(e.into());
        }
    };
    let outcome = tx.commit().await?;
    tracing::debug!(
        "POST /{} committed in {} attempt(s), {} replaced",
        rel_type,
        outcome.attempts,
        outcome.receipt.relationships_deleted
    );
    Ok(rel)
}

async fn create_node<S: GraphStore + 'static>(
    state: &AppState<S>,
    node_type: &str,
    mut properties: Properties,
) -> ApiResult<Node> {
    let descriptor = state
        .engine
        .schema()
        .node_type(node_type)
        .map_err(EngineError::from)?;
    if descriptor.capabilities.contains(FILE_CAPABILITY) {
        let existing = state.engine.nodes_of_type(node_type).await?;
        prepare_file_properties(&mut properties, |name| {
            existing
                .iter()
                .any(|n| n.property("name").and_then(Value::as_str) == Some(name))
        });
    }

    let mut tx = state.engine.begin();
    let node = match tx.create_node(node_type, properties).await {
        Ok(node) => node,
        Err(e) => {
            tx.rollback()?;
            return Err(e.into());
        }
    };

    if node.has_capability(FILE_CAPABILITY) {
        let uploads = state.uploads.clone();
        let receiver = UploadReceiver::for_node(&node);
        tx.register_callback(node.id, move |_| {
            uploads.open(receiver).map_err(|e| Box::new(e) as BoxError)
        })?;
    }

    let outcome = tx.commit().await?;
    for failure in &outcome.callback_failures {
        tracing::warn!("POST /{}: {}", node_type, failure);
    }
    Ok(node)
}

/// `GET /{type}`
pub async fn list_entities<S: GraphStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(type_name): Path<String>,
) -> ApiResult<Response> {
    let schema = state.engine.schema();
    if schema.is_relationship_type(&type_name) {
        let rels = state.engine.relationships_of_type(&type_name).await?;
        Ok(Json(Listing::of(rels)).into_response())
    } else {
        let nodes = state.engine.nodes_of_type(&type_name).await?;
        Ok(Json(Listing::of(nodes)).into_response())
    }
}

/// `GET /{type}/{id}`
pub async fn get_entity<S: GraphStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((type_name, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let schema = state.engine.schema();
    let not_found = || ApiError::NotFound(format!("{} {}", type_name, id));

    let result = if schema.is_relationship_type(&type_name) {
        let rel_id = RelationshipId::from_string(&id).map_err(|_| not_found())?;
        let rel = state
            .engine
            .get_relationship(&rel_id)
            .await?
            .filter(|r| r.rel_type == type_name)
            .ok_or_else(not_found)?;
        serde_json::to_value(rel)?
    } else if schema.is_node_type(&type_name) {
        let node_id = NodeId::from_string(&id).map_err(|_| not_found())?;
        let node = state
            .engine
            .get_node(&node_id)
            .await?
            .filter(|n| n.node_type.as_str() == type_name)
            .ok_or_else(not_found)?;
        serde_json::to_value(node)?
    } else {
        return Err(EngineError::UnknownType(type_name.clone()).into());
    };

    Ok(Json(json!({ "result_count": 1, "result": result })))
}

/// `GET /_schema`
pub async fn describe_schema<S: GraphStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let schema = state.engine.schema();
    let relationships: Vec<Value> = schema
        .relationship_types()
        .into_iter()
        .map(|d| {
            json!({
                "name": d.name,
                "source": d.source_type,
                "target": d.target_type,
                "cardinality": d.cardinality(),
                "autoCreate": d.auto_create,
            })
        })
        .collect();
    Json(json!({
        "nodes": schema.node_types(),
        "relationships": relationships,
    }))
}

/// `GET /_uploads/{id}`
pub async fn get_upload<S: GraphStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let not_found = || ApiError::NotFound(format!("upload receiver {}", id));
    let node_id = NodeId::from_string(&id).map_err(|_| not_found())?;
    let receiver = state
        .uploads
        .get(&node_id)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "result": receiver })))
}

/// `DELETE /_uploads/{id}`
pub async fn close_upload<S: GraphStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let not_found = || ApiError::NotFound(format!("upload receiver {}", id));
    let node_id = NodeId::from_string(&id).map_err(|_| not_found())?;
    state
        .uploads
        .close(&node_id)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(not_found)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /health`
pub async fn health<S: GraphStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let healthy = state.engine.store().health_check().await.unwrap_or(false);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "unavailable" },
            "server": "cardinal",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
