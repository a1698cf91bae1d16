//! Router and server setup

use crate::handlers;
use crate::upload::UploadReceivers;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use cardinal_engine::Engine;
use cardinal_storage::GraphStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum request body size (1MB)
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Shared handler state
pub struct AppState<S: GraphStore> {
    pub engine: Arc<Engine<S>>,
    pub uploads: Arc<UploadReceivers>,
}

impl<S: GraphStore> AppState<S> {
    pub fn new(engine: Arc<Engine<S>>) -> Self {
        Self {
            engine,
            uploads: Arc::new(UploadReceivers::new()),
        }
    }
}

/// Build the router over an existing state
pub fn create_router<S: GraphStore + 'static>(state: Arc<AppState<S>>) -> Router {
    // Restrictive CORS: only allow localhost origins
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://localhost:8080"),
            HeaderValue::from_static("http://127.0.0.1:8080"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health::<S>))
        .route("/_schema", get(handlers::describe_schema::<S>))
        .route(
            "/_uploads/:id",
            get(handlers::get_upload::<S>).delete(handlers::close_upload::<S>),
        )
        .route(
            "/:type",
            get(handlers::list_entities::<S>).post(handlers::create_entity::<S>),
        )
        .route("/:type/:id", get(handlers::get_entity::<S>))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

/// Serve the REST API until the listener fails
pub async fn serve<S: GraphStore + 'static>(engine: Arc<Engine<S>>, addr: &str) -> anyhow::Result<()> {
    let router = create_router(Arc::new(AppState::new(engine)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Cardinal REST server listening on {}", addr);
    tracing::info!("  Schema: http://{}/_schema", addr);
    tracing::info!("  Health check: http://{}/health", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
