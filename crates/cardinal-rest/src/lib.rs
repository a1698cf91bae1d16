//! Cardinal REST - HTTP binding for typed nodes and relationships
//!
//! `POST /{type}` creates a node or, for relationship types, a relationship
//! through the cardinality-enforcing engine. `GET /{type}` and
//! `GET /{type}/{id}` list what is committed.

pub mod error;
pub mod handlers;
pub mod server;
pub mod upload;

pub use error::{ApiError, ApiResult};
pub use server::{create_router, serve, AppState};
pub use upload::{UploadError, UploadReceiver, UploadReceivers};
