//! Persistence layer: the `Database` trait and its two backends.

pub mod libsql_backend;
pub mod migrations;
pub mod rest_backend;
pub mod traits;

use std::sync::Arc;

pub use libsql_backend::LibSqlBackend;
pub use rest_backend::RestBackend;
pub use traits::{Database, SessionUpdate};

use crate::config::StorageConfig;
use crate::error::DatabaseError;

/// Open the configured backend.
pub async fn open(
    config: &StorageConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn Database>, DatabaseError> {
    match config {
        StorageConfig::Baas { url, service_key } => {
            tracing::info!(url = %url, "Using BaaS REST storage");
            Ok(Arc::new(RestBackend::new(client, url.clone(), service_key.clone())))
        }
        StorageConfig::Local { path } => {
            tracing::info!(path = %path.display(), "Using local libSQL storage");
            Ok(Arc::new(LibSqlBackend::new_local(path).await?))
        }
    }
}
