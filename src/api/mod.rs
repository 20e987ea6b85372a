//! REST API server module
//!
//! A thin HTTP adapter over the export and removal engine. Authentication
//! happens upstream; see [`auth`] for how the acting user is passed in.

use crate::db::Database;
use crate::{Config, Result};
use axum::{
    Router,
    routing::{delete, get},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Export
/// - `GET /results/data` - Raw data, one component result per line (streamed)
/// - `GET /results/metadata` - JSON metadata (streamed)
/// - `GET /results/export?type=COMBINED|DATA_ONLY|FILES_ONLY|METADATA_ONLY` - Zip archive
///
/// ## Removal
/// - `DELETE /results/component-results?removeEmptyParents=true` - Remove component results
/// - `DELETE /results/study-results` - Remove study results
/// - `DELETE /workers/:id` - Remove a worker and its study results
///
/// ## System
/// - `GET /health` - Health check
pub fn create_router(db: Arc<Database>, config: Arc<Config>) -> Router {
    let state = AppState::new(db, config);

    Router::new()
        // Export
        .route("/results/data", get(routes::export_data))
        .route("/results/metadata", get(routes::export_metadata))
        .route("/results/export", get(routes::export_archive))
        // Removal
        .route(
            "/results/component-results",
            delete(routes::remove_component_results),
        )
        .route("/results/study-results", delete(routes::remove_study_results))
        .route("/workers/:id", delete(routes::remove_worker))
        // System
        .route("/health", get(routes::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server on the configured bind address.
///
/// Runs until the listener fails.
///
/// # Example
///
/// ```no_run
/// use study_results::{Config, Database};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let db = Arc::new(Database::new(&config.persistence.database_path).await?);
///
/// study_results::api::start_api_server(db, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(db: Arc<Database>, config: Arc<Config>) -> Result<()> {
    config.validate()?;
    let bind_address = config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(db, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
