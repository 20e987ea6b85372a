//! Application state for the API server

use crate::db::Database;
use crate::remover::ResultRemover;
use crate::streamer::ResultStreamer;
use crate::uploads::UploadStore;
use crate::Config;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; everything inside is an `Arc` or a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Result store, used to resolve selectors
    pub db: Arc<Database>,

    /// Export side of the engine
    pub streamer: ResultStreamer,

    /// Removal side of the engine
    pub remover: ResultRemover,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState, wiring the engine to the configured upload directory
    pub fn new(db: Arc<Database>, config: Arc<Config>) -> Self {
        let uploads = UploadStore::new(&config.storage.uploads_dir);
        Self {
            streamer: ResultStreamer::new(db.clone(), uploads.clone(), config.clone()),
            remover: ResultRemover::new(db.clone(), uploads),
            db,
            config,
        }
    }
}
