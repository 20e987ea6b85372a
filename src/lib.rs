//! # study-results
//!
//! Result-data lifecycle engine for an online study platform: selecting,
//! permission-checking, exporting and removing the results participants
//! produce while running studies.
//!
//! ## Design Philosophy
//!
//! - **Bounded memory** - Exports page through the store with one short
//!   transaction per page; output is written as it is produced
//! - **All-or-nothing removal** - Every target is checked before the first row goes
//! - **Consistent groups** - Finished, memberless group results never outlive
//!   their last study result
//! - **Library-first** - The HTTP surface in [`api`] is a thin adapter
//!
//! ## Quick Start
//!
//! ```no_run
//! use study_results::{Config, Database, ResultRemover, ResultStreamer, StudyResultId, User};
//! use study_results::selector::ResultSelector;
//! use study_results::uploads::UploadStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let uploads = UploadStore::new(&config.storage.uploads_dir);
//!     let user = User::new("researcher", "Rea Searcher");
//!
//!     // Export the raw data of a few study results
//!     let streamer = ResultStreamer::new(db.clone(), uploads.clone(), config.clone());
//!     let scope = ResultSelector::study_results("1,4-6")
//!         .to_scope(config.export.max_selector_ids)?;
//!     let mut out = String::new();
//!     let report = streamer.stream_data_text(&scope, &user, &mut out).await?;
//!     println!("{} of {} written", report.written, report.total);
//!
//!     // Remove one of them again
//!     let remover = ResultRemover::new(db, uploads);
//!     remover.remove_study_results(&[StudyResultId(4)], &user).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Permission checks
pub mod checker;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Consistent result removal
pub mod remover;
/// Result ID selectors
pub mod selector;
/// Paginated result export
pub mod streamer;
/// Core types
pub mod types;
/// Uploaded result files
pub mod uploads;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{ApiError, DatabaseError, Error, ErrorDetail, Result, ToHttpStatus};
pub use remover::{RemovalReport, ResultRemover};
pub use streamer::{ArchiveExport, ExportReport, ResultStreamer};
pub use types::{
    BatchId, ComponentId, ComponentResultId, GroupResultId, ResultScope, ResultsType, StudyId,
    StudyResultId, User, WorkerId, WorkerType,
};

/// Log target of completion events, one per study touched by an export or removal
pub const AUDIT_TARGET: &str = "study_results::audit";
