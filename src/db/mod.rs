//! Database layer for study-results
//!
//! Handles SQLite persistence for the result hierarchy
//! (Study → StudyResult → ComponentResult, cross-linked to Worker and GroupResult).
//!
//! ## Submodules
//!
//! Repository operations are associated functions on [`Database`] taking a
//! `&mut SqliteConnection`, so callers decide the transaction boundary
//! (one per export page, one per removal call):
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`studies`] - Studies, components, batches and study membership
//! - [`workers`] - Workers
//! - [`study_results`] - Study results: scoped counts, pages, ID resolvers, deletion
//! - [`component_results`] - Component results: scoped counts, pages, ID resolvers, deletion
//! - [`group_results`] - Group results and their derived member counts
//! - [`scope`] - SQL filters for [`ResultScope`](crate::types::ResultScope)

use crate::types::{
    BatchId, ComponentId, ComponentResultId, ComponentResultState, GroupResultId, GroupState,
    StudyId, StudyResultId, StudyResultState, WorkerId, WorkerType,
};
use crate::{Error, Result};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{FromRow, Transaction, pool::PoolConnection};

mod component_results;
mod group_results;
mod migrations;
mod scope;
mod studies;
mod study_results;
mod workers;

/// Study record from database
#[derive(Debug, Clone, FromRow)]
pub struct Study {
    /// Unique database ID
    pub id: StudyId,
    /// Study title
    pub title: String,
    /// Whether destructive operations are blocked
    pub locked: bool,
    /// Unix timestamp when the study was created
    pub created_at: i64,
}

/// Component record from database
#[derive(Debug, Clone, FromRow)]
pub struct Component {
    /// Unique database ID
    pub id: ComponentId,
    /// Owning study
    pub study_id: StudyId,
    /// Component title
    pub title: String,
    /// Position within the study (1-based)
    pub position: i64,
}

/// Batch record from database
#[derive(Debug, Clone, FromRow)]
pub struct Batch {
    /// Unique database ID
    pub id: BatchId,
    /// Owning study
    pub study_id: StudyId,
    /// Batch title
    pub title: String,
}

/// Worker record from database
#[derive(Debug, Clone, FromRow)]
pub struct Worker {
    /// Unique database ID
    pub id: WorkerId,
    /// Worker subtype
    #[sqlx(try_from = "String")]
    pub worker_type: WorkerType,
    /// Platform user this worker belongs to (only for `Jatos` workers)
    pub username: Option<String>,
    /// Free-text comment
    pub comment: Option<String>,
}

/// Study result record from database
#[derive(Debug, Clone, FromRow)]
pub struct StudyResult {
    /// Unique database ID
    pub id: StudyResultId,
    /// Owning study
    pub study_id: StudyId,
    /// Batch the run belongs to
    pub batch_id: BatchId,
    /// Worker who ran the study
    pub worker_id: WorkerId,
    /// Run state
    #[sqlx(try_from = "String")]
    pub state: StudyResultState,
    /// Unix timestamp when the run started
    pub start_date: i64,
    /// Unix timestamp when the run ended
    pub end_date: Option<i64>,
    /// Group the run currently belongs to
    pub active_group_result_id: Option<GroupResultId>,
    /// Group the run belonged to in the past
    pub history_group_result_id: Option<GroupResultId>,
    /// URL query parameters the run was started with (JSON)
    pub url_query_parameters: Option<String>,
}

/// Component result record from database
#[derive(Debug, Clone, FromRow)]
pub struct ComponentResult {
    /// Unique database ID
    pub id: ComponentResultId,
    /// Parent study result; `None` only for damaged rows
    pub study_result_id: Option<StudyResultId>,
    /// Component that produced this result
    pub component_id: ComponentId,
    /// Run state
    #[sqlx(try_from = "String")]
    pub state: ComponentResultState,
    /// Unix timestamp when the component started
    pub start_date: i64,
    /// Unix timestamp when the component ended
    pub end_date: Option<i64>,
    /// Collected data payload
    pub data: Option<String>,
}

impl ComponentResult {
    /// Size of the data payload in bytes
    pub fn data_size(&self) -> usize {
        self.data.as_ref().map_or(0, String::len)
    }
}

/// Group result record with derived member counts
#[derive(Debug, Clone, FromRow)]
pub struct GroupResult {
    /// Unique database ID
    pub id: GroupResultId,
    /// Batch the group runs in
    pub batch_id: BatchId,
    /// Lifecycle state
    #[sqlx(try_from = "String")]
    pub group_state: GroupState,
    /// Unix timestamp when the group started
    pub start_date: i64,
    /// Unix timestamp when the group ended
    pub end_date: Option<i64>,
    /// Number of study results currently in the group
    pub active_member_count: i64,
    /// Number of study results that were in the group
    pub history_member_count: i64,
}

impl GroupResult {
    /// A finished group without any members is removed instead of persisted
    pub fn is_removable(&self) -> bool {
        self.group_state == GroupState::Finished
            && self.active_member_count == 0
            && self.history_member_count == 0
    }
}

/// New study to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewStudy {
    /// Study title
    pub title: String,
    /// Whether destructive operations are blocked
    pub locked: bool,
}

/// New worker to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewWorker {
    /// Worker subtype
    pub worker_type: WorkerType,
    /// Platform user (only for `Jatos` workers)
    pub username: Option<String>,
    /// Free-text comment
    pub comment: Option<String>,
}

/// New study result to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewStudyResult {
    /// Owning study
    pub study_id: StudyId,
    /// Batch the run belongs to
    pub batch_id: BatchId,
    /// Worker who runs the study
    pub worker_id: WorkerId,
    /// Initial state
    pub state: StudyResultState,
    /// Current group
    pub active_group_result_id: Option<GroupResultId>,
    /// Past group
    pub history_group_result_id: Option<GroupResultId>,
    /// URL query parameters (JSON)
    pub url_query_parameters: Option<String>,
}

/// New component result to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewComponentResult {
    /// Parent study result
    pub study_result_id: StudyResultId,
    /// Component that produced this result
    pub component_id: ComponentId,
    /// Initial state
    pub state: ComponentResultState,
    /// Data payload
    pub data: Option<String>,
}

/// Database handle for study-results
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Start a transaction
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| Error::query("Failed to begin transaction", e))
    }

    /// Acquire a pooled connection for work outside an explicit transaction
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| Error::query("Failed to acquire connection", e))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests;
