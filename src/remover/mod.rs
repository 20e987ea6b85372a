//! Consistent removal of results.
//!
//! Every call loads its targets and permission-checks all of them, lock
//! included, before the first mutation; one failure aborts the whole call.
//! Database changes of one call run in a single transaction. Upload
//! directories are deleted after commit; failures there are logged and
//! reported but never undo the database removal.
//!
//! Removing the last component result of a study result doesn't remove the
//! study result on its own. Callers of [`ResultRemover::remove_component_results`]
//! choose with `remove_empty_parents`; the bulk paths never cascade.

use crate::checker;
use crate::db::{ComponentResult, Database, StudyResult};
use crate::error::{Error, Result};
use crate::selector::dedup_ids;
use crate::types::{
    BatchId, ComponentId, ComponentResultId, GroupResultId, ResultScope, StudyId, StudyResultId,
    User, WorkerId,
};
use crate::uploads::UploadStore;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An upload directory that could not be deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    /// The directory
    pub path: PathBuf,
    /// The I/O error
    pub error: String,
}

/// Summary of one removal call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalReport {
    /// Removed component results, in removal order
    pub removed_component_results: Vec<ComponentResultId>,
    /// Removed study results, in removal order
    pub removed_study_results: Vec<StudyResultId>,
    /// Group results removed because they ended up finished and memberless
    pub removed_group_results: Vec<GroupResultId>,
    /// Worker removed by [`ResultRemover::remove_worker`]
    pub removed_worker: Option<WorkerId>,
    /// Component results that had no parent study result
    pub orphaned_component_results: Vec<ComponentResultId>,
    /// Upload directories left behind
    pub cleanup_failures: Vec<CleanupFailure>,
    /// Studies whose results were removed
    pub studies: BTreeSet<StudyId>,
}

/// Upload directory to delete once the transaction has committed
#[derive(Debug, Clone, Copy)]
enum PendingCleanup {
    StudyResult(StudyResultId),
    ComponentResult(StudyResultId, ComponentResultId),
}

/// State of one removal call
#[derive(Default)]
struct Removal {
    report: RemovalReport,
    cleanup: Vec<PendingCleanup>,
}

/// Removes results and their upload directories
#[derive(Clone)]
pub struct ResultRemover {
    db: Arc<Database>,
    uploads: UploadStore,
}

impl ResultRemover {
    /// Create a remover
    pub fn new(db: Arc<Database>, uploads: UploadStore) -> Self {
        Self { db, uploads }
    }

    /// Remove component results by ID
    ///
    /// With `remove_empty_parents`, a study result left without component
    /// results is removed as well. Unknown IDs fail with `NotFound` before
    /// anything is removed.
    pub async fn remove_component_results(
        &self,
        ids: &[ComponentResultId],
        user: &User,
        remove_empty_parents: bool,
    ) -> Result<RemovalReport> {
        let ids = dedup_ids(ids.iter().copied());
        let mut tx = self.db.begin().await?;

        let results = Database::get_component_results_by_ids(&mut tx, &ids).await?;
        checker::check_component_results(&mut tx, &results, user, true).await?;

        let mut removal = Removal::default();
        for result in &results {
            let parent = remove_component_result(&mut tx, result, &mut removal).await?;
            if let Some(parent) = parent.filter(|_| remove_empty_parents) {
                if Database::count_component_results_of(&mut tx, parent.id).await? == 0 {
                    remove_empty_study_result(&mut tx, &parent, &mut removal).await?;
                }
            }
        }

        commit(tx).await?;
        Ok(self.finish(removal, user).await)
    }

    /// Remove study results by ID, with all their component results
    pub async fn remove_study_results(
        &self,
        ids: &[StudyResultId],
        user: &User,
    ) -> Result<RemovalReport> {
        let ids = dedup_ids(ids.iter().copied());
        let mut tx = self.db.begin().await?;

        let results = Database::get_study_results_by_ids(&mut tx, &ids).await?;
        checker::check_study_results(&mut tx, &results, user, true).await?;

        let mut removal = Removal::default();
        for result in &results {
            remove_study_result(&mut tx, result, &mut removal).await?;
        }

        commit(tx).await?;
        Ok(self.finish(removal, user).await)
    }

    /// Remove every component result of a component
    ///
    /// Study results left empty stay in place.
    pub async fn remove_all_component_results(
        &self,
        component_id: ComponentId,
        user: &User,
    ) -> Result<RemovalReport> {
        let mut tx = self.db.begin().await?;

        let component = Database::get_component(&mut tx, component_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("component {component_id}")))?;
        checker::check_study(&mut tx, component.study_id, user, true).await?;

        let ids =
            Database::find_component_result_ids(&mut tx, &ResultScope::Component(component_id))
                .await?;

        let mut removal = Removal::default();
        for id in ids {
            if let Some(result) = Database::get_component_result(&mut tx, id).await? {
                remove_component_result(&mut tx, &result, &mut removal).await?;
            }
        }
        removal.report.studies.insert(component.study_id);

        commit(tx).await?;
        Ok(self.finish(removal, user).await)
    }

    /// Remove every study result of a batch
    pub async fn remove_all_study_results(
        &self,
        batch_id: BatchId,
        user: &User,
    ) -> Result<RemovalReport> {
        let mut tx = self.db.begin().await?;

        let batch = Database::get_batch(&mut tx, batch_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("batch {batch_id}")))?;
        checker::check_study(&mut tx, batch.study_id, user, true).await?;

        let scope = ResultScope::Batch {
            batch_id,
            worker_type: None,
        };
        let removal = remove_scope(&mut tx, &scope).await?;

        commit(tx).await?;
        Ok(self.finish(removal, user).await)
    }

    /// Remove every study result of a study, before the study itself goes
    pub async fn remove_all_study_results_of_study(
        &self,
        study_id: StudyId,
        user: &User,
    ) -> Result<RemovalReport> {
        let mut tx = self.db.begin().await?;

        checker::check_study(&mut tx, study_id, user, true).await?;
        let removal = remove_scope(&mut tx, &ResultScope::Study(study_id)).await?;

        commit(tx).await?;
        Ok(self.finish(removal, user).await)
    }

    /// Remove a worker with all of its study results
    ///
    /// Workers tied to a platform user are refused. Every study result is
    /// checked first; results may span several studies.
    pub async fn remove_worker(&self, worker_id: WorkerId, user: &User) -> Result<RemovalReport> {
        let mut tx = self.db.begin().await?;

        let worker = Database::get_worker(&mut tx, worker_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("worker {worker_id}")))?;
        checker::check_worker_removable(&worker)?;

        let ids = Database::find_study_result_ids(&mut tx, &ResultScope::Worker(worker_id)).await?;
        let results = Database::get_study_results_by_ids(&mut tx, &ids).await?;
        checker::check_study_results(&mut tx, &results, user, true).await?;

        let mut removal = Removal::default();
        for result in &results {
            remove_study_result(&mut tx, result, &mut removal).await?;
        }
        Database::delete_worker(&mut tx, worker_id).await?;
        removal.report.removed_worker = Some(worker_id);

        commit(tx).await?;
        Ok(self.finish(removal, user).await)
    }

    /// Delete pending upload directories and log one event per touched study
    async fn finish(&self, removal: Removal, user: &User) -> RemovalReport {
        let Removal {
            mut report,
            cleanup,
        } = removal;

        for pending in cleanup {
            let (path, outcome) = match pending {
                PendingCleanup::StudyResult(study_result_id) => (
                    self.uploads.study_result_dir(study_result_id),
                    self.uploads.remove_study_result_dir(study_result_id).await,
                ),
                PendingCleanup::ComponentResult(study_result_id, component_result_id) => (
                    self.uploads
                        .component_result_dir(study_result_id, component_result_id),
                    self.uploads
                        .remove_component_result_dir(study_result_id, component_result_id)
                        .await,
                ),
            };
            if let Err(e) = outcome {
                warn!(?path, error = %e, "could not delete upload directory");
                report.cleanup_failures.push(CleanupFailure {
                    path,
                    error: e.to_string(),
                });
            }
        }

        for study_id in &report.studies {
            info!(
                target: crate::AUDIT_TARGET,
                study_id = %study_id,
                user = %user.username,
                component_results = report.removed_component_results.len(),
                study_results = report.removed_study_results.len(),
                "removed results"
            );
        }

        report
    }
}

async fn commit(tx: sqlx::Transaction<'static, sqlx::Sqlite>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| Error::query("Failed to commit removal", e))
}

/// Remove every study result in a scope; the caller has checked the study
async fn remove_scope(conn: &mut SqliteConnection, scope: &ResultScope) -> Result<Removal> {
    let mut removal = Removal::default();
    for id in Database::find_study_result_ids(&mut *conn, scope).await? {
        if let Some(result) = Database::get_study_result(&mut *conn, id).await? {
            remove_study_result(&mut *conn, &result, &mut removal).await?;
        }
    }
    Ok(removal)
}

/// Remove one component result; returns its parent study result
///
/// A component result without a resolvable parent is logged and removed anyway.
async fn remove_component_result(
    conn: &mut SqliteConnection,
    result: &ComponentResult,
    removal: &mut Removal,
) -> Result<Option<StudyResult>> {
    let parent = match result.study_result_id {
        Some(id) => Database::get_study_result(&mut *conn, id).await?,
        None => None,
    };

    match &parent {
        Some(parent) => {
            removal.report.studies.insert(parent.study_id);
            removal
                .cleanup
                .push(PendingCleanup::ComponentResult(parent.id, result.id));
        }
        None => {
            error!(
                component_result_id = %result.id,
                study_result_id = ?result.study_result_id,
                "component result has no study result; removing it anyway"
            );
            removal.report.orphaned_component_results.push(result.id);
            if let Some(component) = Database::get_component(&mut *conn, result.component_id).await? {
                removal.report.studies.insert(component.study_id);
            }
        }
    }

    Database::delete_component_result(&mut *conn, result.id).await?;
    removal.report.removed_component_results.push(result.id);
    debug!(component_result_id = %result.id, "removed component result");

    Ok(parent)
}

/// Remove a study result with all of its component results
///
/// The component results are not checked again; their parent was.
async fn remove_study_result(
    conn: &mut SqliteConnection,
    result: &StudyResult,
    removal: &mut Removal,
) -> Result<()> {
    for component_result in Database::find_component_results_of(&mut *conn, result.id).await? {
        Database::delete_component_result(&mut *conn, component_result.id).await?;
        removal.report.removed_component_results.push(component_result.id);
        removal
            .cleanup
            .push(PendingCleanup::ComponentResult(result.id, component_result.id));
    }
    remove_empty_study_result(conn, result, removal).await
}

/// Remove a study result that has no component results left
///
/// Its worker keeps no back-reference, so only the group memberships need
/// detaching. Each group is then removed or persisted.
async fn remove_empty_study_result(
    conn: &mut SqliteConnection,
    result: &StudyResult,
    removal: &mut Removal,
) -> Result<()> {
    if let Some(group_id) = result.active_group_result_id {
        Database::clear_active_group(&mut *conn, result.id).await?;
        remove_or_persist_group(&mut *conn, group_id, removal).await?;
    }
    if let Some(group_id) = result.history_group_result_id {
        Database::clear_history_group(&mut *conn, result.id).await?;
        remove_or_persist_group(&mut *conn, group_id, removal).await?;
    }

    Database::delete_study_result(&mut *conn, result.id).await?;
    removal.report.removed_study_results.push(result.id);
    removal.report.studies.insert(result.study_id);
    removal
        .cleanup
        .push(PendingCleanup::StudyResult(result.id));
    debug!(study_result_id = %result.id, worker_id = %result.worker_id, "removed study result");

    Ok(())
}

/// Delete a group that is finished and memberless, otherwise write it back
async fn remove_or_persist_group(
    conn: &mut SqliteConnection,
    group_id: GroupResultId,
    removal: &mut Removal,
) -> Result<()> {
    let Some(group) = Database::get_group_result(&mut *conn, group_id).await? else {
        return Ok(());
    };

    if group.is_removable() {
        Database::delete_group_result(&mut *conn, group.id).await?;
        removal.report.removed_group_results.push(group.id);
        debug!(group_result_id = %group.id, "removed finished empty group result");
    } else {
        Database::update_group_result(&mut *conn, &group).await?;
        debug!(
            group_result_id = %group.id,
            active = group.active_member_count,
            history = group.history_member_count,
            "kept group result"
        );
    }
    Ok(())
}
