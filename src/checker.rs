//! Permission checks for result entities.
//!
//! A user may act on a result only as a member of the owning study. When
//! `must_not_be_locked` is set, a locked study is `Forbidden` as well.
//! Every check resolves the owning study with an explicit repository call
//! on the caller's connection, so it runs inside the caller's transaction.

use crate::db::{ComponentResult, Database, Study, StudyResult, Worker};
use crate::error::{Error, Result};
use crate::types::{StudyId, User, WorkerType};
use sqlx::SqliteConnection;

/// Check that the user may act on a study and return it
pub async fn check_study(
    conn: &mut SqliteConnection,
    study_id: StudyId,
    user: &User,
    must_not_be_locked: bool,
) -> Result<Study> {
    let study = Database::get_study(&mut *conn, study_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("study {study_id}")))?;

    if !Database::is_study_member(&mut *conn, study_id, &user.username).await? {
        return Err(Error::Forbidden(format!(
            "user {} isn't allowed to access study {}",
            user.username, study_id
        )));
    }

    if must_not_be_locked && study.locked {
        return Err(Error::Forbidden(format!(
            "study {study_id} is locked; unlock it first"
        )));
    }

    Ok(study)
}

/// Check one study result
pub async fn check_study_result(
    conn: &mut SqliteConnection,
    result: &StudyResult,
    user: &User,
    must_not_be_locked: bool,
) -> Result<Study> {
    check_study(&mut *conn, result.study_id, user, must_not_be_locked)
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => Error::BadRequest(format!(
                "study result {} doesn't belong to an existing study",
                result.id
            )),
            Error::Forbidden(reason) => {
                Error::Forbidden(format!("study result {}: {reason}", result.id))
            }
            other => other,
        })
}

/// Check one component result via its component's study
pub async fn check_component_result(
    conn: &mut SqliteConnection,
    result: &ComponentResult,
    user: &User,
    must_not_be_locked: bool,
) -> Result<Study> {
    let component = Database::get_component(&mut *conn, result.component_id)
        .await?
        .ok_or_else(|| {
            Error::BadRequest(format!(
                "component result {} doesn't belong to an existing component",
                result.id
            ))
        })?;

    check_study(&mut *conn, component.study_id, user, must_not_be_locked)
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => Error::BadRequest(format!(
                "component result {} doesn't belong to an existing study",
                result.id
            )),
            Error::Forbidden(reason) => {
                Error::Forbidden(format!("component result {}: {reason}", result.id))
            }
            other => other,
        })
}

/// Check every study result; the first failure aborts
pub async fn check_study_results(
    conn: &mut SqliteConnection,
    results: &[StudyResult],
    user: &User,
    must_not_be_locked: bool,
) -> Result<()> {
    for result in results {
        check_study_result(&mut *conn, result, user, must_not_be_locked).await?;
    }
    Ok(())
}

/// Check every component result; the first failure aborts
pub async fn check_component_results(
    conn: &mut SqliteConnection,
    results: &[ComponentResult],
    user: &User,
    must_not_be_locked: bool,
) -> Result<()> {
    for result in results {
        check_component_result(&mut *conn, result, user, must_not_be_locked).await?;
    }
    Ok(())
}

/// Workers tied to a platform user are never removed
pub fn check_worker_removable(worker: &Worker) -> Result<()> {
    if worker.worker_type == WorkerType::Jatos {
        return Err(Error::BadRequest(format!(
            "worker {} belongs to user {} and can't be removed",
            worker.id,
            worker.username.as_deref().unwrap_or("?")
        )));
    }
    Ok(())
}
