//! Study result queries: scoped counts and pages, ID resolution, deletion.

use crate::types::{ResultScope, StudyResultId};
use crate::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::scope::push_study_result_filter;
use super::{Database, NewStudyResult, StudyResult};

const STUDY_RESULT_COLUMNS: &str = "sr.id, sr.study_id, sr.batch_id, sr.worker_id, sr.state, \
     sr.start_date, sr.end_date, sr.active_group_result_id, sr.history_group_result_id, \
     sr.url_query_parameters";

impl Database {
    /// Insert a new study result
    pub async fn insert_study_result(
        conn: &mut SqliteConnection,
        result: &NewStudyResult,
    ) -> Result<StudyResultId> {
        let now = chrono::Utc::now().timestamp();

        let row = sqlx::query(
            r#"
            INSERT INTO study_results (
                study_id, batch_id, worker_id, state, start_date,
                active_group_result_id, history_group_result_id, url_query_parameters
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.study_id)
        .bind(result.batch_id)
        .bind(result.worker_id)
        .bind(result.state.as_str())
        .bind(now)
        .bind(result.active_group_result_id)
        .bind(result.history_group_result_id)
        .bind(&result.url_query_parameters)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to insert study result", e))?;

        Ok(StudyResultId(row.last_insert_rowid()))
    }

    /// Get a study result by ID
    pub async fn get_study_result(
        conn: &mut SqliteConnection,
        id: StudyResultId,
    ) -> Result<Option<StudyResult>> {
        let sql = format!("SELECT {STUDY_RESULT_COLUMNS} FROM study_results sr WHERE sr.id = ?");
        sqlx::query_as::<_, StudyResult>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to get study result", e))
    }

    /// Count the study results in a scope
    pub async fn count_study_results(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
    ) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM study_results sr");
        push_study_result_filter(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to count study results", e))?;

        Ok(count.max(0) as u64)
    }

    /// Fetch one page of study results in a scope
    ///
    /// Ordered by study, then by ID, so the results of one study come out
    /// together and in creation order.
    pub async fn find_study_results(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StudyResult>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {STUDY_RESULT_COLUMNS} FROM study_results sr"
        ));
        push_study_result_filter(&mut qb, scope);
        qb.push(" ORDER BY sr.study_id, sr.id LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        qb.build_query_as::<StudyResult>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to fetch study results", e))
    }

    /// Resolve a scope to the IDs of its study results, in page order
    pub async fn find_study_result_ids(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
    ) -> Result<Vec<StudyResultId>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT sr.id FROM study_results sr");
        push_study_result_filter(&mut qb, scope);
        qb.push(" ORDER BY sr.study_id, sr.id");

        qb.build_query_scalar::<StudyResultId>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to resolve study result IDs", e))
    }

    /// Load study results by ID, keeping the requested order
    ///
    /// Fails with `NotFound` naming the first ID that does not exist.
    pub async fn get_study_results_by_ids(
        conn: &mut SqliteConnection,
        ids: &[StudyResultId],
    ) -> Result<Vec<StudyResult>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match Self::get_study_result(&mut *conn, *id).await? {
                Some(result) => results.push(result),
                None => return Err(Error::NotFound(format!("study result {id}"))),
            }
        }
        Ok(results)
    }

    /// Count the component results a study result still owns
    pub async fn count_component_results_of(
        conn: &mut SqliteConnection,
        id: StudyResultId,
    ) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM component_results WHERE study_result_id = ?",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to count component results", e))?;

        Ok(count.max(0) as u64)
    }

    /// Remove a study result from its active group's member set
    pub async fn clear_active_group(conn: &mut SqliteConnection, id: StudyResultId) -> Result<()> {
        sqlx::query("UPDATE study_results SET active_group_result_id = NULL WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to detach study result from active group", e))?;

        Ok(())
    }

    /// Remove a study result from its historical group's member set
    pub async fn clear_history_group(
        conn: &mut SqliteConnection,
        id: StudyResultId,
    ) -> Result<()> {
        sqlx::query("UPDATE study_results SET history_group_result_id = NULL WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to detach study result from history group", e))?;

        Ok(())
    }

    /// Delete a study result row
    ///
    /// Component results must have been removed before.
    pub async fn delete_study_result(conn: &mut SqliteConnection, id: StudyResultId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM study_results WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to delete study result", e))?;

        Ok(result.rows_affected() > 0)
    }
}
