//! Component result queries: scoped counts and pages, ID resolution, deletion.

use crate::types::{ComponentResultId, ResultScope, StudyResultId};
use crate::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::scope::push_component_result_filter;
use super::{ComponentResult, Database, NewComponentResult};

const COMPONENT_RESULT_COLUMNS: &str =
    "cr.id, cr.study_result_id, cr.component_id, cr.state, cr.start_date, cr.end_date, cr.data";

const COMPONENT_RESULT_FROM: &str =
    " FROM component_results cr LEFT JOIN study_results sr ON sr.id = cr.study_result_id";

impl Database {
    /// Insert a new component result
    pub async fn insert_component_result(
        conn: &mut SqliteConnection,
        result: &NewComponentResult,
    ) -> Result<ComponentResultId> {
        let now = chrono::Utc::now().timestamp();

        let row = sqlx::query(
            r#"
            INSERT INTO component_results (study_result_id, component_id, state, start_date, data)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.study_result_id)
        .bind(result.component_id)
        .bind(result.state.as_str())
        .bind(now)
        .bind(&result.data)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to insert component result", e))?;

        Ok(ComponentResultId(row.last_insert_rowid()))
    }

    /// Get a component result by ID
    pub async fn get_component_result(
        conn: &mut SqliteConnection,
        id: ComponentResultId,
    ) -> Result<Option<ComponentResult>> {
        let sql = format!(
            "SELECT {COMPONENT_RESULT_COLUMNS} FROM component_results cr WHERE cr.id = ?"
        );
        sqlx::query_as::<_, ComponentResult>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to get component result", e))
    }

    /// Count the component results in a scope
    pub async fn count_component_results(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
    ) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*){COMPONENT_RESULT_FROM}"));
        push_component_result_filter(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to count component results", e))?;

        Ok(count.max(0) as u64)
    }

    /// Fetch one page of component results in a scope
    ///
    /// Ordered by parent study result, then by ID, so a study result's
    /// components come out together and in creation order.
    pub async fn find_component_results(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<ComponentResult>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COMPONENT_RESULT_COLUMNS}{COMPONENT_RESULT_FROM}"
        ));
        push_component_result_filter(&mut qb, scope);
        qb.push(" ORDER BY cr.study_result_id, cr.id LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        qb.build_query_as::<ComponentResult>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to fetch component results", e))
    }

    /// Resolve a scope to the IDs of its component results
    pub async fn find_component_result_ids(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
    ) -> Result<Vec<ComponentResultId>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT cr.id{COMPONENT_RESULT_FROM}"));
        push_component_result_filter(&mut qb, scope);
        qb.push(" ORDER BY cr.study_result_id, cr.id");

        qb.build_query_scalar::<ComponentResultId>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to resolve component result IDs", e))
    }

    /// IDs of the component results in a scope that have no study result
    pub async fn find_orphaned_component_result_ids(
        conn: &mut SqliteConnection,
        scope: &ResultScope,
    ) -> Result<Vec<ComponentResultId>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT cr.id{COMPONENT_RESULT_FROM}"));
        push_component_result_filter(&mut qb, scope);
        qb.push(" AND cr.study_result_id IS NULL ORDER BY cr.id");

        qb.build_query_scalar::<ComponentResultId>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to find orphaned component results", e))
    }

    /// Load component results by ID, keeping the requested order
    ///
    /// Fails with `NotFound` naming the first ID that does not exist.
    pub async fn get_component_results_by_ids(
        conn: &mut SqliteConnection,
        ids: &[ComponentResultId],
    ) -> Result<Vec<ComponentResult>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match Self::get_component_result(&mut *conn, *id).await? {
                Some(result) => results.push(result),
                None => return Err(Error::NotFound(format!("component result {id}"))),
            }
        }
        Ok(results)
    }

    /// All component results of one study result, in creation order
    pub async fn find_component_results_of(
        conn: &mut SqliteConnection,
        study_result_id: StudyResultId,
    ) -> Result<Vec<ComponentResult>> {
        let sql = format!(
            "SELECT {COMPONENT_RESULT_COLUMNS} FROM component_results cr \
             WHERE cr.study_result_id = ? ORDER BY cr.id"
        );
        sqlx::query_as::<_, ComponentResult>(&sql)
            .bind(study_result_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to fetch component results of study result", e))
    }

    /// Delete a component result row
    pub async fn delete_component_result(
        conn: &mut SqliteConnection,
        id: ComponentResultId,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM component_results WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to delete component result", e))?;

        Ok(result.rows_affected() > 0)
    }
}
