//! Group results. Member counts are derived from the study result foreign keys.

use crate::types::{BatchId, GroupResultId, GroupState};
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, GroupResult};

impl Database {
    /// Insert a new group result
    pub async fn insert_group_result(
        conn: &mut SqliteConnection,
        batch_id: BatchId,
        state: GroupState,
    ) -> Result<GroupResultId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO group_results (batch_id, group_state, start_date) VALUES (?, ?, ?)",
        )
        .bind(batch_id)
        .bind(state.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to insert group result", e))?;

        Ok(GroupResultId(result.last_insert_rowid()))
    }

    /// Get a group result with its current member counts
    pub async fn get_group_result(
        conn: &mut SqliteConnection,
        id: GroupResultId,
    ) -> Result<Option<GroupResult>> {
        sqlx::query_as::<_, GroupResult>(
            r#"
            SELECT
                g.id, g.batch_id, g.group_state, g.start_date, g.end_date,
                (SELECT COUNT(*) FROM study_results WHERE active_group_result_id = g.id)
                    AS active_member_count,
                (SELECT COUNT(*) FROM study_results WHERE history_group_result_id = g.id)
                    AS history_member_count
            FROM group_results g
            WHERE g.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to get group result", e))
    }

    /// Write a group result's state and dates back
    pub async fn update_group_result(conn: &mut SqliteConnection, group: &GroupResult) -> Result<()> {
        sqlx::query("UPDATE group_results SET group_state = ?, end_date = ? WHERE id = ?")
            .bind(group.group_state.as_str())
            .bind(group.end_date)
            .bind(group.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to update group result", e))?;

        Ok(())
    }

    /// Change a group result's lifecycle state
    pub async fn set_group_state(
        conn: &mut SqliteConnection,
        id: GroupResultId,
        state: GroupState,
    ) -> Result<()> {
        let end_date = (state == GroupState::Finished).then(|| chrono::Utc::now().timestamp());

        sqlx::query("UPDATE group_results SET group_state = ?, end_date = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(end_date)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to update group state", e))?;

        Ok(())
    }

    /// Delete a group result row; it must not have members
    pub async fn delete_group_result(conn: &mut SqliteConnection, id: GroupResultId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_results WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to delete group result", e))?;

        Ok(result.rows_affected() > 0)
    }
}
