//! Worker records.

use crate::types::WorkerId;
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, NewWorker, Worker};

impl Database {
    /// Insert a new worker
    pub async fn insert_worker(conn: &mut SqliteConnection, worker: &NewWorker) -> Result<WorkerId> {
        let result =
            sqlx::query("INSERT INTO workers (worker_type, username, comment) VALUES (?, ?, ?)")
                .bind(worker.worker_type.as_str())
                .bind(&worker.username)
                .bind(&worker.comment)
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::query("Failed to insert worker", e))?;

        Ok(WorkerId(result.last_insert_rowid()))
    }

    /// Get a worker by ID
    pub async fn get_worker(conn: &mut SqliteConnection, id: WorkerId) -> Result<Option<Worker>> {
        sqlx::query_as::<_, Worker>(
            "SELECT id, worker_type, username, comment FROM workers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to get worker", e))
    }

    /// Delete a worker; its batch memberships go with it
    ///
    /// The worker must not own study results anymore.
    pub async fn delete_worker(conn: &mut SqliteConnection, id: WorkerId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workers WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to delete worker", e))?;

        Ok(result.rows_affected() > 0)
    }
}
