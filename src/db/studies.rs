//! Studies, components, batches, users and study membership.

use crate::types::{BatchId, ComponentId, StudyId, User, WorkerId};
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Batch, Component, Database, NewStudy, Study};

impl Database {
    /// Insert a platform user (no-op if the username already exists)
    pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO users (username, name) VALUES (?, ?)")
            .bind(&user.username)
            .bind(&user.name)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to insert user", e))?;

        Ok(())
    }

    /// Insert a new study
    pub async fn insert_study(conn: &mut SqliteConnection, study: &NewStudy) -> Result<StudyId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query("INSERT INTO studies (title, locked, created_at) VALUES (?, ?, ?)")
            .bind(&study.title)
            .bind(study.locked)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to insert study", e))?;

        Ok(StudyId(result.last_insert_rowid()))
    }

    /// Get a study by ID
    pub async fn get_study(conn: &mut SqliteConnection, id: StudyId) -> Result<Option<Study>> {
        sqlx::query_as::<_, Study>("SELECT id, title, locked, created_at FROM studies WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to get study", e))
    }

    /// Lock or unlock a study
    pub async fn set_study_locked(
        conn: &mut SqliteConnection,
        id: StudyId,
        locked: bool,
    ) -> Result<()> {
        sqlx::query("UPDATE studies SET locked = ? WHERE id = ?")
            .bind(locked)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to update study lock", e))?;

        Ok(())
    }

    /// Add a user to a study's members
    pub async fn add_study_member(
        conn: &mut SqliteConnection,
        study_id: StudyId,
        username: &str,
    ) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO study_members (study_id, username) VALUES (?, ?)")
            .bind(study_id)
            .bind(username)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to add study member", e))?;

        Ok(())
    }

    /// Whether the user is a member of the study
    pub async fn is_study_member(
        conn: &mut SqliteConnection,
        study_id: StudyId,
        username: &str,
    ) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM study_members WHERE study_id = ? AND username = ?",
        )
        .bind(study_id)
        .bind(username)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to check study membership", e))?;

        Ok(count > 0)
    }

    /// Insert a component at the end of a study
    pub async fn insert_component(
        conn: &mut SqliteConnection,
        study_id: StudyId,
        title: &str,
    ) -> Result<ComponentId> {
        let result = sqlx::query(
            r#"
            INSERT INTO components (study_id, title, position)
            VALUES (?, ?, (SELECT COUNT(*) + 1 FROM components WHERE study_id = ?))
            "#,
        )
        .bind(study_id)
        .bind(title)
        .bind(study_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to insert component", e))?;

        Ok(ComponentId(result.last_insert_rowid()))
    }

    /// Get a component by ID
    pub async fn get_component(
        conn: &mut SqliteConnection,
        id: ComponentId,
    ) -> Result<Option<Component>> {
        sqlx::query_as::<_, Component>(
            "SELECT id, study_id, title, position FROM components WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::query("Failed to get component", e))
    }

    /// Insert a batch into a study
    pub async fn insert_batch(
        conn: &mut SqliteConnection,
        study_id: StudyId,
        title: &str,
    ) -> Result<BatchId> {
        let result = sqlx::query("INSERT INTO batches (study_id, title) VALUES (?, ?)")
            .bind(study_id)
            .bind(title)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to insert batch", e))?;

        Ok(BatchId(result.last_insert_rowid()))
    }

    /// Get a batch by ID
    pub async fn get_batch(conn: &mut SqliteConnection, id: BatchId) -> Result<Option<Batch>> {
        sqlx::query_as::<_, Batch>("SELECT id, study_id, title FROM batches WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to get batch", e))
    }

    /// Allow a worker to run a batch
    pub async fn add_batch_worker(
        conn: &mut SqliteConnection,
        batch_id: BatchId,
        worker_id: WorkerId,
    ) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO batch_workers (batch_id, worker_id) VALUES (?, ?)")
            .bind(batch_id)
            .bind(worker_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::query("Failed to add batch worker", e))?;

        Ok(())
    }
}
