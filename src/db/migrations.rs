//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

/// Schema of migration v1, one statement per entry
const SCHEMA_V1: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE users (
            username TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    ),
    (
        "studies",
        r#"
        CREATE TABLE studies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            locked INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "study_members",
        r#"
        CREATE TABLE study_members (
            study_id INTEGER NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
            username TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
            PRIMARY KEY (study_id, username)
        )
        "#,
    ),
    (
        "components",
        r#"
        CREATE TABLE components (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            study_id INTEGER NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            position INTEGER NOT NULL
        )
        "#,
    ),
    (
        "batches",
        r#"
        CREATE TABLE batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            study_id INTEGER NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
            title TEXT NOT NULL
        )
        "#,
    ),
    (
        "workers",
        r#"
        CREATE TABLE workers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            worker_type TEXT NOT NULL,
            username TEXT REFERENCES users(username),
            comment TEXT
        )
        "#,
    ),
    (
        "batch_workers",
        r#"
        CREATE TABLE batch_workers (
            batch_id INTEGER NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
            worker_id INTEGER NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
            PRIMARY KEY (batch_id, worker_id)
        )
        "#,
    ),
    (
        "group_results",
        r#"
        CREATE TABLE group_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            group_state TEXT NOT NULL,
            start_date INTEGER NOT NULL,
            end_date INTEGER
        )
        "#,
    ),
    (
        "study_results",
        r#"
        CREATE TABLE study_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            study_id INTEGER NOT NULL REFERENCES studies(id),
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            worker_id INTEGER NOT NULL REFERENCES workers(id),
            state TEXT NOT NULL,
            start_date INTEGER NOT NULL,
            end_date INTEGER,
            active_group_result_id INTEGER REFERENCES group_results(id),
            history_group_result_id INTEGER REFERENCES group_results(id),
            url_query_parameters TEXT
        )
        "#,
    ),
    (
        "component_results",
        r#"
        CREATE TABLE component_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            study_result_id INTEGER REFERENCES study_results(id),
            component_id INTEGER NOT NULL REFERENCES components(id),
            state TEXT NOT NULL,
            start_date INTEGER NOT NULL,
            end_date INTEGER,
            data TEXT
        )
        "#,
    ),
    (
        "idx_study_results_study",
        "CREATE INDEX idx_study_results_study ON study_results(study_id)",
    ),
    (
        "idx_study_results_batch",
        "CREATE INDEX idx_study_results_batch ON study_results(batch_id)",
    ),
    (
        "idx_study_results_worker",
        "CREATE INDEX idx_study_results_worker ON study_results(worker_id)",
    ),
    (
        "idx_study_results_active_group",
        "CREATE INDEX idx_study_results_active_group ON study_results(active_group_result_id)",
    ),
    (
        "idx_study_results_history_group",
        "CREATE INDEX idx_study_results_history_group ON study_results(history_group_result_id)",
    ),
    (
        "idx_component_results_parent",
        "CREATE INDEX idx_component_results_parent ON component_results(study_result_id)",
    ),
    (
        "idx_component_results_component",
        "CREATE INDEX idx_component_results_component ON component_results(component_id)",
    ),
];

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Connect to database with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create the result hierarchy schema
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            for (name, statement) in SCHEMA_V1 {
                sqlx::query(*statement)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to create {}: {}",
                            name, e
                        )))
                    })?;
            }
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    /// Record a migration version
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
