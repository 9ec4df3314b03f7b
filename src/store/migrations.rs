//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()`
//! checks the current version and applies only the new ones
//! sequentially.

use libsql::Connection;

use crate::error::StorageError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS sender_states (
            user_id TEXT NOT NULL,
            sender TEXT NOT NULL,
            category TEXT NOT NULL,
            importance INTEGER NOT NULL,
            email_count INTEGER NOT NULL,
            latest_subject TEXT NOT NULL,
            last_email_date TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, sender)
        );
        CREATE INDEX IF NOT EXISTS idx_sender_states_user ON sender_states(user_id);
        CREATE INDEX IF NOT EXISTS idx_sender_states_category ON sender_states(user_id, category);

        CREATE TABLE IF NOT EXISTS call_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            phone_number TEXT NOT NULL,
            call_type TEXT NOT NULL,
            script TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            provider_call_id TEXT,
            scheduled_time TEXT NOT NULL,
            completed_time TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_call_logs_user ON call_logs(user_id);
        CREATE INDEX IF NOT EXISTS idx_call_logs_status ON call_logs(status);

        CREATE TABLE IF NOT EXISTS scheduled_calls (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            phone_number TEXT NOT NULL,
            call_type TEXT NOT NULL,
            schedule TEXT NOT NULL,
            next_run_at TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_scheduled_calls_next_run
            ON scheduled_calls(is_active, next_run_at);

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            phone_number TEXT NOT NULL,
            voice_id TEXT,
            email_connected INTEGER NOT NULL DEFAULT 0
        );
    "#,
}];

/// Run all pending migrations against the connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StorageError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        conn.execute_batch(migration.sql).await.map_err(|e| {
            StorageError::Migration(format!(
                "Migration V{} ({}) failed: {e}",
                migration.version, migration.name
            ))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| {
            StorageError::Migration(format!(
                "Failed to record migration V{}: {e}",
                migration.version
            ))
        })?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, StorageError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StorageError::Migration(format!("Failed to read migration version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| StorageError::Migration(format!("Bad version row: {e}"))),
        Ok(None) => Ok(0),
        Err(e) => Err(StorageError::Migration(format!(
            "Failed to read migration version: {e}"
        ))),
    }
}
