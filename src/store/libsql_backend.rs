//! libSQL storage backend — async `Storage` trait implementation.
//!
//! Stores a single connection reused for all operations.
//! `libsql::Connection` is `Send + Sync` and safe for concurrent async
//! use; every write here is a single statement, which is where the
//! per-key atomicity the trait promises comes from.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::calls::types::{CallLogEntry, CallStatus, CallType, ScheduledCall, UserAccount};
use crate::error::StorageError;
use crate::store::migrations;
use crate::store::traits::Storage;
use crate::triage::types::{Category, SenderCategoryState};

/// libSQL database backend.
pub struct LibSqlStorage {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStorage {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to a libsql Value (Text or Null).
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const SENDER_STATE_COLUMNS: &str =
    "user_id, sender, category, importance, email_count, latest_subject, last_email_date";

fn row_to_sender_state(row: &libsql::Row) -> Result<SenderCategoryState, libsql::Error> {
    let category_str: String = row.get(2)?;
    let date_str: String = row.get(6)?;
    Ok(SenderCategoryState {
        user_id: row.get(0)?,
        sender: row.get(1)?,
        category: Category::from_wire(&category_str),
        importance: row.get::<i64>(3)? as u8,
        email_count: row.get::<i64>(4)? as u32,
        latest_subject: row.get(5)?,
        last_email_date: parse_datetime(&date_str),
    })
}

const CALL_LOG_COLUMNS: &str = "id, user_id, phone_number, call_type, script, status, \
     provider_call_id, scheduled_time, completed_time";

fn row_to_call_log(row: &libsql::Row) -> Result<CallLogEntry, libsql::Error> {
    let id_str: String = row.get(0)?;
    let call_type_str: String = row.get(3)?;
    let status_str: String = row.get(5)?;
    let scheduled_str: String = row.get(7)?;
    let completed_str: Option<String> = row.get(8).ok();
    Ok(CallLogEntry {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1)?,
        phone_number: row.get(2)?,
        call_type: CallType::from_wire(&call_type_str),
        script: row.get(4)?,
        status: CallStatus::from_wire(&status_str),
        provider_call_id: row.get::<String>(6).ok(),
        scheduled_time: parse_datetime(&scheduled_str),
        completed_time: completed_str.as_deref().map(parse_datetime),
    })
}

const SCHEDULE_COLUMNS: &str =
    "id, user_id, phone_number, call_type, schedule, next_run_at, is_active";

fn row_to_schedule(row: &libsql::Row) -> Result<ScheduledCall, libsql::Error> {
    let call_type_str: String = row.get(3)?;
    let next_run_str: String = row.get(5)?;
    Ok(ScheduledCall {
        id: row.get(0)?,
        user_id: row.get(1)?,
        phone_number: row.get(2)?,
        call_type: CallType::from_wire(&call_type_str),
        schedule: row.get(4)?,
        next_run_at: parse_datetime(&next_run_str),
        is_active: row.get::<i64>(6)? != 0,
    })
}

fn row_to_user(row: &libsql::Row) -> Result<UserAccount, libsql::Error> {
    Ok(UserAccount {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        voice_id: row.get::<String>(2).ok(),
        email_connected: row.get::<i64>(3)? != 0,
    })
}

#[async_trait]
impl Storage for LibSqlStorage {
    async fn run_migrations(&self) -> Result<(), StorageError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sender category state ───────────────────────────────────────

    async fn sender_state(
        &self,
        user_id: &str,
        sender: &str,
    ) -> Result<Option<SenderCategoryState>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SENDER_STATE_COLUMNS} FROM sender_states \
                     WHERE user_id = ?1 AND sender = ?2"
                ),
                params![user_id, sender],
            )
            .await
            .map_err(|e| StorageError::Query(format!("sender_state: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let state = row_to_sender_state(&row)
                    .map_err(|e| StorageError::Query(format!("sender_state row parse: {e}")))?;
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("sender_state: {e}"))),
        }
    }

    async fn upsert_sender_state(&self, state: &SenderCategoryState) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO sender_states \
                 (user_id, sender, category, importance, email_count, latest_subject, \
                  last_email_date, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT (user_id, sender) DO UPDATE SET \
                    category = excluded.category, \
                    importance = excluded.importance, \
                    email_count = excluded.email_count, \
                    latest_subject = excluded.latest_subject, \
                    last_email_date = excluded.last_email_date, \
                    updated_at = excluded.updated_at",
                params![
                    state.user_id.as_str(),
                    state.sender.as_str(),
                    state.category.as_str(),
                    i64::from(state.importance),
                    i64::from(state.email_count),
                    state.latest_subject.as_str(),
                    state.last_email_date.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("upsert_sender_state: {e}")))?;
        Ok(())
    }

    async fn sender_states_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<SenderCategoryState>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SENDER_STATE_COLUMNS} FROM sender_states \
                     WHERE user_id = ?1 ORDER BY sender"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("sender_states_for_user: {e}")))?;

        let mut states = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let state = row_to_sender_state(&row).map_err(|e| {
                StorageError::Query(format!("sender_states_for_user row parse: {e}"))
            })?;
            states.push(state);
        }
        Ok(states)
    }

    // ── Call log ────────────────────────────────────────────────────

    async fn insert_call_log(&self, entry: &CallLogEntry) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO call_logs \
                 (id, user_id, phone_number, call_type, script, status, provider_call_id, \
                  scheduled_time, completed_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id.to_string(),
                    entry.user_id.as_str(),
                    entry.phone_number.as_str(),
                    entry.call_type.as_str(),
                    entry.script.as_str(),
                    entry.status.as_str(),
                    opt_text_owned(entry.provider_call_id.clone()),
                    entry.scheduled_time.to_rfc3339(),
                    opt_text_owned(entry.completed_time.map(|t| t.to_rfc3339())),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("insert_call_log: {e}")))?;
        Ok(())
    }

    async fn update_call_log(&self, entry: &CallLogEntry) -> Result<(), StorageError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE call_logs SET status = ?2, provider_call_id = ?3, \
                 completed_time = ?4, updated_at = ?5 WHERE id = ?1",
                params![
                    entry.id.to_string(),
                    entry.status.as_str(),
                    opt_text_owned(entry.provider_call_id.clone()),
                    opt_text_owned(entry.completed_time.map(|t| t.to_rfc3339())),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_call_log: {e}")))?;

        if affected == 0 {
            return Err(StorageError::NotFound {
                entity: "call_log".into(),
                id: entry.id.to_string(),
            });
        }
        Ok(())
    }

    async fn call_log(&self, id: Uuid) -> Result<Option<CallLogEntry>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CALL_LOG_COLUMNS} FROM call_logs WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("call_log: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let entry = row_to_call_log(&row)
                    .map_err(|e| StorageError::Query(format!("call_log row parse: {e}")))?;
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("call_log: {e}"))),
        }
    }

    async fn open_call_logs(&self) -> Result<Vec<CallLogEntry>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CALL_LOG_COLUMNS} FROM call_logs \
                     WHERE status IN ('initiated', 'in-progress') \
                     ORDER BY scheduled_time"
                ),
                (),
            )
            .await
            .map_err(|e| StorageError::Query(format!("open_call_logs: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let entry = row_to_call_log(&row)
                .map_err(|e| StorageError::Query(format!("open_call_logs row parse: {e}")))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn call_logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<CallLogEntry>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CALL_LOG_COLUMNS} FROM call_logs \
                     WHERE user_id = ?1 ORDER BY scheduled_time DESC LIMIT ?2"
                ),
                params![user_id, limit as i64],
            )
            .await
            .map_err(|e| StorageError::Query(format!("call_logs_for_user: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let entry = row_to_call_log(&row)
                .map_err(|e| StorageError::Query(format!("call_logs_for_user row parse: {e}")))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    // ── Scheduled calls ─────────────────────────────────────────────

    async fn upsert_schedule(&self, schedule: &ScheduledCall) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO scheduled_calls \
                 (id, user_id, phone_number, call_type, schedule, next_run_at, is_active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT (id) DO UPDATE SET \
                    phone_number = excluded.phone_number, \
                    call_type = excluded.call_type, \
                    schedule = excluded.schedule, \
                    next_run_at = excluded.next_run_at, \
                    is_active = excluded.is_active",
                params![
                    schedule.id.as_str(),
                    schedule.user_id.as_str(),
                    schedule.phone_number.as_str(),
                    schedule.call_type.as_str(),
                    schedule.schedule.as_str(),
                    schedule.next_run_at.to_rfc3339(),
                    i64::from(schedule.is_active),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("upsert_schedule: {e}")))?;
        Ok(())
    }

    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledCall>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM scheduled_calls \
                     WHERE is_active = 1 AND next_run_at <= ?1 ORDER BY next_run_at"
                ),
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("due_schedules: {e}")))?;

        let mut schedules = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let schedule = row_to_schedule(&row)
                .map_err(|e| StorageError::Query(format!("due_schedules row parse: {e}")))?;
            schedules.push(schedule);
        }
        Ok(schedules)
    }

    async fn active_schedules(&self) -> Result<Vec<ScheduledCall>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM scheduled_calls \
                     WHERE is_active = 1 ORDER BY id"
                ),
                (),
            )
            .await
            .map_err(|e| StorageError::Query(format!("active_schedules: {e}")))?;

        let mut schedules = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let schedule = row_to_schedule(&row)
                .map_err(|e| StorageError::Query(format!("active_schedules row parse: {e}")))?;
            schedules.push(schedule);
        }
        Ok(schedules)
    }

    async fn update_schedule_next_run(
        &self,
        id: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE scheduled_calls SET next_run_at = ?2 WHERE id = ?1",
                params![id, next_run_at.to_rfc3339()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_schedule_next_run: {e}")))?;

        if affected == 0 {
            return Err(StorageError::NotFound {
                entity: "scheduled_call".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn user(&self, user_id: &str) -> Result<Option<UserAccount>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, phone_number, voice_id, email_connected FROM users WHERE id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user = row_to_user(&row)
                    .map_err(|e| StorageError::Query(format!("user row parse: {e}")))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("user: {e}"))),
        }
    }

    async fn upsert_user(&self, user: &UserAccount) -> Result<(), StorageError> {
        self.conn()
            .execute(
                "INSERT INTO users (id, phone_number, voice_id, email_connected) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (id) DO UPDATE SET \
                    phone_number = excluded.phone_number, \
                    voice_id = excluded.voice_id, \
                    email_connected = excluded.email_connected",
                params![
                    user.id.as_str(),
                    user.phone_number.as_str(),
                    opt_text_owned(user.voice_id.clone()),
                    i64::from(user.email_connected),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("upsert_user: {e}")))?;
        Ok(())
    }
}
