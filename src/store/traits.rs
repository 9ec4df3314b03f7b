//! Unified `Storage` trait — single async interface for all persistence.
//!
//! The core never implements locking itself; it relies on each backend
//! providing per-key atomic updates (single-row upserts/updates) for the
//! sender-state merge and the call-log state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calls::types::{CallLogEntry, ScheduledCall, UserAccount};
use crate::error::StorageError;
use crate::triage::types::SenderCategoryState;

/// Backend-agnostic storage covering sender state, call logs, schedules,
/// and the user slice the scheduler reads.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StorageError>;

    // ── Sender category state ───────────────────────────────────────

    /// Get one sender's state for a user.
    async fn sender_state(
        &self,
        user_id: &str,
        sender: &str,
    ) -> Result<Option<SenderCategoryState>, StorageError>;

    /// Insert or replace a sender's state (atomic per `(user, sender)` key).
    async fn upsert_sender_state(&self, state: &SenderCategoryState) -> Result<(), StorageError>;

    /// All sender states for a user.
    async fn sender_states_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<SenderCategoryState>, StorageError>;

    // ── Call log ────────────────────────────────────────────────────

    /// Insert a new call log entry.
    async fn insert_call_log(&self, entry: &CallLogEntry) -> Result<(), StorageError>;

    /// Replace a call log entry by id (atomic per id).
    async fn update_call_log(&self, entry: &CallLogEntry) -> Result<(), StorageError>;

    /// Get a call log entry by id.
    async fn call_log(&self, id: Uuid) -> Result<Option<CallLogEntry>, StorageError>;

    /// All entries still in flight (initiated / in-progress) — the
    /// reconciliation loop's work list.
    async fn open_call_logs(&self) -> Result<Vec<CallLogEntry>, StorageError>;

    /// A user's call history, most recent first.
    async fn call_logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<CallLogEntry>, StorageError>;

    // ── Scheduled calls ─────────────────────────────────────────────

    /// Insert or replace a schedule.
    async fn upsert_schedule(&self, schedule: &ScheduledCall) -> Result<(), StorageError>;

    /// Active schedules whose `next_run_at` has arrived.
    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledCall>, StorageError>;

    /// Every active schedule, due or not (the scan loop's user list).
    async fn active_schedules(&self) -> Result<Vec<ScheduledCall>, StorageError>;

    /// Move a schedule's next fire time forward (atomic per id).
    async fn update_schedule_next_run(
        &self,
        id: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Get a user account by id.
    async fn user(&self, user_id: &str) -> Result<Option<UserAccount>, StorageError>;

    /// Insert or replace a user account.
    async fn upsert_user(&self, user: &UserAccount) -> Result<(), StorageError>;
}
