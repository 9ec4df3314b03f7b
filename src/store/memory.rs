//! In-memory storage backend.
//!
//! Backs tests and embedded use. A single mutex is plenty here: every
//! operation is a short critical section with no await inside, which
//! also gives the per-key atomicity the trait promises.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::calls::types::{CallLogEntry, CallStatus, ScheduledCall, UserAccount};
use crate::error::StorageError;
use crate::store::traits::Storage;
use crate::triage::types::SenderCategoryState;

#[derive(Default)]
struct Inner {
    /// Keyed by (user_id, sender).
    sender_states: HashMap<(String, String), SenderCategoryState>,
    call_logs: HashMap<Uuid, CallLogEntry>,
    schedules: HashMap<String, ScheduledCall>,
    users: HashMap<String, UserAccount>,
}

/// HashMap-backed storage.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn run_migrations(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn sender_state(
        &self,
        user_id: &str,
        sender: &str,
    ) -> Result<Option<SenderCategoryState>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sender_states
            .get(&(user_id.to_string(), sender.to_string()))
            .cloned())
    }

    async fn upsert_sender_state(&self, state: &SenderCategoryState) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.sender_states.insert(
            (state.user_id.clone(), state.sender.clone()),
            state.clone(),
        );
        Ok(())
    }

    async fn sender_states_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<SenderCategoryState>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut states: Vec<_> = inner
            .sender_states
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        states.sort_by(|a, b| a.sender.cmp(&b.sender));
        Ok(states)
    }

    async fn insert_call_log(&self, entry: &CallLogEntry) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.call_logs.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update_call_log(&self, entry: &CallLogEntry) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.call_logs.contains_key(&entry.id) {
            return Err(StorageError::NotFound {
                entity: "call_log".into(),
                id: entry.id.to_string(),
            });
        }
        inner.call_logs.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn call_log(&self, id: Uuid) -> Result<Option<CallLogEntry>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.call_logs.get(&id).cloned())
    }

    async fn open_call_logs(&self) -> Result<Vec<CallLogEntry>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut open: Vec<_> = inner
            .call_logs
            .values()
            .filter(|e| {
                matches!(e.status, CallStatus::Initiated | CallStatus::InProgress)
            })
            .cloned()
            .collect();
        open.sort_by_key(|e| e.scheduled_time);
        Ok(open)
    }

    async fn call_logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<CallLogEntry>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut logs: Vec<_> = inner
            .call_logs
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.scheduled_time.cmp(&a.scheduled_time));
        logs.truncate(limit);
        Ok(logs)
    }

    async fn upsert_schedule(&self, schedule: &ScheduledCall) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledCall>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<_> = inner
            .schedules
            .values()
            .filter(|s| s.is_active && s.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        Ok(due)
    }

    async fn active_schedules(&self) -> Result<Vec<ScheduledCall>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut active: Vec<_> = inner
            .schedules
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    async fn update_schedule_next_run(
        &self,
        id: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let schedule = inner.schedules.get_mut(id).ok_or_else(|| StorageError::NotFound {
            entity: "scheduled_call".into(),
            id: id.to_string(),
        })?;
        schedule.next_run_at = next_run_at;
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserAccount>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(user_id).cloned())
    }

    async fn upsert_user(&self, user: &UserAccount) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}
