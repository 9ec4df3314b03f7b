//! Shared types for call scheduling and dispatch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Call type ───────────────────────────────────────────────────────

/// Purpose of an outbound call; selects the script template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallType {
    DailyDigest,
    UrgentAlert,
    WeeklySummary,
    Reminder,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::DailyDigest => "daily-digest",
            CallType::UrgentAlert => "urgent-alert",
            CallType::WeeklySummary => "weekly-summary",
            CallType::Reminder => "reminder",
        }
    }

    /// Map a stored string back into the enum; unknown values default to
    /// the digest (harmless script, no false urgency).
    pub fn from_wire(s: &str) -> Self {
        match s {
            "urgent-alert" => CallType::UrgentAlert,
            "weekly-summary" => CallType::WeeklySummary,
            "reminder" => CallType::Reminder,
            _ => CallType::DailyDigest,
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Call status ─────────────────────────────────────────────────────

/// Lifecycle of a dispatched call.
///
/// `Pending` exists because the dispatcher logs a write-ahead row before
/// submitting to the gateway. Transitions are monotonic; `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Pending,
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Initiated => "initiated",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }

    pub fn from_wire(s: &str) -> Self {
        match s {
            "initiated" => CallStatus::Initiated,
            "in-progress" => CallStatus::InProgress,
            "completed" => CallStatus::Completed,
            "failed" => CallStatus::Failed,
            _ => CallStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }

    /// Whether `next` is a legal forward step from this status.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        match (self, next) {
            (Pending, Initiated) | (Pending, Failed) => true,
            (Initiated, InProgress) | (Initiated, Completed) | (Initiated, Failed) => true,
            (InProgress, Completed) | (InProgress, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Call script ─────────────────────────────────────────────────────

/// A spoken-word script, generated on demand. Ephemeral — the call log
/// keeps the body for audit, nothing else persists it.
#[derive(Debug, Clone, PartialEq)]
pub struct CallScript {
    pub body: String,
    pub estimated_duration: Duration,
    pub call_type: CallType,
}

// ── Scheduled call ──────────────────────────────────────────────────

/// A user's standing request for recurring calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub id: String,
    pub user_id: String,
    pub phone_number: String,
    pub call_type: CallType,
    /// Cron expression driving the recurrence.
    pub schedule: String,
    /// Next time the scheduler tick should fire this entry.
    pub next_run_at: DateTime<Utc>,
    pub is_active: bool,
}

// ── Call log ────────────────────────────────────────────────────────

/// One dispatched (or refused) call attempt.
///
/// Created at dispatch time, mutated only by the reconciliation loop,
/// frozen once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub phone_number: String,
    pub call_type: CallType,
    pub script: String,
    pub status: CallStatus,
    pub provider_call_id: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub completed_time: Option<DateTime<Utc>>,
}

impl CallLogEntry {
    /// Fresh write-ahead entry, not yet submitted to the gateway.
    pub fn pending(
        user_id: &str,
        phone_number: &str,
        call_type: CallType,
        script: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            phone_number: phone_number.to_string(),
            call_type,
            script: script.to_string(),
            status: CallStatus::Pending,
            provider_call_id: None,
            scheduled_time,
            completed_time: None,
        }
    }
}

// ── User account ────────────────────────────────────────────────────

/// The slice of user data the scheduler needs. Owned by the surrounding
/// system; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub phone_number: String,
    /// Provider voice to read scripts with.
    pub voice_id: Option<String>,
    /// Whether the user has working email credentials. Users without
    /// them are skipped by the schedule tick, not retried.
    pub email_connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        use CallStatus::*;
        assert!(Pending.can_transition_to(Initiated));
        assert!(Pending.can_transition_to(Failed));
        assert!(Initiated.can_transition_to(InProgress));
        assert!(Initiated.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));

        // No going back, no leaving terminal states.
        assert!(!Initiated.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(Initiated));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Initiated));
        assert!(!Completed.can_transition_to(InProgress));
    }

    #[test]
    fn terminal_statuses() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(!CallStatus::Pending.is_terminal());
        assert!(!CallStatus::Initiated.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
    }

    #[test]
    fn status_wire_roundtrip() {
        for status in [
            CallStatus::Pending,
            CallStatus::Initiated,
            CallStatus::InProgress,
            CallStatus::Completed,
            CallStatus::Failed,
        ] {
            assert_eq!(CallStatus::from_wire(status.as_str()), status);
        }
    }

    #[test]
    fn call_type_wire_roundtrip() {
        for call_type in [
            CallType::DailyDigest,
            CallType::UrgentAlert,
            CallType::WeeklySummary,
            CallType::Reminder,
        ] {
            assert_eq!(CallType::from_wire(call_type.as_str()), call_type);
        }
        assert_eq!(CallType::from_wire("something-else"), CallType::DailyDigest);
    }

    #[test]
    fn pending_entry_starts_clean() {
        let entry = CallLogEntry::pending(
            "u1",
            "+15551230000",
            CallType::DailyDigest,
            "Good morning!",
            Utc::now(),
        );
        assert_eq!(entry.status, CallStatus::Pending);
        assert!(entry.provider_call_id.is_none());
        assert!(entry.completed_time.is_none());
    }
}
