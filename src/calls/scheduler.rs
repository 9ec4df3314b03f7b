//! Call scheduler — decides who gets called, builds the script, and
//! hands off to the dispatcher.
//!
//! Two trigger paths:
//! 1. a periodic tick over active `ScheduledCall`s whose `next_run_at`
//!    has arrived — users without working email credentials are skipped,
//!    not retried;
//! 2. an urgent fast path invoked synchronously by the triage pipeline
//!    when a scan produces `call-me` senders, bypassing the schedule.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::calls::dispatcher::{CallDispatcher, DispatchRequest};
use crate::calls::types::{CallLogEntry, CallType, ScheduledCall};
use crate::error::{ConfigError, StorageError};
use crate::script::{ScriptRequest, ScriptSynthesizer};
use crate::store::Storage;
use crate::triage::types::{Category, CategoryStats, SenderCategoryState};

/// Schedules and triggers outbound calls.
pub struct CallScheduler {
    store: Arc<dyn Storage>,
    dispatcher: Arc<CallDispatcher>,
    synthesizer: ScriptSynthesizer,
}

impl CallScheduler {
    pub fn new(
        store: Arc<dyn Storage>,
        dispatcher: Arc<CallDispatcher>,
        synthesizer: ScriptSynthesizer,
    ) -> Self {
        Self {
            store,
            dispatcher,
            synthesizer,
        }
    }

    /// One scheduler pass: dispatch every due schedule.
    ///
    /// Per-schedule failures are logged and skipped; the tick always
    /// finishes the sweep.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let due = match self.store.due_schedules(now).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Could not list due schedules");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        info!(count = due.len(), "Dispatching due scheduled calls");
        for schedule in &due {
            if let Err(e) = self.schedule_and_dispatch(schedule, now).await {
                warn!(
                    schedule_id = %schedule.id,
                    error = %e,
                    "Scheduled dispatch failed"
                );
            }
        }
    }

    /// Run one due schedule: check the user, build the script, dispatch,
    /// advance `next_run_at`.
    ///
    /// Returns `None` when the user was skipped (missing account or no
    /// email credentials); the schedule still advances so the skip is
    /// not retried until the next recurrence.
    pub async fn schedule_and_dispatch(
        &self,
        schedule: &ScheduledCall,
        now: DateTime<Utc>,
    ) -> Result<Option<CallLogEntry>, StorageError> {
        let user = match self.store.user(&schedule.user_id).await? {
            None => {
                warn!(user_id = %schedule.user_id, "Skipping schedule: unknown user");
                None
            }
            Some(user) if !user.email_connected => {
                debug!(
                    user_id = %user.id,
                    "Skipping schedule: user has no email credentials"
                );
                None
            }
            Some(user) => Some(user),
        };

        // Advance before dispatching so a crash mid-call cannot re-fire
        // the same slot in a tight loop.
        self.advance(schedule, now).await?;

        let Some(user) = user else {
            return Ok(None);
        };

        let states = self.store.sender_states_for_user(&user.id).await?;
        let stats = CategoryStats::from_states(&states);
        let script = self.synthesizer.generate_script(&ScriptRequest {
            call_type: schedule.call_type,
            stats: &stats,
            highlights: &states,
            reminder_category: reminder_target(schedule.call_type, &stats),
        });

        let entry = self
            .dispatcher
            .dispatch(
                &DispatchRequest {
                    user_id: user.id.clone(),
                    phone_number: schedule.phone_number.clone(),
                    voice_id: user.voice_id.clone(),
                },
                &script,
            )
            .await?;
        Ok(Some(entry))
    }

    /// Urgent fast path: call the user about `call-me` senders right
    /// now, schedule or no schedule. Returns `None` when the user is
    /// unknown or nothing in `urgent` actually warrants a call.
    pub async fn dispatch_urgent(
        &self,
        user_id: &str,
        urgent: &[SenderCategoryState],
    ) -> Result<Option<CallLogEntry>, StorageError> {
        let callworthy: Vec<SenderCategoryState> = urgent
            .iter()
            .filter(|s| s.category == Category::CallMe)
            .cloned()
            .collect();
        if callworthy.is_empty() {
            return Ok(None);
        }

        let Some(user) = self.store.user(user_id).await? else {
            warn!(user_id = %user_id, "Urgent alert for unknown user dropped");
            return Ok(None);
        };

        let stats = CategoryStats::from_states(&callworthy);
        let script = self.synthesizer.generate_script(&ScriptRequest {
            call_type: CallType::UrgentAlert,
            stats: &stats,
            highlights: &callworthy,
            reminder_category: None,
        });

        info!(
            user_id = %user.id,
            senders = callworthy.len(),
            "Dispatching urgent alert call"
        );
        let entry = self
            .dispatcher
            .dispatch(
                &DispatchRequest {
                    user_id: user.id.clone(),
                    phone_number: user.phone_number.clone(),
                    voice_id: user.voice_id.clone(),
                },
                &script,
            )
            .await?;
        Ok(Some(entry))
    }

    async fn advance(
        &self,
        schedule: &ScheduledCall,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let next = match next_cron_fire(&schedule.schedule, now) {
            Ok(Some(next)) => next,
            Ok(None) => {
                // Schedule has no future firings; push it far out rather
                // than hammering every tick.
                warn!(schedule_id = %schedule.id, "Schedule has no upcoming fire time");
                now + chrono::Duration::days(365)
            }
            Err(e) => {
                warn!(
                    schedule_id = %schedule.id,
                    error = %e,
                    "Unparseable cron expression; deferring a day"
                );
                now + chrono::Duration::days(1)
            }
        };
        self.store
            .update_schedule_next_run(&schedule.id, next)
            .await
    }
}

/// Reminder calls speak about the busiest actionable bucket.
fn reminder_target(call_type: CallType, stats: &CategoryStats) -> Option<Category> {
    if call_type != CallType::Reminder {
        return None;
    }
    Category::SPOKEN_ORDER
        .into_iter()
        .filter(|c| stats.count(*c) > 0)
        .max_by_key(|c| stats.count(*c))
        .or(Some(Category::RemindMe))
}

/// Parse a cron expression and compute the next fire time after `now`.
pub fn next_cron_fire(
    expression: &str,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ConfigError> {
    let schedule = cron::Schedule::from_str(expression).map_err(|e| ConfigError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })?;
    Ok(schedule.after(&now).next())
}

/// Spawn the periodic scheduler tick.
pub fn spawn_schedule_ticker(
    scheduler: Arc<CallScheduler>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            scheduler.tick(Utc::now()).await;
        }
    })
}
