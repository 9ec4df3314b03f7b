//! Call dispatcher — submits calls to the telephony gateway and owns the
//! call-log state machine.
//!
//! State machine per call: `pending → initiated → in-progress →
//! {completed | failed}`. Submission failures (gateway unreachable,
//! missing credentials, malformed number) terminate locally at `failed`
//! without ever reaching the provider — a visible terminal transition,
//! not a silent drop, and never an `Err` to the caller.
//!
//! Bookkeeping is write-ahead: a `pending` log row is persisted BEFORE
//! the gateway submission and updated after, so a crash mid-flight
//! leaves a traceable row rather than an untracked call (at-least-once
//! bookkeeping — the row may say `pending` for a call that went out).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::calls::gateway::TelephonyGateway;
use crate::calls::types::{CallLogEntry, CallScript, CallStatus, CallType};
use crate::error::StorageError;
use crate::store::Storage;

/// One call to place.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub user_id: String,
    pub phone_number: String,
    pub voice_id: Option<String>,
}

/// Tuning for dispatch and reconciliation.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deadline for a single gateway interaction.
    pub gateway_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(30),
        }
    }
}

/// Places calls and reconciles their status.
pub struct CallDispatcher {
    /// `None` when telephony credentials were absent at construction —
    /// every dispatch then fails locally without network I/O.
    gateway: Option<Arc<dyn TelephonyGateway>>,
    store: Arc<dyn Storage>,
    config: DispatcherConfig,
    number_re: Regex,
}

impl CallDispatcher {
    pub fn new(
        gateway: Option<Arc<dyn TelephonyGateway>>,
        store: Arc<dyn Storage>,
        config: DispatcherConfig,
    ) -> Self {
        if gateway.is_none() {
            info!("No telephony gateway configured — dispatch will refuse calls locally");
        }
        Self {
            gateway,
            store,
            config,
            // E.164-ish: optional +, 7-15 digits, no leading zero.
            number_re: Regex::new(r"^\+?[1-9]\d{6,14}$").unwrap(),
        }
    }

    /// Dispatch a call. Always returns a persisted `CallLogEntry`; call
    /// failures surface as `status = failed` on the entry, and only
    /// storage errors propagate as `Err`.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        script: &CallScript,
    ) -> Result<CallLogEntry, StorageError> {
        let mut entry = CallLogEntry::pending(
            &request.user_id,
            &request.phone_number,
            script.call_type,
            &script.body,
            Utc::now(),
        );

        // A malformed destination never reaches the gateway.
        if !self.number_re.is_match(request.phone_number.trim()) {
            warn!(
                user_id = %request.user_id,
                number = %request.phone_number,
                "Refusing dispatch: invalid phone number"
            );
            entry.status = CallStatus::Failed;
            entry.completed_time = Some(Utc::now());
            self.store.insert_call_log(&entry).await?;
            return Ok(entry);
        }

        // Write-ahead: the pending row exists before the provider hears
        // about the call.
        self.store.insert_call_log(&entry).await?;

        let Some(gateway) = &self.gateway else {
            warn!(
                user_id = %request.user_id,
                "Refusing dispatch: no telephony credentials"
            );
            entry.status = CallStatus::Failed;
            entry.completed_time = Some(Utc::now());
            self.store.update_call_log(&entry).await?;
            return Ok(entry);
        };

        let submission = tokio::time::timeout(
            self.config.gateway_timeout,
            gateway.place_call(
                &request.phone_number,
                script,
                request.voice_id.as_deref(),
            ),
        )
        .await;

        match submission {
            Ok(Ok(placed)) => {
                let status = placed.status.into_call_status();
                // Whatever the provider said, submission means at least
                // `initiated`; keep the transition legal and monotonic.
                entry.status = if entry.status.can_transition_to(status) {
                    status
                } else {
                    CallStatus::Initiated
                };
                entry.provider_call_id = Some(placed.provider_call_id);
                if entry.status.is_terminal() {
                    entry.completed_time = Some(Utc::now());
                }
                info!(
                    id = %entry.id,
                    provider_call_id = entry.provider_call_id.as_deref().unwrap_or("-"),
                    status = %entry.status,
                    "Call dispatched"
                );
            }
            Ok(Err(e)) => {
                warn!(id = %entry.id, error = %e, "Call submission failed");
                entry.status = CallStatus::Failed;
                entry.completed_time = Some(Utc::now());
            }
            Err(_) => {
                warn!(
                    id = %entry.id,
                    timeout = ?self.config.gateway_timeout,
                    "Call submission timed out"
                );
                entry.status = CallStatus::Failed;
                entry.completed_time = Some(Utc::now());
            }
        }

        self.store.update_call_log(&entry).await?;
        Ok(entry)
    }

    /// Reconcile one in-flight entry against the provider.
    ///
    /// Writes back only on a detected status change; terminal entries
    /// and unchanged statuses produce no storage write. Poll failures
    /// leave the entry as-is for the next sweep.
    pub async fn reconcile(&self, entry: &CallLogEntry) -> Result<CallLogEntry, StorageError> {
        if entry.status.is_terminal() {
            return Ok(entry.clone());
        }
        let (Some(gateway), Some(provider_call_id)) =
            (&self.gateway, entry.provider_call_id.as_deref())
        else {
            return Ok(entry.clone());
        };

        let polled = tokio::time::timeout(
            self.config.gateway_timeout,
            gateway.call_status(provider_call_id),
        )
        .await;

        let gateway_status = match polled {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                debug!(id = %entry.id, error = %e, "Status poll failed; will retry next sweep");
                return Ok(entry.clone());
            }
            Err(_) => {
                debug!(id = %entry.id, "Status poll timed out; will retry next sweep");
                return Ok(entry.clone());
            }
        };

        let next = gateway_status.into_call_status();
        if next == entry.status || !entry.status.can_transition_to(next) {
            return Ok(entry.clone());
        }

        let mut updated = entry.clone();
        updated.status = next;
        if next.is_terminal() {
            updated.completed_time = Some(Utc::now());
        }
        self.store.update_call_log(&updated).await?;
        info!(
            id = %updated.id,
            from = %entry.status,
            to = %updated.status,
            "Call status reconciled"
        );
        Ok(updated)
    }

    /// Sweep every in-flight call once. Per-entry failures degrade that
    /// entry only; the sweep always finishes.
    pub async fn reconcile_open_calls(&self) {
        let open = match self.store.open_call_logs().await {
            Ok(open) => open,
            Err(e) => {
                warn!(error = %e, "Could not list open calls for reconciliation");
                return;
            }
        };
        if open.is_empty() {
            return;
        }

        debug!(count = open.len(), "Reconciling in-flight calls");
        for entry in &open {
            if let Err(e) = self.reconcile(entry).await {
                warn!(id = %entry.id, error = %e, "Failed to persist reconciled status");
            }
        }
    }

    /// Whether a gateway is configured (used by the scheduler for logs).
    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }
}
