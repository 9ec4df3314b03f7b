//! Telephony gateway interface — pure I/O, no business logic.
//!
//! The dispatcher and the reconciliation loop only ever see this trait.
//! Twilio is the shipped implementation; voice-synthesis providers (or a
//! webhook-driven variant) are alternate implementations behind the same
//! seam, so the scheduler never changes when the provider does.

use async_trait::async_trait;

use crate::calls::types::{CallScript, CallStatus};
use crate::error::CallError;

/// Provider-side view of a call's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl GatewayCallStatus {
    /// Map a provider status string. Unknown strings read as `Queued` —
    /// the reconciler will simply look again next tick.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "ringing" => GatewayCallStatus::Ringing,
            "in-progress" | "answered" => GatewayCallStatus::InProgress,
            "completed" => GatewayCallStatus::Completed,
            "busy" => GatewayCallStatus::Busy,
            "no-answer" => GatewayCallStatus::NoAnswer,
            "failed" => GatewayCallStatus::Failed,
            "canceled" => GatewayCallStatus::Canceled,
            _ => GatewayCallStatus::Queued,
        }
    }

    /// Collapse into our call-log status.
    pub fn into_call_status(self) -> CallStatus {
        match self {
            GatewayCallStatus::Queued | GatewayCallStatus::Ringing => CallStatus::Initiated,
            GatewayCallStatus::InProgress => CallStatus::InProgress,
            GatewayCallStatus::Completed => CallStatus::Completed,
            GatewayCallStatus::Busy
            | GatewayCallStatus::NoAnswer
            | GatewayCallStatus::Failed
            | GatewayCallStatus::Canceled => CallStatus::Failed,
        }
    }
}

/// Result of submitting a call to the provider.
#[derive(Debug, Clone)]
pub struct PlacedCall {
    pub provider_call_id: String,
    pub status: GatewayCallStatus,
}

/// Outbound voice-call provider.
#[async_trait]
pub trait TelephonyGateway: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Place a call that reads `script` to `to_number`.
    async fn place_call(
        &self,
        to_number: &str,
        script: &CallScript,
        voice_id: Option<&str>,
    ) -> Result<PlacedCall, CallError>;

    /// Fetch the current status of a previously placed call.
    async fn call_status(&self, provider_call_id: &str) -> Result<GatewayCallStatus, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(
            GatewayCallStatus::from_provider("ringing"),
            GatewayCallStatus::Ringing
        );
        assert_eq!(
            GatewayCallStatus::from_provider("no-answer"),
            GatewayCallStatus::NoAnswer
        );
        // Unknown strings stay non-terminal.
        assert_eq!(
            GatewayCallStatus::from_provider("initiated-v2"),
            GatewayCallStatus::Queued
        );
    }

    #[test]
    fn gateway_status_collapses_to_call_status() {
        assert_eq!(
            GatewayCallStatus::Ringing.into_call_status(),
            CallStatus::Initiated
        );
        assert_eq!(
            GatewayCallStatus::InProgress.into_call_status(),
            CallStatus::InProgress
        );
        assert_eq!(
            GatewayCallStatus::Completed.into_call_status(),
            CallStatus::Completed
        );
        for terminal in [
            GatewayCallStatus::Busy,
            GatewayCallStatus::NoAnswer,
            GatewayCallStatus::Failed,
            GatewayCallStatus::Canceled,
        ] {
            assert_eq!(terminal.into_call_status(), CallStatus::Failed);
        }
    }
}
