//! Outbound call orchestration: gateway seam, dispatcher state machine,
//! schedule tick, and status reconciliation.

pub mod dispatcher;
pub mod gateway;
pub mod reconciler;
pub mod scheduler;
pub mod twilio;
pub mod types;

pub use dispatcher::{CallDispatcher, DispatchRequest, DispatcherConfig};
pub use gateway::{GatewayCallStatus, PlacedCall, TelephonyGateway};
pub use reconciler::spawn_status_reconciler;
pub use scheduler::{CallScheduler, spawn_schedule_ticker};
pub use twilio::{TwilioConfig, TwilioGateway};
pub use types::{CallLogEntry, CallScript, CallStatus, CallType, ScheduledCall, UserAccount};
