//! Background status reconciliation.
//!
//! Polls the gateway for every in-flight call on an interval and writes
//! back detected changes. Polling (rather than provider webhooks) keeps
//! the gateway interface minimal; a push-based gateway implementation
//! can drive the same dispatcher methods without touching this loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::calls::dispatcher::CallDispatcher;

/// Spawn the periodic call-status reconciliation sweep.
pub fn spawn_status_reconciler(
    dispatcher: Arc<CallDispatcher>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval = ?interval, "Call status reconciler started");
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            dispatcher.reconcile_open_calls().await;
        }
    })
}
