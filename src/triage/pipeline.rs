//! Inbox pipeline — runs one triage pass and feeds the call side.
//!
//! Flow per scan:
//! 1. fetch messages (external source, read-only)
//! 2. batch categorization (AI with heuristic safety net)
//! 3. fold results into per-sender state, persisted
//! 4. urgent fast path: `call-me` senders trigger an immediate alert
//!    call, bypassing the schedule
//!
//! Sender-state merges run sequentially within a scan, which is the
//! single-writer-per-sender discipline the latest-message-wins merge
//! needs; the storage backend makes each upsert atomic.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::calls::CallScheduler;
use crate::calls::types::CallLogEntry;
use crate::error::{PipelineError, SourceError};
use crate::source::MessageSource;
use crate::store::Storage;
use crate::triage::aggregator::merge_sender_state;
use crate::triage::categorizer::AiCategorizer;
use crate::triage::types::{Category, SenderCategoryState};

/// Outcome of one scan, for logs and callers.
#[derive(Debug)]
pub struct ScanReport {
    pub fetched: usize,
    pub categorized: usize,
    pub senders_updated: usize,
    pub urgent_senders: usize,
    /// The urgent alert call, when one was dispatched.
    pub urgent_call: Option<CallLogEntry>,
}

/// One user's triage pass, wired from external seams.
pub struct InboxPipeline {
    source: Arc<dyn MessageSource>,
    categorizer: AiCategorizer,
    store: Arc<dyn Storage>,
    scheduler: Arc<CallScheduler>,
}

impl InboxPipeline {
    pub fn new(
        source: Arc<dyn MessageSource>,
        categorizer: AiCategorizer,
        store: Arc<dyn Storage>,
        scheduler: Arc<CallScheduler>,
    ) -> Self {
        Self {
            source,
            categorizer,
            store,
            scheduler,
        }
    }

    /// Run one scan for a user.
    ///
    /// Categorization failures never surface here (per-message heuristic
    /// fallback); fetch and storage failures do.
    pub async fn run_scan(
        &self,
        user_id: &str,
        max_results: usize,
    ) -> Result<ScanReport, PipelineError> {
        let messages = match self.source.fetch_messages(user_id, max_results).await {
            Ok(messages) => messages,
            Err(e @ SourceError::Auth(_)) => {
                warn!(user_id = %user_id, error = %e, "Inbox auth failed; user must reconnect");
                return Err(e.into());
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Inbox fetch failed; will retry next scan");
                return Err(e.into());
            }
        };

        if messages.is_empty() {
            debug!(user_id = %user_id, "Nothing to scan");
            return Ok(ScanReport {
                fetched: 0,
                categorized: 0,
                senders_updated: 0,
                urgent_senders: 0,
                urgent_call: None,
            });
        }

        info!(user_id = %user_id, count = messages.len(), "Scanning inbox");
        let results = self.categorizer.categorize_many(&messages).await;

        // Fold per-message results into per-sender state, oldest first so
        // latest-message-wins sees messages in a sane order regardless of
        // how the source sorted them.
        let mut ordered: Vec<_> = messages.iter().collect();
        ordered.sort_by_key(|m| m.date);

        let mut urgent: Vec<SenderCategoryState> = Vec::new();
        let mut senders_updated = 0;
        for message in ordered {
            let Some(result) = results.get(&message.id) else {
                continue;
            };
            let existing = self.store.sender_state(user_id, &message.from).await?;
            let merged = merge_sender_state(existing, user_id, message, result);
            self.store.upsert_sender_state(&merged).await?;
            senders_updated += 1;

            // Urgent trigger keys off this scan's results; the merged
            // state supplies what the alert reads out. A stale call-me
            // (older than the sender's latest message) does not alert.
            if result.category == Category::CallMe && merged.category == Category::CallMe {
                urgent.retain(|s| s.sender != merged.sender);
                urgent.push(merged);
            }
        }

        // Urgent fast path — synchronous, schedule bypassed.
        let urgent_call = if urgent.is_empty() {
            None
        } else {
            self.scheduler.dispatch_urgent(user_id, &urgent).await?
        };

        let report = ScanReport {
            fetched: messages.len(),
            categorized: results.len(),
            senders_updated,
            urgent_senders: urgent.len(),
            urgent_call,
        };
        info!(
            user_id = %user_id,
            fetched = report.fetched,
            urgent = report.urgent_senders,
            "Scan complete"
        );
        Ok(report)
    }
}
