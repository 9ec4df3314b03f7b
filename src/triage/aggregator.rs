//! Per-sender category state aggregation.
//!
//! Latest-message-wins: a sender's bucket always reflects their most
//! recent message's classification, not a historical blend. Ties on the
//! date keep the existing state so re-processing a message is a no-op.

use tracing::debug;

use crate::triage::types::{CategoryResult, EmailMessage, SenderCategoryState};

/// Fold one `(message, result)` pair into a sender's persisted state.
///
/// Callers must serialize merges for the same sender key (single writer
/// per sender); the storage layer provides per-row atomic upserts.
pub fn merge_sender_state(
    existing: Option<SenderCategoryState>,
    user_id: &str,
    message: &EmailMessage,
    result: &CategoryResult,
) -> SenderCategoryState {
    let Some(mut state) = existing else {
        return SenderCategoryState {
            sender: message.from.clone(),
            user_id: user_id.to_string(),
            category: result.category,
            importance: result.importance,
            email_count: 1,
            latest_subject: message.subject.clone(),
            last_email_date: message.date,
        };
    };

    // Equal dates mean the same message coming around again — leave the
    // state untouched so re-processing a scan is idempotent.
    if message.date == state.last_email_date {
        return state;
    }

    state.email_count += 1;

    if message.date > state.last_email_date {
        debug!(
            sender = %state.sender,
            from = %state.category,
            to = %result.category,
            "Sender category updated by newer message"
        );
        state.category = result.category;
        state.importance = result.importance;
        state.latest_subject = message.subject.clone();
        state.last_email_date = message.date;
    }

    state
}
