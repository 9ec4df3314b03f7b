//! Message source interface — pure I/O, no business logic.
//!
//! The real Gmail fetch/parse layer lives outside this crate; the
//! pipeline only sees this trait. [`spool::SpoolSource`] is a small
//! file-based implementation for development and tests.

pub mod spool;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::triage::types::EmailMessage;

pub use spool::SpoolSource;

/// Read-only inbox access for one or more users.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Source name, for logs.
    fn name(&self) -> &str;

    /// Fetch up to `max_results` recent messages for a user.
    ///
    /// `SourceError::Auth` means the user's credentials are broken and a
    /// retry is pointless; `SourceError::Transient` is retried on the
    /// next scan.
    async fn fetch_messages(
        &self,
        user_id: &str,
        max_results: usize,
    ) -> Result<Vec<EmailMessage>, SourceError>;
}
