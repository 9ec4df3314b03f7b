//! Email triage: categorization, aggregation, and the scan pipeline.

pub mod aggregator;
pub mod categorizer;
pub mod heuristics;
pub mod pipeline;
pub mod types;

pub use aggregator::merge_sender_state;
pub use categorizer::{AiCategorizer, CategorizerConfig};
pub use heuristics::{HeuristicClassifier, clamp_result};
pub use pipeline::{InboxPipeline, ScanReport};
pub use types::{
    Category, CategoryResult, CategoryStats, EmailMessage, Priority, SenderCategoryState,
    Sentiment, TimeToRespond,
};
