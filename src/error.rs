//! Error types for callbrief.

use std::time::Duration;

/// Top-level error type for the triage core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Message source error: {0}")]
    Source(#[from] SourceError),

    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

/// AI service errors.
///
/// The three failure shapes the categorizer distinguishes are kept as
/// separate variants: no credentials, request failed, bad response shape.
/// All of them end in the same place (heuristic fallback), but the logs
/// and the short-circuit behavior differ.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("No AI credentials configured")]
    NoCredentials,

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Unparseable response from {provider}: {reason}")]
    BadResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Message source (inbox fetch) errors.
///
/// Auth failures are permanent for a user until they re-connect their
/// account; transient failures are retried on the next scan.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Fetch failed: {0}")]
    Transient(String),
}

/// Telephony gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("No telephony credentials configured")]
    NoCredentials,

    #[error("Invalid destination number: {0:?}")]
    InvalidNumber(String),

    #[error("Gateway {name} unreachable: {reason}")]
    Unreachable { name: String, reason: String },

    #[error("Gateway {name} rejected the call: {reason}")]
    Rejected { name: String, reason: String },

    #[error("Gateway {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Unknown provider call id: {0}")]
    UnknownCall(String),
}

/// Storage backend errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Pipeline-level errors.
///
/// Per-message categorization failures never surface here — they degrade
/// to the heuristic path inside the categorizer. What does surface is a
/// failed fetch (the scan has nothing to work on) and storage failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Inbox fetch failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
