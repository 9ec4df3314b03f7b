//! AI categorization client — buckets messages into sender categories.
//!
//! Flow per message:
//! 1. AI completion with a fixed-shape JSON contract
//! 2. closed-set category mapping + defensive numeric clamping
//! 3. on any failure (no credentials, timeout, bad shape) → heuristic
//!    fallback for that message, never an error to the caller
//!
//! Batches are chunked (5 messages per chunk, concurrent within a chunk)
//! with an enforced pause between chunks to respect the provider's rate
//! limit. One bad message never fails its batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ai::{AiProvider, ChatMessage, CompletionRequest};
use crate::error::AiError;
use crate::triage::heuristics::{HeuristicClassifier, clamp_result};
use crate::triage::types::{
    Category, CategoryResult, EmailMessage, Priority, Sentiment, TimeToRespond,
};

/// Messages per rate-limit window.
const CHUNK_SIZE: usize = 5;

/// Max tokens for a categorization call (runs on every message — keep tight).
const CATEGORIZE_MAX_TOKENS: u32 = 512;

/// Temperature for categorization (deterministic-ish).
const CATEGORIZE_TEMPERATURE: f32 = 0.1;

/// Tuning for the categorizer.
#[derive(Debug, Clone)]
pub struct CategorizerConfig {
    /// Messages per concurrent chunk.
    pub chunk_size: usize,
    /// Pause between chunks.
    pub chunk_pause: Duration,
    /// Per-request deadline; a timeout degrades to the heuristic path.
    pub request_timeout: Duration,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_pause: Duration::from_secs(1),
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Email categorizer: AI service with a deterministic safety net.
pub struct AiCategorizer {
    provider: Option<Arc<dyn AiProvider>>,
    heuristics: HeuristicClassifier,
    config: CategorizerConfig,
}

impl AiCategorizer {
    /// Create a categorizer. `provider: None` means credentials were
    /// absent at construction — every call short-circuits to heuristics
    /// without attempting network I/O.
    pub fn new(provider: Option<Arc<dyn AiProvider>>, config: CategorizerConfig) -> Self {
        if provider.is_none() {
            info!("No AI provider configured — categorization runs heuristic-only");
        }
        Self {
            provider,
            heuristics: HeuristicClassifier::new(),
            config,
        }
    }

    /// Heuristic-only categorizer (degraded mode, also handy in tests).
    pub fn heuristic_only(config: CategorizerConfig) -> Self {
        Self::new(None, config)
    }

    /// Categorize a single message. Infallible: the heuristic path
    /// absorbs every failure.
    pub async fn categorize_one(&self, message: &EmailMessage) -> CategoryResult {
        let Some(provider) = &self.provider else {
            return self.heuristics.classify(message);
        };

        let outcome = tokio::time::timeout(
            self.config.request_timeout,
            self.request_categorization(provider.as_ref(), message),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => clamp_result(result),
            Ok(Err(e)) => {
                warn!(id = %message.id, error = %e, "Categorization failed, using heuristics");
                self.heuristics.classify(message)
            }
            Err(_) => {
                warn!(
                    id = %message.id,
                    timeout = ?self.config.request_timeout,
                    "Categorization timed out, using heuristics"
                );
                self.heuristics.classify(message)
            }
        }
    }

    /// Categorize a batch of messages, keyed by message id.
    ///
    /// Chunks run concurrently internally; chunk N+1 never starts before
    /// chunk N's pause has elapsed. The result map always covers every
    /// input message.
    pub async fn categorize_many(
        &self,
        messages: &[EmailMessage],
    ) -> HashMap<String, CategoryResult> {
        let mut results = HashMap::with_capacity(messages.len());
        if messages.is_empty() {
            return results;
        }

        let chunk_count = messages.len().div_ceil(self.config.chunk_size);
        debug!(
            total = messages.len(),
            chunks = chunk_count,
            "Categorizing message batch"
        );

        for (i, chunk) in messages.chunks(self.config.chunk_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.chunk_pause).await;
            }
            let chunk_results = futures::future::join_all(chunk.iter().map(|message| async {
                (message.id.clone(), self.categorize_one(message).await)
            }))
            .await;
            results.extend(chunk_results);
        }

        info!(categorized = results.len(), "Batch categorization complete");
        results
    }

    /// One AI completion + parse. Errors here are per-message and are
    /// absorbed by `categorize_one`.
    async fn request_categorization(
        &self,
        provider: &dyn AiProvider,
        message: &EmailMessage,
    ) -> Result<CategoryResult, AiError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_categorize_system_prompt()),
            ChatMessage::user(build_categorize_user_prompt(message)),
        ])
        .with_temperature(CATEGORIZE_TEMPERATURE)
        .with_max_tokens(CATEGORIZE_MAX_TOKENS);

        let response = provider.complete(request).await?;

        parse_categorization(&response.content).map_err(|reason| AiError::BadResponse {
            provider: provider.model_name().to_string(),
            reason,
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_categorize_system_prompt() -> String {
    "You are an email triage engine. Bucket the sender of the given email into exactly one category.\n\n\
     Categories:\n\
     - \"call-me\": urgent, the user should be phoned about this\n\
     - \"remind-me\": needs action soon, worth a reminder\n\
     - \"keep-quiet\": fine to leave unread, no action\n\
     - \"newsletter\": subscription content, digests\n\
     - \"why-did-i-signup\": promotions and marketing noise\n\
     - \"dont-tell-anyone\": sensitive or private, mention discreetly\n\n\
     Respond with ONLY a JSON object:\n\
     {\"category\": \"...\", \"importance\": 1-5, \"reasoning\": \"...\", \"summary\": \"...\",\n\
      \"sentiment\": {\"score\": -1.0 to 1.0, \"confidence\": 0.0 to 1.0, \"tone\": \"...\"},\n\
      \"priority\": {\"score\": 1-5, \"factors\": [\"...\"], \"time_to_respond\": \"immediate|today|this-week|when-convenient|never\"}}\n\n\
     Rules:\n\
     - summary and reasoning: one sentence each\n\
     - importance 5 only for genuinely urgent mail\n\
     - when in doubt between categories, choose keep-quiet"
        .to_string()
}

fn build_categorize_user_prompt(message: &EmailMessage) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str(&format!("From: {}\n", message.from));
    prompt.push_str(&format!("Subject: {}\n", message.subject));
    prompt.push_str(&format!("Date: {}\n", message.date.to_rfc3339()));
    if !message.labels.is_empty() {
        prompt.push_str(&format!("Labels: {}\n", message.labels.join(", ")));
    }

    // Body truncated for token efficiency; the snippet covers short mail.
    let text = if message.body.is_empty() {
        &message.snippet
    } else {
        &message.body
    };
    let preview: String = text.chars().take(1000).collect();
    prompt.push_str(&format!("\nEmail:\n{}", preview));

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Raw wire shape of the AI categorization response. Every field is
/// optional — missing pieces get defaults, not errors.
#[derive(Debug, serde::Deserialize)]
struct WireCategorization {
    #[serde(default)]
    category: String,
    #[serde(default = "default_importance")]
    importance: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    sentiment: WireSentiment,
    #[serde(default)]
    priority: WirePriority,
}

#[derive(Debug, Default, serde::Deserialize)]
struct WireSentiment {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    tone: String,
}

#[derive(Debug, Default, serde::Deserialize)]
struct WirePriority {
    #[serde(default = "default_importance")]
    score: f64,
    #[serde(default)]
    factors: Vec<String>,
    #[serde(default, alias = "timeToRespond")]
    time_to_respond: String,
}

fn default_importance() -> f64 {
    2.0
}

/// Parse the AI response into a `CategoryResult`.
///
/// The category string is mapped into the closed set here, immediately
/// after deserialization; numeric ranges are clamped by the caller.
fn parse_categorization(raw: &str) -> Result<CategoryResult, String> {
    let json_str = extract_json_object(raw);
    let wire: WireCategorization =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let category = Category::from_wire(&wire.category);
    let tone = if wire.sentiment.tone.is_empty() {
        "neutral".to_string()
    } else {
        wire.sentiment.tone
    };

    Ok(CategoryResult {
        category,
        importance: to_score(wire.importance),
        reasoning: wire.reasoning,
        summary: wire.summary,
        sentiment: Sentiment {
            score: wire.sentiment.score as f32,
            confidence: wire.sentiment.confidence as f32,
            tone,
        },
        priority: Priority {
            score: to_score(wire.priority.score),
            factors: wire.priority.factors,
            time_to_respond: TimeToRespond::from_wire(&wire.priority.time_to_respond),
        },
    })
}

/// Round a wire number into a u8 score. Range clamping happens later in
/// `clamp_result`; this only guards the integer conversion.
fn to_score(value: f64) -> u8 {
    if !value.is_finite() || value < 0.0 {
        return 0;
    }
    value.round().min(f64::from(u8::MAX)) as u8
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
