//! Deterministic fallback classifier for when the AI service is
//! unavailable, plus the clamp that re-validates AI output.
//!
//! Rules run in priority order, first match wins:
//! - urgency markers in the subject → `call-me`
//! - scheduling markers in the subject → `remind-me`
//! - newsletter markers in subject or a no-reply sender → `newsletter`
//! - promotional markers in the subject → `why-did-i-signup`
//! - everything else → `keep-quiet`
//!
//! `classify` is total: no I/O, no failure path.

use regex::Regex;
use tracing::debug;

use crate::triage::types::{
    Category, CategoryResult, EmailMessage, Priority, Sentiment, TimeToRespond,
};

/// Which message field a rule matches against.
#[derive(Debug, Clone, Copy)]
enum RuleField {
    Subject,
    Sender,
}

/// A single keyword/domain rule with a compiled regex.
struct HeuristicRule {
    /// Short name, used as the priority factor on matches.
    name: &'static str,
    regex: Regex,
    field: RuleField,
    category: Category,
    importance: u8,
    time_to_respond: TimeToRespond,
    reasoning: &'static str,
}

/// Keyword/domain classifier — the safety net under the AI client.
pub struct HeuristicClassifier {
    rules: Vec<HeuristicRule>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        let rules = vec![
            HeuristicRule {
                name: "urgency-marker",
                regex: Regex::new(r"(?i)\b(urgent|asap|immediate)\b").unwrap(),
                field: RuleField::Subject,
                category: Category::CallMe,
                importance: 4,
                time_to_respond: TimeToRespond::Immediate,
                reasoning: "subject contains an urgency marker",
            },
            HeuristicRule {
                name: "scheduling-marker",
                regex: Regex::new(r"(?i)\b(meeting|call|schedule)\b").unwrap(),
                field: RuleField::Subject,
                category: Category::RemindMe,
                importance: 3,
                time_to_respond: TimeToRespond::Today,
                reasoning: "subject contains a scheduling marker",
            },
            HeuristicRule {
                name: "newsletter-subject",
                regex: Regex::new(r"(?i)\b(newsletter|digest)\b").unwrap(),
                field: RuleField::Subject,
                category: Category::Newsletter,
                importance: 2,
                time_to_respond: TimeToRespond::WhenConvenient,
                reasoning: "subject contains a newsletter marker",
            },
            HeuristicRule {
                name: "noreply-sender",
                regex: Regex::new(r"(?i)^no[\-_.]?reply@|@(newsletter|news|mailer)\.").unwrap(),
                field: RuleField::Sender,
                category: Category::Newsletter,
                importance: 2,
                time_to_respond: TimeToRespond::WhenConvenient,
                reasoning: "sender looks like an automated no-reply address",
            },
            HeuristicRule {
                name: "promo-marker",
                regex: Regex::new(r"(?i)\b(promotion|sale|offer)\b").unwrap(),
                field: RuleField::Subject,
                category: Category::WhyDidISignup,
                importance: 1,
                time_to_respond: TimeToRespond::Never,
                reasoning: "subject contains a promotional marker",
            },
        ];
        Self { rules }
    }

    /// Classify a message with keyword rules alone. Total function.
    pub fn classify(&self, message: &EmailMessage) -> CategoryResult {
        for rule in &self.rules {
            let field_value = match rule.field {
                RuleField::Subject => &message.subject,
                RuleField::Sender => &message.from,
            };
            if rule.regex.is_match(field_value) {
                debug!(
                    id = %message.id,
                    rule = rule.name,
                    category = %rule.category,
                    "Heuristic rule matched"
                );
                return self.build_result(message, rule);
            }
        }

        // No rule matched — park the sender quietly.
        CategoryResult {
            category: Category::KeepQuiet,
            importance: 2,
            reasoning: "no heuristic rule matched".into(),
            summary: summarize(message),
            sentiment: neutral_sentiment(),
            priority: Priority {
                score: 2,
                factors: vec!["default".into()],
                time_to_respond: TimeToRespond::WhenConvenient,
            },
        }
    }

    fn build_result(&self, message: &EmailMessage, rule: &HeuristicRule) -> CategoryResult {
        CategoryResult {
            category: rule.category,
            importance: rule.importance,
            reasoning: rule.reasoning.into(),
            summary: summarize(message),
            sentiment: neutral_sentiment(),
            priority: Priority {
                score: rule.importance,
                factors: vec![rule.name.into()],
                time_to_respond: rule.time_to_respond,
            },
        }
    }
}

/// One-line summary for a result produced without the AI service.
fn summarize(message: &EmailMessage) -> String {
    let text = if message.snippet.is_empty() {
        &message.subject
    } else {
        &message.snippet
    };
    let preview: String = text.chars().take(120).collect();
    format!("{} (from {})", preview, message.from)
}

/// Heuristic results carry no real sentiment signal.
fn neutral_sentiment() -> Sentiment {
    Sentiment {
        score: 0.0,
        confidence: 0.3,
        tone: "neutral".into(),
    }
}

// ── AI output clamping ──────────────────────────────────────────────

/// Re-validate a categorization result against the declared ranges.
///
/// The category is already a closed enum by the time a result exists, so
/// only the numeric fields need clamping. Applied to every AI result
/// before it is stored or used downstream.
pub fn clamp_result(mut result: CategoryResult) -> CategoryResult {
    let before_importance = result.importance;
    result.importance = result.importance.clamp(1, 5);
    result.priority.score = result.priority.score.clamp(1, 5);
    result.sentiment.score = result.sentiment.score.clamp(-1.0, 1.0);
    result.sentiment.confidence = result.sentiment.confidence.clamp(0.0, 1.0);

    if result.importance != before_importance {
        debug!(
            importance = before_importance,
            clamped = result.importance,
            "Clamped out-of-range importance"
        );
    }
    result
}
