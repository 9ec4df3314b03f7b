//! Shared types for the email triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound email ───────────────────────────────────────────────────

/// A fetched inbox message.
///
/// Owned by the fetch layer; the triage pipeline consumes it read-only
/// and never mutates it after fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Provider-native message id.
    pub id: String,
    /// Thread id, when the provider exposes one.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Sender address.
    pub from: String,
    /// Recipient address (the user's own, usually).
    #[serde(default)]
    pub to: Option<String>,
    /// When the message was received.
    pub date: DateTime<Utc>,
    /// Short preview text.
    #[serde(default)]
    pub snippet: String,
    /// Full body text.
    #[serde(default)]
    pub body: String,
    /// Provider labels/folders.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Whether the user has already opened it.
    #[serde(default)]
    pub is_read: bool,
}

// ── Category ────────────────────────────────────────────────────────

/// The closed set of sender buckets.
///
/// Raw strings from the AI service are mapped into this enum at the
/// deserialization boundary — anything unrecognized becomes `KeepQuiet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    CallMe,
    RemindMe,
    KeepQuiet,
    Newsletter,
    WhyDidISignup,
    DontTellAnyone,
}

impl Category {
    /// The order categories are read out in a spoken digest.
    pub const SPOKEN_ORDER: [Category; 6] = [
        Category::CallMe,
        Category::RemindMe,
        Category::KeepQuiet,
        Category::WhyDidISignup,
        Category::DontTellAnyone,
        Category::Newsletter,
    ];

    /// Wire label (matches the AI response contract and the DB column).
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CallMe => "call-me",
            Category::RemindMe => "remind-me",
            Category::KeepQuiet => "keep-quiet",
            Category::Newsletter => "newsletter",
            Category::WhyDidISignup => "why-did-i-signup",
            Category::DontTellAnyone => "dont-tell-anyone",
        }
    }

    /// Map a raw external string into the closed set.
    ///
    /// This is the only place a loose category string is interpreted;
    /// unknown values park the sender in `KeepQuiet`.
    pub fn from_wire(s: &str) -> Self {
        match s.trim() {
            "call-me" => Category::CallMe,
            "remind-me" => Category::RemindMe,
            "keep-quiet" => Category::KeepQuiet,
            "newsletter" => Category::Newsletter,
            "why-did-i-signup" => Category::WhyDidISignup,
            "dont-tell-anyone" => Category::DontTellAnyone,
            _ => Category::KeepQuiet,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Response urgency ────────────────────────────────────────────────

/// How soon a message deserves a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeToRespond {
    Immediate,
    Today,
    ThisWeek,
    WhenConvenient,
    Never,
}

impl TimeToRespond {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeToRespond::Immediate => "immediate",
            TimeToRespond::Today => "today",
            TimeToRespond::ThisWeek => "this-week",
            TimeToRespond::WhenConvenient => "when-convenient",
            TimeToRespond::Never => "never",
        }
    }

    /// Map a raw external string; unknown values default to `WhenConvenient`.
    pub fn from_wire(s: &str) -> Self {
        match s.trim() {
            "immediate" => TimeToRespond::Immediate,
            "today" => TimeToRespond::Today,
            "this-week" => TimeToRespond::ThisWeek,
            "never" => TimeToRespond::Never,
            _ => TimeToRespond::WhenConvenient,
        }
    }
}

// ── Categorization result ───────────────────────────────────────────

/// Emotional register of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    /// −1.0 (hostile) to 1.0 (warm).
    pub score: f32,
    /// 0.0 to 1.0.
    pub confidence: f32,
    /// Short descriptor, e.g. "neutral", "anxious".
    pub tone: String,
}

/// Actionability of a message, separate from importance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Priority {
    /// 1 (ignorable) to 5 (drop everything).
    pub score: u8,
    /// What drove the score.
    pub factors: Vec<String>,
    pub time_to_respond: TimeToRespond,
}

/// Per-message categorization outcome.
///
/// Immutable once produced — re-categorizing a message always builds a
/// new result, never edits an old one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResult {
    pub category: Category,
    /// 1–5 urgency score.
    pub importance: u8,
    pub reasoning: String,
    pub summary: String,
    pub sentiment: Sentiment,
    pub priority: Priority,
}

// ── Per-sender state ────────────────────────────────────────────────

/// Aggregated category state for one sender, persisted across scans.
///
/// Derived, not authoritative: recomputed whenever new messages arrive.
/// The merge rule lives in [`crate::triage::aggregator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderCategoryState {
    pub sender: String,
    pub user_id: String,
    pub category: Category,
    pub importance: u8,
    pub email_count: u32,
    pub latest_subject: String,
    pub last_email_date: DateTime<Utc>,
}

// ── Aggregate statistics ────────────────────────────────────────────

/// Per-category sender counts, used to build call scripts.
///
/// Iteration over [`Category::SPOKEN_ORDER`] is the stable ordering the
/// synthesizer relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryStats {
    counts: [usize; 6],
}

impl CategoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build stats from persisted sender states.
    pub fn from_states(states: &[SenderCategoryState]) -> Self {
        let mut stats = Self::new();
        for state in states {
            stats.record(state.category);
        }
        stats
    }

    pub fn record(&mut self, category: Category) {
        self.counts[Self::index(category)] += 1;
    }

    pub fn set(&mut self, category: Category, count: usize) {
        self.counts[Self::index(category)] = count;
    }

    pub fn count(&self, category: Category) -> usize {
        self.counts[Self::index(category)]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn index(category: Category) -> usize {
        match category {
            Category::CallMe => 0,
            Category::RemindMe => 1,
            Category::KeepQuiet => 2,
            Category::Newsletter => 3,
            Category::WhyDidISignup => 4,
            Category::DontTellAnyone => 5,
        }
    }
}
