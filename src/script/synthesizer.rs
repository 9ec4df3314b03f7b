//! Turns aggregated category statistics into spoken-word call scripts.
//!
//! The default path is pure templating — deterministic, no I/O. An
//! optional AI pass can rewrite the digest into freer prose, but the
//! template is always the fallback, never an error.

use std::time::Duration;

use tracing::{debug, warn};

use crate::ai::{AiProvider, ChatMessage, CompletionRequest};
use crate::calls::types::{CallScript, CallType};
use crate::triage::types::{Category, CategoryStats, SenderCategoryState};

/// Senders below this importance never make the highlight list.
const HIGHLIGHT_IMPORTANCE_FLOOR: u8 = 4;

/// Tuning for script generation.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Highlights read out per digest, at most.
    pub max_highlights: usize,
    /// Fixed cost of greeting + sign-off.
    pub base_duration: Duration,
    /// Added per category line or highlight read out.
    pub per_item_duration: Duration,
    /// Ceiling on the estimate.
    pub max_duration: Duration,
    /// Deadline for the optional AI rewrite.
    pub rewrite_timeout: Duration,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            max_highlights: 5,
            base_duration: Duration::from_secs(15),
            per_item_duration: Duration::from_secs(6),
            max_duration: Duration::from_secs(120),
            rewrite_timeout: Duration::from_secs(10),
        }
    }
}

/// Everything a script is built from.
#[derive(Debug, Clone)]
pub struct ScriptRequest<'a> {
    pub call_type: CallType,
    pub stats: &'a CategoryStats,
    /// Candidate highlight senders; the synthesizer filters and caps.
    pub highlights: &'a [SenderCategoryState],
    /// For `Reminder` calls: which bucket the guidance is about.
    pub reminder_category: Option<Category>,
}

/// Call script generator.
pub struct ScriptSynthesizer {
    config: SynthesizerConfig,
    rewriter: Option<std::sync::Arc<dyn AiProvider>>,
}

impl ScriptSynthesizer {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self {
            config,
            rewriter: None,
        }
    }

    /// Attach an AI provider for the optional natural-language pass.
    pub fn with_rewriter(mut self, provider: std::sync::Arc<dyn AiProvider>) -> Self {
        self.rewriter = Some(provider);
        self
    }

    /// Generate a script from templates. Pure and deterministic: the
    /// same request always yields the same script.
    pub fn generate_script(&self, request: &ScriptRequest<'_>) -> CallScript {
        let (body, spoken_items) = match request.call_type {
            CallType::DailyDigest => self.digest_body(request, "Good morning!", "today"),
            CallType::WeeklySummary => {
                self.digest_body(request, "Hello! Here's your week in email.", "this week")
            }
            CallType::UrgentAlert => self.urgent_body(request),
            CallType::Reminder => self.reminder_body(request),
        };

        CallScript {
            estimated_duration: self.estimate_duration(spoken_items),
            body,
            call_type: request.call_type,
        }
    }

    /// Generate a script, letting the AI provider rewrite the digest
    /// into freer prose when one is attached. Falls back to the template
    /// on any failure — this method cannot fail.
    pub async fn generate_script_natural(&self, request: &ScriptRequest<'_>) -> CallScript {
        let template = self.generate_script(request);
        let Some(rewriter) = &self.rewriter else {
            return template;
        };

        let prompt = format!(
            "Rewrite this phone call script to sound natural and warm when \
             read aloud. Keep every count and every sender name exactly as \
             given. Reply with the script text only.\n\n{}",
            template.body
        );
        let completion = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(1024)
            .with_temperature(0.7);

        let outcome =
            tokio::time::timeout(self.config.rewrite_timeout, rewriter.complete(completion)).await;

        match outcome {
            Ok(Ok(response)) if !response.content.trim().is_empty() => CallScript {
                body: response.content.trim().to_string(),
                ..template
            },
            Ok(Ok(_)) => {
                debug!("AI rewrite returned empty script, keeping template");
                template
            }
            Ok(Err(e)) => {
                warn!(error = %e, "AI rewrite failed, keeping template");
                template
            }
            Err(_) => {
                warn!("AI rewrite timed out, keeping template");
                template
            }
        }
    }

    // ── Templates ───────────────────────────────────────────────────

    fn digest_body(
        &self,
        request: &ScriptRequest<'_>,
        greeting: &str,
        window: &str,
    ) -> (String, usize) {
        let mut lines = vec![greeting.to_string()];
        let mut spoken_items = 0;

        if request.stats.is_empty() {
            lines.push(format!("Your inbox is all clear {window}. Nothing needs you."));
        } else {
            lines.push(format!(
                "Here's where your inbox stands {window}, across {} senders.",
                request.stats.total()
            ));
            for category in Category::SPOKEN_ORDER {
                let count = request.stats.count(category);
                if count == 0 {
                    continue;
                }
                lines.push(category_line(category, count));
                spoken_items += 1;
            }
        }

        let highlights = self.pick_highlights(request.highlights);
        if !highlights.is_empty() {
            lines.push("Worth a closer look:".to_string());
            for state in &highlights {
                lines.push(format!(
                    "From {}: \"{}\".",
                    display_name(&state.sender),
                    state.latest_subject
                ));
                spoken_items += 1;
            }
        }

        lines.push("That's the briefing. Talk soon!".to_string());
        (lines.join(" "), spoken_items)
    }

    fn urgent_body(&self, request: &ScriptRequest<'_>) -> (String, usize) {
        let urgent = self.pick_highlights(request.highlights);
        if urgent.is_empty() {
            // Urgent call with nothing urgent — keep it honest and short.
            return (
                "Heads up: something in your inbox was flagged urgent, \
                 but it has since been resolved. Nothing to do right now."
                    .to_string(),
                0,
            );
        }

        let mut lines = vec![if urgent.len() == 1 {
            "Heads up: you have an urgent email.".to_string()
        } else {
            format!("Heads up: you have {} urgent emails.", urgent.len())
        }];
        for state in &urgent {
            lines.push(format!(
                "{} wrote about \"{}\".",
                display_name(&state.sender),
                state.latest_subject
            ));
        }
        lines.push("Please check your inbox as soon as you can.".to_string());
        let count = urgent.len();
        (lines.join(" "), count)
    }

    fn reminder_body(&self, request: &ScriptRequest<'_>) -> (String, usize) {
        let category = request.reminder_category.unwrap_or(Category::RemindMe);
        let count = request.stats.count(category);
        let guidance = reminder_guidance(category);
        let body = if count == 0 {
            format!("Quick reminder from your inbox assistant. {guidance}")
        } else {
            format!(
                "Quick reminder from your inbox assistant. You have {} {} {}. {}",
                count,
                pluralize(count, "sender", "senders"),
                bucket_phrase(category),
                guidance
            )
        };
        (body, 1)
    }

    /// Filter to importance ≥ floor, newest first, capped.
    fn pick_highlights<'s>(
        &self,
        candidates: &'s [SenderCategoryState],
    ) -> Vec<&'s SenderCategoryState> {
        let mut picked: Vec<&SenderCategoryState> = candidates
            .iter()
            .filter(|s| s.importance >= HIGHLIGHT_IMPORTANCE_FLOOR)
            .collect();
        picked.sort_by(|a, b| {
            b.importance
                .cmp(&a.importance)
                .then(b.last_email_date.cmp(&a.last_email_date))
                .then(a.sender.cmp(&b.sender))
        });
        picked.truncate(self.config.max_highlights);
        picked
    }

    fn estimate_duration(&self, spoken_items: usize) -> Duration {
        let estimate = self.config.base_duration + self.config.per_item_duration * spoken_items as u32;
        estimate.min(self.config.max_duration)
    }
}

/// One digest line per non-empty category, in spoken order.
fn category_line(category: Category, count: usize) -> String {
    let n = count;
    match category {
        Category::CallMe => format!(
            "{n} {} you to call back.",
            pluralize(n, "sender wants", "senders want")
        ),
        Category::RemindMe => format!(
            "{n} {} a reminder for later.",
            pluralize(n, "sender needs", "senders need")
        ),
        Category::KeepQuiet => format!(
            "{n} {} staying quiet, nothing needed.",
            pluralize(n, "sender is", "senders are")
        ),
        Category::WhyDidISignup => format!(
            "{n} {} promotional noise you probably never meant to sign up for.",
            pluralize(n, "sender is", "senders are")
        ),
        Category::DontTellAnyone => format!(
            "{n} {} for your eyes only.",
            pluralize(n, "message is", "messages are")
        ),
        Category::Newsletter => format!(
            "{n} {} waiting.",
            pluralize(n, "newsletter is", "newsletters are")
        ),
    }
}

/// Canned per-category guidance for reminder calls.
fn reminder_guidance(category: Category) -> &'static str {
    match category {
        Category::CallMe => "They're waiting on a call back — pick up the phone when you can.",
        Category::RemindMe => "You asked to be nudged about these. Today is a good day to reply.",
        Category::KeepQuiet => "Nothing there needs your attention. Enjoy the quiet.",
        Category::Newsletter => {
            "Your newsletters are piling up. Skim or archive them in one sitting."
        }
        Category::WhyDidISignup => {
            "It's mostly promotions. An unsubscribe sweep would clear it right out."
        }
        Category::DontTellAnyone => {
            "There's private mail waiting. Have a look when you're on your own."
        }
    }
}

fn bucket_phrase(category: Category) -> &'static str {
    match category {
        Category::CallMe => "waiting on a call",
        Category::RemindMe => "to follow up with",
        Category::KeepQuiet => "sitting quietly",
        Category::Newsletter => "sending newsletters",
        Category::WhyDidISignup => "sending promotions",
        Category::DontTellAnyone => "marked private",
    }
}

fn pluralize<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

/// "alice@example.com" reads badly aloud; use the mailbox name.
fn display_name(sender: &str) -> &str {
    sender.split('@').next().unwrap_or(sender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AiError;
    use crate::triage::types::CategoryStats;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    fn state(sender: &str, category: Category, importance: u8, subject: &str) -> SenderCategoryState {
        SenderCategoryState {
            sender: sender.into(),
            user_id: "u1".into(),
            category,
            importance,
            email_count: 1,
            latest_subject: subject.into(),
            last_email_date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    fn synthesizer() -> ScriptSynthesizer {
        ScriptSynthesizer::new(SynthesizerConfig::default())
    }

    #[test]
    fn digest_counts_in_stable_spoken_order() {
        let mut stats = CategoryStats::new();
        stats.set(Category::CallMe, 2);
        stats.set(Category::RemindMe, 1);
        stats.set(Category::Newsletter, 3);

        let request = ScriptRequest {
            call_type: CallType::DailyDigest,
            stats: &stats,
            highlights: &[],
            reminder_category: None,
        };
        let script = synthesizer().generate_script(&request);

        let body = &script.body;
        let call_pos = body.find("2 senders want").expect("call-me line present");
        let remind_pos = body.find("remind").expect("remind-me line present");
        let news_pos = body.find("newsletter").expect("newsletter line present");
        assert!(call_pos < remind_pos);
        assert!(remind_pos < news_pos);
    }

    #[test]
    fn digest_is_deterministic() {
        let mut stats = CategoryStats::new();
        stats.set(Category::CallMe, 1);
        stats.set(Category::KeepQuiet, 4);
        let highlights = vec![state("boss@corp.com", Category::CallMe, 5, "Budget review")];

        let request = ScriptRequest {
            call_type: CallType::DailyDigest,
            stats: &stats,
            highlights: &highlights,
            reminder_category: None,
        };
        let synth = synthesizer();
        let first = synth.generate_script(&request);
        let second = synth.generate_script(&request);
        assert_eq!(first, second);
    }

    #[test]
    fn digest_skips_empty_categories() {
        let mut stats = CategoryStats::new();
        stats.set(Category::Newsletter, 2);
        let request = ScriptRequest {
            call_type: CallType::DailyDigest,
            stats: &stats,
            highlights: &[],
            reminder_category: None,
        };
        let script = synthesizer().generate_script(&request);
        assert!(script.body.contains("newsletters"));
        assert!(!script.body.contains("call back"));
        assert!(!script.body.contains("promotional"));
    }

    #[test]
    fn empty_inbox_gets_all_clear() {
        let stats = CategoryStats::new();
        let request = ScriptRequest {
            call_type: CallType::DailyDigest,
            stats: &stats,
            highlights: &[],
            reminder_category: None,
        };
        let script = synthesizer().generate_script(&request);
        assert!(script.body.contains("all clear"));
    }

    #[test]
    fn highlights_capped_and_filtered_by_importance() {
        let stats = CategoryStats::new();
        let mut highlights: Vec<_> = (0..8)
            .map(|i| state(&format!("vip{i}@x.com"), Category::CallMe, 5, "Important"))
            .collect();
        highlights.push(state("meh@x.com", Category::KeepQuiet, 2, "Low priority"));

        let request = ScriptRequest {
            call_type: CallType::DailyDigest,
            stats: &stats,
            highlights: &highlights,
            reminder_category: None,
        };
        let script = synthesizer().generate_script(&request);

        let mentions = script.body.matches("From vip").count();
        assert_eq!(mentions, 5);
        assert!(!script.body.contains("meh"));
    }

    #[test]
    fn urgent_alert_names_senders_and_subjects() {
        let stats = CategoryStats::new();
        let highlights = vec![
            state("ceo@client.com", Category::CallMe, 5, "Wire transfer needed"),
            state("lawyer@firm.com", Category::CallMe, 4, "Contract deadline"),
        ];
        let request = ScriptRequest {
            call_type: CallType::UrgentAlert,
            stats: &stats,
            highlights: &highlights,
            reminder_category: None,
        };
        let script = synthesizer().generate_script(&request);
        assert!(script.body.contains("2 urgent emails"));
        assert!(script.body.contains("ceo"));
        assert!(script.body.contains("Wire transfer needed"));
        assert!(script.body.contains("lawyer"));
        // Urgent scripts stay short — no category breakdown.
        assert!(!script.body.contains("senders are staying quiet"));
    }

    #[test]
    fn reminder_guidance_differs_per_category() {
        let mut stats = CategoryStats::new();
        stats.set(Category::Newsletter, 3);
        stats.set(Category::WhyDidISignup, 2);

        let synth = synthesizer();
        let mut bodies = Vec::new();
        for category in Category::SPOKEN_ORDER {
            let request = ScriptRequest {
                call_type: CallType::Reminder,
                stats: &stats,
                highlights: &[],
                reminder_category: Some(category),
            };
            bodies.push(synth.generate_script(&request).body);
        }
        // All six canned texts are distinct.
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                assert_ne!(bodies[i], bodies[j]);
            }
        }
    }

    #[test]
    fn duration_grows_with_items_and_caps() {
        let synth = synthesizer();
        assert_eq!(synth.estimate_duration(0), Duration::from_secs(15));
        assert_eq!(synth.estimate_duration(3), Duration::from_secs(33));
        assert_eq!(synth.estimate_duration(500), Duration::from_secs(120));
    }

    #[test]
    fn weekly_summary_uses_week_framing() {
        let mut stats = CategoryStats::new();
        stats.set(Category::RemindMe, 2);
        let request = ScriptRequest {
            call_type: CallType::WeeklySummary,
            stats: &stats,
            highlights: &[],
            reminder_category: None,
        };
        let script = synthesizer().generate_script(&request);
        assert!(script.body.contains("week"));
        assert_eq!(script.call_type, CallType::WeeklySummary);
    }

    // ── AI rewrite fallback ─────────────────────────────────────────

    struct FailingRewriter;

    #[async_trait]
    impl AiProvider for FailingRewriter {
        fn model_name(&self) -> &str {
            "mock-rewriter"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<crate::ai::CompletionResponse, AiError> {
            Err(AiError::RequestFailed {
                provider: "mock-rewriter".into(),
                reason: "simulated outage".into(),
            })
        }
    }

    #[tokio::test]
    async fn rewrite_failure_falls_back_to_template() {
        let mut stats = CategoryStats::new();
        stats.set(Category::CallMe, 1);
        let request = ScriptRequest {
            call_type: CallType::DailyDigest,
            stats: &stats,
            highlights: &[],
            reminder_category: None,
        };

        let synth = synthesizer().with_rewriter(std::sync::Arc::new(FailingRewriter));
        let template = synth.generate_script(&request);
        let natural = synth.generate_script_natural(&request).await;
        assert_eq!(natural, template);
    }

    #[tokio::test]
    async fn no_rewriter_returns_template() {
        let stats = CategoryStats::new();
        let request = ScriptRequest {
            call_type: CallType::DailyDigest,
            stats: &stats,
            highlights: &[],
            reminder_category: None,
        };
        let synth = synthesizer();
        let natural = synth.generate_script_natural(&request).await;
        assert_eq!(natural, synth.generate_script(&request));
    }
}
