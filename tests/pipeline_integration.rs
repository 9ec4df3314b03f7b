//! End-to-end scenarios: fetch → categorize → aggregate → dispatch.
//!
//! Everything external is faked: a static message source, the in-memory
//! store, and a scripted telephony gateway. The AI service is left
//! unconfigured so categorization exercises the heuristic safety net.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use callbrief::calls::gateway::{GatewayCallStatus, PlacedCall, TelephonyGateway};
use callbrief::calls::{
    CallDispatcher, CallScheduler, CallScript, CallStatus, CallType, DispatcherConfig,
    ScheduledCall, UserAccount,
};
use callbrief::error::{CallError, SourceError};
use callbrief::script::{ScriptSynthesizer, SynthesizerConfig};
use callbrief::source::MessageSource;
use callbrief::store::{MemoryStorage, Storage};
use callbrief::triage::{
    AiCategorizer, Category, CategorizerConfig, EmailMessage, InboxPipeline,
};

// ── Fakes ───────────────────────────────────────────────────────────

/// Message source with a fixed inbox.
struct StaticSource {
    messages: Vec<EmailMessage>,
    auth_broken: bool,
}

#[async_trait]
impl MessageSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_messages(
        &self,
        _user_id: &str,
        max_results: usize,
    ) -> Result<Vec<EmailMessage>, SourceError> {
        if self.auth_broken {
            return Err(SourceError::Auth("token revoked".into()));
        }
        Ok(self.messages.iter().take(max_results).cloned().collect())
    }
}

/// Gateway recording placed calls; optionally unreachable.
struct FakeGateway {
    placed: Mutex<Vec<(String, String, CallType)>>,
    status_calls: AtomicUsize,
    reachable: bool,
}

impl FakeGateway {
    fn new() -> Self {
        Self {
            placed: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            reachable: true,
        }
    }

    fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }
}

#[async_trait]
impl TelephonyGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn place_call(
        &self,
        to_number: &str,
        script: &CallScript,
        _voice_id: Option<&str>,
    ) -> Result<PlacedCall, CallError> {
        if !self.reachable {
            return Err(CallError::Unreachable {
                name: "fake".into(),
                reason: "network down".into(),
            });
        }
        let mut placed = self.placed.lock().unwrap();
        placed.push((to_number.into(), script.body.clone(), script.call_type));
        Ok(PlacedCall {
            provider_call_id: format!("CA-{}", placed.len()),
            status: GatewayCallStatus::Queued,
        })
    }

    async fn call_status(&self, _provider_call_id: &str) -> Result<GatewayCallStatus, CallError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayCallStatus::Completed)
    }
}

// ── Fixture wiring ──────────────────────────────────────────────────

struct Fixture {
    store: Arc<MemoryStorage>,
    gateway: Arc<FakeGateway>,
    scheduler: Arc<CallScheduler>,
    pipeline: InboxPipeline,
}

fn fixture(messages: Vec<EmailMessage>, gateway: FakeGateway) -> Fixture {
    let store = Arc::new(MemoryStorage::new());
    let gateway = Arc::new(gateway);
    let dispatcher = Arc::new(CallDispatcher::new(
        Some(gateway.clone() as Arc<dyn TelephonyGateway>),
        store.clone(),
        DispatcherConfig::default(),
    ));
    let scheduler = Arc::new(CallScheduler::new(
        store.clone(),
        dispatcher,
        ScriptSynthesizer::new(SynthesizerConfig::default()),
    ));
    let pipeline = InboxPipeline::new(
        Arc::new(StaticSource {
            messages,
            auth_broken: false,
        }),
        AiCategorizer::heuristic_only(CategorizerConfig::default()),
        store.clone(),
        scheduler.clone(),
    );
    Fixture {
        store,
        gateway,
        scheduler,
        pipeline,
    }
}

async fn seed_user(store: &MemoryStorage, phone: &str) {
    store
        .upsert_user(&UserAccount {
            id: "u1".into(),
            phone_number: phone.into(),
            voice_id: None,
            email_connected: true,
        })
        .await
        .unwrap();
}

fn message(id: &str, subject: &str, from: &str, day: u32) -> EmailMessage {
    EmailMessage {
        id: id.into(),
        thread_id: None,
        subject: subject.into(),
        from: from.into(),
        to: Some("me@example.com".into()),
        date: Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap(),
        snippet: format!("snippet of {subject}"),
        body: format!("body of {subject}"),
        labels: vec![],
        is_read: false,
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

/// AI disabled, urgent subject → heuristic path classifies call-me and
/// the urgent fast path places an alert call.
#[tokio::test]
async fn urgent_email_heuristic_path_triggers_alert_call() {
    let fx = fixture(
        vec![message(
            "m1",
            "URGENT: wire transfer needed",
            "ceo@client.com",
            5,
        )],
        FakeGateway::new(),
    );
    seed_user(&fx.store, "+15551234567").await;

    let report = fx.pipeline.run_scan("u1", 50).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.urgent_senders, 1);

    let state = fx
        .store
        .sender_state("u1", "ceo@client.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.category, Category::CallMe);
    assert_eq!(state.importance, 4);

    let call = report.urgent_call.expect("urgent call dispatched");
    assert_eq!(call.call_type, CallType::UrgentAlert);
    assert_eq!(call.status, CallStatus::Initiated);

    let placed = fx.gateway.placed.lock().unwrap();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].0, "+15551234567");
    assert!(placed[0].1.contains("ceo"));
    assert!(placed[0].1.contains("URGENT: wire transfer needed"));
}

/// Heuristic classification satisfies the closed-set + range invariants
/// and the documented per-rule outcomes.
#[tokio::test]
async fn heuristic_results_respect_declared_ranges() {
    let fx = fixture(
        vec![message("m1", "URGENT: server down", "ops@x.com", 3)],
        FakeGateway::new(),
    );
    seed_user(&fx.store, "+15551234567").await;
    fx.pipeline.run_scan("u1", 50).await.unwrap();

    let state = fx.store.sender_state("u1", "ops@x.com").await.unwrap().unwrap();
    assert!(Category::SPOKEN_ORDER.contains(&state.category));
    assert!((1..=5).contains(&state.importance));
}

/// Newsletter on Jan 1, call-me on Jan 5 → sender ends as call-me with
/// both messages counted.
#[tokio::test]
async fn latest_message_wins_across_scans() {
    let fx = fixture(
        vec![
            message("m1", "Monthly newsletter", "mixed@sender.com", 1),
            message("m2", "URGENT: contract signature", "mixed@sender.com", 5),
        ],
        FakeGateway::new(),
    );
    seed_user(&fx.store, "+15551234567").await;

    fx.pipeline.run_scan("u1", 50).await.unwrap();

    let state = fx
        .store
        .sender_state("u1", "mixed@sender.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.category, Category::CallMe);
    assert_eq!(state.email_count, 2);
    assert_eq!(state.latest_subject, "URGENT: contract signature");
}

/// Re-running the same scan does not inflate counts or flip categories.
#[tokio::test]
async fn rescanning_same_messages_is_idempotent() {
    let fx = fixture(
        vec![message("m1", "Monthly newsletter", "news@site.com", 2)],
        FakeGateway::new(),
    );
    seed_user(&fx.store, "+15551234567").await;

    fx.pipeline.run_scan("u1", 50).await.unwrap();
    fx.pipeline.run_scan("u1", 50).await.unwrap();

    let state = fx
        .store
        .sender_state("u1", "news@site.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.email_count, 1);
    assert_eq!(state.category, Category::Newsletter);
}

/// Digest script reads category counts in the stable spoken order.
#[tokio::test]
async fn daily_digest_reads_counts_in_order() {
    let fx = fixture(Vec::new(), FakeGateway::new());
    seed_user(&fx.store, "+15551234567").await;

    // 2 call-me, 1 remind-me, 3 newsletters, straight into the store.
    let seed = [
        ("a@x.com", Category::CallMe, 5),
        ("b@x.com", Category::CallMe, 4),
        ("c@x.com", Category::RemindMe, 3),
        ("d@x.com", Category::Newsletter, 2),
        ("e@x.com", Category::Newsletter, 2),
        ("f@x.com", Category::Newsletter, 2),
    ];
    for (sender, category, importance) in seed {
        fx.store
            .upsert_sender_state(&callbrief::triage::SenderCategoryState {
                sender: sender.into(),
                user_id: "u1".into(),
                category,
                importance,
                email_count: 1,
                latest_subject: "Subject".into(),
                last_email_date: Utc::now(),
            })
            .await
            .unwrap();
    }

    let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    fx.store
        .upsert_schedule(&ScheduledCall {
            id: "s1".into(),
            user_id: "u1".into(),
            phone_number: "+15551234567".into(),
            call_type: CallType::DailyDigest,
            schedule: "0 0 8 * * *".into(),
            next_run_at: now,
            is_active: true,
        })
        .await
        .unwrap();

    fx.scheduler.tick(now).await;

    let placed = fx.gateway.placed.lock().unwrap();
    assert_eq!(placed.len(), 1);
    let body = &placed[0].1;

    let call_pos = body.find("2 senders want").expect("call-me count spoken");
    let remind_pos = body.find("remind").expect("remind-me spoken");
    let news_pos = body.find("newsletter").expect("newsletters spoken");
    assert!(call_pos < remind_pos && remind_pos < news_pos);
}

/// Invalid phone number: the log entry fails immediately and the
/// gateway is never contacted.
#[tokio::test]
async fn invalid_number_fails_fast_without_gateway_io() {
    let fx = fixture(
        vec![message("m1", "URGENT: now", "ceo@client.com", 5)],
        FakeGateway::new(),
    );
    seed_user(&fx.store, "").await; // no phone number on file

    let report = fx.pipeline.run_scan("u1", 50).await.unwrap();
    let call = report.urgent_call.expect("refused call still logged");
    assert_eq!(call.status, CallStatus::Failed);
    assert!(call.provider_call_id.is_none());

    assert!(fx.gateway.placed.lock().unwrap().is_empty());
    assert_eq!(fx.gateway.status_calls.load(Ordering::SeqCst), 0);

    // The refusal is visible in the user's call history.
    let history = fx.store.call_logs_for_user("u1", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, CallStatus::Failed);
}

/// Unreachable gateway: dispatch degrades to a failed entry, no error.
#[tokio::test]
async fn unreachable_gateway_yields_failed_entry() {
    let fx = fixture(
        vec![message("m1", "URGENT: now", "ceo@client.com", 5)],
        FakeGateway::unreachable(),
    );
    seed_user(&fx.store, "+15551234567").await;

    let report = fx.pipeline.run_scan("u1", 50).await.unwrap();
    let call = report.urgent_call.expect("failed call still logged");
    assert_eq!(call.status, CallStatus::Failed);
    assert!(call.completed_time.is_some());
}

/// Auth failures from the source are surfaced (distinguishable from
/// transient fetch problems), not swallowed.
#[tokio::test]
async fn source_auth_failure_propagates() {
    let store = Arc::new(MemoryStorage::new());
    let gateway = Arc::new(FakeGateway::new());
    let dispatcher = Arc::new(CallDispatcher::new(
        Some(gateway as Arc<dyn TelephonyGateway>),
        store.clone(),
        DispatcherConfig::default(),
    ));
    let scheduler = Arc::new(CallScheduler::new(
        store.clone(),
        dispatcher,
        ScriptSynthesizer::new(SynthesizerConfig::default()),
    ));
    let pipeline = InboxPipeline::new(
        Arc::new(StaticSource {
            messages: vec![],
            auth_broken: true,
        }),
        AiCategorizer::heuristic_only(CategorizerConfig::default()),
        store.clone(),
        scheduler,
    );

    let err = pipeline.run_scan("u1", 50).await.unwrap_err();
    assert!(err.to_string().contains("Authentication"));
}

/// The reconciliation sweep settles calls the provider reports done.
#[tokio::test]
async fn reconciliation_settles_placed_calls() {
    let fx = fixture(
        vec![message("m1", "URGENT: now", "ceo@client.com", 5)],
        FakeGateway::new(),
    );
    seed_user(&fx.store, "+15551234567").await;

    let report = fx.pipeline.run_scan("u1", 50).await.unwrap();
    let call = report.urgent_call.unwrap();
    assert_eq!(call.status, CallStatus::Initiated);

    let open = fx.store.open_call_logs().await.unwrap();
    assert_eq!(open.len(), 1);

    let dispatcher = CallDispatcher::new(
        Some(fx.gateway.clone() as Arc<dyn TelephonyGateway>),
        fx.store.clone(),
        DispatcherConfig::default(),
    );
    dispatcher.reconcile_open_calls().await;

    let settled = fx.store.call_log(call.id).await.unwrap().unwrap();
    assert_eq!(settled.status, CallStatus::Completed);
    assert!(settled.completed_time.is_some());
    assert!(fx.store.open_call_logs().await.unwrap().is_empty());
}
