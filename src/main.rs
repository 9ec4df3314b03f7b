use std::sync::Arc;

use callbrief::ai::{AiConfig, create_provider};
use callbrief::calls::{
    CallDispatcher, CallScheduler, DispatcherConfig, TelephonyGateway, TwilioConfig,
    TwilioGateway, spawn_schedule_ticker, spawn_status_reconciler,
};
use callbrief::config::AppConfig;
use callbrief::script::{ScriptSynthesizer, SynthesizerConfig};
use callbrief::source::SpoolSource;
use callbrief::store::{LibSqlStorage, Storage};
use callbrief::triage::{AiCategorizer, CategorizerConfig, InboxPipeline};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env();

    eprintln!("📞 callbrief v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);

    // ── Storage ──────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let store: Arc<dyn Storage> = Arc::new(LibSqlStorage::new_local(db_path).await.map_err(
        |e| {
            eprintln!("Error: failed to open database at {}: {}", config.db_path, e);
            e
        },
    )?);

    // ── AI provider (optional — heuristics carry the load without it) ─
    let provider = match AiConfig::from_env() {
        Some(ai_config) => {
            eprintln!("   AI: {}", ai_config.model);
            Some(create_provider(&ai_config)?)
        }
        None => {
            eprintln!("   AI: disabled (no ANTHROPIC_API_KEY / OPENAI_API_KEY)");
            None
        }
    };

    // ── Telephony gateway (optional — dispatch refuses locally) ──────
    let gateway: Option<Arc<dyn TelephonyGateway>> = match TwilioConfig::from_env() {
        Some(twilio_config) => {
            eprintln!("   Telephony: Twilio ({})", twilio_config.from_number);
            Some(Arc::new(TwilioGateway::new(twilio_config)?))
        }
        None => {
            eprintln!("   Telephony: disabled (no TWILIO_* credentials)");
            None
        }
    };

    // ── Call side ────────────────────────────────────────────────────
    let dispatcher = Arc::new(CallDispatcher::new(
        gateway,
        Arc::clone(&store),
        DispatcherConfig::default(),
    ));

    let mut synthesizer = ScriptSynthesizer::new(SynthesizerConfig::default());
    if let Some(provider) = &provider {
        synthesizer = synthesizer.with_rewriter(Arc::clone(provider));
    }

    let scheduler = Arc::new(CallScheduler::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        synthesizer,
    ));

    let _schedule_handle = spawn_schedule_ticker(Arc::clone(&scheduler), config.schedule_tick);
    let _reconcile_handle = spawn_status_reconciler(Arc::clone(&dispatcher), config.reconcile_tick);

    // ── Triage side (needs a message source) ─────────────────────────
    let _scan_handle = match &config.spool_dir {
        Some(spool_dir) => {
            eprintln!("   Spool: {}", spool_dir.display());
            let pipeline = Arc::new(InboxPipeline::new(
                Arc::new(SpoolSource::new(spool_dir.clone())),
                AiCategorizer::new(provider, CategorizerConfig::default()),
                Arc::clone(&store),
                Arc::clone(&scheduler),
            ));
            Some(spawn_scan_loop(pipeline, Arc::clone(&store), config.clone()))
        }
        None => {
            eprintln!("   Spool: disabled (set CALLBRIEF_SPOOL_DIR to scan)");
            None
        }
    };

    eprintln!(
        "   Ticks: schedule {}s, reconcile {}s\n",
        config.schedule_tick.as_secs(),
        config.reconcile_tick.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down.");
    Ok(())
}

/// Scan every user that has an active schedule, on an interval.
fn spawn_scan_loop(
    pipeline: Arc<InboxPipeline>,
    store: Arc<dyn Storage>,
    config: AppConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.scan_interval);

        loop {
            ticker.tick().await;

            let schedules = match store.active_schedules().await {
                Ok(schedules) => schedules,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not list users for scanning");
                    continue;
                }
            };

            let mut user_ids: Vec<String> =
                schedules.into_iter().map(|s| s.user_id).collect();
            user_ids.sort();
            user_ids.dedup();

            for user_id in user_ids {
                if let Err(e) = pipeline.run_scan(&user_id, config.scan_batch_size).await {
                    tracing::warn!(user_id = %user_id, error = %e, "Scan failed");
                }
            }
        }
    })
}
