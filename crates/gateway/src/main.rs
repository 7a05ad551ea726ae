use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use candor_domain::clock::{Clock, SystemClock};
use candor_domain::config::{Config, ConfigSeverity};
use candor_domain::interview::InterviewStatus;
use candor_domain::session::TerminalKind;
use candor_providers::llm::OpenAiCompatLlm;
use candor_providers::tts::HttpTts;
use candor_providers::vision::HttpDetector;
use candor_providers::{FrameDetector, LlmProvider, TtsProvider};
use candor_sessions::SessionRegistry;

use candor_gateway::api;
use candor_gateway::cli::{self, Cli, Command, ConfigCommand};
use candor_gateway::interviews::InterviewStore;
use candor_gateway::runtime::coding::{CodingEvaluator, CodingQuestionBank, ProcessRunner};
use candor_gateway::runtime::dialogue::DialogueController;
use candor_gateway::runtime::evaluation::{EvaluationAssembler, EvaluationStore};
use candor_gateway::runtime::proctor::ProctorManager;
use candor_gateway::runtime::recording::{FfmpegRunner, RecordingStore};
use candor_gateway::runtime::snapshot;
use candor_gateway::runtime::tts_cache::TtsCache;
use candor_gateway::slots::SlotStore;
use candor_gateway::state::AppState;
use candor_gateway::storage::Storage;
use candor_gateway::tokens::TokenService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let config = cli::load_config()?;
            if !cli::doctor::run(&config).await {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = cli::load_config()?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues
                .iter()
                .any(|i| i.severity == ConfigSeverity::Error)
            {
                std::process::exit(2);
            }
            println!("configuration is valid");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = cli::load_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("candor {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(admin) => {
            let code = cli::run_admin(&cli.gateway, admin).await;
            std::process::exit(code);
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,candor_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Candor starting");

    // ── Config validation ────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Clock & storage ──────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = Arc::new(Storage::new(config.storage.root.clone()));
    storage.ensure_layout().context("creating storage layout")?;
    tracing::info!(root = %config.storage.root.display(), "storage ready");

    // ── Durable stores ───────────────────────────────────────────
    let slots = Arc::new(
        SlotStore::new(&config.storage.state_path).context("initializing slot store")?,
    );
    let interviews = Arc::new(
        InterviewStore::new(&config.storage.state_path)
            .context("initializing interview store")?,
    );
    let evaluations = Arc::new(
        EvaluationStore::new(&config.storage.state_path)
            .context("initializing evaluation store")?,
    );

    // ── Providers ────────────────────────────────────────────────
    let llm: Arc<dyn LlmProvider> =
        Arc::new(OpenAiCompatLlm::from_config(&config.llm).context("initializing LLM adapter")?);
    let tts_provider: Arc<dyn TtsProvider> =
        Arc::new(HttpTts::from_config(&config.tts).context("initializing TTS adapter")?);
    let detector_primary: Arc<dyn FrameDetector> = Arc::new(
        HttpDetector::primary(&config.vision).context("initializing primary detector")?,
    );
    let detector_fallback: Arc<dyn FrameDetector> = Arc::new(
        HttpDetector::fallback(&config.vision).context("initializing fallback detector")?,
    );
    tracing::info!(
        llm = %config.llm.model,
        stt = %config.stt.model,
        "provider adapters ready"
    );

    // ── Runtime ──────────────────────────────────────────────────
    let registry = Arc::new(SessionRegistry::new());
    let tts_cache = Arc::new(TtsCache::new(tts_provider, storage.clone(), &config.tts));
    let dialogue = DialogueController::new(
        llm.clone(),
        tts_cache,
        clock.clone(),
        config.dialogue.clone(),
        config.tts.voice.clone(),
        config.llm.call_deadline_s,
    );
    let proctor = Arc::new(ProctorManager::new(
        detector_primary,
        detector_fallback,
        config.proctor.clone(),
        storage.clone(),
        clock.clone(),
    ));
    let recordings = Arc::new(RecordingStore::new(
        storage.clone(),
        Arc::new(FfmpegRunner::new(&config.recording)),
        config.recording.clone(),
    ));
    let coding_bank = Arc::new(
        CodingQuestionBank::load(&config.storage.state_path)
            .context("loading coding question bank")?,
    );
    let coding = Arc::new(CodingEvaluator::new(
        coding_bank,
        Arc::new(ProcessRunner::new(config.coding.clone())),
        llm.clone(),
        config.llm.call_deadline_s,
    ));
    let assembler = Arc::new(EvaluationAssembler::new(
        llm.clone(),
        config.llm.call_deadline_s,
        evaluations.clone(),
        storage.clone(),
    ));

    let tokens = Arc::new(TokenService::new(
        config.access.clone(),
        config.dialogue.clone(),
        config.proctor.clone(),
        clock.clone(),
        interviews.clone(),
        slots.clone(),
        registry.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        clock: clock.clone(),
        storage,
        slots,
        interviews,
        tokens,
        registry,
        dialogue,
        llm,
        proctor,
        recordings,
        coding,
        evaluations,
        assembler,
        admin_token_hash: api::auth::admin_token_hash(&config.server.admin_token_env),
    };

    // ── Session sweeper (hard expiry + GC) ───────────────────────
    spawn_session_sweeper(state.clone());

    // ── Serve ────────────────────────────────────────────────────
    let router = api::build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;
    Ok(())
}

/// Periodic sweep: hard-cancel sessions past `valid_until` (they become
/// Abandoned, with artifacts persisted) and drop swept entries from the
/// registry.
fn spawn_session_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            tick.tick().await;
            let now = state.clock.now_utc();

            for handle in state.registry.list() {
                if now < handle.valid_until || handle.is_terminal() {
                    continue;
                }
                tracing::info!(session_id = %handle.id, "access window closed, abandoning");
                {
                    let mut session = handle.state.lock().await;
                    handle.mark_terminal(&mut session, TerminalKind::Abandoned);
                }
                let snap = snapshot::capture(&handle, TerminalKind::Abandoned, now).await;
                if let Err(e) =
                    snapshot::persist(&state.config.storage.state_path, &snap).await
                {
                    tracing::error!(session_id = %handle.id, error = %e, "snapshot persist failed");
                }
                if let Err(e) = state
                    .interviews
                    .set_status(&handle.interview_id, InterviewStatus::Abandoned)
                    .await
                {
                    tracing::warn!(error = %e, "failed to mark interview abandoned");
                }
                state.proctor.detach(&handle.id);
            }

            let removed = state.registry.gc(now);
            if !removed.is_empty() {
                tracing::debug!(count = removed.len(), "sessions swept");
            }
        }
    });
}
