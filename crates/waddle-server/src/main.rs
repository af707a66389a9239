use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{info, warn};
use waddle_core::config::WaddleConfig;
use waddle_router::{RouterState, TriggerRegistry};
use waddle_scheduler::{Job, Schedule, SchedulerEngine, SchedulerHandle};
use waddle_translate::{
    AiBackedProvider, CommercialProvider, LightweightProvider, TranslationCore, TranslationCoreConfig,
    TranslationProvider,
};
use waddle_workflow::{NodeKind, WorkflowDefinition, WorkflowEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waddle_server=info,waddle_router=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("WADDLE_CONFIG").ok();
    let config = WaddleConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        WaddleConfig::default()
    });

    let bind_port = config.module.port;
    let db_path = config.database.url.clone();

    let mut state = RouterState::new(config.clone(), &db_path)?;
    bootstrap_triggers(&state.triggers, &config.router.triggers);
    state.translation = Some(build_translation_core(&config)?);
    let state = Arc::new(state);

    let ingest_state = state.clone();
    tokio::spawn(waddle_router::ingest::run(ingest_state, format!("router-{}", uuid::Uuid::new_v4())));

    spawn_scheduler(state.clone(), &db_path)?;

    let router = waddle_router::build_router(state);
    let addr: SocketAddr = format!("0.0.0.0:{bind_port}").parse()?;
    info!(%addr, "waddle-server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Populate the trigger table from `[[router.triggers]]` config entries —
/// the bootstrap mechanism standing in for each interaction module's own
/// registration call.
fn bootstrap_triggers(registry: &TriggerRegistry, entries: &[waddle_core::config::TriggerBootstrap]) {
    for entry in entries {
        let kind = match entry.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(pattern = %entry.pattern, error = %e, "skipping trigger with unknown kind");
                continue;
            }
        };
        let role = entry.required_role.parse().unwrap_or(waddle_core::types::UserRole::Member);
        registry.register_full(entry.pattern.clone(), kind, entry.module_name.clone(), entry.priority, role, None);
    }
    info!(count = entries.len(), "bootstrapped triggers from config");
}

/// Bootstraps the scheduler from every `TriggerSchedule` node in a
/// workflow's graph, then starts the engine's tick loop and a consumer
/// that runs the bound workflow whenever one of its jobs fires — the
/// missing link between `waddle-scheduler`'s cron ticks and
/// `waddle-workflow`'s graph walk.
fn spawn_scheduler(state: Arc<RouterState>, db_path: &str) -> anyhow::Result<()> {
    let handle = SchedulerHandle::new(Connection::open(db_path)?)?;
    let workflows = state.workflows.list_all_enabled()?;
    bootstrap_schedule_jobs(&handle, &workflows);

    let (fired_tx, mut fired_rx) = tokio::sync::mpsc::channel(64);
    let engine = SchedulerEngine::new(Connection::open(db_path)?, Some(fired_tx))?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    // Held for the process lifetime so the receiver never observes a closed
    // sender and busy-loops on `changed()`.
    std::mem::forget(shutdown_tx);
    tokio::spawn(engine.run(shutdown_rx));

    tokio::spawn(async move {
        while let Some(job) = fired_rx.recv().await {
            run_fired_job(&state, job).await;
        }
    });

    Ok(())
}

fn bootstrap_schedule_jobs(handle: &SchedulerHandle, workflows: &[WorkflowDefinition]) {
    let existing: std::collections::HashSet<String> = handle
        .list_jobs()
        .map(|jobs| jobs.into_iter().map(|j| j.name).collect())
        .unwrap_or_default();

    for workflow in workflows {
        for node in &workflow.nodes {
            let NodeKind::TriggerSchedule(cfg) = &node.kind else {
                continue;
            };
            let job_name = format!("workflow:{}:{}", workflow.id, node.id);
            if existing.contains(&job_name) {
                continue;
            }
            let action = serde_json::json!({"workflow_id": workflow.id, "node_id": node.id}).to_string();
            let schedule = Schedule::Cron {
                expression: cfg.cron.clone(),
            };
            if let Err(e) = handle.add_job(&job_name, schedule, &action) {
                warn!(workflow_id = %workflow.id, error = %e, "failed to register schedule job");
            }
        }
    }
}

async fn run_fired_job(state: &Arc<RouterState>, job: Job) {
    let Ok(action) = serde_json::from_str::<serde_json::Value>(&job.action) else {
        warn!(job = %job.name, "scheduled job has an unparseable action payload");
        return;
    };
    let Some(workflow_id) = action.get("workflow_id").and_then(|v| v.as_str()) else {
        warn!(job = %job.name, "scheduled job action is missing workflow_id");
        return;
    };
    match state.workflows.get(workflow_id) {
        Ok(Some(definition)) => {
            let engine = WorkflowEngine::default();
            let context = serde_json::json!({"job_name": job.name, "fired_at": job.last_run});
            match engine.run(&definition, context).await {
                Ok(result) if result.completed => info!(workflow_id, job = %job.name, "scheduled workflow run completed"),
                Ok(_) => warn!(workflow_id, job = %job.name, "scheduled workflow run did not reach a successful end"),
                Err(e) => warn!(workflow_id, job = %job.name, error = %e, "scheduled workflow run errored"),
            }
        }
        Ok(None) => warn!(workflow_id, "scheduled job references a missing or disabled workflow"),
        Err(e) => warn!(workflow_id, error = %e, "failed to load scheduled workflow"),
    }
}

/// Wires the tri-tier cache and the provider fallback chain. The
/// commercial provider is only added to the chain when a base URL is
/// configured; the other two are always present since
/// `health_check` already gates use of an unreachable endpoint.
fn build_translation_core(config: &WaddleConfig) -> anyhow::Result<TranslationCore> {
    let cache_conn = Connection::open(&config.cache.url)?;
    let cache = Arc::new(waddle_cache::TriTierCache::open(
        cache_conn,
        Duration::from_secs(config.cache.l1_ttl_secs),
        Duration::from_secs(config.cache.l2_ttl_secs),
        config.cache.l1_max_entries,
    )?);

    let mut providers: Vec<Arc<dyn TranslationProvider>> = Vec::new();
    if let Some(base_url) = &config.translation.commercial_base_url {
        providers.push(Arc::new(CommercialProvider::new(
            base_url.clone(),
            config.translation.commercial_api_key.clone(),
        )));
    }
    providers.push(Arc::new(LightweightProvider::new(config.translation.lightweight_base_url.clone())));
    providers.push(Arc::new(AiBackedProvider::new(
        config.translation.ai_base_url.clone(),
        config.translation.ai_model.clone(),
    )));

    Ok(TranslationCore::new(
        cache,
        providers,
        TranslationCoreConfig {
            min_words: config.translation.min_words,
            confidence_threshold: config.translation.confidence_threshold,
        },
    ))
}
