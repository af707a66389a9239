use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;
use waddle_core::config::WaddleConfig;
use waddle_sessions::{CommunityStore, EntityStore, SessionManager};
use waddle_stream::{StreamPipeline, StreamPipelineConfig};
use waddle_translate::TranslationCore;
use waddle_users::{GrantStore, MembershipStore, PolicyEngine};
use waddle_workflow::WorkflowStore;

use crate::alias::AliasStore;
use crate::auth::ApiKeyStore;
use crate::error::Result;
use crate::trigger::TriggerRegistry;

/// Everything an inbound session's dispatch needs, assembled once at
/// startup and shared behind an `Arc` across every axum handler and
/// spawned dispatch task.
pub struct RouterState {
    pub config: WaddleConfig,
    pub sessions: SessionManager,
    pub entities: EntityStore,
    pub communities: CommunityStore,
    pub policy: PolicyEngine,
    pub aliases: AliasStore,
    pub triggers: TriggerRegistry,
    pub stream: StreamPipeline,
    pub workflows: WorkflowStore,
    pub api_keys: ApiKeyStore,
    /// `None` when no provider is configured — translation is then a no-op
    /// regardless of a community's `translation_enabled` flag.
    pub translation: Option<TranslationCore>,
    publication_seq: AtomicU64,
}

impl RouterState {
    pub fn new(config: WaddleConfig, db_path: &str) -> Result<Self> {
        let sessions = SessionManager::new(Connection::open(db_path)?)?;
        let entities = EntityStore::new(Connection::open(db_path)?)?;
        let communities = CommunityStore::new(Connection::open(db_path)?)?;
        let membership = MembershipStore::new(Connection::open(db_path)?)?;
        let grants = GrantStore::new(Connection::open(db_path)?)?;
        let policy = PolicyEngine::new(membership, grants);
        let aliases = AliasStore::new(Connection::open(db_path)?)?;
        let workflows = WorkflowStore::new(Connection::open(db_path)?)?;
        let api_keys = ApiKeyStore::new(Connection::open(db_path)?)?;
        let stream = StreamPipeline::open(
            db_path,
            StreamPipelineConfig {
                enabled: config.stream.enabled,
                stream_prefix: config.stream.prefix.clone(),
                dlq_prefix: config.stream.dlq_prefix.clone(),
                max_retries: config.stream.max_retries,
                batch_size: config.stream.batch_size,
                block_ms: config.stream.block_ms,
                max_len: config.stream.max_len,
            },
        )?;

        Ok(Self {
            config,
            sessions,
            entities,
            communities,
            policy,
            aliases,
            triggers: TriggerRegistry::new(),
            stream,
            workflows,
            api_keys,
            translation: None,
            publication_seq: AtomicU64::new(0),
        })
    }

    pub fn next_publication_id(&self) -> u64 {
        self.publication_seq.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn build_router(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/events", post(crate::http::post_events))
        .route("/responses", post(crate::http::post_responses))
        .route("/commands", get(crate::http::get_commands))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;
    use waddle_core::config::WaddleConfig;

    #[test]
    fn new_assigns_distinct_publication_ids() {
        let state = RouterState::new(WaddleConfig::default(), ":memory:").unwrap();
        let a = state.next_publication_id();
        let b = state.next_publication_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn build_router_serves_get_commands() {
        let state = Arc::new(RouterState::new(WaddleConfig::default(), ":memory:").unwrap());
        let router = build_router(state);
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/commands")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
