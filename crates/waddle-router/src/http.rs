//! HTTP boundary: `POST /events` admits an inbound session and returns
//! immediately, `POST /responses` lets a dispatched module answer,
//! `GET /commands` lists registered triggers for client autocomplete. Each
//! handler follows the same sequence — parse, authenticate, authorize,
//! validate, handle, serialize, log — as explicit calls in the handler
//! body.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tracing::info;
use waddle_sessions::{ModuleResponse, Session};

use crate::app::RouterState;
use crate::auth::resolve_credential;
use crate::dispatcher::{self, InboundContext};
use crate::error::RouterError;
use crate::types::{CommandListing, InboundEventRequest, InboundEventResponse, ModuleResponseAck, ModuleResponseRequest};

impl IntoResponse for RouterError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({"error": self.code(), "message": self.to_string()}));
        (status, body).into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn authenticate(state: &RouterState, headers: &HeaderMap) -> Result<waddle_core::types::Credential> {
    resolve_credential(
        header_str(headers, "authorization"),
        header_str(headers, "x-api-key"),
        &state.config.auth.jwt_secret,
        &state.api_keys,
    )
}

/// `POST /events`: parse -> authenticate -> validate -> enqueue -> respond.
/// When the Event Stream Pipeline is enabled the envelope is published to
/// `events:inbound` for the `ingest` consumer loop to pick up; otherwise
/// dispatch runs inline in a spawned task. Either way the caller never
/// waits on the full session lifecycle.
pub async fn post_events(
    State(state): State<Arc<RouterState>>,
    headers: HeaderMap,
    Json(req): Json<InboundEventRequest>,
) -> std::result::Result<Json<InboundEventResponse>, RouterError> {
    let _credential = authenticate(&state, &headers)?;

    if req.user_id.trim().is_empty() || req.username.trim().is_empty() {
        return Err(RouterError::Validation("user_id and username are required".to_string()));
    }
    if req.channel_id.trim().is_empty() {
        return Err(RouterError::Validation("channel_id is required".to_string()));
    }

    let session = Session::new(
        req.platform,
        req.user_id,
        req.username,
        req.display_name,
        req.message,
        req.message_type,
    );
    let session_id = session.id.to_string();
    let ctx = InboundContext {
        server_id: req.server_id.unwrap_or_default(),
        channel_id: req.channel_id,
    };

    info!(session_id, platform = %req.platform, "event accepted");

    if state.stream.is_enabled() {
        let envelope = crate::ingest::InboundEnvelope { session, ctx };
        let payload = serde_json::to_value(&envelope)?;
        state.stream.publish(crate::ingest::INBOUND_STREAM, payload, None).await?;
    } else {
        tokio::spawn(dispatcher::dispatch(state, session, ctx));
    }

    Ok(Json(InboundEventResponse {
        accepted: true,
        session_id,
    }))
}

/// `POST /responses`: one interaction module answering a dispatched
/// command. Recorded into the session's aggregator; the dispatch task
/// waiting on it wakes via `SessionAggregator::wait_for_response`.
pub async fn post_responses(
    State(state): State<Arc<RouterState>>,
    headers: HeaderMap,
    Json(req): Json<ModuleResponseRequest>,
) -> std::result::Result<Json<ModuleResponseAck>, RouterError> {
    let _credential = authenticate(&state, &headers)?;

    if req.module_name.trim().is_empty() {
        return Err(RouterError::Validation("module_name is required".to_string()));
    }
    if state.sessions.correlation_state(&req.session_id)?.is_none() {
        return Err(RouterError::SessionNotFound(req.session_id));
    }

    let publication_id = state.next_publication_id();
    state.sessions.aggregator.record(
        &req.session_id,
        ModuleResponse {
            module_name: req.module_name,
            success: req.success,
            response_action: req.response_action,
            response_data: req.response_data,
            error_message: req.error_message,
            processing_time_ms: req.processing_time_ms,
            publication_id,
        },
    );

    Ok(Json(ModuleResponseAck { accepted: true }))
}

#[derive(Debug, Deserialize)]
pub struct CommandsQuery {
    pub platform: Option<String>,
}

/// `GET /commands?platform=` — registered triggers, for client-side
/// autocomplete. No auth required: this is public catalog data.
pub async fn get_commands(
    State(state): State<Arc<RouterState>>,
    Query(_query): Query<CommandsQuery>,
) -> Json<Vec<CommandListing>> {
    let listings = state
        .triggers
        .all()
        .into_iter()
        .map(|t| CommandListing {
            pattern: t.pattern,
            event_type: format!("{:?}", t.kind),
            module_name: t.module_name,
            priority: t.priority,
        })
        .collect();
    Json(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use waddle_core::config::WaddleConfig;
    use waddle_core::types::{MessageType, Platform};

    fn state() -> Arc<RouterState> {
        Arc::new(RouterState::new(WaddleConfig::default(), ":memory:").unwrap())
    }

    fn api_key_headers(state: &RouterState) -> HeaderMap {
        let raw = state.api_keys.issue("tester", &["events:write".to_string()]).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&raw).unwrap());
        headers
    }

    fn sample_request() -> InboundEventRequest {
        InboundEventRequest {
            session_id: None,
            entity_id: None,
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            display_name: None,
            message: "!help".to_string(),
            message_type: MessageType::ChatMessage,
            platform: Platform::Twitch,
            channel_id: "c7".to_string(),
            server_id: Some("s1".to_string()),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn post_events_without_credential_is_unauthenticated() {
        let state = state();
        let err = post_events(State(state), HeaderMap::new(), Json(sample_request()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn post_events_rejects_empty_user_id() {
        let state = state();
        let headers = api_key_headers(&state);
        let mut req = sample_request();
        req.user_id = "  ".to_string();
        let err = post_events(State(state), headers, Json(req)).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn post_events_accepts_a_well_formed_request() {
        let state = state();
        let headers = api_key_headers(&state);
        let resp = post_events(State(state), headers, Json(sample_request())).await.unwrap();
        assert!(resp.accepted);
        assert!(!resp.session_id.is_empty());
    }

    #[tokio::test]
    async fn post_responses_rejects_unknown_session() {
        let state = state();
        let headers = api_key_headers(&state);
        let req = ModuleResponseRequest {
            session_id: "does-not-exist".to_string(),
            module_name: "help_mod".to_string(),
            success: true,
            response_action: None,
            response_data: None,
            error_message: None,
            processing_time_ms: 1,
        };
        let err = post_responses(State(state), headers, Json(req)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn post_responses_records_against_an_active_session() {
        let state = state();
        let headers = api_key_headers(&state);

        let accept = post_events(State(state.clone()), headers.clone(), Json(sample_request()))
            .await
            .unwrap();

        let req = ModuleResponseRequest {
            session_id: accept.session_id.clone(),
            module_name: "help_mod".to_string(),
            success: true,
            response_action: Some(serde_json::json!({"type": "reply"})),
            response_data: None,
            error_message: None,
            processing_time_ms: 3,
        };
        let ack = post_responses(State(state.clone()), headers, Json(req)).await.unwrap();
        assert!(ack.accepted);

        let snapshot = state.sessions.aggregator.snapshot(&accept.session_id);
        assert_eq!(snapshot.get("help_mod").map(|r| r.len()), Some(1));
    }

    #[tokio::test]
    async fn get_commands_lists_registered_triggers() {
        let state = state();
        state
            .triggers
            .register("!help", crate::trigger::PatternKind::CommandPrefix, "help_mod", 10);
        let Json(listings) = get_commands(State(state), Query(CommandsQuery { platform: None })).await;
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].module_name, "help_mod");
    }
}
