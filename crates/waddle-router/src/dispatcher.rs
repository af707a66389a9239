//! The Router state machine: turns one inbound session into the ordered
//! `Received -> Resolving -> Policy -> Classifying -> ResolvingAlias ->
//! Dispatching -> Collecting -> Emitting -> Completed/Failed/Rejected` walk,
//! publishing matched commands to `events:commands`, collecting module
//! responses, and emitting the resulting actions to
//! `events:actions:<platform>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use waddle_core::types::CommunityId;
use waddle_sessions::{ModuleResponse, Session, SessionState};
use waddle_users::PolicyRequest;
use waddle_workflow::WorkflowEngine;

use crate::alias;
use crate::app::RouterState;
use crate::error::Result;
use crate::trigger::Trigger;
use crate::types::{ActionPayload, CommandDispatch};

/// Extra addressing the HTTP boundary carries alongside the `Session` but
/// that the session type itself does not model — the entity lookup key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InboundContext {
    pub server_id: String,
    pub channel_id: String,
}

/// Drive one session through the full lifecycle. Spawned as its own task
/// per inbound event so `POST /events` can return immediately.
#[instrument(skip(state, session), fields(session_id = %session.id))]
pub async fn dispatch(state: Arc<RouterState>, mut session: Session, ctx: InboundContext) {
    let session_id = session.id.to_string();
    if let Err(e) = state.sessions.begin(session.clone()) {
        warn!(session_id, error = %e, "failed to register session");
        return;
    }

    match run(&state, &mut session, &ctx).await {
        Ok(()) => {
            let _ = state.sessions.transition(&session_id, SessionState::Completed);
        }
        Err(Outcome::Rejected(reason)) => {
            info!(session_id, reason, "session rejected");
            let _ = state
                .sessions
                .transition(&session_id, SessionState::Rejected { reason });
        }
        Err(Outcome::Failed(reason)) => {
            warn!(session_id, reason, "session failed");
            let _ = state
                .sessions
                .transition(&session_id, SessionState::Failed { reason });
        }
    }
}

/// Why a session stopped short of `Completed`.
enum Outcome {
    Rejected(String),
    Failed(String),
}

impl From<crate::error::RouterError> for Outcome {
    fn from(e: crate::error::RouterError) -> Self {
        Outcome::Failed(e.to_string())
    }
}

async fn run(state: &Arc<RouterState>, session: &mut Session, ctx: &InboundContext) -> std::result::Result<(), Outcome> {
    let session_id = session.id.to_string();

    // Resolving: map (platform, server, channel) to its owning entity/community.
    state
        .sessions
        .transition(&session_id, SessionState::Resolving)
        .map_err(Outcome::from)?;
    let entity = state
        .entities
        .resolve(session.platform, &ctx.server_id, &ctx.channel_id)
        .map_err(Outcome::from)?
        .ok_or_else(|| Outcome::Rejected("unknown_entity".to_string()))?;
    session.entity_id = Some(entity.id.clone());
    session.community_id = Some(entity.community_id.0);

    let (_, community_config) = state
        .communities
        .get(entity.community_id)
        .map_err(Outcome::from)?
        .ok_or_else(|| Outcome::Rejected("unknown_community".to_string()))?;

    // Policy: session-level gate ahead of per-module checks. The four-kind
    // chain itself (rate limit / role / delegated grant / feature flag) is
    // evaluated per matched trigger in the Dispatching step below, since it
    // needs the specific module and its required role to mean anything.
    state
        .sessions
        .transition(&session_id, SessionState::Policy)
        .map_err(Outcome::from)?;

    // `!alias add/remove/list` manage the AliasStore directly — it lives on
    // RouterState rather than behind an interaction module, so there is no
    // `events:commands` trigger to register for it. Handled here, ahead of
    // normal classification, so it never falls through to the wildcard.
    if let Some(reply) = try_handle_alias_command(state, session, &entity.id, entity.community_id) {
        state
            .sessions
            .transition(&session_id, SessionState::Emitting)
            .map_err(Outcome::from)?;
        emit_reply(state, session, "alias", reply).await;
        return Ok(());
    }

    // Classifying + ResolvingAlias: find the trigger(s) this message maps
    // to, expanding an entity-scoped alias first if no trigger matches the
    // raw text directly.
    state
        .sessions
        .transition(&session_id, SessionState::Classifying)
        .map_err(Outcome::from)?;
    let direct_hits = state.triggers.matches(
        &session.message,
        session.message_type,
        None,
        &community_config.question_triggers,
    );
    let has_direct_command = direct_hits
        .iter()
        .any(|t| t.kind == crate::trigger::PatternKind::CommandPrefix && session.message.starts_with(&t.pattern));

    let matched = if has_direct_command {
        direct_hits
    } else if let Some(expanded) = try_expand_alias(state, &entity.id, session) {
        state
            .sessions
            .transition(&session_id, SessionState::ResolvingAlias)
            .map_err(Outcome::from)?;
        let hits = state.triggers.matches(
            &expanded,
            session.message_type,
            None,
            &community_config.question_triggers,
        );
        session.message = expanded;
        hits
    } else {
        direct_hits
    };

    if matched.is_empty() {
        return Err(Outcome::Rejected("no_trigger_matched".to_string()));
    }

    // Dispatching: per-module policy check, then publish a command (or run
    // a bound workflow) for every trigger that passes.
    state
        .sessions
        .transition(&session_id, SessionState::Dispatching)
        .map_err(Outcome::from)?;

    let now_secs = now_unix_secs();
    let mut dispatched_modules = Vec::new();
    for trigger in &matched {
        let rate_rule = community_config
            .rate_limits
            .get(&trigger.module_name)
            .copied()
            .unwrap_or_default();

        let decision = state
            .policy
            .evaluate(
                &PolicyRequest {
                    community_id: entity.community_id,
                    user_id: &session.user_id,
                    module: &trigger.module_name,
                    required_role: trigger.required_role,
                    rate_limit: rate_rule.limit,
                    rate_window_secs: rate_rule.window_secs,
                    required_capability: None,
                    feature_flags_satisfied: true,
                },
                now_secs,
            )
            .map_err(|e| Outcome::Failed(e.to_string()))?;

        if !decision.is_allowed() {
            info!(session_id, module = %trigger.module_name, "module skipped: policy denied");
            continue;
        }

        if let Some(workflow_id) = trigger.workflow_id {
            run_workflow(state, session, workflow_id).await;
            continue;
        }

        if publish_command(state, session, &entity.community_id, &entity.id, trigger)
            .await
            .is_ok()
        {
            dispatched_modules.push(trigger.module_name.clone());
        }
    }

    if dispatched_modules.is_empty() {
        return Err(Outcome::Rejected("policy_denied_all_modules".to_string()));
    }

    // Collecting: wait for every dispatched module to answer or time out.
    state
        .sessions
        .transition(&session_id, SessionState::Collecting)
        .map_err(Outcome::from)?;
    let responses = collect_responses(
        state,
        &session_id,
        &dispatched_modules,
        Duration::from_millis(state.config.router.module_timeout_ms),
        Duration::from_millis(state.config.router.session_timeout_ms),
    )
    .await;

    // Emitting: publish each module's action (if any) to the platform's
    // outbound action stream, tagged with the originating session.
    state
        .sessions
        .transition(&session_id, SessionState::Emitting)
        .map_err(Outcome::from)?;
    for (module_name, resps) in responses {
        for resp in resps {
            if !resp.success {
                continue;
            }
            let Some(action) = resp.response_action else {
                continue;
            };
            let payload = ActionPayload {
                session_id: session_id.clone(),
                platform: session.platform,
                module_name: module_name.clone(),
                action,
                data: resp.response_data,
            };
            if let Ok(json) = serde_json::to_value(&payload) {
                let stream_name = format!("events:actions:{}", session.platform);
                let _ = state.stream.publish(&stream_name, json, None).await;
            }
        }
    }

    Ok(())
}

/// `!alias add <name> <command>` / `!alias remove <name>` / `!alias list`.
/// Add/remove
/// require moderator role; list is open to any member. Returns `None` when
/// the message isn't an alias command at all, so normal trigger matching
/// still runs for everything else.
fn try_handle_alias_command(
    state: &RouterState,
    session: &Session,
    entity_id: &waddle_core::types::EntityId,
    community_id: CommunityId,
) -> Option<String> {
    use waddle_core::types::UserRole;

    let mut parts = session.message.split_whitespace();
    if parts.next()? != "!alias" {
        return None;
    }
    let sub = parts.next().unwrap_or("");
    let role = state
        .policy
        .membership
        .role_of(community_id, &session.user_id)
        .unwrap_or_default();

    let reply = match sub {
        "add" => {
            if !role.satisfies(UserRole::Moderator) {
                "only moderators can add aliases".to_string()
            } else {
                match parts.next() {
                    Some(name) => {
                        let rest: Vec<&str> = parts.collect();
                        if rest.is_empty() {
                            "usage: !alias add <name> <command>".to_string()
                        } else {
                            match state.aliases.add(entity_id.as_str(), name, &rest.join(" "), &session.username) {
                                Ok(_) => format!("alias '{name}' created"),
                                Err(e) => e.to_string(),
                            }
                        }
                    }
                    None => "usage: !alias add <name> <command>".to_string(),
                }
            }
        }
        "remove" => {
            if !role.satisfies(UserRole::Moderator) {
                "only moderators can remove aliases".to_string()
            } else {
                match parts.next() {
                    Some(name) => match state.aliases.remove(entity_id.as_str(), name) {
                        Ok(true) => format!("alias '{name}' removed"),
                        Ok(false) => format!("no active alias named '{name}'"),
                        Err(e) => e.to_string(),
                    },
                    None => "usage: !alias remove <name>".to_string(),
                }
            }
        }
        "list" => match state.aliases.list(entity_id.as_str()) {
            Ok(aliases) if aliases.is_empty() => "no aliases configured".to_string(),
            Ok(aliases) => aliases.iter().map(|a| a.alias_name.as_str()).collect::<Vec<_>>().join(", "),
            Err(e) => e.to_string(),
        },
        _ => "usage: !alias <add|remove|list> ...".to_string(),
    };
    Some(reply)
}

/// Publish a synthesized text reply straight to the platform's action
/// stream, bypassing `events:commands` — used for built-in commands the
/// router answers itself rather than a dispatched module.
async fn emit_reply(state: &RouterState, session: &Session, module_name: &str, text: String) {
    let payload = ActionPayload {
        session_id: session.id.to_string(),
        platform: session.platform,
        module_name: module_name.to_string(),
        action: serde_json::json!({"type": "reply", "text": text}),
        data: None,
    };
    if let Ok(json) = serde_json::to_value(&payload) {
        let stream_name = format!("events:actions:{}", session.platform);
        let _ = state.stream.publish(&stream_name, json, None).await;
    }
}

fn try_expand_alias(state: &RouterState, entity_id: &waddle_core::types::EntityId, session: &Session) -> Option<String> {
    let mut parts = session.message.split_whitespace();
    let first = parts.next()?;
    let args: Vec<&str> = parts.collect();
    let active = state.aliases.get_active(entity_id.as_str(), first).ok()??;
    let _ = state.aliases.record_usage(entity_id.as_str(), first);
    Some(alias::expand(&active.command_text, &session.username, &args))
}

async fn run_workflow(state: &Arc<RouterState>, session: &Session, workflow_id: i64) {
    let Ok(Some(definition)) = state.workflows.get(&workflow_id.to_string()) else {
        warn!(workflow_id, "workflow trigger bound to a missing definition");
        return;
    };
    let context = serde_json::json!({
        "session_id": session.id.to_string(),
        "user_id": session.user_id,
        "username": session.username,
        "message": session.message,
        "platform": session.platform.to_string(),
    });
    let engine = WorkflowEngine::default();
    match engine.run(&definition, context).await {
        Ok(result) if result.completed => info!(workflow_id, "workflow run completed"),
        Ok(_) => warn!(workflow_id, "workflow run did not reach a successful end"),
        Err(e) => warn!(workflow_id, error = %e, "workflow run errored"),
    }
}

async fn publish_command(
    state: &RouterState,
    session: &Session,
    community_id: &CommunityId,
    entity_id: &waddle_core::types::EntityId,
    trigger: &Trigger,
) -> Result<()> {
    let publication_id = state.next_publication_id();
    let dispatch = CommandDispatch {
        session_id: session.id.to_string(),
        module_name: trigger.module_name.clone(),
        platform: session.platform,
        entity_id: entity_id.to_string(),
        community_id: community_id.0,
        user_id: session.user_id.clone(),
        username: session.username.clone(),
        display_name: session.display_name.clone(),
        message: session.message.clone(),
        message_type: session.message_type,
        correlation_token: session.correlation_token.clone(),
        publication_id,
    };
    let payload = serde_json::to_value(&dispatch)?;
    state.stream.publish("events:commands", payload, None).await?;
    Ok(())
}

/// Wait for every dispatched module to respond or hit its own timeout,
/// bounded overall by `session_deadline`.
async fn collect_responses(
    state: &RouterState,
    session_id: &str,
    expected_modules: &[String],
    module_timeout: Duration,
    session_deadline: Duration,
) -> HashMap<String, Vec<ModuleResponse>> {
    let deadline = tokio::time::Instant::now() + session_deadline;
    loop {
        let snapshot = state.sessions.aggregator.snapshot(session_id);
        if expected_modules.iter().all(|m| snapshot.contains_key(m)) {
            return snapshot;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return snapshot;
        }
        let wait = module_timeout.min(remaining);
        if !state.sessions.aggregator.wait_for_response(session_id, wait).await {
            return state.sessions.aggregator.snapshot(session_id);
        }
    }
}

fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waddle_core::config::WaddleConfig;
    use waddle_core::types::{MessageType, Platform};
    use waddle_sessions::Session;

    fn state() -> Arc<RouterState> {
        let mut config = WaddleConfig::default();
        config.stream.enabled = true;
        Arc::new(RouterState::new(config, ":memory:").unwrap())
    }

    fn ctx() -> InboundContext {
        InboundContext {
            server_id: "s1".into(),
            channel_id: "c7".into(),
        }
    }

    #[tokio::test]
    async fn unknown_entity_is_rejected() {
        let state = state();
        let session = Session::new(Platform::Twitch, "u1", "alice", None, "!help", MessageType::ChatMessage);
        let session_id = session.id.to_string();
        dispatch(state.clone(), session, ctx()).await;

        assert_eq!(
            state.sessions.correlation_state(&session_id).unwrap().as_deref(),
            Some("rejected")
        );
    }

    #[tokio::test]
    async fn no_matching_trigger_is_rejected() {
        let state = state();
        let community_id = state.communities.create("owner-1").unwrap();
        state
            .entities
            .create_or_activate(Platform::Twitch, "s1", "c7", community_id)
            .unwrap();

        let session = Session::new(
            Platform::Twitch,
            "u1",
            "alice",
            None,
            "!unregistered",
            MessageType::ChatMessage,
        );
        let session_id = session.id.to_string();
        dispatch(state.clone(), session, ctx()).await;

        assert_eq!(
            state.sessions.correlation_state(&session_id).unwrap().as_deref(),
            Some("rejected")
        );
    }

    /// End-to-end happy path: a registered `!help` trigger produces a
    /// command event on `events:commands`, the module's recorded response
    /// is collected, and an action lands on `events:actions:twitch` tagged
    /// with the originating session id.
    #[tokio::test]
    async fn matched_trigger_dispatches_collects_and_emits() {
        let state = state();
        let community_id = state.communities.create("owner-1").unwrap();
        state
            .entities
            .create_or_activate(Platform::Twitch, "s1", "c7", community_id)
            .unwrap();
        state
            .triggers
            .register("!help", crate::trigger::PatternKind::CommandPrefix, "help_mod", 10);

        let session = Session::new(Platform::Twitch, "u1", "alice", None, "!help", MessageType::ChatMessage);
        let session_id = session.id.to_string();

        // Simulate the help module: read the command, then publish its
        // response to the aggregator the way `POST /responses` would.
        let responder_state = state.clone();
        let responder_session_id = session_id.clone();
        let responder = tokio::spawn(async move {
            for _ in 0..50 {
                let events = responder_state
                    .stream
                    .consume("events:commands", "help_mod", "w1", None, Some(20))
                    .await
                    .unwrap();
                if let Some(event) = events.into_iter().find(|e| {
                    e.payload.get("session_id").and_then(|v| v.as_str()) == Some(&responder_session_id)
                }) {
                    responder_state.sessions.aggregator.record(
                        &responder_session_id,
                        ModuleResponse {
                            module_name: "help_mod".to_string(),
                            success: true,
                            response_action: Some(serde_json::json!({"type": "reply", "text": "here to help"})),
                            response_data: None,
                            error_message: None,
                            processing_time_ms: 5,
                            publication_id: 0,
                        },
                    );
                    responder_state
                        .stream
                        .ack("events:commands", "help_mod", &event.id)
                        .await
                        .unwrap();
                    break;
                }
            }
        });

        dispatch(state.clone(), session, ctx()).await;
        responder.await.unwrap();

        assert_eq!(
            state.sessions.correlation_state(&session_id).unwrap().as_deref(),
            Some("completed")
        );

        let actions = state
            .stream
            .consume("events:actions:twitch", "test", "t1", None, Some(0))
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].payload.get("session_id").and_then(|v| v.as_str()), Some(session_id.as_str()));
        assert_eq!(actions[0].payload.get("module_name").and_then(|v| v.as_str()), Some("help_mod"));
    }

    #[tokio::test]
    async fn alias_list_command_is_handled_without_dispatch() {
        let state = state();
        let community_id = state.communities.create("owner-1").unwrap();
        state
            .entities
            .create_or_activate(Platform::Twitch, "s1", "c7", community_id)
            .unwrap();

        let session = Session::new(Platform::Twitch, "u1", "alice", None, "!alias list", MessageType::ChatMessage);
        let session_id = session.id.to_string();
        dispatch(state.clone(), session, ctx()).await;

        assert_eq!(
            state.sessions.correlation_state(&session_id).unwrap().as_deref(),
            Some("completed")
        );
        let actions = state
            .stream
            .consume("events:actions:twitch", "test", "t1", None, Some(0))
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].payload["action"]["text"], serde_json::json!("no aliases configured"));
    }

    /// Testable scenario #2: an alias must expand into the dispatched
    /// command's message content, not just steer trigger matching.
    #[tokio::test]
    async fn alias_expansion_replaces_dispatched_message() {
        let state = state();
        let community_id = state.communities.create("owner-1").unwrap();
        let entity = state
            .entities
            .create_or_activate(Platform::Twitch, "s1", "c7", community_id)
            .unwrap();
        state
            .aliases
            .add(entity.id.as_str(), "!so", "shoutout {arg1}", "mod1")
            .unwrap();
        state.triggers.register(
            "shoutout",
            crate::trigger::PatternKind::CommandPrefix,
            "shoutout_mod",
            10,
        );

        let session = Session::new(Platform::Twitch, "u1", "alice", None, "!so bob", MessageType::ChatMessage);
        let session_id = session.id.to_string();
        dispatch(state.clone(), session, ctx()).await;

        let events = state
            .stream
            .consume("events:commands", "shoutout_mod", "w1", None, Some(0))
            .await
            .unwrap();
        let command = events
            .into_iter()
            .find(|e| e.payload.get("session_id").and_then(|v| v.as_str()) == Some(session_id.as_str()))
            .expect("shoutout_mod command was published");
        assert_eq!(command.payload.get("message").and_then(|v| v.as_str()), Some("shoutout bob"));

        let alias = state.aliases.get_active(entity.id.as_str(), "!so").unwrap().unwrap();
        assert_eq!(alias.usage_count, 1);
    }
}
