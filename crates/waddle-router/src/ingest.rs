//! The inbound leg of the Event Stream Pipeline: `Receiver -> events:inbound
//! -> Router`. `POST /events` publishes an envelope onto `events:inbound`;
//! this module's consumer loop (one per process, registered under the
//! `router` consumer group) reads batches off it and feeds each into
//! [`dispatcher::dispatch`], then finalizes the stream entry through the
//! standard ack/retry/DLQ classifier (`waddle_stream::handle_consumer_result`).
//!
//! When the stream pipeline is disabled this loop has nothing to consume —
//! `post_events` falls back to dispatching the session inline instead, so
//! the router still functions without the durable queue in front of it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::app::RouterState;
use crate::dispatcher::{self, InboundContext};

pub const INBOUND_STREAM: &str = "events:inbound";
pub const CONSUMER_GROUP: &str = "router";

/// What `post_events` publishes and this loop consumes: the session plus
/// the addressing context the session type itself does not carry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InboundEnvelope {
    pub session: waddle_sessions::Session,
    pub ctx: InboundContext,
}

/// Run forever, consuming `events:inbound` under the `router` consumer
/// group until `state.stream` is disabled, in which case this returns
/// immediately rather than busy-polling a queue nothing will ever fill.
pub async fn run(state: Arc<RouterState>, consumer_id: String) {
    if !state.stream.is_enabled() {
        return;
    }

    loop {
        let events = match state
            .stream
            .consume(INBOUND_STREAM, CONSUMER_GROUP, &consumer_id, None, None)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "inbound consume failed");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
        };

        for event in events {
            let outcome = match serde_json::from_value::<InboundEnvelope>(event.payload.clone()) {
                Ok(envelope) => {
                    dispatcher::dispatch(state.clone(), envelope.session, envelope.ctx).await;
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "inbound envelope failed to deserialize");
                    Err(("invalid_envelope".to_string(), false))
                }
            };

            if let Err(e) =
                waddle_stream::handle_consumer_result(&state.stream, INBOUND_STREAM, CONSUMER_GROUP, &event, outcome).await
            {
                error!(error = %e, "failed to finalize inbound event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use waddle_core::config::WaddleConfig;
    use waddle_core::types::{MessageType, Platform};
    use waddle_sessions::Session;

    fn enabled_state() -> Arc<RouterState> {
        let mut config = WaddleConfig::default();
        config.stream.enabled = true;
        Arc::new(RouterState::new(config, ":memory:").unwrap())
    }

    #[tokio::test]
    async fn disabled_stream_returns_immediately() {
        let state = Arc::new(RouterState::new(WaddleConfig::default(), ":memory:").unwrap());
        // Would hang forever on a real consume loop if this didn't
        // short-circuit on `is_enabled() == false`.
        tokio::time::timeout(Duration::from_millis(200), run(state, "c1".into()))
            .await
            .expect("run must return promptly when the stream is disabled");
    }

    #[tokio::test]
    async fn malformed_envelope_is_dead_lettered() {
        let state = enabled_state();
        state
            .stream
            .publish(INBOUND_STREAM, serde_json::json!({"not": "an envelope"}), None)
            .await
            .unwrap();

        let events = state
            .stream
            .consume(INBOUND_STREAM, CONSUMER_GROUP, "c1", None, Some(0))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        let outcome = serde_json::from_value::<InboundEnvelope>(events[0].payload.clone());
        assert!(outcome.is_err());
        waddle_stream::handle_consumer_result(
            &state.stream,
            INBOUND_STREAM,
            CONSUMER_GROUP,
            &events[0],
            Err(("invalid_envelope".to_string(), false)),
        )
        .await
        .unwrap();

        let dlq = state.stream.get_dlq_events(INBOUND_STREAM, 10).await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].failure_reason, "invalid_envelope");
    }

    #[tokio::test]
    async fn well_formed_envelope_dispatches_and_acks() {
        let state = enabled_state();
        let session = Session::new(
            Platform::Twitch,
            "u1",
            "alice",
            None,
            "!help",
            MessageType::ChatMessage,
        );
        let envelope = InboundEnvelope {
            session,
            ctx: InboundContext {
                server_id: "s1".into(),
                channel_id: "c7".into(),
            },
        };
        state
            .stream
            .publish(INBOUND_STREAM, serde_json::to_value(&envelope).unwrap(), None)
            .await
            .unwrap();

        let handle = tokio::spawn(run(state.clone(), "c1".into()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        let pending = state.stream.pending(INBOUND_STREAM, CONSUMER_GROUP, None).await.unwrap();
        assert!(pending.is_empty(), "event should have been acked after dispatch");
        let _ = Connection::open_in_memory();
    }
}
