//! HTTP boundary shapes: the inbound event envelope, the module response
//! envelope, and the trigger listing used for autocomplete.

use serde::{Deserialize, Serialize};
use waddle_core::types::{MessageType, Platform};

/// `POST /events` body.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEventRequest {
    pub session_id: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub message: String,
    pub message_type: MessageType,
    pub platform: Platform,
    pub channel_id: String,
    pub server_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// `POST /events` response: `{accepted:true, session_id}`, returned before
/// dispatch/collection completes — the router enqueues and returns.
#[derive(Debug, Clone, Serialize)]
pub struct InboundEventResponse {
    pub accepted: bool,
    pub session_id: String,
}

/// `POST /responses` body — one interaction module's answer to a dispatched
/// command.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleResponseRequest {
    pub session_id: String,
    pub module_name: String,
    pub success: bool,
    pub response_action: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleResponseAck {
    pub accepted: bool,
}

/// One row of `GET /commands?platform=…` — a registered trigger a client
/// can offer for autocomplete.
#[derive(Debug, Clone, Serialize)]
pub struct CommandListing {
    pub pattern: String,
    pub event_type: String,
    pub module_name: String,
    pub priority: i32,
}

/// The command event published to `events:commands` carrying the full
/// session context a worker needs to execute the matched module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDispatch {
    pub session_id: String,
    pub module_name: String,
    pub platform: Platform,
    pub entity_id: String,
    pub community_id: i64,
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub message: String,
    pub message_type: MessageType,
    pub correlation_token: String,
    pub publication_id: u64,
}

/// The action payload published to `events:actions:<platform>` — always
/// tagged with the originating session id so downstream ordering can be
/// reconstructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPayload {
    pub session_id: String,
    pub platform: Platform,
    pub module_name: String,
    pub action: serde_json::Value,
    pub data: Option<serde_json::Value>,
}
