use serde::{Deserialize, Serialize};
use waddle_core::types::{EntityId, MessageType, Platform, SessionId};

/// The session lifecycle. Transitions are one-directional except the
/// terminal pair, which a session enters exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Received,
    Resolving,
    Rejected { reason: String },
    Policy,
    Classifying,
    ResolvingAlias,
    Dispatching,
    Collecting,
    Emitting,
    Completed,
    Failed { reason: String },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Rejected { .. } | SessionState::Completed | SessionState::Failed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Received => "received",
            SessionState::Resolving => "resolving",
            SessionState::Rejected { .. } => "rejected",
            SessionState::Policy => "policy",
            SessionState::Classifying => "classifying",
            SessionState::ResolvingAlias => "resolving_alias",
            SessionState::Dispatching => "dispatching",
            SessionState::Collecting => "collecting",
            SessionState::Emitting => "emitting",
            SessionState::Completed => "completed",
            SessionState::Failed { .. } => "failed",
        }
    }
}

/// One inbound event's execution context. Created on receiver ingestion,
/// destroyed once every module either completes or times out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub platform: Platform,
    /// Set once `Resolving` succeeds; `None` while pending or on rejection.
    pub entity_id: Option<EntityId>,
    pub community_id: Option<i64>,
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub message: String,
    pub message_type: MessageType,
    pub arrived_at: String,
    /// Opaque token correlating this session across streams/logs.
    pub correlation_token: String,
    pub state: SessionState,
}

impl Session {
    pub fn new(
        platform: Platform,
        user_id: impl Into<String>,
        username: impl Into<String>,
        display_name: Option<String>,
        message: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        let id = SessionId::new();
        Self {
            correlation_token: id.to_string(),
            id,
            platform,
            entity_id: None,
            community_id: None,
            user_id: user_id.into(),
            username: username.into(),
            display_name,
            message: message.into(),
            message_type,
            arrived_at: chrono::Utc::now().to_rfc3339(),
            state: SessionState::Received,
        }
    }
}

/// One module's response to a dispatched command, keyed into the
/// aggregator by session id and module name — the body of a `POST
/// /responses` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResponse {
    pub module_name: String,
    pub success: bool,
    pub response_action: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub processing_time_ms: u64,
    /// Monotonically increasing within one module's responses for this
    /// session — the FIFO order the aggregator preserves.
    pub publication_id: u64,
}

/// A single module's dispatch slot, tracked so the router can tell a slow
/// module from one that never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotOutcome {
    Pending,
    Responded,
    TimedOut,
}
