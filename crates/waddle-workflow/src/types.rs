use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One connection point on a node. Every node kind leaves its own
/// attributes open; ports are the one shape every kind shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Object,
    Boolean,
    String,
    Number,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    pub port_type: PortType,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRule {
    pub field: String,
    pub operator: OperatorType,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCommandConfig {
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerScheduleConfig {
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionIfConfig {
    pub rules: Vec<ConditionRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransformConfig {
    pub expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopForeachConfig {
    pub iterable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionChatMessageConfig {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionWebhookConfig {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac_secret: Option<String>,
    #[serde(default)]
    pub hmac_algorithm: HmacAlgorithm,
    #[serde(default)]
    pub hmac_header: Option<String>,
    #[serde(default)]
    pub extract: HashMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Get
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
    Sha1,
}

impl Default for HmacAlgorithm {
    fn default() -> Self {
        HmacAlgorithm::Sha256
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEndConfig {
    pub status: String,
}

/// Node kind plus its kind-specific configuration. Untyped kinds (e.g. a
/// trigger without a recognised sub-kind) are rejected by the validator
/// rather than represented here, keeping the enum exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    TriggerCommand(TriggerCommandConfig),
    TriggerSchedule(TriggerScheduleConfig),
    ConditionIf(ConditionIfConfig),
    Transform(DataTransformConfig),
    LoopForeach(LoopForeachConfig),
    ActionWebhook(ActionWebhookConfig),
    ActionChatMessage(ActionChatMessageConfig),
    FlowEnd(FlowEndConfig),
}

impl NodeKind {
    pub fn is_trigger(&self) -> bool {
        matches!(self, NodeKind::TriggerCommand(_) | NodeKind::TriggerSchedule(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::TriggerCommand(_) => "trigger_command",
            NodeKind::TriggerSchedule(_) => "trigger_schedule",
            NodeKind::ConditionIf(_) => "condition_if",
            NodeKind::Transform(_) => "transform",
            NodeKind::LoopForeach(_) => "loop_foreach",
            NodeKind::ActionWebhook(_) => "action_webhook",
            NodeKind::ActionChatMessage(_) => "action_chat_message",
            NodeKind::FlowEnd(_) => "flow_end",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub ports: Vec<PortDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
    pub connections: Vec<Connection>,
}

/// Complexity caps (defaults 100/200/20, each configurable via
/// `WORKFLOW_MAX_NODES` / `WORKFLOW_MAX_CONNECTIONS` / `WORKFLOW_MAX_DEPTH`).
#[derive(Debug, Clone, Copy)]
pub struct ComplexityLimits {
    pub max_nodes: usize,
    pub max_connections: usize,
    pub max_depth: usize,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_nodes: 100,
            max_connections: 200,
            max_depth: 20,
        }
    }
}

/// One error or warning, optionally scoped to a node — the unit collected
/// into a validation report's `per_node_errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationMessage>,
    pub warnings: Vec<ValidationMessage>,
    pub per_node_errors: HashMap<String, Vec<String>>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            per_node_errors: HashMap::new(),
        }
    }
}

impl ValidationReport {
    pub fn error(&mut self, node_id: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        if let Some(id) = node_id {
            self.per_node_errors
                .entry(id.to_string())
                .or_default()
                .push(message.clone());
        }
        self.errors.push(ValidationMessage {
            message,
            node_id: node_id.map(str::to_string),
        });
        self.is_valid = false;
    }

    pub fn warn(&mut self, node_id: Option<&str>, message: impl Into<String>) {
        self.warnings.push(ValidationMessage {
            message: message.into(),
            node_id: node_id.map(str::to_string),
        });
    }
}
