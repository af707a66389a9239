pub mod engine;
pub mod error;
pub mod signer;
pub mod store;
pub mod templater;
pub mod types;
pub mod validator;
pub mod webhook;

pub use engine::{RunResult, StepOutcome, WorkflowEngine};
pub use error::{Result, WorkflowError};
pub use store::WorkflowStore;
pub use templater::{eval_expr, ExpressionTemplater};
pub use types::{
    ActionChatMessageConfig, ActionWebhookConfig, ComplexityLimits, Connection, ConditionIfConfig, ConditionRule,
    DataTransformConfig, DataType, FlowEndConfig, HmacAlgorithm, HttpMethod, LoopForeachConfig, NodeKind,
    OperatorType, PortDefinition, PortType, TriggerCommandConfig, TriggerScheduleConfig, ValidationMessage,
    ValidationReport, WorkflowDefinition, WorkflowNode,
};
pub use validator::WorkflowValidator;
pub use webhook::{ErrorClass, RetryPolicy, WebhookExecutor, WebhookResult};
