//! Executes a validated [`WorkflowDefinition`] end to end: walk the graph
//! from its trigger node, following `connections` edge by edge, running
//! each node kind's effect against a shared JSON context.
//!
//! Unlike [`crate::webhook::WebhookExecutor`], which runs a single
//! `action_webhook` node, this module is the thing the router calls when a
//! trigger resolves to a workflow instead of an interaction module — it
//! owns the node-to-node walk, not just one node's effect.

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::signer;
use crate::templater::ExpressionTemplater;
use crate::types::{ConditionRule, NodeKind, OperatorType, WorkflowDefinition, WorkflowNode};
use crate::webhook::{RetryPolicy, WebhookExecutor};
use crate::{Result, WorkflowError};

/// One node's outcome, recorded for the run's trace.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub node_id: String,
    pub kind: &'static str,
    pub success: bool,
    pub detail: Option<String>,
}

/// The full run's result: whether it reached a `flow_end` successfully,
/// the accumulated context, and a per-node trace for diagnostics.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub completed: bool,
    pub context: Value,
    pub steps: Vec<StepOutcome>,
    pub duration: Duration,
}

/// Runs a workflow against an initial context (the triggering session's
/// fields, e.g. `message`, `user_id`, `platform`). Caps iteration at
/// `max_steps` guards against a cycle slipping past validation.
pub struct WorkflowEngine {
    webhook: WebhookExecutor,
    max_steps: usize,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl WorkflowEngine {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            webhook: WebhookExecutor::new(retry_policy),
            max_steps: 10_000,
        }
    }

    #[instrument(skip(self, workflow, initial_context))]
    pub async fn run(&self, workflow: &WorkflowDefinition, initial_context: Value) -> Result<RunResult> {
        let started = Instant::now();
        let trigger = workflow
            .nodes
            .iter()
            .find(|n| n.kind.is_trigger())
            .ok_or_else(|| WorkflowError::Template("workflow has no trigger node".to_string()))?;

        let mut context = initial_context;
        let mut steps = Vec::new();
        let mut current: Option<&WorkflowNode> = Some(trigger);
        let mut visited = 0usize;
        let mut completed = false;

        while let Some(node) = current {
            visited += 1;
            if visited > self.max_steps {
                warn!(workflow = %workflow.id, "workflow run aborted: exceeded max step count");
                break;
            }

            let (success, next_port, detail) = self.run_node(node, &mut context).await;
            steps.push(StepOutcome {
                node_id: node.id.clone(),
                kind: node.kind.label(),
                success,
                detail,
            });

            if matches!(node.kind, NodeKind::FlowEnd(_)) {
                completed = success;
                break;
            }
            if !success {
                break;
            }

            current = self.next_node(workflow, &node.id, next_port.as_deref());
        }

        Ok(RunResult {
            completed,
            context,
            steps,
            duration: started.elapsed(),
        })
    }

    fn next_node<'a>(&self, workflow: &'a WorkflowDefinition, node_id: &str, from_port: Option<&str>) -> Option<&'a WorkflowNode> {
        let edge = workflow.connections.iter().find(|c| {
            c.from_node == node_id && from_port.map(|p| c.from_port == p).unwrap_or(true)
        })?;
        workflow.nodes.iter().find(|n| n.id == edge.to_node)
    }

    /// Run one node's effect, returning `(success, outgoing port to follow,
    /// diagnostic detail)`. `condition_if` picks `"true"`/`"false"` as the
    /// outgoing port name; every other kind uses the node's sole `"next"` port.
    async fn run_node(&self, node: &WorkflowNode, context: &mut Value) -> (bool, Option<String>, Option<String>) {
        match &node.kind {
            NodeKind::TriggerCommand(_) | NodeKind::TriggerSchedule(_) => (true, Some("next".to_string()), None),

            NodeKind::ConditionIf(cfg) => {
                let matched = cfg.rules.iter().all(|r| evaluate_rule(r, context));
                (true, Some(if matched { "true" } else { "false" }.to_string()), None)
            }

            NodeKind::Transform(cfg) => match crate::eval_expr(&cfg.expression, context) {
                Ok(value) => {
                    merge_context(context, "transform_result", value);
                    (true, Some("next".to_string()), None)
                }
                Err(e) => (false, None, Some(e.to_string())),
            },

            NodeKind::LoopForeach(cfg) => {
                let templater = ExpressionTemplater::new();
                let rendered = templater.render(&cfg.iterable, context);
                (true, Some("next".to_string()), Some(format!("iterated over {rendered}")))
            }

            NodeKind::ActionWebhook(cfg) => {
                let result = self.webhook.execute(cfg, context).await;
                if !result.extracted_variables.is_empty() {
                    for (k, v) in result.extracted_variables {
                        merge_context(context, &k, v);
                    }
                }
                (result.success, Some("next".to_string()), result.error)
            }

            NodeKind::ActionChatMessage(cfg) => {
                let templater = ExpressionTemplater::new();
                let rendered = templater.render(&cfg.message, context);
                merge_context(context, "last_chat_message", json!(rendered));
                (true, Some("next".to_string()), None)
            }

            NodeKind::FlowEnd(cfg) => (cfg.status == "success", None, Some(cfg.status.clone())),
        }
    }
}

fn merge_context(context: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = context {
        map.insert(key.to_string(), value);
    }
}

fn lookup_field<'a>(context: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(context, |v, part| v.get(part))
}

fn evaluate_rule(rule: &ConditionRule, context: &Value) -> bool {
    let Some(actual) = lookup_field(context, &rule.field) else {
        return false;
    };
    match rule.operator {
        OperatorType::Equals => actual == &rule.value,
        OperatorType::NotEquals => actual != &rule.value,
        OperatorType::GreaterThan => as_f64(actual).zip(as_f64(&rule.value)).is_some_and(|(a, b)| a > b),
        OperatorType::LessThan => as_f64(actual).zip(as_f64(&rule.value)).is_some_and(|(a, b)| a < b),
        OperatorType::Contains => as_str(actual)
            .zip(as_str(&rule.value))
            .is_some_and(|(a, b)| a.contains(b)),
        OperatorType::StartsWith => as_str(actual)
            .zip(as_str(&rule.value))
            .is_some_and(|(a, b)| a.starts_with(b)),
        OperatorType::EndsWith => as_str(actual)
            .zip(as_str(&rule.value))
            .is_some_and(|(a, b)| a.ends_with(b)),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn as_str(v: &Value) -> Option<&str> {
    v.as_str()
}

/// Verify an inbound webhook signature against a configured secret, using
/// the same HMAC machinery `action_webhook` signs outbound requests with.
pub fn verify_inbound_signature(
    algorithm: crate::types::HmacAlgorithm,
    secret: &str,
    body: &str,
    provided_signature: &str,
) -> bool {
    signer::verify(algorithm, secret, body, provided_signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ActionChatMessageConfig, ConditionIfConfig, FlowEndConfig, TriggerCommandConfig, WorkflowDefinition, WorkflowNode,
    };
    use crate::validator::connection;

    fn simple_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-1".to_string(),
            name: "greet".to_string(),
            nodes: vec![
                WorkflowNode {
                    id: "trigger".to_string(),
                    kind: NodeKind::TriggerCommand(TriggerCommandConfig {
                        command: "!greet".to_string(),
                    }),
                    ports: vec![],
                },
                WorkflowNode {
                    id: "check".to_string(),
                    kind: NodeKind::ConditionIf(ConditionIfConfig {
                        rules: vec![ConditionRule {
                            field: "user_id".to_string(),
                            operator: OperatorType::Equals,
                            value: json!("u1"),
                        }],
                    }),
                    ports: vec![],
                },
                WorkflowNode {
                    id: "chat".to_string(),
                    kind: NodeKind::ActionChatMessage(ActionChatMessageConfig {
                        message: "hello ${user_id}".to_string(),
                        channel: None,
                    }),
                    ports: vec![],
                },
                WorkflowNode {
                    id: "end".to_string(),
                    kind: NodeKind::FlowEnd(FlowEndConfig {
                        status: "success".to_string(),
                    }),
                    ports: vec![],
                },
            ],
            connections: vec![
                connection("trigger", "next", "check", "in"),
                connection("check", "true", "chat", "in"),
                connection("chat", "next", "end", "in"),
            ],
        }
    }

    #[tokio::test]
    async fn run_walks_true_branch_to_completion() {
        let engine = WorkflowEngine::default();
        let result = engine
            .run(&simple_workflow(), json!({"user_id": "u1"}))
            .await
            .unwrap();
        assert!(result.completed);
        assert_eq!(result.context["last_chat_message"], json!("hello u1"));
    }

    #[tokio::test]
    async fn run_stops_at_false_branch_with_no_outgoing_edge() {
        let engine = WorkflowEngine::default();
        let result = engine
            .run(&simple_workflow(), json!({"user_id": "someone_else"}))
            .await
            .unwrap();
        assert!(!result.completed);
        assert!(result.context.get("last_chat_message").is_none());
    }

    #[test]
    fn evaluate_rule_handles_every_operator() {
        let ctx = json!({"count": 5, "name": "widget"});
        assert!(evaluate_rule(
            &ConditionRule {
                field: "count".to_string(),
                operator: OperatorType::GreaterThan,
                value: json!(1)
            },
            &ctx
        ));
        assert!(evaluate_rule(
            &ConditionRule {
                field: "name".to_string(),
                operator: OperatorType::StartsWith,
                value: json!("wid")
            },
            &ctx
        ));
        assert!(!evaluate_rule(
            &ConditionRule {
                field: "missing".to_string(),
                operator: OperatorType::Equals,
                value: json!(1)
            },
            &ctx
        ));
    }
}
