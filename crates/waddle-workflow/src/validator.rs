use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{
    ComplexityLimits, Connection, DataType, NodeKind, PortType, ValidationReport, WorkflowDefinition, WorkflowNode,
};

/// Code-injection patterns rejected wherever a user-authored expression
/// appears: transform expressions and anything the templater would
/// otherwise hand to `$(...)`. Deliberately broader than the templater's own
/// grammar so a clever encoding doesn't have to reach the sandbox to get
/// flagged.
fn deny_list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\beval\s*\(|\bexec\s*\(|\b__import__\s*\(|\bos\.system|\bsubprocess\.|\bopen\s*\(|`|\$\{.*constructor.*\}")
            .unwrap()
    })
}

/// Stateless, pure, deterministic — the same definition always produces the
/// same report.
pub struct WorkflowValidator {
    limits: ComplexityLimits,
}

impl WorkflowValidator {
    pub fn new(limits: ComplexityLimits) -> Self {
        Self { limits }
    }

    pub fn validate(&self, workflow: &WorkflowDefinition) -> ValidationReport {
        let mut report = ValidationReport::default();

        self.check_complexity(workflow, &mut report);
        let node_ids = self.check_structural(workflow, &mut report);
        self.check_reachability(workflow, &node_ids, &mut report);
        self.check_node_configuration(workflow, &mut report);
        self.check_security(workflow, &mut report);

        report
    }

    fn check_complexity(&self, workflow: &WorkflowDefinition, report: &mut ValidationReport) {
        if workflow.nodes.len() > self.limits.max_nodes {
            report.error(
                None,
                format!(
                    "workflow has {} nodes, exceeding the maximum of {}",
                    workflow.nodes.len(),
                    self.limits.max_nodes
                ),
            );
        }
        if workflow.connections.len() > self.limits.max_connections {
            report.error(
                None,
                format!(
                    "workflow has {} connections, exceeding the maximum of {}",
                    workflow.connections.len(),
                    self.limits.max_connections
                ),
            );
        }
    }

    /// Node id uniqueness, and every connection referencing an existing
    /// node/port pair with output→input direction and matching data type.
    /// Returns the set of valid node ids for downstream checks.
    fn check_structural(&self, workflow: &WorkflowDefinition, report: &mut ValidationReport) -> HashSet<String> {
        let mut seen = HashSet::new();
        for node in &workflow.nodes {
            if !seen.insert(node.id.clone()) {
                report.error(Some(&node.id), format!("duplicate node id '{}'", node.id));
            }
        }

        let nodes_by_id: HashMap<&str, &WorkflowNode> = workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        for conn in &workflow.connections {
            let Some(from) = nodes_by_id.get(conn.from_node.as_str()) else {
                report.error(None, format!("connection references unknown source node '{}'", conn.from_node));
                continue;
            };
            let Some(to) = nodes_by_id.get(conn.to_node.as_str()) else {
                report.error(None, format!("connection references unknown destination node '{}'", conn.to_node));
                continue;
            };

            let from_port = from.ports.iter().find(|p| p.name == conn.from_port);
            let to_port = to.ports.iter().find(|p| p.name == conn.to_port);

            match (from_port, to_port) {
                (Some(fp), Some(tp)) => {
                    if fp.port_type != PortType::Output {
                        report.error(
                            Some(&conn.from_node),
                            format!("port '{}' on node '{}' is not an output port", conn.from_port, conn.from_node),
                        );
                    }
                    if tp.port_type != PortType::Input {
                        report.error(
                            Some(&conn.to_node),
                            format!("port '{}' on node '{}' is not an input port", conn.to_port, conn.to_node),
                        );
                    }
                    if !data_types_compatible(fp.data_type, tp.data_type) {
                        report.error(
                            Some(&conn.to_node),
                            format!(
                                "incompatible data types between '{}.{}' ({:?}) and '{}.{}' ({:?})",
                                conn.from_node, conn.from_port, fp.data_type, conn.to_node, conn.to_port, tp.data_type
                            ),
                        );
                    }
                }
                (None, _) => report.error(
                    Some(&conn.from_node),
                    format!("node '{}' has no port named '{}'", conn.from_node, conn.from_port),
                ),
                (_, None) => report.error(
                    Some(&conn.to_node),
                    format!("node '{}' has no port named '{}'", conn.to_node, conn.to_port),
                ),
            }
        }

        seen
    }

    /// At least one trigger, cycle detection via DFS, unreachable-node
    /// detection, and depth-cap enforcement.
    fn check_reachability(&self, workflow: &WorkflowDefinition, node_ids: &HashSet<String>, report: &mut ValidationReport) {
        let triggers: Vec<&WorkflowNode> = workflow.nodes.iter().filter(|n| n.kind.is_trigger()).collect();
        if triggers.is_empty() {
            // A missing trigger is reported as both an error
            // (is_valid=false) and a warning mentioning "trigger".
            report.error(None, "workflow has no trigger node");
            report.warn(None, "workflow has no trigger node to start execution");
        }

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for conn in &workflow.connections {
            if node_ids.contains(&conn.from_node) && node_ids.contains(&conn.to_node) {
                adjacency.entry(conn.from_node.as_str()).or_default().push(conn.to_node.as_str());
            }
        }

        if let Some(cycle_node) = detect_cycle(&workflow.nodes, &adjacency) {
            report.error(Some(cycle_node), "workflow graph contains a cycle");
        }

        let reachable = bfs_reachable(&triggers, &adjacency);
        for node in &workflow.nodes {
            if !reachable.contains(node.id.as_str()) && !node.kind.is_trigger() {
                report.warn(Some(&node.id), format!("node '{}' is unreachable from any trigger", node.id));
            }
        }

        let depth = max_depth(&triggers, &adjacency);
        if depth > self.limits.max_depth {
            report.error(None, format!("workflow depth {depth} exceeds the maximum of {}", self.limits.max_depth));
        }
    }

    fn check_node_configuration(&self, workflow: &WorkflowDefinition, report: &mut ValidationReport) {
        for node in &workflow.nodes {
            match &node.kind {
                NodeKind::ActionWebhook(cfg) => {
                    if !cfg.url.starts_with("http://") && !cfg.url.starts_with("https://") {
                        report.error(Some(&node.id), format!("webhook node '{}' has a malformed url", node.id));
                    }
                }
                NodeKind::TriggerSchedule(cfg) => {
                    use std::str::FromStr;
                    if cron::Schedule::from_str(&cfg.cron).is_err() {
                        report.error(Some(&node.id), format!("schedule node '{}' has an unparseable cron expression", node.id));
                    }
                }
                NodeKind::Transform(cfg) => {
                    if deny_list_re().is_match(&cfg.expression) {
                        report.error(Some(&node.id), format!("transform node '{}' expression matches a forbidden pattern", node.id));
                    }
                }
                NodeKind::ConditionIf(cfg) => {
                    if cfg.rules.is_empty() {
                        report.error(Some(&node.id), format!("condition node '{}' has no rules", node.id));
                    }
                }
                NodeKind::LoopForeach(cfg) => {
                    if cfg.iterable.trim().is_empty() {
                        report.error(Some(&node.id), format!("loop node '{}' has no iterable binding", node.id));
                    }
                }
                NodeKind::TriggerCommand(cfg) => {
                    if cfg.command.trim().is_empty() {
                        report.error(Some(&node.id), format!("command trigger node '{}' has an empty command", node.id));
                    }
                }
                NodeKind::ActionChatMessage(_) | NodeKind::FlowEnd(_) => {}
            }
        }
    }

    fn check_security(&self, workflow: &WorkflowDefinition, report: &mut ValidationReport) {
        for node in &workflow.nodes {
            let expressions: Vec<&str> = match &node.kind {
                NodeKind::Transform(cfg) => vec![cfg.expression.as_str()],
                NodeKind::ActionWebhook(cfg) => {
                    let mut v = vec![cfg.url.as_str()];
                    if let Some(body_str) = cfg.body.as_str() {
                        v.push(body_str);
                    }
                    v
                }
                NodeKind::ActionChatMessage(cfg) => vec![cfg.message.as_str()],
                _ => Vec::new(),
            };
            for expr in expressions {
                if deny_list_re().is_match(expr) {
                    report.error(Some(&node.id), format!("node '{}' contains a forbidden expression pattern", node.id));
                }
            }
        }
    }
}

fn data_types_compatible(from: DataType, to: DataType) -> bool {
    from == to || matches!((from, to), (_, DataType::Object) | (DataType::Object, _))
}

fn detect_cycle<'a>(nodes: &'a [WorkflowNode], adjacency: &HashMap<&'a str, Vec<&'a str>>) -> Option<&'a str> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        InStack,
        Done,
    }

    let mut state: HashMap<&str, State> = nodes.iter().map(|n| (n.id.as_str(), State::Unvisited)).collect();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        state: &mut HashMap<&'a str, State>,
    ) -> Option<&'a str> {
        state.insert(node, State::InStack);
        if let Some(neighbors) = adjacency.get(node) {
            for &next in neighbors {
                match state.get(next).copied().unwrap_or(State::Unvisited) {
                    State::InStack => return Some(next),
                    State::Unvisited => {
                        if let Some(cycle) = visit(next, adjacency, state) {
                            return Some(cycle);
                        }
                    }
                    State::Done => {}
                }
            }
        }
        state.insert(node, State::Done);
        None
    }

    for node in nodes {
        if state.get(node.id.as_str()).copied() == Some(State::Unvisited) {
            if let Some(cycle) = visit(&node.id, adjacency, &mut state) {
                return Some(cycle);
            }
        }
    }
    None
}

fn bfs_reachable<'a>(triggers: &[&'a WorkflowNode], adjacency: &HashMap<&'a str, Vec<&'a str>>) -> HashSet<&'a str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = triggers.iter().map(|n| n.id.as_str()).collect();
    for t in &queue {
        visited.insert(t);
    }
    while let Some(current) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(current) {
            for &next in neighbors {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    visited
}

fn max_depth<'a>(triggers: &[&'a WorkflowNode], adjacency: &HashMap<&'a str, Vec<&'a str>>) -> usize {
    let mut best = 0usize;
    for t in triggers {
        let mut visited = HashSet::new();
        best = best.max(dfs_depth(t.id.as_str(), adjacency, &mut visited));
    }
    best
}

fn dfs_depth<'a>(node: &'a str, adjacency: &HashMap<&'a str, Vec<&'a str>>, visited: &mut HashSet<&'a str>) -> usize {
    if !visited.insert(node) {
        return 0;
    }
    let mut best = 0usize;
    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            best = best.max(1 + dfs_depth(next, adjacency, visited));
        }
    }
    visited.remove(node);
    best
}

#[allow(clippy::too_many_arguments)]
pub fn connection(from_node: &str, from_port: &str, to_node: &str, to_port: &str) -> Connection {
    Connection {
        from_node: from_node.to_string(),
        from_port: from_port.to_string(),
        to_node: to_node.to_string(),
        to_port: to_port.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionChatMessageConfig, FlowEndConfig, PortDefinition, TriggerCommandConfig};

    fn node(id: &str, kind: NodeKind, ports: Vec<PortDefinition>) -> WorkflowNode {
        WorkflowNode { id: id.to_string(), kind, ports }
    }

    fn output_port() -> PortDefinition {
        PortDefinition { name: "out".into(), port_type: PortType::Output, data_type: DataType::Object }
    }

    fn input_port() -> PortDefinition {
        PortDefinition { name: "in".into(), port_type: PortType::Input, data_type: DataType::Object }
    }

    fn simple_valid_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf1".into(),
            name: "greet".into(),
            nodes: vec![
                node("trigger", NodeKind::TriggerCommand(TriggerCommandConfig { command: "!hi".into() }), vec![output_port()]),
                node(
                    "action",
                    NodeKind::ActionChatMessage(ActionChatMessageConfig { message: "hello".into(), channel: None }),
                    vec![input_port(), output_port()],
                ),
                node("end", NodeKind::FlowEnd(FlowEndConfig { status: "ok".into() }), vec![input_port()]),
            ],
            connections: vec![connection("trigger", "out", "action", "in"), connection("action", "out", "end", "in")],
        }
    }

    #[test]
    fn valid_workflow_passes() {
        let validator = WorkflowValidator::new(ComplexityLimits::default());
        let report = validator.validate(&simple_valid_workflow());
        assert!(report.is_valid, "{:?}", report.errors);
    }

    #[test]
    fn missing_trigger_is_error_and_warning() {
        let mut wf = simple_valid_workflow();
        wf.nodes.remove(0);
        wf.connections.clear();
        let validator = WorkflowValidator::new(ComplexityLimits::default());
        let report = validator.validate(&wf);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.message.contains("trigger")));
        assert!(report.warnings.iter().any(|w| w.message.contains("trigger")));
    }

    #[test]
    fn cycle_is_detected() {
        let mut wf = simple_valid_workflow();
        wf.connections.push(connection("end", "out", "trigger", "in"));
        wf.nodes[2].ports.push(output_port());
        wf.nodes[0].ports.push(input_port());
        let validator = WorkflowValidator::new(ComplexityLimits::default());
        let report = validator.validate(&wf);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.message.contains("cycle")));
    }

    #[test]
    fn unreachable_node_is_a_warning() {
        let mut wf = simple_valid_workflow();
        wf.nodes.push(node("orphan", NodeKind::FlowEnd(FlowEndConfig { status: "ok".into() }), vec![]));
        let validator = WorkflowValidator::new(ComplexityLimits::default());
        let report = validator.validate(&wf);
        assert!(report.warnings.iter().any(|w| w.message.contains("unreachable")));
    }

    #[test]
    fn node_count_over_limit_is_a_hard_failure() {
        let validator = WorkflowValidator::new(ComplexityLimits { max_nodes: 1, max_connections: 200, max_depth: 20 });
        let report = validator.validate(&simple_valid_workflow());
        assert!(!report.is_valid);
    }

    #[test]
    fn forbidden_transform_expression_is_rejected() {
        use crate::types::DataTransformConfig;
        let mut wf = simple_valid_workflow();
        wf.nodes.push(node(
            "bad",
            NodeKind::Transform(DataTransformConfig { expression: "eval(payload)".into() }),
            vec![],
        ));
        let validator = WorkflowValidator::new(ComplexityLimits::default());
        let report = validator.validate(&wf);
        assert!(!report.is_valid);
        assert!(report.per_node_errors.contains_key("bad"));
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut wf = simple_valid_workflow();
        let dup = wf.nodes[0].clone();
        wf.nodes.push(dup);
        let validator = WorkflowValidator::new(ComplexityLimits::default());
        let report = validator.validate(&wf);
        assert!(!report.is_valid);
    }
}
