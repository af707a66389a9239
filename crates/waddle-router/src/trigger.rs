//! Trigger registration and resolution: `{pattern | event_type, module,
//! priority}` rows the router matches an inbound event against, in a fixed
//! order for `chatMessage` events — exact command prefix, then (outside
//! this module) alias expansion, greeting/farewell keywords, community
//! question triggers, wildcard fallback. Ties break by priority (higher
//! first) then registration order.

use serde::{Deserialize, Serialize};
use waddle_core::types::{MessageType, UserRole};

/// How a trigger's `pattern` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// `message.starts_with(pattern)` — the exact command prefix match.
    CommandPrefix,
    /// Matched against the built-in greeting/farewell keyword sets below.
    Greeting,
    Farewell,
    /// Matches unconditionally — the wildcard fallback, always lowest priority.
    Wildcard,
    /// Matches a non-chat event family (`subscribe`, `follow`, `donation`, …)
    /// by `event_type` rather than by text pattern.
    EventType,
}

impl std::str::FromStr for PatternKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "command_prefix" => Ok(PatternKind::CommandPrefix),
            "greeting" => Ok(PatternKind::Greeting),
            "farewell" => Ok(PatternKind::Farewell),
            "wildcard" => Ok(PatternKind::Wildcard),
            "event_type" => Ok(PatternKind::EventType),
            other => Err(format!("unknown trigger kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub pattern: String,
    pub kind: PatternKind,
    pub module_name: String,
    pub priority: i32,
    /// Registration order — the router's documented final tie-break.
    pub registered_at: u64,
    /// Minimum role a user must hold for this module to run. Modules raise
    /// the default, which is `member`.
    pub required_role: UserRole,
    /// When this trigger represents a workflow's entry node rather than an
    /// interaction module, the workflow's id — the dispatcher invokes the
    /// Workflow Engine instead of publishing to `events:commands`.
    pub workflow_id: Option<i64>,
}

/// Built-in keyword sets the router consults when no command prefix
/// matched, before falling back to community question triggers and the
/// wildcard.
const GREETINGS: &[&str] = &["hello", "hi", "hey", "yo", "greetings"];
const FAREWELLS: &[&str] = &["bye", "goodbye", "see you", "farewell", "later"];

pub fn is_greeting(message: &str) -> bool {
    let lower = message.to_lowercase();
    GREETINGS.iter().any(|g| lower.trim() == *g || lower.starts_with(&format!("{g} ")))
}

pub fn is_farewell(message: &str) -> bool {
    let lower = message.to_lowercase();
    FAREWELLS.iter().any(|g| lower.trim() == *g || lower.starts_with(&format!("{g} ")))
}

/// In-memory, process-shared trigger table. Registration happens at module
/// startup/registration time and is read far more often than written, so a
/// `RwLock<Vec<_>>` (sorted lazily at match time) is simpler than a `DashMap`
/// here — there is no per-key sharding benefit for a small, whole-table scan.
pub struct TriggerRegistry {
    triggers: std::sync::RwLock<Vec<Trigger>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            triggers: std::sync::RwLock::new(Vec::new()),
            next_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn register(&self, pattern: impl Into<String>, kind: PatternKind, module_name: impl Into<String>, priority: i32) {
        self.register_full(pattern, kind, module_name, priority, UserRole::Member, None)
    }

    /// Register with an explicit required role and/or workflow binding,
    /// for modules that raise the default role or triggers that hand off
    /// to the Workflow Engine instead of an interaction module.
    pub fn register_full(
        &self,
        pattern: impl Into<String>,
        kind: PatternKind,
        module_name: impl Into<String>,
        priority: i32,
        required_role: UserRole,
        workflow_id: Option<i64>,
    ) {
        let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.triggers.write().unwrap().push(Trigger {
            pattern: pattern.into(),
            kind,
            module_name: module_name.into(),
            priority,
            registered_at: seq,
            required_role,
            workflow_id,
        });
    }

    pub fn unregister(&self, module_name: &str) {
        self.triggers.write().unwrap().retain(|t| t.module_name != module_name);
    }

    pub fn all(&self) -> Vec<Trigger> {
        self.triggers.read().unwrap().clone()
    }

    /// Every trigger whose pattern class matches `message`/`message_type`,
    /// sorted by the documented tie-break (priority desc, then
    /// registration order asc). `question_triggers` are the community's
    /// configured phrases checked after greeting/farewell but before the
    /// wildcard.
    pub fn matches(
        &self,
        message: &str,
        message_type: MessageType,
        event_type: Option<&str>,
        question_triggers: &[String],
    ) -> Vec<Trigger> {
        let triggers = self.triggers.read().unwrap();
        let mut matched: Vec<Trigger> = Vec::new();

        if message_type != MessageType::ChatMessage {
            if let Some(ev) = event_type {
                matched.extend(
                    triggers
                        .iter()
                        .filter(|t| t.kind == PatternKind::EventType && t.pattern == ev)
                        .cloned(),
                );
            }
            sort_by_priority(&mut matched);
            return matched;
        }

        // 1. exact command prefix match.
        let prefix_hits: Vec<Trigger> = triggers
            .iter()
            .filter(|t| t.kind == PatternKind::CommandPrefix && message.starts_with(t.pattern.as_str()))
            .cloned()
            .collect();
        if !prefix_hits.is_empty() {
            matched = prefix_hits;
            sort_by_priority(&mut matched);
            return matched;
        }

        // 2. (alias expansion happens one layer up, before trigger
        //    resolution runs again on the expanded message.)

        // 3. greeting/farewell keyword sets.
        if is_greeting(message) {
            matched.extend(triggers.iter().filter(|t| t.kind == PatternKind::Greeting).cloned());
        }
        if is_farewell(message) {
            matched.extend(triggers.iter().filter(|t| t.kind == PatternKind::Farewell).cloned());
        }
        if !matched.is_empty() {
            sort_by_priority(&mut matched);
            return matched;
        }

        // 4. community-configured question triggers.
        let lower = message.to_lowercase();
        if question_triggers.iter().any(|q| lower.contains(&q.to_lowercase())) {
            matched.extend(
                triggers
                    .iter()
                    .filter(|t| t.kind == PatternKind::CommandPrefix && t.pattern == "?question")
                    .cloned(),
            );
        }
        if !matched.is_empty() {
            sort_by_priority(&mut matched);
            return matched;
        }

        // 5. wildcard fallback.
        matched.extend(triggers.iter().filter(|t| t.kind == PatternKind::Wildcard).cloned());
        sort_by_priority(&mut matched);
        matched
    }
}

fn sort_by_priority(triggers: &mut [Trigger]) {
    triggers.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.registered_at.cmp(&b.registered_at)));
}
