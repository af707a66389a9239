use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::types::ModuleResponse;

/// Per-session response collector. Exactly one owner (the router task
/// handling that session) reads it; other tasks only push through
/// [`SessionAggregator::record`] — a session's aggregator belongs to
/// exactly one task. Ordering across modules is not guaranteed; within one
/// module responses are kept in publication order.
#[derive(Default)]
pub struct SessionAggregator {
    // session_id -> module_name -> ordered responses
    slots: DashMap<String, Arc<SessionSlot>>,
}

#[derive(Default)]
struct SessionSlot {
    responses: Mutex<HashMap<String, Vec<ModuleResponse>>>,
    notify: Notify,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session before dispatch so late-arriving responses have
    /// somewhere to land even if the router task hasn't started collecting.
    pub fn open(&self, session_id: &str) {
        self.slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionSlot::default()));
    }

    /// Push one module's response. Safe to call from any task.
    pub fn record(&self, session_id: &str, response: ModuleResponse) {
        let slot = self
            .slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionSlot::default()))
            .clone();
        {
            let mut responses = slot.responses.lock().unwrap();
            responses
                .entry(response.module_name.clone())
                .or_default()
                .push(response);
        }
        slot.notify.notify_waiters();
    }

    /// Snapshot every response recorded so far for a session.
    pub fn snapshot(&self, session_id: &str) -> HashMap<String, Vec<ModuleResponse>> {
        self.slots
            .get(session_id)
            .map(|slot| slot.responses.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Count of distinct modules that have responded so far.
    pub fn responded_modules(&self, session_id: &str) -> usize {
        self.slots
            .get(session_id)
            .map(|slot| slot.responses.lock().unwrap().len())
            .unwrap_or(0)
    }

    /// Wait until a new response arrives or `deadline` elapses, whichever
    /// is first. Returns `true` if woken by a new response.
    pub async fn wait_for_response(&self, session_id: &str, deadline: std::time::Duration) -> bool {
        let slot = self
            .slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionSlot::default()))
            .clone();
        tokio::time::timeout(deadline, slot.notify.notified())
            .await
            .is_ok()
    }

    /// Drop a session's aggregator state once it reaches a terminal state.
    pub fn close(&self, session_id: &str) {
        self.slots.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(module: &str, pub_id: u64) -> ModuleResponse {
        ModuleResponse {
            module_name: module.to_string(),
            success: true,
            response_action: None,
            response_data: None,
            error_message: None,
            processing_time_ms: 1,
            publication_id: pub_id,
        }
    }

    #[test]
    fn record_preserves_fifo_order_within_a_module() {
        let agg = SessionAggregator::new();
        agg.record("s1", response("help_mod", 1));
        agg.record("s1", response("help_mod", 2));
        let snap = agg.snapshot("s1");
        let ids: Vec<u64> = snap["help_mod"].iter().map(|r| r.publication_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn responses_from_different_modules_are_independent() {
        let agg = SessionAggregator::new();
        agg.record("s1", response("help_mod", 1));
        agg.record("s1", response("games_mod", 1));
        assert_eq!(agg.responded_modules("s1"), 2);
    }

    #[tokio::test]
    async fn wait_for_response_times_out_when_nothing_arrives() {
        let agg = SessionAggregator::new();
        agg.open("s1");
        let woke = agg
            .wait_for_response("s1", std::time::Duration::from_millis(10))
            .await;
        assert!(!woke);
    }

    #[tokio::test]
    async fn wait_for_response_wakes_on_record() {
        let agg = Arc::new(SessionAggregator::new());
        agg.open("s1");
        let agg2 = agg.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            agg2.record("s1", response("help_mod", 1));
        });
        let woke = agg
            .wait_for_response("s1", std::time::Duration::from_secs(1))
            .await;
        assert!(woke);
        handle.await.unwrap();
    }
}
