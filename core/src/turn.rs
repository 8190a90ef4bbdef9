//! Deterministic per-session turn automaton.

use std::time::{Duration, Instant};

use crate::ids::{IdPrefix, make_data_node_id};
use crate::session::{DataKind, DataNode, Session};

impl Session {
    /// The authoritative entry point: a new user prompt. Advances `turn`,
    /// clears `tainted`, and registers a `user_prompt` DataNode. Explicit
    /// callers that wire this up must not also rely on idle inference for
    /// the same prompt.
    pub fn begin_user_turn(&mut self, text: &str) -> crate::ids::DataNodeId {
        self.turn += 1;
        self.tainted = false;
        self.last_event_at = Instant::now();

        let suffix = self.next_suffix();
        let id = make_data_node_id(IdPrefix::User, self.turn, &format!("p{suffix}"));
        self.data.insert(
            id.clone(),
            DataNode {
                kind: DataKind::UserPrompt,
                tool_name: None,
                resource: None,
                turn: self.turn,
                value: Some(serde_json::Value::String(text.to_string())),
            },
        );
        id
    }

    /// Safety net for callers that have not wired explicit prompt
    /// notifications: begins a turn with empty text if none has started
    /// yet, or if the session has been idle past `turn_idle_ms`. Always
    /// updates `last_event_at`. Logged, since a wall-clock heuristic
    /// deciding turn boundaries is a hazard.
    pub fn auto_begin_turn(&mut self, turn_idle_ms: u64) {
        let now = Instant::now();
        let idle = now.duration_since(self.last_event_at) > Duration::from_millis(turn_idle_ms);

        if self.turn == 0 || idle {
            tracing::info!(
                session_turn = self.turn,
                idle,
                "auto-inferring a new turn from idle/absent state; explicit begin_user_turn was not called"
            );
            self.begin_user_turn("");
            return;
        }

        self.last_event_at = now;
    }

    /// Marks the session tainted unless `tool_name` is a trusted
    /// observation tool. Monotonic within a turn: can only flip
    /// false -> true.
    pub fn record_observation_taint(&mut self, tool_name: &str, trusted_observation_tools: &[String]) {
        if !trusted_observation_tools.iter().any(|t| t == tool_name) {
            self.tainted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SessionId;

    #[test]
    fn begin_user_turn_advances_turn_and_clears_taint() {
        let mut s = Session::new(SessionId::new("s"));
        s.tainted = true;
        let id = s.begin_user_turn("hello");
        assert_eq!(s.turn, 1);
        assert!(!s.tainted);
        assert!(id.as_str().starts_with("user:t1:"));
    }

    #[test]
    fn auto_begin_turn_starts_first_turn() {
        let mut s = Session::new(SessionId::new("s"));
        s.auto_begin_turn(15_000);
        assert_eq!(s.turn, 1);
    }

    #[test]
    fn auto_begin_turn_does_not_duplicate_within_idle_window() {
        let mut s = Session::new(SessionId::new("s"));
        s.begin_user_turn("hi");
        s.auto_begin_turn(15_000);
        assert_eq!(s.turn, 1);
    }

    #[test]
    fn auto_begin_turn_infers_new_turn_after_idle() {
        let mut s = Session::new(SessionId::new("s"));
        s.begin_user_turn("hi");
        assert_eq!(s.turn, 1);
        // Simulate an idle gap by back-dating last_event_at.
        s.last_event_at = Instant::now() - Duration::from_millis(20_000);
        s.auto_begin_turn(15_000);
        assert_eq!(s.turn, 2);
    }

    #[test]
    fn taint_is_monotonic_until_next_turn() {
        let mut s = Session::new(SessionId::new("s"));
        s.begin_user_turn("hi");
        let trusted = vec!["read_file".to_string()];
        s.record_observation_taint("read_file", &trusted);
        assert!(!s.tainted);
        s.record_observation_taint("exec", &trusted);
        assert!(s.tainted);
        s.record_observation_taint("read_file", &trusted);
        assert!(s.tainted, "must stay tainted until the next begin_user_turn");
        s.begin_user_turn("next");
        assert!(!s.tainted);
    }
}
