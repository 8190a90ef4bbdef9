//! The per-session data model: turn/taint state, the provenance graph, and
//! pending writes. `Session` itself is plain data; the operations on it
//! live in `provenance.rs` and `turn.rs` as `impl Session` blocks so each
//! algorithm stays in its own file while sharing one struct.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;

use crate::ids::{DataNodeId, ResourceKey, SessionId, ToolCallId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    UserPrompt,
    ToolObservation,
    FileContent,
    ModelLiteral,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct DataNode {
    pub kind: DataKind,
    pub tool_name: Option<String>,
    pub resource: Option<String>,
    pub turn: u64,
    /// Retained only when its serialised size is within
    /// `provenance.maxStoredValueBytes`; `$ref` resolution of an omitted
    /// value fails closed.
    pub value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub tool_call_id: String,
    pub paths: Vec<PathBuf>,
    pub turn: u64,
    pub created_at: Instant,
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub turn: u64,
    pub tainted: bool,
    pub last_event_at: Instant,
    pub data: HashMap<DataNodeId, DataNode>,
    pub resource_last_write_turn: HashMap<ResourceKey, u64>,
    pub pending_writes: HashMap<ToolCallId, PendingWrite>,
    /// Base directory relative paths in tool params are resolved against.
    pub cwd: PathBuf,
    /// Monotonic counter used to keep generated suffixes unique within a
    /// turn without depending on wall-clock resolution.
    pub(crate) next_suffix: u64,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self::new_with_cwd(id, std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn new_with_cwd(id: SessionId, cwd: PathBuf) -> Self {
        Self {
            id,
            turn: 0,
            tainted: false,
            last_event_at: Instant::now(),
            data: HashMap::new(),
            resource_last_write_turn: HashMap::new(),
            pending_writes: HashMap::new(),
            cwd,
            next_suffix: 0,
        }
    }

    pub(crate) fn next_suffix(&mut self) -> u64 {
        self.next_suffix += 1;
        self.next_suffix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_at_turn_zero_untainted() {
        let s = Session::new(SessionId::new("s1"));
        assert_eq!(s.turn, 0);
        assert!(!s.tainted);
        assert!(s.data.is_empty());
    }
}
