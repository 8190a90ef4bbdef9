//! Per-session data-origin graph: `$ref` resolution and staleness queries.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{rule_ids, GateError};
use crate::ids::{make_data_node_id, DataNodeId, IdPrefix, ResourceKey};
use crate::session::{DataKind, DataNode, Session};

impl Session {
    /// Creates a `tool_observation` node. The value is retained only when
    /// its serialised size is within `max_stored_value_bytes`; otherwise it
    /// is omitted and later `$ref` resolution of this id fails closed.
    pub fn register_observation(
        &mut self,
        tool_name: &str,
        tool_call_id: Option<&str>,
        result: &Value,
        max_stored_value_bytes: usize,
    ) -> DataNodeId {
        let suffix = match tool_call_id {
            Some(id) => format!("{tool_name}_{id}"),
            None => format!("{tool_name}_{}", self.next_suffix()),
        };
        let id = make_data_node_id(IdPrefix::Obs, self.turn, &suffix);

        let value = retain_if_small(result, max_stored_value_bytes);
        self.data.insert(
            id.clone(),
            DataNode {
                kind: DataKind::ToolObservation,
                tool_name: Some(tool_name.to_string()),
                resource: None,
                turn: self.turn,
                value,
            },
        );
        id
    }

    /// Creates a `file_content` node for `path`. When `current_turn_only`
    /// is set and the resource has no recorded write in the current turn,
    /// the session is tainted: the content did not demonstrably originate
    /// from this turn's own actions.
    pub fn register_file_content(
        &mut self,
        path: &str,
        content: &Value,
        current_turn_only: bool,
        max_stored_value_bytes: usize,
    ) -> DataNodeId {
        let resource = ResourceKey::for_file(path);
        let last_write_turn = self.resource_last_write_turn.get(&resource).copied();

        if current_turn_only && last_write_turn != Some(self.turn) {
            self.tainted = true;
        }

        let suffix = self.next_suffix();
        let id = make_data_node_id(IdPrefix::File, self.turn, &format!("f{suffix}"));
        let value = retain_if_small(content, max_stored_value_bytes);
        self.data.insert(
            id.clone(),
            DataNode {
                kind: DataKind::FileContent,
                tool_name: None,
                resource: Some(resource.into_string()),
                turn: self.turn,
                value,
            },
        );
        id
    }

    /// Deep-walks `params`, replacing any mapping containing a `$ref` (or
    /// `ref`) string key with the referenced node's stored value.
    /// Substitution is recursive over containers but not over the
    /// substituted value itself, one level of indirection.
    pub fn resolve_refs(&self, params: &Value) -> Result<Value, GateError> {
        match params {
            Value::Object(map) => {
                if let Some(id) = ref_key(map) {
                    let node = self
                        .data
                        .get(id.as_str())
                        .ok_or_else(|| GateError::RefUnresolved(id.to_string()))?;
                    return node
                        .value
                        .clone()
                        .ok_or_else(|| GateError::RefUnresolved(id.to_string()));
                }
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_refs(v)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_refs(item)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Deep-walks `params` without resolving, collecting every referenced
    /// id. Used by the pre-flight evaluator to classify refs as
    /// missing/stale/non-user without mutating or requiring success.
    pub fn collect_refs(params: &Value) -> HashSet<String> {
        let mut ids = HashSet::new();
        collect_refs_into(params, &mut ids);
        ids
    }
}

fn ref_key(map: &Map<String, Value>) -> Option<&str> {
    map.get("$ref")
        .or_else(|| map.get("ref"))
        .and_then(Value::as_str)
}

fn collect_refs_into(value: &Value, ids: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(id) = ref_key(map) {
                ids.insert(id.to_string());
                return;
            }
            for v in map.values() {
                collect_refs_into(v, ids);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs_into(item, ids);
            }
        }
        _ => {}
    }
}

fn retain_if_small(value: &Value, max_bytes: usize) -> Option<Value> {
    match serde_json::to_vec(value) {
        Ok(bytes) if bytes.len() <= max_bytes => Some(value.clone()),
        _ => None,
    }
}
