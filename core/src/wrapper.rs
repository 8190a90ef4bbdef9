//! Single pre/post integration point invoked by the agent harness around
//! every tool call. The pure decoration logic lives here; the actual
//! pre-flight/record calls need a session and a policy, so the
//! orchestrating method is `Engine::wrap_tool_call` (`engine.rs`).

use serde_json::Value;

use crate::error::PolicyEvaluationResult;
use crate::ids::DataNodeId;

/// Why `wrap_tool_call` did not run the underlying tool at all.
#[derive(Debug, Clone)]
pub enum Blocked {
    Decision(PolicyEvaluationResult),
}

/// Attaches `__prov_ref` to a tool result. Object results get the field
/// inserted; primitive (non-object) results are wrapped as
/// `{value, __prov_ref}` instead of being mutated in place, since a bare
/// string/number/bool has nowhere to carry an extra field.
pub fn decorate(result: Value, prov_ref: &DataNodeId) -> Value {
    match result {
        Value::Object(mut map) => {
            map.insert("__prov_ref".to_string(), Value::String(prov_ref.to_string()));
            Value::Object(map)
        }
        other => serde_json::json!({ "value": other, "__prov_ref": prov_ref.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_results_get_field_inserted() {
        let id = DataNodeId::new("obs:t1:read_1");
        let decorated = decorate(json!({ "content": "hi" }), &id);
        assert_eq!(decorated["__prov_ref"], json!("obs:t1:read_1"));
        assert_eq!(decorated["content"], json!("hi"));
    }

    #[test]
    fn primitive_results_are_wrapped() {
        let id = DataNodeId::new("obs:t1:read_1");
        let decorated = decorate(json!(42), &id);
        assert_eq!(decorated, json!({ "value": 42, "__prov_ref": "obs:t1:read_1" }));
    }
}
