//! Updates the provenance registry and turn automaton after a tool
//! observation completes, and commits any pending file writes.

use serde_json::Value;

use crate::ids::DataNodeId;
use crate::policy::Policy;
use crate::session::Session;

/// Runs the five-step post-tool algorithm and returns the new observation
/// DataNode id.
pub fn record(
    session: &mut Session,
    tool_name: &str,
    tool_call_id: Option<&str>,
    ok: bool,
    result: &Value,
    policy: &Policy,
) -> DataNodeId {
    // Step 1.
    session.auto_begin_turn(policy.provenance.turn_idle_ms);

    // Step 2.
    session.record_observation_taint(tool_name, &policy.provenance.trusted_observation_tools);

    // Step 3: commit pending writes keyed by tool_call_id, idempotently.
    if let Some(id) = tool_call_id {
        if let Some(pending) = session.pending_writes.remove(id) {
            if ok {
                for path in &pending.paths {
                    let key = crate::ids::ResourceKey::for_file(&path.to_string_lossy());
                    session
                        .resource_last_write_turn
                        .insert(key, pending.turn);
                }
                tracing::debug!(
                    tool_call_id = id,
                    paths = pending.paths.len(),
                    "committed pending write(s)"
                );
            }
        }
    }

    // Step 4.
    session.register_observation(tool_name, tool_call_id, result, policy.provenance.max_stored_value_bytes)

    // Step 5 (returning the id) is the caller's responsibility to attach
    // as `__prov_ref`, see wrapper.rs.
}
