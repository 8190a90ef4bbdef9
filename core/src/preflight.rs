//! Combines the provenance registry and turn automaton with policy to
//! admit or deny a proposed tool call. The broader orchestrator composition
//! (`$ref` resolution, secret scanning, exec-specific checks, path
//! extraction) lives in `orchestrator.rs`; this module is the eight-step
//! provenance algorithm on its own.

use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;

use crate::error::{rule_ids, Decision, PolicyEvaluationResult};
use crate::ids::ToolCallId;
use crate::policy::Policy;
use crate::session::{PendingWrite, Session};
use crate::shapes::extract_declared_paths;

struct RefClassification {
    any_missing: bool,
    any_stale: bool,
    any_non_user: bool,
}

fn classify_refs(session: &Session, ref_ids: &std::collections::HashSet<String>, policy: &Policy) -> RefClassification {
    let mut c = RefClassification {
        any_missing: false,
        any_stale: false,
        any_non_user: false,
    };

    for id in ref_ids {
        match session.data.get(id.as_str()) {
            None => c.any_missing = true,
            Some(node) => {
                if policy.provenance.current_turn_only && node.turn != session.turn {
                    c.any_stale = true;
                }
                if policy.provenance.forbid_non_user_data
                    && !matches!(node.kind, crate::session::DataKind::UserPrompt)
                {
                    c.any_non_user = true;
                }
            }
        }
    }
    c
}

fn is_high_risk(tool_name: &str, policy: &Policy) -> bool {
    tool_name == "exec" || policy.provenance.high_risk_tools.iter().any(|t| t == tool_name)
}

/// Runs the eight-step provenance algorithm. Mutates `session` for steps 2
/// and 3: turn inference, then pending-write registration for file-write
/// tools.
pub fn evaluate(
    session: &mut Session,
    tool_name: &str,
    params: &Value,
    tool_call_id: Option<&str>,
    policy: &Policy,
) -> PolicyEvaluationResult {
    // Step 1.
    if !policy.provenance.enabled {
        return PolicyEvaluationResult::allow();
    }

    // Step 2.
    session.auto_begin_turn(policy.provenance.turn_idle_ms);

    // Step 3.
    if policy.provenance.file_write_tools.iter().any(|t| t == tool_name) {
        if let Some(declared) = extract_declared_paths(params) {
            let key = tool_call_id
                .map(ToolCallId::new)
                .unwrap_or_else(|| ToolCallId::new(format!("synthetic:{}", session.turn)));
            session.pending_writes.insert(
                key.clone(),
                PendingWrite {
                    tool_call_id: key.as_str().to_string(),
                    paths: declared.into_iter().map(PathBuf::from).collect(),
                    turn: session.turn,
                    created_at: Instant::now(),
                },
            );
        }
    }

    // Step 4.
    let ref_ids = Session::collect_refs(params);
    let classification = classify_refs(session, &ref_ids, policy);

    // Step 5.
    if classification.any_missing {
        return PolicyEvaluationResult::deny(
            rule_ids::PROV_REF_UNRESOLVED,
            "one or more $ref ids in params are not known to this session",
        );
    }

    // Step 6.
    let high_risk = is_high_risk(tool_name, policy);

    // Step 7 / 8.
    if high_risk {
        if policy.provenance.require_clean_for_high_risk && session.tainted {
            return decision_for(
                policy.provenance.on_violation,
                rule_ids::PROV_HIGH_RISK_AFTER_UNTRUSTED,
                "session is tainted by an untrusted observation during this turn",
            );
        }
        if classification.any_stale {
            return decision_for(
                policy.provenance.on_violation,
                rule_ids::PROV_HIGH_RISK_STALE_SOURCE,
                "a referenced data node originated in a prior turn",
            );
        }
        if classification.any_non_user {
            return decision_for(
                policy.provenance.on_violation,
                rule_ids::PROV_HIGH_RISK_NON_USER_SOURCE,
                "a referenced data node did not originate from the user prompt",
            );
        }
    }

    PolicyEvaluationResult::allow()
}

fn decision_for(on_violation: Decision, rule_id: &str, reason: &str) -> PolicyEvaluationResult {
    match on_violation {
        Decision::Confirm => PolicyEvaluationResult::confirm(rule_id, reason),
        Decision::Allow => PolicyEvaluationResult::allow(),
        Decision::Deny => PolicyEvaluationResult::deny(rule_id, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SessionId;
    use serde_json::json;

    fn policy_with_root(root: &str) -> Policy {
        let mut p = Policy::default();
        p.allowed_roots = vec![PathBuf::from(root)];
        p
    }

    #[test]
    fn scenario_clean_exec_allowed() {
        let mut s = Session::new(SessionId::new("S"));
        s.begin_user_turn("hi");
        let policy = Policy::default();
        let result = evaluate(&mut s, "exec", &json!({ "command": "echo hi" }), None, &policy);
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn scenario_taint_blocks_high_risk() {
        let mut s = Session::new(SessionId::new("S"));
        s.begin_user_turn("t1");
        s.record_observation_taint("read", &Policy::default().provenance.trusted_observation_tools);
        let policy = Policy::default();
        let result = evaluate(&mut s, "exec", &json!({ "command": "echo x" }), None, &policy);
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.rule_id.as_deref(), Some(rule_ids::PROV_HIGH_RISK_AFTER_UNTRUSTED));
    }

    #[test]
    fn scenario_non_user_ref_blocks_high_risk() {
        let mut s = Session::new(SessionId::new("S"));
        s.begin_user_turn("t2");
        let obs = s.register_observation("read", Some("t2"), &json!("X"), 32 * 1024);
        let policy = Policy::default();
        let result = evaluate(
            &mut s,
            "exec",
            &json!({ "command": { "$ref": obs.as_str() } }),
            None,
            &policy,
        );
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(
            result.rule_id.as_deref(),
            Some(rule_ids::PROV_HIGH_RISK_NON_USER_SOURCE)
        );
    }

    #[test]
    fn scenario_stale_ref_across_turns() {
        let mut s = Session::new(SessionId::new("S"));
        s.begin_user_turn("t2");
        let obs = s.register_observation("read", Some("t2"), &json!("X"), 32 * 1024);
        s.begin_user_turn("t3");
        let policy = Policy::default();
        let result = evaluate(
            &mut s,
            "exec",
            &json!({ "command": { "$ref": obs.as_str() } }),
            None,
            &policy,
        );
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.rule_id.as_deref(), Some(rule_ids::PROV_HIGH_RISK_STALE_SOURCE));
    }

    #[test]
    fn scenario_missing_ref_fails_closed() {
        let mut s = Session::new(SessionId::new("S"));
        s.begin_user_turn("hi");
        let policy = Policy::default();
        let result = evaluate(
            &mut s,
            "exec",
            &json!({ "command": { "$ref": "obs:t999:missing" } }),
            None,
            &policy,
        );
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.rule_id.as_deref(), Some(rule_ids::PROV_REF_UNRESOLVED));
    }

    #[test]
    fn disabled_kill_switch_always_allows() {
        let mut s = Session::new(SessionId::new("S"));
        let mut policy = Policy::default();
        policy.provenance.enabled = false;
        let result = evaluate(
            &mut s,
            "exec",
            &json!({ "command": { "$ref": "missing" } }),
            None,
            &policy,
        );
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn file_write_records_pending_write() {
        let mut s = Session::new(SessionId::new("S"));
        s.begin_user_turn("hi");
        let policy = policy_with_root("/work");
        let result = evaluate(
            &mut s,
            "write_file",
            &json!({ "path": "/work/a.txt", "content": "x" }),
            Some("tc1"),
            &policy,
        );
        assert_eq!(result.decision, Decision::Allow);
        assert!(s.pending_writes.contains_key("tc1"));
    }
}
