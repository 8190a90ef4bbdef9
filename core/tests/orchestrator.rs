//! End-to-end exercises against the public `Engine` API, as opposed to the
//! unit tests colocated with each module that exercise one component in
//! isolation.

use serde_json::json;
use toolguard_core::{Engine, Policy, SessionId};

fn policy_with_root(root: &str) -> Policy {
    let mut policy = Policy::default();
    policy.allowed_roots = vec![std::path::PathBuf::from(root)];
    policy
}

#[test]
fn a_full_turn_of_read_then_write_then_blocked_exec() {
    let engine = Engine::with_policy(policy_with_root("/work"));
    let session = SessionId::new("s1");

    engine.begin_user_turn(&session, "please read and then clean up");

    let read_result = engine.preflight(&session, "read_file", &json!({ "path": "/work/notes.txt" }), Some("tc1"));
    assert!(read_result.is_allowed());
    engine.record(&session, "read_file", &json!({ "content": "hello" }), Some("tc1"), true);

    // read_file is a trusted observation tool by default, so the session is
    // still clean and a high-risk exec is allowed.
    let exec_result = engine.preflight(&session, "exec", &json!({ "command": "echo done" }), None);
    assert!(exec_result.is_allowed());
}

#[test]
fn an_untrusted_observation_blocks_a_subsequent_high_risk_call() {
    let engine = Engine::with_policy(Policy::default());
    let session = SessionId::new("s2");

    engine.begin_user_turn(&session, "search the web then send a message");
    engine.record(&session, "web_search", &json!({ "results": [] }), Some("tc1"), true);

    let result = engine.preflight(&session, "send_message", &json!({ "to": "team", "body": "done" }), None);
    assert!(!result.is_allowed());
    assert_eq!(
        result.rule_id.as_deref(),
        Some(toolguard_core::rule_ids::PROV_HIGH_RISK_AFTER_UNTRUSTED)
    );
}

#[test]
fn a_dollar_ref_to_an_observation_from_a_prior_turn_is_stale() {
    let engine = Engine::with_policy(Policy::default());
    let session = SessionId::new("s3");

    engine.begin_user_turn(&session, "turn one");
    let written = engine.record(&session, "read_file", &json!("secret contents"), Some("tc1"), true);

    engine.begin_user_turn(&session, "turn two");
    let result = engine.preflight(
        &session,
        "send_message",
        &json!({ "to": "team", "body": { "$ref": written.to_string() } }),
        None,
    );
    assert!(!result.is_allowed());
    assert_eq!(
        result.rule_id.as_deref(),
        Some(toolguard_core::rule_ids::PROV_HIGH_RISK_STALE_SOURCE)
    );
}

#[test]
fn writing_outside_allowed_roots_is_denied() {
    let engine = Engine::with_policy(policy_with_root("/work"));
    let session = SessionId::new("s4");
    engine.begin_user_turn(&session, "write somewhere odd");

    let result = engine.preflight(
        &session,
        "write_file",
        &json!({ "path": "/etc/shadow", "content": "x" }),
        Some("tc1"),
    );
    assert!(!result.is_allowed());
    assert_eq!(result.rule_id.as_deref(), Some(toolguard_core::rule_ids::PATH_OUTSIDE_ALLOWED_ROOTS));
}

#[test]
fn a_secret_looking_value_is_denied_even_through_a_ref() {
    let engine = Engine::with_policy(policy_with_root("/work"));
    let session = SessionId::new("s5");
    engine.begin_user_turn(&session, "copy the token over");

    let obs = engine.record(
        &session,
        "read_file",
        &json!("sk-ABCDEFGHIJKLMNOPQRSTUVWX1234"),
        Some("tc1"),
        true,
    );

    let result = engine.preflight(
        &session,
        "write_file",
        &json!({ "path": "/work/out.txt", "content": { "$ref": obs.to_string() } }),
        Some("tc2"),
    );
    assert!(!result.is_allowed());
    assert_eq!(result.rule_id.as_deref(), Some(toolguard_core::rule_ids::SECRETS_DETECTED));
}
