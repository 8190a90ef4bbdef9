//! Composes the provenance pre-flight, `$ref` resolution, secret scan, and
//! exec/path checks in a fixed order, denying on the first failure. This is
//! the function an `Engine` calls for every proposed tool call.

use serde_json::{json, Value};

use crate::commands;
use crate::error::{rule_ids, PolicyEvaluationResult};
use crate::net;
use crate::path_resolver;
use crate::policy::Policy;
use crate::preflight;
use crate::secrets;
use crate::session::Session;
use crate::shapes::extract_declared_paths;

fn looks_like_path(arg: &str) -> bool {
    arg.starts_with('/') || arg.starts_with("~/") || arg.starts_with("./") || arg.starts_with("../") || arg == "~"
}

fn extract_argv(resolved: &Value) -> Vec<String> {
    if let Some(argv) = resolved.get("argv").and_then(Value::as_array) {
        return argv.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
    }
    resolved
        .get("command")
        .and_then(Value::as_str)
        .and_then(shlex::split)
        .unwrap_or_default()
}

/// The orchestrator entry point. Any internal error is caught here and
/// converted to the fail-closed decision; no `Result` ever escapes to the
/// harness.
pub fn preflight(
    session: &mut Session,
    tool_name: &str,
    params: &Value,
    tool_call_id: Option<&str>,
    policy: &Policy,
) -> PolicyEvaluationResult {
    // The global kill switch bypasses every evaluator below.
    if !policy.enabled {
        return PolicyEvaluationResult::allow();
    }

    // (a) provenance pre-flight.
    let pre = preflight::evaluate(session, tool_name, params, tool_call_id, policy);
    if !pre.is_allowed() {
        return pre;
    }

    // (b) $ref resolution, any failure is prov.ref_unresolved.
    let resolved = match session.resolve_refs(params) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(tool_name, error = %e, "ref resolution failed");
            return PolicyEvaluationResult::deny(
                rule_ids::PROV_REF_UNRESOLVED,
                "a $ref in params could not be resolved",
            );
        }
    };

    // (c) secret scan on resolved params.
    if let Err(violation) = secrets::scan(&resolved, tool_name, &policy.secrets) {
        return PolicyEvaluationResult::deny(
            violation.rule_id,
            format!("likely secret detected at {}", violation.first_field_path),
        )
        .with_metadata("field_path", json!(violation.first_field_path))
        .with_metadata("count", json!(violation.count));
    }

    if tool_name == "exec" {
        // (d) exec-specific checks.
        let argv = extract_argv(&resolved);

        if commands::is_shell_wrapped(&argv) {
            return PolicyEvaluationResult::deny(
                rule_ids::EXEC_SHELL_WRAPPED,
                "shell-wrapped command forms are denied outright",
            );
        }

        for arg in &argv {
            if looks_like_path(arg) {
                let target = path_resolver::resolve(arg, &session.cwd);
                if let Err(violation) = path_resolver::check_path_access(&target, policy) {
                    return PolicyEvaluationResult::deny(violation.rule_id, violation.reason);
                }
            }
        }

        if commands::is_destructive_without_target(&argv) {
            return PolicyEvaluationResult::deny(
                rule_ids::COMMAND_DESTRUCTIVE_NO_TARGET,
                "destructive command with no explicit target",
            );
        }
    } else if let Some(channel) = policy_channel_for(tool_name, policy) {
        // Network-channel tools consult the allowlist instead of the path
        // firewall.
        if let Some(target) = extract_network_target(&resolved) {
            if let Err(violation) = net::check_allowlisted(&channel, &target, &policy.network) {
                return PolicyEvaluationResult::deny(violation.rule_id, violation.reason);
            }
        } else {
            return PolicyEvaluationResult::deny(
                rule_ids::TOOL_PARAMS_UNRECOGNIZED,
                "network tool call has no recognisable target shape",
            );
        }
    } else {
        // (e) non-exec tools: shape-key path extraction.
        match extract_declared_paths(&resolved) {
            None => {
                return PolicyEvaluationResult::deny(
                    rule_ids::TOOL_PARAMS_UNRECOGNIZED,
                    "tool params did not match any known path shape",
                );
            }
            Some(paths) => {
                for p in paths {
                    let target = path_resolver::resolve(&p, &session.cwd);
                    if let Err(violation) = path_resolver::check_path_access(&target, policy) {
                        return PolicyEvaluationResult::deny(violation.rule_id, violation.reason);
                    }
                }
            }
        }
    }

    PolicyEvaluationResult::allow()
}

/// A tool is a "network channel" tool when its name appears as a key in
/// the configured allowlist; this is how the orchestrator decides whether
/// to run the path firewall or the network firewall for a non-exec tool.
fn policy_channel_for(tool_name: &str, policy: &Policy) -> Option<String> {
    policy
        .network
        .allowlist
        .keys()
        .find(|k| k.as_str() == tool_name)
        .cloned()
}

fn extract_network_target(resolved: &Value) -> Option<String> {
    for key in ["url", "endpoint", "to", "recipient"] {
        if let Some(v) = resolved.get(key).and_then(Value::as_str) {
            return Some(v.to_string());
        }
    }
    None
}
