use std::io;

use thiserror::Error;

/// Internal failure modes. Never crosses the `preflight`/`record` boundary
/// directly; the orchestrator catches every variant and converts it into a
/// `{allowed: false, reason: "fail-closed"}` decision.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("policy file io error: {0}")]
    PolicyIo(#[from] io::Error),

    #[error("failed to serialize approval request: {0}")]
    ApprovalEncode(#[from] serde_json::Error),

    #[error("$ref {0:?} does not resolve to a known data node in this session")]
    RefUnresolved(String),

    #[error("approval request timed out")]
    ApprovalTimeout,

    #[error("approval reply was malformed: {0}")]
    ApprovalMalformed(String),

    #[error("no approval descriptor configured")]
    ApprovalDescriptorAbsent,
}

/// Stable rule ids referenced by operators and tests.
pub mod rule_ids {
    pub const PROV_REF_UNRESOLVED: &str = "prov.ref_unresolved";
    pub const PROV_HIGH_RISK_AFTER_UNTRUSTED: &str = "prov.high_risk_after_untrusted";
    pub const PROV_HIGH_RISK_STALE_SOURCE: &str = "prov.high_risk_stale_source";
    pub const PROV_HIGH_RISK_NON_USER_SOURCE: &str = "prov.high_risk_non_user_source";

    pub const PATH_OUTSIDE_ALLOWED_ROOTS: &str = "path.outside_allowed_roots";
    pub const PATH_BLOCKED: &str = "path.blocked";
    pub const PATH_HOME_SENSITIVE: &str = "path.home_sensitive";

    pub const SECRETS_DETECTED: &str = "secrets.detected";

    pub const NETWORK_NOT_ALLOWLISTED: &str = "network.not_allowlisted";

    pub const EXEC_SHELL_WRAPPED: &str = "exec.shell_wrapped";
    pub const COMMAND_DESTRUCTIVE_NO_TARGET: &str = "command.destructive.no_target";

    pub const TOOL_PARAMS_UNRECOGNIZED: &str = "tool.params_unrecognized";
}

/// The only shape an evaluator is allowed to return across the public
/// contract: a tagged decision, never an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    Confirm,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PolicyEvaluationResult {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PolicyEvaluationResult {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: None,
            rule_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn deny(rule_id: &str, reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            rule_id: Some(rule_id.to_string()),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn confirm(rule_id: &str, reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Confirm,
            reason: Some(reason.into()),
            rule_id: Some(rule_id.to_string()),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}
