//! The explicit engine handle: one `Engine` is created at program start and
//! threaded through by the harness; tests construct a fresh one instead of
//! calling a reset entry point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use crate::approval::{self, ApprovalDescriptor};
use crate::error::{Decision, PolicyEvaluationResult};
use crate::ids::{DataNodeId, SessionId};
use crate::orchestrator;
use crate::policy::{Policy, PolicyStore};
use crate::recorder;
use crate::session::Session;
use crate::wrapper::{decorate, Blocked};

pub struct Engine {
    policy_store: Option<PolicyStore>,
    policy: RwLock<Arc<Policy>>,
    sessions: Mutex<HashMap<SessionId, Session>>,
    approval_descriptor: Option<ApprovalDescriptor>,
    default_cwd: PathBuf,
}

impl Engine {
    /// Loads policy from `policy_store` (defaults on any load failure) and
    /// starts with no sessions.
    pub fn new(policy_store: PolicyStore) -> Self {
        let policy = policy_store.load();
        Self {
            policy_store: Some(policy_store),
            policy: RwLock::new(Arc::new(policy)),
            sessions: Mutex::new(HashMap::new()),
            approval_descriptor: ApprovalDescriptor::from_env(),
            default_cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Test/embedding convenience: build an engine around an in-memory
    /// policy with no backing file.
    pub fn with_policy(policy: Policy) -> Self {
        Self {
            policy_store: None,
            policy: RwLock::new(Arc::new(policy)),
            sessions: Mutex::new(HashMap::new()),
            approval_descriptor: None,
            default_cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_approval_descriptor(mut self, descriptor: Option<ApprovalDescriptor>) -> Self {
        self.approval_descriptor = descriptor;
        self
    }

    pub fn with_default_cwd(mut self, cwd: PathBuf) -> Self {
        self.default_cwd = cwd;
        self
    }

    pub fn policy_snapshot(&self) -> Arc<Policy> {
        #[allow(clippy::unwrap_used)]
        self.policy.read().unwrap().clone()
    }

    /// Re-reads the policy file, if this engine was constructed with one.
    /// A no-op for `with_policy`-constructed engines.
    pub fn reload_policy(&self) {
        if let Some(store) = &self.policy_store {
            let fresh = store.load();
            #[allow(clippy::unwrap_used)]
            {
                *self.policy.write().unwrap() = Arc::new(fresh);
            }
        }
    }

    fn with_session<R>(&self, session_id: &SessionId, f: impl FnOnce(&mut Session, &Policy) -> R) -> R {
        #[allow(clippy::unwrap_used)]
        let mut sessions = self.sessions.lock().unwrap();
        let cwd = self.default_cwd.clone();
        let session = sessions
            .entry(session_id.clone())
            .or_insert_with(|| Session::new_with_cwd(session_id.clone(), cwd));
        let policy = self.policy_snapshot();
        f(session, &policy)
    }

    /// The authoritative turn boundary contract.
    pub fn begin_user_turn(&self, session_id: &SessionId, text: &str) -> DataNodeId {
        self.with_session(session_id, |session, _policy| session.begin_user_turn(text))
    }

    /// Raw tri-state decision, before any `confirm` resolution. Useful for
    /// inspection tooling (the CLI's `check` subcommand) that wants to see
    /// the engine's reasoning without driving an approval RPC.
    pub fn preflight_result(
        &self,
        session_id: &SessionId,
        tool_name: &str,
        params: &Value,
        tool_call_id: Option<&str>,
    ) -> PolicyEvaluationResult {
        self.with_session(session_id, |session, policy| {
            orchestrator::preflight(session, tool_name, params, tool_call_id, policy)
        })
    }

    /// `confirm` decisions are resolved through the approval bridge here,
    /// so callers only ever see `allow`/`deny` by the time this returns.
    pub fn preflight(
        &self,
        session_id: &SessionId,
        tool_name: &str,
        params: &Value,
        tool_call_id: Option<&str>,
    ) -> PolicyEvaluationResult {
        let result = self.preflight_result(session_id, tool_name, params, tool_call_id);
        self.resolve_confirm_if_needed(tool_name, result)
    }

    fn resolve_confirm_if_needed(&self, tool_name: &str, result: PolicyEvaluationResult) -> PolicyEvaluationResult {
        if result.decision != Decision::Confirm {
            return result;
        }
        let rule_id = result.rule_id.clone().unwrap_or_default();
        let reason = result.reason.clone().unwrap_or_default();
        let approved = approval::resolve_confirm(
            self.approval_descriptor.as_ref(),
            &rule_id,
            Some(tool_name),
            &reason,
            &result.metadata,
        );
        PolicyEvaluationResult {
            decision: if approved { Decision::Allow } else { Decision::Deny },
            ..result
        }
    }

    /// The post-tool contract.
    pub fn record(
        &self,
        session_id: &SessionId,
        tool_name: &str,
        result: &Value,
        tool_call_id: Option<&str>,
        ok: bool,
    ) -> DataNodeId {
        self.with_session(session_id, |session, policy| {
            recorder::record(session, tool_name, tool_call_id, ok, result, policy)
        })
    }

    /// The single pre/post integration point a harness calls around every
    /// tool invocation. On block, returns `Err(Blocked)` without recording
    /// an observation. On
    /// success, records and decorates the result with `__prov_ref`. On
    /// tool failure, still records once (`ok: false`) and re-raises the
    /// tool's own error untouched.
    pub fn wrap_tool_call<E>(
        &self,
        session_id: &SessionId,
        tool_name: &str,
        params: &Value,
        tool_call_id: Option<&str>,
        run: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, ToolCallOutcome<E>> {
        let decision = self.preflight(session_id, tool_name, params, tool_call_id);
        if !decision.is_allowed() {
            return Err(ToolCallOutcome::Blocked(Blocked::Decision(decision)));
        }

        match run() {
            Ok(value) => {
                let prov_ref = self.record(session_id, tool_name, &value, tool_call_id, true);
                Ok(decorate(value, &prov_ref))
            }
            Err(err) => {
                let failure_record = serde_json::json!({ "ok": false });
                self.record(session_id, tool_name, &failure_record, tool_call_id, false);
                Err(ToolCallOutcome::ToolFailed(err))
            }
        }
    }
}

#[derive(Debug)]
pub enum ToolCallOutcome<E> {
    Blocked(Blocked),
    ToolFailed(E),
}
