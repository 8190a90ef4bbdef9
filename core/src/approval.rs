//! Forwards `confirm` decisions to an out-of-band human-in-the-loop
//! approval channel over a Unix domain stream socket. On platforms without
//! Unix sockets the descriptor is simply always absent, which this module
//! treats the same as "no approval channel configured" rather than as a
//! compile error.

use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GateError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to find the listener and how to authenticate to it. Sourced from
/// the environment by the harness; the engine itself never reads env vars
/// directly so that tests can inject a descriptor explicitly.
#[derive(Debug, Clone)]
pub struct ApprovalDescriptor {
    pub socket_path: std::path::PathBuf,
    pub bearer_token: String,
}

impl ApprovalDescriptor {
    /// Reads `OPENCLAW_APPROVAL_SOCKET` / `OPENCLAW_APPROVAL_TOKEN` from
    /// the environment. Returns `None` when either is unset, at which
    /// point the caller must convert `confirm` to `deny`.
    pub fn from_env() -> Option<Self> {
        let socket_path = std::env::var_os("OPENCLAW_APPROVAL_SOCKET")?;
        let bearer_token = std::env::var("OPENCLAW_APPROVAL_TOKEN").ok()?;
        Some(Self {
            socket_path: socket_path.into(),
            bearer_token,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalOutcome {
    AllowOnce,
    AllowAlways,
    Deny,
}

#[derive(Debug, Serialize)]
struct ApprovalRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    rule_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<&'a str>,
    reason: &'a str,
    metadata: &'a Map<String, Value>,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    result: String,
}

/// Sends one `policy.request` and waits (bounded by `timeout`, default 30s)
/// for a response. Fail-closed: any I/O error, timeout, or malformed reply
/// becomes `Err`, which the caller must treat as `deny`.
pub fn request_approval(
    descriptor: &ApprovalDescriptor,
    rule_id: &str,
    tool_name: Option<&str>,
    reason: &str,
    metadata: &Map<String, Value>,
) -> Result<ApprovalOutcome, GateError> {
    request_approval_with_timeout(descriptor, rule_id, tool_name, reason, metadata, DEFAULT_TIMEOUT)
}

fn request_approval_with_timeout(
    descriptor: &ApprovalDescriptor,
    rule_id: &str,
    tool_name: Option<&str>,
    reason: &str,
    metadata: &Map<String, Value>,
    timeout: Duration,
) -> Result<ApprovalOutcome, GateError> {
    #[cfg(unix)]
    {
        use std::os::unix::net::UnixStream;

        let mut stream = UnixStream::connect(&descriptor.socket_path)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let request = ApprovalRequest {
            kind: "policy.request",
            rule_id,
            tool_name,
            reason,
            metadata,
            token: &descriptor.bearer_token,
        };
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        stream.write_all(&line)?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        let bytes_read = reader
            .read_line(&mut response_line)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    GateError::ApprovalTimeout
                }
                _ => GateError::PolicyIo(e),
            })?;
        if bytes_read == 0 {
            return Err(GateError::ApprovalMalformed("empty reply".to_string()));
        }

        let response: ApprovalResponse = serde_json::from_str(response_line.trim())
            .map_err(|e| GateError::ApprovalMalformed(e.to_string()))?;

        match response.result.as_str() {
            "allow-once" => Ok(ApprovalOutcome::AllowOnce),
            "allow-always" => Ok(ApprovalOutcome::AllowAlways),
            "deny" => Ok(ApprovalOutcome::Deny),
            other => Err(GateError::ApprovalMalformed(format!("unknown result {other:?}"))),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (descriptor, rule_id, tool_name, reason, metadata, timeout);
        Err(GateError::ApprovalDescriptorAbsent)
    }
}

/// Resolves a `confirm` decision via the approval channel. Absent
/// descriptor, or any error from `request_approval`, converts to `deny`
/// (fail-closed).
pub fn resolve_confirm(
    descriptor: Option<&ApprovalDescriptor>,
    rule_id: &str,
    tool_name: Option<&str>,
    reason: &str,
    metadata: &Map<String, Value>,
) -> bool {
    let Some(descriptor) = descriptor else {
        tracing::warn!(rule_id, "confirm requested but no approval descriptor is configured; denying");
        return false;
    };

    match request_approval(descriptor, rule_id, tool_name, reason, metadata) {
        Ok(ApprovalOutcome::AllowOnce | ApprovalOutcome::AllowAlways) => true,
        Ok(ApprovalOutcome::Deny) => false,
        Err(e) => {
            tracing::warn!(rule_id, error = %e, "approval bridge failed; denying (fail-closed)");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn from_env_is_none_without_both_vars() {
        // SAFETY: test-local env mutation; no other test in this module
        // reads these vars concurrently.
        unsafe {
            std::env::remove_var("OPENCLAW_APPROVAL_SOCKET");
            std::env::remove_var("OPENCLAW_APPROVAL_TOKEN");
        }
        assert!(ApprovalDescriptor::from_env().is_none());
    }

    #[test]
    fn resolve_confirm_denies_without_descriptor() {
        let metadata = Map::new();
        assert!(!resolve_confirm(None, "prov.x", Some("exec"), "reason", &metadata));
    }

    #[cfg(unix)]
    #[test]
    fn round_trip_over_unix_socket() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("approval.sock");
        let listener = UnixListener::bind(&socket_path).expect("bind");

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            let mut stream = stream;
            stream.write_all(b"{\"result\":\"allow-once\"}\n").expect("write");
        });

        let descriptor = ApprovalDescriptor {
            socket_path,
            bearer_token: "tok".to_string(),
        };
        let metadata = Map::new();
        let outcome = request_approval(&descriptor, "prov.x", Some("exec"), "reason", &metadata).unwrap();
        assert_eq!(outcome, ApprovalOutcome::AllowOnce);
        server.join().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn malformed_reply_fails_closed() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("approval.sock");
        let listener = UnixListener::bind(&socket_path).expect("bind");

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            stream.write_all(b"not json\n").expect("write");
        });

        let descriptor = ApprovalDescriptor {
            socket_path,
            bearer_token: "tok".to_string(),
        };
        let metadata = Map::new();
        assert!(request_approval(&descriptor, "prov.x", Some("exec"), "reason", &metadata).is_err());
        server.join().unwrap();
    }
}
