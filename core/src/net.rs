//! Network allowlist enforcement: matches a tool's target against the
//! glob-style patterns configured for its channel.

use crate::error::rule_ids;
use crate::policy::NetworkPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkViolation {
    pub rule_id: &'static str,
    pub reason: String,
}

/// Simple glob matcher supporting a single trailing or leading `*`
/// wildcard per segment, enough for patterns like `*.internal.example.com`
/// or `https://api.example.com/*`. Anything more elaborate should go
/// through `globset` at the harness layer; the core engine only needs to
/// gate, not to be a general pattern-matching library.
fn glob_match(pattern: &str, target: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return target.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return target.starts_with(prefix);
    }
    pattern == target
}

/// Checks `target` (a URL, host, or recipient identifier) against the
/// configured allowlist for `channel`. A channel with no configured
/// patterns, or a target matching none of its channel's patterns, is
/// denied (the allowlist is fail-closed by construction).
pub fn check_allowlisted(channel: &str, target: &str, policy: &NetworkPolicy) -> Result<(), NetworkViolation> {
    let patterns = policy.allowlist.get(channel);
    let allowed = patterns
        .map(|pats| pats.iter().any(|p| glob_match(p, target)))
        .unwrap_or(false);

    if allowed {
        Ok(())
    } else {
        Err(NetworkViolation {
            rule_id: rule_ids::NETWORK_NOT_ALLOWLISTED,
            reason: format!("{target} is not allowlisted for channel {channel}"),
        })
    }
}
