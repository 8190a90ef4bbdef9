//! Entropy + pattern heuristic secret scanner over arbitrary nested JSON
//! parameters.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::rule_ids;
use crate::policy::SecretsPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretsViolation {
    pub rule_id: &'static str,
    pub first_field_path: String,
    pub count: usize,
}

struct Patterns {
    long_alnum: Regex,
    sk_prefixed: Regex,
    pk_prefixed: Regex,
    base64_block: Regex,
    bearer_token: Regex,
    jwt: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        long_alnum: Regex::new(r"^[A-Za-z0-9+/_-]{32,}$").expect("valid regex"),
        sk_prefixed: Regex::new(r"^sk-[A-Za-z0-9]{10,}$").expect("valid regex"),
        pk_prefixed: Regex::new(r"^pk_[A-Za-z0-9]{10,}$").expect("valid regex"),
        base64_block: Regex::new(r"^(?:[A-Za-z0-9+/]{4}){4,}(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$")
            .expect("valid regex"),
        bearer_token: Regex::new(r"^Bearer\s+[A-Za-z0-9._-]{8,}$").expect("valid regex"),
        jwt: Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").expect("valid regex"),
    })
}

fn matches_known_pattern(s: &str) -> bool {
    let p = patterns();
    p.long_alnum.is_match(s)
        || p.sk_prefixed.is_match(s)
        || p.pk_prefixed.is_match(s)
        || p.base64_block.is_match(s)
        || p.bearer_token.is_match(s)
        || p.jwt.is_match(s)
}

/// Shannon entropy over per-character frequency, in bits per character.
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0usize) += 1;
    }
    let len = s.chars().count() as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn field_path_push(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}.{segment}")
    }
}

fn field_path_index(base: &str, i: usize) -> String {
    format!("{base}[{i}]")
}

fn path_suppressed(field_path: &str, exceptions: &[String]) -> bool {
    exceptions.iter().any(|ex| {
        field_path
            .split(['.', '['])
            .any(|component| component.trim_end_matches(']') == ex)
    })
}

fn scan_value(value: &Value, field_path: &str, policy: &SecretsPolicy, flagged: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.chars().count() >= policy.min_length
                && shannon_entropy(trimmed) >= policy.entropy_threshold
                && matches_known_pattern(trimmed)
                && !path_suppressed(field_path, &policy.exceptions.fields)
            {
                flagged.push(field_path.to_string());
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_value(item, &field_path_index(field_path, i), policy, flagged);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                scan_value(item, &field_path_push(field_path, key), policy, flagged);
            }
        }
        _ => {}
    }
}

/// Recursively scans `params` for likely secrets. Suppressed entirely when
/// `tool_name` is in `secrets.exceptions.tools`, or per-field when a path
/// component matches `secrets.exceptions.fields`.
pub fn scan(params: &Value, tool_name: &str, policy: &SecretsPolicy) -> Result<(), SecretsViolation> {
    if !policy.enabled || policy.exceptions.tools.iter().any(|t| t == tool_name) {
        return Ok(());
    }

    let mut flagged = Vec::new();
    scan_value(params, "", policy, &mut flagged);

    if flagged.is_empty() {
        Ok(())
    } else {
        Err(SecretsViolation {
            rule_id: rule_ids::SECRETS_DETECTED,
            first_field_path: flagged[0].clone(),
            count: flagged.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn entropy_favours_random_over_repeated() {
        assert!(shannon_entropy("aaaaaaaaaa") < shannon_entropy("a1b2c3d4e5"));
    }

    #[test]
    fn flags_sk_prefixed_token() {
        let policy = SecretsPolicy::default();
        let params = json!({ "apiKey": "sk-ABCDEFGHIJKLMNOPQRSTUVWX1234" });
        let violation = scan(&params, "exec", &policy).unwrap_err();
        assert_eq!(violation.first_field_path, "apiKey");
        assert_eq!(violation.count, 1);
    }

    #[test]
    fn short_strings_are_never_flagged() {
        let policy = SecretsPolicy::default();
        let params = json!({ "apiKey": "sk-short" });
        assert!(scan(&params, "exec", &policy).is_ok());
    }

    #[test]
    fn tool_exception_suppresses_entire_scan() {
        let mut policy = SecretsPolicy::default();
        policy.exceptions.tools.push("debug_dump".to_string());
        let params = json!({ "apiKey": "sk-ABCDEFGHIJKLMNOPQRSTUVWX1234" });
        assert!(scan(&params, "debug_dump", &policy).is_ok());
    }

    #[test]
    fn field_exception_suppresses_single_field() {
        let policy = SecretsPolicy::default();
        let params = json!({ "media": { "base64": "sk-ABCDEFGHIJKLMNOPQRSTUVWX1234" } });
        assert!(scan(&params, "exec", &policy).is_ok());
    }

    #[test]
    fn nested_arrays_are_walked() {
        let policy = SecretsPolicy::default();
        let params = json!({ "items": [ { "token": "sk-ABCDEFGHIJKLMNOPQRSTUVWX1234" } ] });
        let violation = scan(&params, "exec", &policy).unwrap_err();
        assert_eq!(violation.first_field_path, "items[0].token");
    }

    #[test]
    fn disabled_policy_never_flags() {
        let mut policy = SecretsPolicy::default();
        policy.enabled = false;
        let params = json!({ "apiKey": "sk-ABCDEFGHIJKLMNOPQRSTUVWX1234" });
        assert!(scan(&params, "exec", &policy).is_ok());
    }
}
