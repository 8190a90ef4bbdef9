//! Declarative policy loading, normalisation and defaults.
//!
//! Never throws: load failures are logged and fall back to defaults, and
//! normalisation fills each missing or wrongly typed field individually off
//! a `serde_json::Value` rather than failing the whole document in one shot
//! (see DESIGN.md).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::Decision;

pub const DEFAULT_MIN_SECRET_LENGTH: usize = 20;
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 3.5;
pub const DEFAULT_MAX_STORED_VALUE_BYTES: usize = 32 * 1024;
pub const DEFAULT_TURN_IDLE_MS: u64 = 15_000;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictedPaths {
    pub system_critical: Vec<PathBuf>,
}

impl Default for RestrictedPaths {
    fn default() -> Self {
        Self {
            system_critical: vec![
                PathBuf::from("/etc"),
                PathBuf::from("/boot"),
                PathBuf::from("/sys"),
                PathBuf::from("/proc"),
                PathBuf::from("C:/Windows"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpacePolicy {
    pub deny_on_any_access: Vec<String>,
}

impl Default for UserSpacePolicy {
    fn default() -> Self {
        Self {
            deny_on_any_access: vec![
                ".ssh".to_string(),
                ".aws".to_string(),
                ".gnupg".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct NetworkPolicy {
    /// channel -> allowed target patterns (glob-style).
    pub allowlist: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SecretExceptions {
    pub tools: Vec<String>,
    pub fields: Vec<String>,
}

impl Default for SecretExceptions {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            fields: vec![
                "buffer".to_string(),
                "base64".to_string(),
                "media".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsPolicy {
    pub enabled: bool,
    pub min_length: usize,
    pub entropy_threshold: f64,
    pub exceptions: SecretExceptions,
}

impl Default for SecretsPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_length: DEFAULT_MIN_SECRET_LENGTH,
            entropy_threshold: DEFAULT_ENTROPY_THRESHOLD,
            exceptions: SecretExceptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenancePolicy {
    pub enabled: bool,
    pub current_turn_only: bool,
    pub forbid_non_user_data: bool,
    pub require_clean_for_high_risk: bool,
    pub on_violation: Decision,
    pub high_risk_tools: Vec<String>,
    pub trusted_observation_tools: Vec<String>,
    pub file_write_tools: Vec<String>,
    pub file_read_tools: Vec<String>,
    pub max_stored_value_bytes: usize,
    pub turn_idle_ms: u64,
}

impl Default for ProvenancePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            current_turn_only: true,
            forbid_non_user_data: true,
            require_clean_for_high_risk: true,
            on_violation: Decision::Deny,
            high_risk_tools: vec![
                "send_message".to_string(),
                "send_email".to_string(),
                "webhook_call".to_string(),
                "payment_transfer".to_string(),
            ],
            trusted_observation_tools: vec![
                "read_file".to_string(),
                "list_dir".to_string(),
                "search".to_string(),
            ],
            file_write_tools: vec![
                "write_file".to_string(),
                "edit_file".to_string(),
                "apply_patch".to_string(),
            ],
            file_read_tools: vec!["read_file".to_string()],
            max_stored_value_bytes: DEFAULT_MAX_STORED_VALUE_BYTES,
            turn_idle_ms: DEFAULT_TURN_IDLE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub enabled: bool,
    pub allowed_roots: Vec<PathBuf>,
    pub restricted_paths: RestrictedPaths,
    pub user_space: UserSpacePolicy,
    pub network: NetworkPolicy,
    pub secrets: SecretsPolicy,
    pub provenance: ProvenancePolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_roots: Vec::new(),
            restricted_paths: RestrictedPaths::default(),
            user_space: UserSpacePolicy::default(),
            network: NetworkPolicy::default(),
            secrets: SecretsPolicy::default(),
            provenance: ProvenancePolicy::default(),
        }
    }
}

/// Loads and caches policy snapshots. One `PolicyStore` is owned by an
/// `Engine` for the lifetime of the process; there is no process-wide
/// singleton.
pub struct PolicyStore {
    path: PathBuf,
}

impl PolicyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `~/.openclaw/policy.json`, honouring `$HOME`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".openclaw")
            .join("policy.json")
    }

    pub fn with_default_path() -> Self {
        Self::new(Self::default_path())
    }

    /// Loads the policy document, returning defaults when absent or
    /// malformed. Never panics, never returns an error: this is the one
    /// load path every other component can assume always succeeds.
    pub fn load(&self) -> Policy {
        self.load_with_overrides(&[])
    }

    /// Like [`Self::load`], but applies `-c key.path=value` style overrides
    /// (dotted key into the raw JSON document, value parsed as JSON when
    /// possible, else kept as a string) before normalization, mirroring the
    /// teacher's `-c` config-override flag.
    pub fn load_with_overrides(&self, overrides: &[(String, String)]) -> Policy {
        let mut value = self.read_raw_value().unwrap_or_else(|| Value::Object(Default::default()));
        for (key, raw) in overrides {
            apply_override(&mut value, key, raw);
        }
        normalize(&value)
    }

    fn read_raw_value(&self) -> Option<Value> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "policy.json not found, using defaults");
                return None;
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to read policy.json, using defaults");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "policy.json is not valid json, using defaults");
                None
            }
        }
    }

    /// Re-reads the policy file. A plain idempotent function rather than a
    /// cached singleton: reloading just means calling it again.
    pub fn reload(&self) -> Policy {
        self.load()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn get<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    v.as_object().and_then(|o| o.get(key))
}

fn get_bool(v: &Value, key: &str, default: bool) -> bool {
    get(v, key).and_then(Value::as_bool).unwrap_or(default)
}

fn get_u64(v: &Value, key: &str, default: u64) -> u64 {
    get(v, key).and_then(Value::as_u64).unwrap_or(default)
}

fn get_f64(v: &Value, key: &str, default: f64) -> f64 {
    get(v, key).and_then(Value::as_f64).unwrap_or(default)
}

fn get_usize(v: &Value, key: &str, default: usize) -> usize {
    get(v, key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn get_str_vec(v: &Value, key: &str, default: Vec<String>) -> Vec<String> {
    match get(v, key).and_then(Value::as_array) {
        Some(arr) => {
            let out: Vec<String> = arr
                .iter()
                .filter_map(|e| e.as_str().map(str::to_string))
                .collect();
            if out.len() == arr.len() { out } else { default }
        }
        None => default,
    }
}

fn get_path_vec(v: &Value, key: &str, default: Vec<PathBuf>) -> Vec<PathBuf> {
    match get(v, key).and_then(Value::as_array) {
        Some(arr) => {
            let out: Vec<PathBuf> = arr
                .iter()
                .filter_map(|e| e.as_str().map(PathBuf::from))
                .collect();
            if out.len() == arr.len() { out } else { default }
        }
        None => default,
    }
}

/// Sets `value` at a dotted `key` path (creating intermediate objects as
/// needed), parsing `raw` as JSON when it looks like one, else storing it
/// as a plain string.
fn apply_override(value: &mut Value, key: &str, raw: &str) {
    let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let mut cursor = value;
    let mut segments = key.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !cursor.is_object() {
            *cursor = Value::Object(Default::default());
        }
        let Value::Object(object) = cursor else {
            return;
        };
        if segments.peek().is_none() {
            object.insert(segment.to_string(), parsed);
            return;
        }
        cursor = object.entry(segment.to_string()).or_insert_with(|| Value::Object(Default::default()));
    }
}

fn normalize(v: &Value) -> Policy {
    let version_ok = get(v, "version").and_then(Value::as_u64).map(|n| n == 1).unwrap_or(true);
    if !version_ok {
        tracing::warn!("policy.json has an unrecognised version, using defaults");
        return Policy::default();
    }

    let defaults = Policy::default();

    let allowed_roots = get_path_vec(v, "allowedRoots", defaults.allowed_roots.clone());

    let restricted_paths = get(v, "restrictedPaths")
        .map(|rp| RestrictedPaths {
            system_critical: get_path_vec(
                rp,
                "systemCritical",
                defaults.restricted_paths.system_critical.clone(),
            ),
        })
        .unwrap_or(defaults.restricted_paths.clone());

    let user_space = get(v, "userSpace")
        .map(|us| UserSpacePolicy {
            deny_on_any_access: get_str_vec(
                us,
                "denyOnAnyAccess",
                defaults.user_space.deny_on_any_access.clone(),
            ),
        })
        .unwrap_or(defaults.user_space.clone());

    let network = get(v, "network")
        .map(|n| NetworkPolicy {
            allowlist: get(n, "allowlist")
                .and_then(Value::as_object)
                .map(|obj| {
                    obj.iter()
                        .filter_map(|(k, v)| {
                            v.as_array().map(|arr| {
                                (
                                    k.clone(),
                                    arr.iter()
                                        .filter_map(|e| e.as_str().map(str::to_string))
                                        .collect(),
                                )
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .unwrap_or_default();

    let secrets = get(v, "secrets")
        .map(|s| SecretsPolicy {
            enabled: get_bool(s, "enabled", defaults.secrets.enabled),
            min_length: get_usize(s, "minLength", defaults.secrets.min_length),
            entropy_threshold: get_f64(s, "entropyThreshold", defaults.secrets.entropy_threshold),
            exceptions: get(s, "exceptions")
                .map(|ex| SecretExceptions {
                    tools: get_str_vec(ex, "tools", defaults.secrets.exceptions.tools.clone()),
                    fields: get_str_vec(
                        ex,
                        "fields",
                        defaults.secrets.exceptions.fields.clone(),
                    ),
                })
                .unwrap_or(defaults.secrets.exceptions.clone()),
        })
        .unwrap_or(defaults.secrets.clone());

    let provenance = get(v, "provenance")
        .map(|p| {
            let on_violation = match get(p, "onViolation").and_then(Value::as_str) {
                Some("confirm") => Decision::Confirm,
                Some("allow") => Decision::Allow,
                _ => Decision::Deny,
            };
            ProvenancePolicy {
                enabled: get_bool(p, "enabled", defaults.provenance.enabled),
                current_turn_only: get_bool(
                    p,
                    "currentTurnOnly",
                    defaults.provenance.current_turn_only,
                ),
                forbid_non_user_data: get_bool(
                    p,
                    "forbidNonUserData",
                    defaults.provenance.forbid_non_user_data,
                ),
                require_clean_for_high_risk: get_bool(
                    p,
                    "requireCleanForHighRisk",
                    defaults.provenance.require_clean_for_high_risk,
                ),
                on_violation,
                high_risk_tools: get_str_vec(
                    p,
                    "highRiskTools",
                    defaults.provenance.high_risk_tools.clone(),
                ),
                trusted_observation_tools: get_str_vec(
                    p,
                    "trustedObservationTools",
                    defaults.provenance.trusted_observation_tools.clone(),
                ),
                file_write_tools: get_str_vec(
                    p,
                    "fileWriteTools",
                    defaults.provenance.file_write_tools.clone(),
                ),
                file_read_tools: get_str_vec(
                    p,
                    "fileReadTools",
                    defaults.provenance.file_read_tools.clone(),
                ),
                max_stored_value_bytes: get_usize(
                    p,
                    "maxStoredValueBytes",
                    defaults.provenance.max_stored_value_bytes,
                ),
                turn_idle_ms: get_u64(p, "turnIdleMs", defaults.provenance.turn_idle_ms),
            }
        })
        .unwrap_or(defaults.provenance.clone());

    Policy {
        enabled: get_bool(v, "enabled", defaults.enabled),
        allowed_roots,
        restricted_paths,
        user_space,
        network,
        secrets,
        provenance,
    }
}
