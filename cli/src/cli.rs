use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Standalone gate for one-shot preflight checks and policy inspection,
/// for scripting and CI use against the same policy document an embedded
/// engine would load.
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Cli {
    /// Path to policy.json. Defaults to `~/.openclaw/policy.json`.
    #[arg(long, global = true)]
    pub policy: Option<PathBuf>,

    /// Override `~` for the default policy path (ignored if --policy is set).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Override a dotted policy field, e.g. `-c secrets.minLength=8`. May be
    /// repeated.
    #[arg(short = 'c', value_name = "KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    #[clap(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parses `-c key=value` flags into `(key, value)` pairs, skipping any
    /// malformed entry with a warning rather than failing the whole run.
    pub fn parsed_overrides(&self) -> Vec<(String, String)> {
        self.overrides
            .iter()
            .filter_map(|kv| match kv.split_once('=') {
                Some((k, v)) => Some((k.to_string(), v.to_string())),
                None => {
                    tracing::warn!(entry = %kv, "ignoring malformed -c override, expected key=value");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single pre-flight evaluation and print the decision as JSON.
    Check {
        #[arg(long)]
        session: String,
        #[arg(long)]
        tool: String,
        #[arg(long = "params-json")]
        params_json: String,
        #[arg(long = "tool-call-id")]
        tool_call_id: Option<String>,
    },

    /// Inspect the effective policy document.
    #[clap(subcommand)]
    Policy(PolicyCommand),
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    /// Load and normalize the configured policy file, printing the result.
    Show,

    /// Load and normalize a specific policy file, printing the result.
    Validate { path: PathBuf },
}
