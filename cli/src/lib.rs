mod cli;

pub use cli::{Cli, Command, PolicyCommand};

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use toolguard_core::{Engine, PolicyStore, SessionId};

pub fn run_main(cli: Cli) -> Result<()> {
    init_logging();

    let overrides = cli.parsed_overrides();
    let policy_path = resolve_policy_path(cli.policy, cli.home);

    match cli.command {
        Command::Check {
            session,
            tool,
            params_json,
            tool_call_id,
        } => run_check(policy_path, overrides, session, tool, params_json, tool_call_id),
        Command::Policy(PolicyCommand::Show) => run_policy_show(policy_path, overrides),
        Command::Policy(PolicyCommand::Validate { path }) => run_policy_show(Some(path), overrides),
    }
}

/// `--policy` wins outright; otherwise `--home` relocates the default
/// `<home>/.openclaw/policy.json` lookup.
fn resolve_policy_path(policy: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    policy.or_else(|| home.map(|h| h.join(".openclaw").join("policy.json")))
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn store_for(policy_path: Option<PathBuf>) -> PolicyStore {
    PolicyStore::new(policy_path.unwrap_or_else(PolicyStore::default_path))
}

fn run_check(
    policy_path: Option<PathBuf>,
    overrides: Vec<(String, String)>,
    session: String,
    tool: String,
    params_json: String,
    tool_call_id: Option<String>,
) -> Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(&params_json).context("params-json is not valid JSON")?;

    let policy = store_for(policy_path).load_with_overrides(&overrides);
    let engine = Engine::with_policy(policy);
    let session_id = SessionId::new(session);
    engine.begin_user_turn(&session_id, "");

    let result = engine.preflight_result(&session_id, &tool, &params, tool_call_id.as_deref());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_policy_show(policy_path: Option<PathBuf>, overrides: Vec<(String, String)>) -> Result<()> {
    let policy = store_for(policy_path).load_with_overrides(&overrides);
    println!("{}", serde_json::to_string_pretty(&policy)?);
    Ok(())
}
