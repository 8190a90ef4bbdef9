use clap::Parser;
use toolguard_cli::{run_main, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_main(cli)
}
