//! Bootstrap script runner.
//!
//! Resolves the scripts named after the configured flag (default
//! `--scripts`) and runs them in order, stopping at the first failure:
//!
//! ```bash
//! bootstrap --config bootstrap.toml -- --scripts schema.toml seed.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use bootstrap::exit_codes;
use bootstrap::io::config::load_config;
use bootstrap::io::loader::FileLoader;
use bootstrap::{IdentifierSource, Outcome, Session, SessionConfig};
use clap::Parser;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "bootstrap",
    version,
    about = "Run bootstrap scripts in order, stopping at the first failure"
)]
struct Cli {
    /// Config file. Defaults apply when it does not exist.
    #[arg(long, default_value = "bootstrap.toml")]
    config: PathBuf,

    /// Override the directory used for the second resolution attempt.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Print each outcome as a JSON line.
    #[arg(long)]
    json: bool,

    /// Arguments scanned for the configured scripts flag (after `--`).
    #[arg(last = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() {
    bootstrap::logging::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::CONFIGURATION);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut cfg =
        load_config(&cli.config).with_context(|| format!("load {}", cli.config.display()))?;
    if let Some(base_dir) = cli.base_dir {
        cfg.base_dir = base_dir;
    }
    debug!(flag = %cfg.flag, base_dir = %cfg.base_dir.display(), "config loaded");

    let config = SessionConfig::from_config(&cfg, IdentifierSource::Args(cli.args));
    let mut session = Session::new(config, FileLoader);
    let json = cli.json;
    match session.run_with(|outcome| print_outcome(outcome, json)).await {
        Ok(count) => {
            info!(count, "bootstrap complete");
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("bootstrap failed: {err}");
            for diagnostic in session.errors() {
                eprintln!("- {diagnostic}");
            }
            Ok(exit_codes::for_error(&err))
        }
    }
}

fn print_outcome(outcome: &Outcome, json: bool) {
    if !json {
        println!("ok {}", outcome.script_name);
        return;
    }
    match serde_json::to_string(outcome) {
        Ok(line) => println!("{line}"),
        Err(err) => eprintln!("serialize outcome for {}: {err}", outcome.script_name),
    }
}
