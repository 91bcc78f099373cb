//! dhua - donghua streaming from the terminal
//!
//! # Usage
//!
//! ```bash
//! dhua search "soul land"
//! dhua episodes https://luciferdonghua.in/anime/soul-land-2/
//! dhua play https://luciferdonghua.in/anime/soul-land-2/ --start 40
//! dhua cache list --json
//! ```

mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dhua::cli::{Cli, Command, ExitCode, Output};
use dhua::config::Config;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}

/// Log to stderr so stdout stays clean for command output.
/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "dhua=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    let config = match cli.config.as_deref() {
        Some(path) => {
            if !path.exists() {
                return output.error(
                    format!("Config file not found: {}", path.display()),
                    ExitCode::InvalidArgs,
                );
            }
            Config::load_from(path)
        }
        None => Config::load(),
    };

    match cli.command {
        Command::Search(cmd) => commands::search_cmd(cmd, &config, &output).await,
        Command::Episodes(cmd) => commands::episodes_cmd(cmd, &config, &output).await,
        Command::Resolve(cmd) => commands::resolve_cmd(cmd, &config, &output).await,
        Command::Play(cmd) => commands::play_cmd(cmd, &config, &output).await,
        Command::Cache(cmd) => commands::cache_cmd(cmd, &config, &output).await,
    }
}
