use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod dispatch;
mod error;
mod flows;
mod render;

use dispatch::run_cli;
use error::exit_code_for;
use render::{current_output_style, render_status_line};

const LOG_ENV: &str = "QZDEPLOY_LOG";

#[derive(Parser, Debug)]
#[command(name = "qzdeploy", version)]
#[command(
    about = "Install, configure and restart QZ Tray",
    long_about = "Install, configure and restart QZ Tray.\n\nTARGET is 'stable' (default), 'beta', 'unstable' or a release version such as 2.2.4. The word 'detect' locates an existing install instead, and 'help' prints this message."
)]
struct Cli {
    /// Release channel, version, `detect` or `help`.
    #[arg(value_name = "TARGET", default_value = "stable")]
    target: String,

    /// Configuration file to read instead of the per-user default.
    #[arg(long, env = "QZDEPLOY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds to wait for a running instance to quit before killing it.
    #[arg(long, value_name = "SECS")]
    max_wait: Option<u64>,

    /// Show diagnostic logs on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!(
                "{}",
                render_status_line(current_output_style(), "err", &format!("{err:#}"))
            );
            ExitCode::from(exit_code_for(&err))
        }
    }
}

#[cfg(test)]
mod tests;
