//! insight-rs command-line entry point.

use std::process::ExitCode;

use clap::Parser;
use insight_rs::cli::{Cli, execute};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // A missing .env file is not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                #[allow(clippy::print_stdout)]
                {
                    print!("{output}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    Ok(execute(cli)?)
}

/// Logs go to stderr so stdout stays parseable. `INSIGHT_LOG` takes an
/// `EnvFilter` directive; `--verbose` raises the default to debug.
fn init_tracing(verbose: bool) {
    let default = if verbose { "insight_rs=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("INSIGHT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
