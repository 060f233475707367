mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{check, setup};
use tracing_subscriber::EnvFilter;

/// Log to stderr; `RUST_LOG` wins over the verbosity count.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match &cli.command {
        Commands::Setup(args) => setup::run(&cli, args),
        Commands::Check(args) => check::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
