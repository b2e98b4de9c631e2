use clap::Parser;
use mdboard::cli::commands::Cli;
use mdboard::cli::handlers;
use tracing_subscriber::EnvFilter;

/// Env var holding the log filter (e.g. `MDBOARD_LOG=mdboard=debug`)
const LOG_ENV: &str = "MDBOARD_LOG";

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = handlers::dispatch(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
