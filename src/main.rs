mod cmd;

use clap::Parser;
use cmd::Cli;
use tracing_subscriber::EnvFilter;

fn setup_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "error" => "error",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    if let Err(e) = cmd::run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
