//! supgrade - plaintext TCP in, TLS out.

use clap::Parser;
use supgrade::{run_server, Cli, Config, Error, APP_NAME};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => die(&e),
    };
    tracing::debug!(?cli, "arguments");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => die(&Error::Io(e)),
    };

    if let Err(e) = runtime.block_on(run_server(config)) {
        die(&e);
    }
}

fn die(err: &Error) -> ! {
    eprintln!("{}: {}", APP_NAME, err);
    std::process::exit(err.exit_code().into());
}
