//! CLI definitions for supgrade.

use clap::{builder::PossibleValuesParser, Parser};
use std::time::Duration;

/// Program name used in fatal diagnostics.
pub const APP_NAME: &str = "supgrade";

/// Default listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 80;

/// Parse a duration from a human-readable string.
fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

/// Accepts plaintext TCP connections and forwards them to a TLS destination.
#[derive(Debug, Parser)]
#[command(name = APP_NAME)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on
    #[arg(short = 'p', default_value_t = DEFAULT_LISTEN_PORT)]
    pub port: u16,

    /// Forwarding destination (host[:port], port defaults to 443)
    #[arg(short = 'd')]
    pub dest: Option<String>,

    /// Verbose errors
    #[arg(short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// Nameserver to use for looking up destination (host[:port])
    #[arg(short = 'n')]
    pub nameserver: Option<String>,

    /// Timeout for network operations
    #[arg(short = 't', value_parser = parse_duration, default_value = "10s")]
    pub timeout: Duration,

    /// Time zone for which to display timestamps (IANA name, local if unset)
    #[arg(short = 'z')]
    pub zone: Option<String>,

    /// Diagnostic log level (debug|info|warn|error)
    #[arg(
        long,
        default_value = "warn",
        value_parser = PossibleValuesParser::new(["debug", "info", "warn", "error"])
    )]
    pub log_level: String,
}
