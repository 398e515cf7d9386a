//! supgrade - Plaintext-to-TLS TCP relay.
//!
//! Accepts plaintext TCP connections and forwards each one to a fixed
//! destination over TLS, optionally resolving the destination on a
//! caller-specified nameserver.

pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod event;
pub mod pipe;
pub mod relay;
pub mod resolver;
pub mod server;
pub mod tls;

pub use cli::{Cli, APP_NAME, DEFAULT_LISTEN_PORT};
pub use common::{format_duration, join_host_port, split_host_port, READ_BUFFER_SIZE};
pub use config::{Config, Destination, DisplayZone, Nameserver};
pub use error::{Error, ExitCode, Result};
pub use event::{Event, EventKind, EventLogger};
pub use pipe::{pipe, PipeStats};
pub use relay::{ForwardTarget, Relay, SessionError, SessionOutcome};
pub use resolver::{ResolveError, ResolveResult, Resolver};
pub use server::{run_server, Server};
pub use tls::{
    build_client_config, build_client_config_with_roots, TlsUpgrader, UpgradeError, UpgradeResult,
};
