//! Per-connection relay session.
//!
//! The session flow:
//! 1. Pick the forward target: resolve the destination on the configured
//!    nameserver, or dial the hostname as-is when none is configured
//! 2. Dial the target over TCP within the configured timeout
//! 3. Upgrade the outbound connection to TLS (SNI = destination hostname)
//! 4. Log OPEN, pipe bytes until either side ends, log CLOSE
//!
//! A failure in steps 1-3 logs a single ERROR instead of OPEN/CLOSE and
//! closes the inbound connection.

use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::{Config, Destination};
use crate::event::EventLogger;
use crate::pipe::{pipe, PipeStats};
use crate::resolver::{ResolveError, Resolver};
use crate::tls::{TlsUpgrader, UpgradeError};

/// Where the outbound connection is dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardTarget {
    /// Address obtained from the configured nameserver.
    Resolved(SocketAddr),
    /// No nameserver configured: the hostname goes to the system resolver at dial time.
    Hostname(Destination),
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardTarget::Resolved(addr) => write!(f, "{}", addr),
            ForwardTarget::Hostname(dest) => write!(f, "{}", dest),
        }
    }
}

/// Reasons a session aborts before OPEN.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("dial tcp {target}: {source}")]
    Dial {
        target: String,
        source: std::io::Error,
    },

    #[error("dial tcp {target}: i/o timeout")]
    DialTimeout { target: String },

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// OPEN and CLOSE were logged.
    Closed {
        source: String,
        destination: String,
        stats: PipeStats,
    },
    /// A single ERROR was logged.
    Aborted(SessionError),
}

/// Shared, read-only state handed to every session.
#[derive(Debug, Clone)]
pub struct Relay {
    config: Arc<Config>,
    resolver: Option<Resolver>,
    upgrader: TlsUpgrader,
    logger: EventLogger,
}

impl Relay {
    pub fn new(config: Arc<Config>, upgrader: TlsUpgrader, logger: EventLogger) -> Self {
        let resolver = config
            .nameserver
            .clone()
            .map(|ns| Resolver::new(ns, config.timeout));

        Self {
            config,
            resolver,
            upgrader,
            logger,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    /// Runs one session to completion.
    pub async fn handle(&self, inbound: TcpStream, peer: SocketAddr) -> SessionOutcome {
        let source = peer.to_string();
        let host = self.config.destination.host.as_str();

        let target = match self.forward_target().await {
            Ok(target) => target,
            Err(e) => {
                self.logger.error(&source, host, &e);
                return SessionOutcome::Aborted(e.into());
            }
        };

        let outbound = match dial(&target, self.config.timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.logger.error(&source, &target.to_string(), &e);
                drop(inbound);
                return SessionOutcome::Aborted(e);
            }
        };

        let destination = outbound
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| target.to_string());

        let upgrade =
            tokio::time::timeout(self.config.timeout, self.upgrader.upgrade(host, outbound));
        let outbound = match upgrade.await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.logger.error(&source, &destination, &e);
                drop(inbound);
                return SessionOutcome::Aborted(e.into());
            }
            Err(_) => {
                let e = UpgradeError::Handshake(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "i/o timeout",
                ));
                self.logger.error(&source, &destination, &e);
                drop(inbound);
                return SessionOutcome::Aborted(e.into());
            }
        };

        self.logger.open(&source, &destination);
        let stats = pipe(inbound, outbound).await;
        tracing::debug!(
            %source,
            %destination,
            sent = stats.a_to_b,
            received = stats.b_to_a,
            "session finished"
        );
        self.logger.close(&source, &destination);

        SessionOutcome::Closed {
            source,
            destination,
            stats,
        }
    }

    async fn forward_target(&self) -> Result<ForwardTarget, ResolveError> {
        let dest = &self.config.destination;
        match &self.resolver {
            Some(resolver) => {
                let ip: Ipv4Addr = resolver.resolve(&dest.host).await?;
                Ok(ForwardTarget::Resolved(SocketAddr::from((ip, dest.port))))
            }
            None => Ok(ForwardTarget::Hostname(dest.clone())),
        }
    }
}

/// Opens the outbound TCP connection within `timeout`.
async fn dial(target: &ForwardTarget, timeout: Duration) -> Result<TcpStream, SessionError> {
    let connect = async {
        match target {
            ForwardTarget::Resolved(addr) => TcpStream::connect(*addr).await,
            ForwardTarget::Hostname(dest) => {
                TcpStream::connect((dest.host.as_str(), dest.port)).await
            }
        }
    };
    connect_within(target, timeout, connect).await
}

async fn connect_within<F>(
    target: &ForwardTarget,
    timeout: Duration,
    connect: F,
) -> Result<TcpStream, SessionError>
where
    F: Future<Output = std::io::Result<TcpStream>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            tracing::debug!(%target, "outbound connection established");
            Ok(stream)
        }
        Ok(Err(source)) => Err(SessionError::Dial {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(SessionError::DialTimeout {
            target: target.to_string(),
        }),
    }
}
