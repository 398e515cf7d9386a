//! Acceptor: owns the listening socket and spawns one session per client.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::common::format_duration;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::EventLogger;
use crate::relay::Relay;
use crate::tls::TlsUpgrader;

/// Bound listener ready to accept connections.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    listen_addr: SocketAddr,
    relay: Relay,
}

impl Server {
    /// Binds `0.0.0.0:<listen_port>` for `relay`.
    pub async fn bind(relay: Relay) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], relay.config().listen_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::ListenFailed(format!("listen tcp {}: {}", addr, e)))?;
        let listen_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            listen_addr,
            relay,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Logs START and accepts connections forever.
    ///
    /// Accept errors are logged and never end the loop.
    pub async fn run(self) -> Result<()> {
        let listen = self.listen_addr.to_string();
        let destination = self.relay.config().destination.to_string();
        let logger = self.relay.logger().clone();

        logger.start(&listen, &destination);
        tracing::info!(%listen, %destination, "relay listening");

        loop {
            match self.listener.accept().await {
                Ok((inbound, peer)) => {
                    let relay = self.relay.clone();
                    tokio::spawn(async move {
                        tracing::debug!(%peer, "connection accepted");
                        relay.handle(inbound, peer).await;
                    });
                }
                Err(e) => accept_failed(&logger, &listen, &destination, &e),
            }
        }
    }
}

fn accept_failed(logger: &EventLogger, listen: &str, destination: &str, err: &std::io::Error) {
    tracing::warn!(error = %err, "failed to accept connection");
    logger.error(listen, destination, err);
}

/// Runs the relay described by `config` until the process exits.
pub async fn run_server(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let upgrader = TlsUpgrader::new().map_err(|e| Error::Config(e.to_string()))?;
    let logger = EventLogger::stdio(config.zone, config.verbose);

    tracing::debug!(
        listen_port = config.listen_port,
        destination = %config.destination,
        nameserver = ?config.nameserver.as_ref().map(|ns| ns.to_string()),
        timeout = %format_duration(config.timeout),
        zone = ?config.zone,
        verbose = config.verbose,
        "starting relay"
    );

    let server = Server::bind(Relay::new(config, upgrader, logger)).await?;
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Destination, DisplayZone};
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config(listen_port: u16) -> Config {
        Config {
            listen_port,
            destination: Destination::parse("example.com").unwrap(),
            verbose: false,
            nameserver: None,
            timeout: Duration::from_secs(1),
            zone: DisplayZone::Local,
        }
    }

    fn relay(config: Config) -> Relay {
        let logger = EventLogger::with_writers(
            config.zone,
            config.verbose,
            Box::new(std::io::sink()),
            Box::new(std::io::sink()),
        );
        Relay::new(Arc::new(config), TlsUpgrader::new().unwrap(), logger)
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind(relay(config(0))).await.unwrap();
        assert!(server.local_addr().ip().is_unspecified());
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_port_in_use_fails() {
        let first = Server::bind(relay(config(0))).await.unwrap();
        let port = first.local_addr().port();

        let err = Server::bind(relay(config(port))).await.unwrap_err();
        assert!(matches!(err, Error::ListenFailed(_)));
        assert!(err.to_string().starts_with(&format!("listen tcp 0.0.0.0:{}", port)));
    }

    #[test]
    fn test_accept_error_logs_error_event() {
        let out = Capture::default();
        let err = Capture::default();
        let zone = DisplayZone::parse(Some("UTC")).unwrap();
        let logger =
            EventLogger::with_writers(zone, true, Box::new(out.clone()), Box::new(err.clone()));

        let e = std::io::Error::other("too many open files");
        accept_failed(&logger, "0.0.0.0:8080", "example.com:443", &e);

        let out = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.trim_end().ends_with(" [!] 0.0.0.0:8080 => example.com:443"));

        let err = String::from_utf8(err.0.lock().unwrap().clone()).unwrap();
        assert!(err.contains("too many open files"));
    }
}
