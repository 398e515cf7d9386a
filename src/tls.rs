//! TLS upgrade of the outbound leg.
//!
//! This module provides:
//! - the default client configuration (ring provider, web PKI trust roots)
//! - [`TlsUpgrader`], which performs the client handshake with the
//!   destination hostname as SNI

use rustls::pki_types::{InvalidDnsNameError, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Error type for TLS upgrades.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("invalid server name '{name}': {source}")]
    InvalidServerName {
        name: String,
        source: InvalidDnsNameError,
    },

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("tls handshake: {0}")]
    Handshake(#[from] std::io::Error),
}

/// Result type for TLS upgrades.
pub type UpgradeResult<T> = std::result::Result<T, UpgradeError>;

/// Builds the default client configuration trusting the web PKI roots.
pub fn build_client_config() -> UpgradeResult<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    build_client_config_with_roots(roots)
}

/// Builds a client configuration trusting exactly `roots`.
pub fn build_client_config_with_roots(roots: RootCertStore) -> UpgradeResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| UpgradeError::TlsConfig(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// Wraps outbound TCP connections in a TLS client session.
#[derive(Clone)]
pub struct TlsUpgrader {
    connector: TlsConnector,
}

impl std::fmt::Debug for TlsUpgrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsUpgrader")
            .field("connector", &"<TlsConnector>")
            .finish()
    }
}

impl TlsUpgrader {
    /// Upgrader using the web PKI trust roots.
    pub fn new() -> UpgradeResult<Self> {
        Ok(Self::from_config(build_client_config()?))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            connector: TlsConnector::from(Arc::new(config)),
        }
    }

    /// Performs the client handshake over `stream` with `server_name` as SNI.
    pub async fn upgrade(
        &self,
        server_name: &str,
        stream: TcpStream,
    ) -> UpgradeResult<TlsStream<TcpStream>> {
        let name = ServerName::try_from(server_name.to_string()).map_err(|source| {
            UpgradeError::InvalidServerName {
                name: server_name.to_string(),
                source,
            }
        })?;

        let stream = self.connector.connect(name, stream).await?;
        tracing::debug!(server_name, "tls handshake complete");
        Ok(stream)
    }
}
