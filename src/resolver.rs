//! Destination lookup against a caller-specified nameserver.
//!
//! A single A query is sent over UDP. If the answer comes back truncated the
//! same query is repeated over TCP. Nothing is cached: each session pays for
//! a fresh lookup.

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use hickory_proto::ProtoError;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout_at, Instant};

use crate::config::Nameserver;

/// Largest UDP response accepted (EDNS-sized).
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Error type for destination lookups.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid hostname '{host}': {source}")]
    InvalidName { host: String, source: ProtoError },

    #[error("dns: {0}")]
    Proto(#[from] ProtoError),

    #[error("lookup via {server}: i/o timeout")]
    Timeout { server: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("no results from resolver")]
    NoResults,

    #[error("no A records found for destination")]
    NoARecords,
}

/// Result type for destination lookups.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Looks up A records on one fixed nameserver.
#[derive(Debug, Clone)]
pub struct Resolver {
    nameserver: Nameserver,
    timeout: Duration,
}

impl Resolver {
    pub fn new(nameserver: Nameserver, timeout: Duration) -> Self {
        Self {
            nameserver,
            timeout,
        }
    }

    /// Returns the first A record the nameserver reports for `host`.
    pub async fn resolve(&self, host: &str) -> ResolveResult<Ipv4Addr> {
        let server = self.server_addr().await?;
        let (id, query) = build_query(host)?;

        let mut response = self.exchange_udp(server, id, &query).await?;
        if response.truncated() {
            tracing::debug!(%server, host, "truncated UDP answer, retrying over TCP");
            response = self.exchange_tcp(server, id, &query).await?;
        }

        let ip = first_a_record(&response)?;
        tracing::debug!(%server, host, %ip, "destination resolved");
        Ok(ip)
    }

    async fn server_addr(&self) -> ResolveResult<SocketAddr> {
        let deadline = Instant::now() + self.timeout;
        let addrs = timeout_at(deadline, self.nameserver.socket_addrs())
            .await
            .map_err(|_| self.timed_out())??;

        addrs.into_iter().next().ok_or_else(|| {
            ResolveError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for nameserver {}", self.nameserver),
            ))
        })
    }

    async fn exchange_udp(
        &self,
        server: SocketAddr,
        id: u16,
        query: &[u8],
    ) -> ResolveResult<Message> {
        let deadline = Instant::now() + self.timeout;
        let bind_addr: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        timeout_at(deadline, socket.send(query))
            .await
            .map_err(|_| self.timed_out())??;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let n = timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| self.timed_out())??;

            let response = Message::from_vec(&buf[..n])?;
            if response.id() == id {
                return Ok(response);
            }
            tracing::debug!(
                %server,
                expected = id,
                got = response.id(),
                "ignoring answer with mismatched id"
            );
        }
    }

    async fn exchange_tcp(
        &self,
        server: SocketAddr,
        id: u16,
        query: &[u8],
    ) -> ResolveResult<Message> {
        let deadline = Instant::now() + self.timeout;
        let exchange = async {
            let mut stream = TcpStream::connect(server).await?;
            let len = u16::try_from(query.len()).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "query too large")
            })?;

            let mut framed = Vec::with_capacity(query.len() + 2);
            framed.extend_from_slice(&len.to_be_bytes());
            framed.extend_from_slice(query);
            stream.write_all(&framed).await?;

            let len = stream.read_u16().await? as usize;
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let buf = timeout_at(deadline, exchange)
            .await
            .map_err(|_| self.timed_out())??;

        let response = Message::from_vec(&buf)?;
        if response.id() != id {
            return Err(ResolveError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("answer id {} does not match query id {}", response.id(), id),
            )));
        }
        Ok(response)
    }

    fn timed_out(&self) -> ResolveError {
        ResolveError::Timeout {
            server: self.nameserver.to_string(),
        }
    }
}

/// Builds a recursive A query for `host` and returns its id with the wire bytes.
fn build_query(host: &str) -> ResolveResult<(u16, Vec<u8>)> {
    let mut name = Name::from_ascii(host).map_err(|source| ResolveError::InvalidName {
        host: host.to_string(),
        source,
    })?;
    name.set_fqdn(true);

    let id = fastrand::u16(..);
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, RecordType::A));

    let bytes = BinEncodable::to_bytes(&message)?;
    Ok((id, bytes))
}

/// Picks the first A answer.
fn first_a_record(response: &Message) -> ResolveResult<Ipv4Addr> {
    if response.answers().is_empty() {
        return Err(ResolveError::NoResults);
    }

    response
        .answers()
        .iter()
        .find_map(|record| match record.data() {
            RData::A(a) => Some(a.0),
            _ => None,
        })
        .ok_or(ResolveError::NoARecords)
}
