//! Frozen relay configuration.
//!
//! [`Config`] is built once from the command line by [`Config::from_cli`] and
//! shared read-only (behind an `Arc`) with the acceptor and every session.

use chrono::{DateTime, Local, SecondsFormat, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::cli::Cli;
use crate::common::{join_host_port, split_host_port};
use crate::error::{Error, Result};

/// Port used when the destination omits one.
pub const DEFAULT_DESTINATION_PORT: u16 = 443;

/// Port used when the nameserver omits one.
pub const DEFAULT_NAMESERVER_PORT: u16 = 53;

/// Forwarding destination. `host` doubles as the TLS server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    /// Parses `host[:port]`.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::Config("expected destination".to_string()));
        }

        let (host, port) = split_host_port(input, DEFAULT_DESTINATION_PORT, "destination")?;
        if host.is_empty() {
            return Err(Error::Config(format!(
                "destination: missing host in '{}'",
                input
            )));
        }

        Ok(Self { host, port })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

/// DNS server used for custom destination lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nameserver {
    pub host: String,
    pub port: u16,
}

impl Nameserver {
    /// Parses `host[:port]`; the port defaults to 53.
    pub fn parse(input: &str) -> Result<Self> {
        let (host, port) = split_host_port(input, DEFAULT_NAMESERVER_PORT, "nameserver")?;
        if host.is_empty() {
            return Err(Error::Config(format!(
                "nameserver: missing host in '{}'",
                input
            )));
        }
        Ok(Self { host, port })
    }

    /// Resolves the nameserver itself to socket addresses.
    ///
    /// IP literals resolve without touching the system resolver.
    pub async fn socket_addrs(&self) -> std::io::Result<Vec<SocketAddr>> {
        if let Ok(ip) = self.host.parse::<std::net::IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, self.port)]);
        }
        Ok(tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .collect())
    }
}

impl fmt::Display for Nameserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

/// Time zone in which event timestamps are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    /// The host's local time zone.
    Local,
    /// A named IANA zone.
    Named(Tz),
}

impl DisplayZone {
    /// Parses an IANA zone name. `None` or an empty name selects local time.
    pub fn parse(name: Option<&str>) -> Result<Self> {
        match name {
            None | Some("") => Ok(DisplayZone::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(DisplayZone::Named)
                .map_err(|e| Error::Config(format!("invalid time zone: {}", e))),
        }
    }

    /// Renders `instant` as RFC 3339 at second precision.
    pub fn format(&self, instant: DateTime<Utc>) -> String {
        match self {
            DisplayZone::Local => instant
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            DisplayZone::Named(tz) => instant
                .with_timezone(tz)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Process-wide relay configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub destination: Destination,
    pub verbose: bool,
    pub nameserver: Option<Nameserver>,
    pub timeout: Duration,
    pub zone: DisplayZone,
}

impl Config {
    /// Validates command line arguments and freezes them into a config.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let destination = match cli.dest.as_deref() {
            None => return Err(Error::Config("expected destination".to_string())),
            Some(dest) => Destination::parse(dest)?,
        };

        let nameserver = match cli.nameserver.as_deref() {
            None | Some("") => None,
            Some(ns) => Some(Nameserver::parse(ns)?),
        };

        Ok(Self {
            listen_port: cli.port,
            destination,
            verbose: cli.verbose,
            nameserver,
            timeout: cli.timeout,
            zone: DisplayZone::parse(cli.zone.as_deref())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clap::Parser;

    fn config_from(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["supgrade"];
        argv.extend_from_slice(args);
        Config::from_cli(&Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_destination_defaults_to_443() {
        let dest = Destination::parse("example.com").unwrap();
        assert_eq!(dest.host, "example.com");
        assert_eq!(dest.port, 443);
        assert_eq!(dest.to_string(), "example.com:443");
    }

    #[test]
    fn test_destination_explicit_port() {
        let dest = Destination::parse("example.com:8443").unwrap();
        assert_eq!(dest.host, "example.com");
        assert_eq!(dest.port, 8443);
    }

    #[test]
    fn test_destination_empty_is_rejected() {
        let err = Destination::parse("").unwrap_err();
        assert_eq!(err.to_string(), "expected destination");
    }

    #[test]
    fn test_destination_missing_host_is_rejected() {
        assert!(Destination::parse(":443").is_err());
    }

    #[test]
    fn test_destination_ipv6_display() {
        let dest = Destination::parse("[::1]:8443").unwrap();
        assert_eq!(dest.host, "::1");
        assert_eq!(dest.to_string(), "[::1]:8443");
    }

    #[test]
    fn test_nameserver_defaults_to_53() {
        let ns = Nameserver::parse("8.8.8.8").unwrap();
        assert_eq!(ns.to_string(), "8.8.8.8:53");

        let ns = Nameserver::parse("127.0.0.1:5353").unwrap();
        assert_eq!(ns.port, 5353);
    }

    #[tokio::test]
    async fn test_nameserver_ip_literal_socket_addr() {
        let ns = Nameserver::parse("127.0.0.1:5353").unwrap();
        let addrs = ns.socket_addrs().await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:5353".parse().unwrap()]);
    }

    #[test]
    fn test_zone_named_formats_with_offset() {
        let zone = DisplayZone::parse(Some("Asia/Tokyo")).unwrap();
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(zone.format(instant), "2024-01-02T12:04:05+09:00");
    }

    #[test]
    fn test_zone_utc_uses_z_suffix() {
        let zone = DisplayZone::parse(Some("UTC")).unwrap();
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(zone.format(instant), "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_zone_unknown_is_rejected() {
        let err = DisplayZone::parse(Some("Mars/Olympus")).unwrap_err();
        assert!(err.to_string().starts_with("invalid time zone"));
    }

    #[test]
    fn test_zone_empty_is_local() {
        assert_eq!(DisplayZone::parse(None).unwrap(), DisplayZone::Local);
        assert_eq!(DisplayZone::parse(Some("")).unwrap(), DisplayZone::Local);
    }

    #[test]
    fn test_config_from_cli() {
        let config = config_from(&["-p", "9000", "-d", "target.example", "-n", "1.1.1.1"]).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.destination.to_string(), "target.example:443");
        assert_eq!(config.nameserver.unwrap().to_string(), "1.1.1.1:53");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(!config.verbose);
    }

    #[test]
    fn test_config_requires_destination() {
        let err = config_from(&[]).unwrap_err();
        assert_eq!(err.to_string(), "expected destination");

        assert!(config_from(&["-d", ""]).is_err());
    }

    #[test]
    fn test_config_empty_nameserver_disables_lookup() {
        let config = config_from(&["-d", "example.com", "-n", ""]).unwrap();
        assert!(config.nameserver.is_none());
    }
}
