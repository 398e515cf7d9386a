//! Common helpers shared by configuration parsing and the relay.

use std::time::Duration;

use crate::error::{Error, Result};

/// Buffer size for each copy direction.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Splits `host[:port]` into its parts, falling back to `default_port`.
///
/// Bracketed IPv6 literals (`[::1]:443`) are unwrapped. A bare IPv6 literal
/// without brackets is taken as a host with no port.
pub fn split_host_port(input: &str, default_port: u16, what: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(rest) = input.strip_prefix('[') {
        let close = rest
            .find(']')
            .ok_or_else(|| Error::Config(format!("{}: missing ']' in address '{}'", what, input)))?;
        let host = &rest[..close];
        let tail = &rest[close + 1..];
        let port = match tail {
            "" => None,
            _ => Some(tail.strip_prefix(':').ok_or_else(|| {
                Error::Config(format!("{}: unexpected '{}' after address", what, tail))
            })?),
        };
        (host, port)
    } else {
        match input.matches(':').count() {
            0 => (input, None),
            1 => {
                let colon = input.rfind(':').unwrap_or(input.len());
                (&input[..colon], Some(&input[colon + 1..]))
            }
            _ => (input, None),
        }
    };

    let port = match port {
        None | Some("") => default_port,
        Some(p) => p
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("{} port: {}", what, e)))?,
    };

    Ok((host.to_string(), port))
}

/// Joins a host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Formats a duration in a human-readable format.
pub fn format_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}
