//! Network-address helpers.
//!
//! Workers are stored as a host plus port pair, but callers refer to them
//! as `host:port` strings or full URLs. These helpers convert between the
//! forms, bracketing IPv6 literals the same way `SocketAddr` does.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static URL_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(http|https)://[a-zA-Z0-9\-._~:/?#\[\]@!$&'()*+,;=%]+$")
        .expect("static url regex")
});

/// Errors produced while parsing a worker address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrError {
    #[error("address is empty")]
    Empty,

    #[error("missing port in address: {0}")]
    MissingPort(String),

    #[error("invalid port in address: {0}")]
    InvalidPort(String),

    #[error("missing host in address: {0}")]
    MissingHost(String),
}

/// Join a host and port into `host:port`, bracketing IPv6 hosts.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Build the base HTTP URL for a worker.
pub fn url_from_host_port(host: &str, port: u16) -> String {
    format!("http://{}", join_host_port(host, port))
}

/// Split an address into host and port.
///
/// Accepts `host:port`, `[v6]:port`, or a URL such as
/// `http://host:port/path`. The scheme and any path are ignored.
pub fn split_host_port(raw: &str) -> Result<(String, u16), AddrError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AddrError::Empty);
    }

    let without_scheme = match raw.split_once("://") {
        Some((_, rest)) => rest,
        None => raw,
    };
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Drop userinfo if present.
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| AddrError::MissingPort(raw.to_string()))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| AddrError::MissingPort(raw.to_string()))?;
        (host, port)
    } else {
        authority
            .rsplit_once(':')
            .ok_or_else(|| AddrError::MissingPort(raw.to_string()))?
    };

    if host.is_empty() {
        return Err(AddrError::MissingHost(raw.to_string()));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| AddrError::InvalidPort(raw.to_string()))?;

    Ok((host.to_string(), port))
}

/// Check that a string is a plausible `http`/`https` URL with a host.
pub fn is_valid_url(raw: &str) -> bool {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return false;
    };
    if scheme != "http" && scheme != "https" {
        return false;
    }
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return false;
    }
    URL_CHARSET.is_match(raw)
}
