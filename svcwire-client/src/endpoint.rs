//! Endpoint addressing.
//!
//! An endpoint is written as a URI-like string:
//!
//! ```text
//! svcwire://host:port?login=true
//! ```
//!
//! The raw string is the identity of the endpoint: the connection pool
//! keys on it verbatim. The `login` attribute advertises whether the
//! remote side supports the login handshake.

use crate::error::ClientError;
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "svcwire://";

/// A parsed transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    raw: String,
    host: String,
    port: u16,
    login_supported: bool,
}

impl Endpoint {
    /// Parses an endpoint string of the form `svcwire://host:port[?login=...]`.
    pub fn parse(s: &str) -> Result<Self, ClientError> {
        let invalid = |reason: &str| ClientError::InvalidEndpoint(s.to_string(), reason.to_string());

        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected 'svcwire://' scheme"))?;

        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };

        let (host, port_str) = authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port: u16 = port_str.parse().map_err(|_| invalid("invalid port"))?;

        let mut login_supported = false;
        if let Some(query) = query {
            for attr in query.split('&').filter(|a| !a.is_empty()) {
                match attr.split_once('=') {
                    Some(("login", value)) => match value {
                        "true" => login_supported = true,
                        "false" => login_supported = false,
                        _ => return Err(invalid("login attribute must be true or false")),
                    },
                    _ => return Err(invalid("unknown endpoint attribute")),
                }
            }
        }

        Ok(Self {
            raw: s.to_string(),
            host: host.to_string(),
            port,
            login_supported,
        })
    }

    /// The verbatim endpoint string this was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `host:port` form suitable for `TcpStream::connect`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the remote side advertises the login handshake.
    pub fn login_supported(&self) -> bool {
        self.login_supported
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
