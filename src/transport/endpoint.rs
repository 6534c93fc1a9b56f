//! Agent endpoint parsing

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A parsed `host:port` Agent endpoint
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IPv4 address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Parse `host:port`
    ///
    /// The input must contain exactly one `:` separating a non-empty host from
    /// a numeric port. Bracketed IPv6 literals are not accepted.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            endpoint: input.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = input.split(':');
        let (host, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) => (host, port),
            (_, None, _) => return Err(invalid("expected host:port")),
            _ => return Err(invalid("expected exactly one ':'")),
        };

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(invalid("host contains whitespace"));
        }
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("port is not numeric"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| invalid("port is out of range"))?;
        if port == 0 {
            return Err(invalid("port must be between 1 and 65535"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// `https://host:port/`, the Agent's only request path
    pub fn url(&self) -> String {
        format!("https://{}:{}/", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where to deliver a document and which credentials to present
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTarget {
    /// Agent endpoint as `host:port`
    pub endpoint: String,
    /// Logical certificate bundle name
    pub cert_bundle: String,
}

impl ConnectionTarget {
    /// Create a target
    pub fn new(endpoint: impl Into<String>, cert_bundle: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            cert_bundle: cert_bundle.into(),
        }
    }

    /// Validate and parse the endpoint
    pub fn parse_endpoint(&self) -> Result<Endpoint, TransportError> {
        Endpoint::parse(&self.endpoint)
    }
}
