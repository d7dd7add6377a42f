//! Backend endpoint resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::{ClientConfig, ClientError};

/// Host, port and path of the backend socket.
///
/// Resolved once when the client starts and never re-resolved during a
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionEndpoint {
    host: String,
    port: u16,
    path: String,
}

impl ConnectionEndpoint {
    /// Create an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            host: host.into(),
            port,
            path,
        }
    }

    /// Resolve the endpoint from the page origin.
    ///
    /// Only the host is taken from the origin. The port and path come from
    /// the configuration, since the backend socket lives on its own port.
    ///
    /// # Errors
    /// Returns error if the origin is not a URL or has no host.
    pub fn from_origin(origin: &str, config: &ClientConfig) -> Result<Self, ClientError> {
        let url = Url::parse(origin)
            .map_err(|e| ClientError::InvalidEndpoint(format!("{origin}: {e}")))?;
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => {
                return Err(ClientError::InvalidEndpoint(format!(
                    "{origin}: origin has no host"
                )));
            }
        };
        Ok(Self::new(host, config.backend_port, config.ws_path.clone()))
    }

    /// Host name or address, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Backend port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Socket path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` authority, bracketing IPv6 addresses.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Socket URL to connect to.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.authority(), self.path)
    }
}

impl fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ws_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_port_is_replaced() {
        let config = ClientConfig::default();
        let endpoint =
            ConnectionEndpoint::from_origin("http://192.168.1.5:3000/web/?interface=chat", &config)
                .unwrap();
        assert_eq!(endpoint.host(), "192.168.1.5");
        assert_eq!(endpoint.port(), 3001);
        assert_eq!(endpoint.ws_url(), "ws://192.168.1.5:3001/ws");
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let config = ClientConfig::default();
        let endpoint = ConnectionEndpoint::from_origin("http://[::1]:3000/", &config).unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.ws_url(), "ws://[::1]:3001/ws");
    }

    #[test]
    fn test_invalid_origin() {
        let config = ClientConfig::default();
        assert!(ConnectionEndpoint::from_origin("not a url", &config).is_err());
        assert!(ConnectionEndpoint::from_origin("data:text/plain,hi", &config).is_err());
    }

    #[test]
    fn test_path_gets_leading_slash() {
        let endpoint = ConnectionEndpoint::new("localhost", 9000, "ws");
        assert_eq!(endpoint.to_string(), "ws://localhost:9000/ws");
    }
}
