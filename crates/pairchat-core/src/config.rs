//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::ClientError;

/// Environment variable overriding the backend port.
pub const BACKEND_PORT_ENV: &str = "PAIRCHAT_BACKEND_PORT";

/// Default port of the backend socket endpoint.
pub const DEFAULT_BACKEND_PORT: u16 = 3001;

/// Client configuration.
///
/// Only the backend port is part of the external contract; the paths are
/// fixed by the backend and exposed here for tests and demos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Port the backend socket listens on.
    pub backend_port: u16,
    /// Path of the socket endpoint.
    pub ws_path: String,
    /// Path the web client is served from.
    pub web_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_port: DEFAULT_BACKEND_PORT,
            ws_path: "/ws".to_string(),
            web_path: "/web/".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// Returns error if `PAIRCHAT_BACKEND_PORT` is set but not a valid port.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_port_var(std::env::var(BACKEND_PORT_ENV).ok().as_deref())
    }

    fn from_port_var(value: Option<&str>) -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(raw) = value {
            config.backend_port = raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| {
                    ClientError::Config(format!("{BACKEND_PORT_ENV} is not a valid port: {raw}"))
                })?;
        }
        Ok(config)
    }
}
