//! Error types shared across pairchat crates.

use thiserror::Error;

/// Client setup error.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Send error.
///
/// Sending never touches the connection state; the caller decides whether
/// to surface the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,
}
