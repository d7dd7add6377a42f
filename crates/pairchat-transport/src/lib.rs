//! Transport layer for the pairchat client.
//!
//! Provides:
//! - `TransportManager` - One connection per session, state signal, send/close
//! - `Connector` - Seam between the manager and a concrete socket
//! - In-process channel transport
//! - WebSocket transport (feature: websocket)

pub mod channel;
pub mod connector;
pub mod manager;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use channel::{ChannelAcceptor, ChannelConnector, ChannelLink};
pub use connector::{Connector, EventSink, TransportError};
pub use manager::TransportManager;

#[cfg(feature = "websocket")]
pub use websocket::WsConnector;
