//! Core building blocks for the pairchat streaming client.
//!
//! This crate is I/O free and provides:
//! - `ConnectionEndpoint` - Backend socket address resolved from the page origin
//! - `ProtocolEvent` / `TransportEvent` - Wire protocol decoding
//! - `ConnectionState` - Transport lifecycle state machine
//! - `TranscriptAssembler` - Reassembly of streamed fragments into messages
//! - `PairingLink` - One-shot handoff URL for a second device
//! - `ClientConfig` - Backend port and paths

pub mod config;
pub mod endpoint;
pub mod error;
pub mod pairing;
pub mod protocol;
pub mod state;
pub mod transcript;

pub use config::ClientConfig;
pub use endpoint::ConnectionEndpoint;
pub use error::{ClientError, SendError};
pub use pairing::PairingLink;
pub use protocol::{ProtocolEvent, TransportEvent};
pub use state::ConnectionState;
pub use transcript::{Role, TranscriptAssembler, TranscriptChange, TranscriptEntry};
