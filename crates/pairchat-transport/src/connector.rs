//! Seam between the transport manager and a concrete socket.

use async_trait::async_trait;
use pairchat_core::TransportEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
///
/// These never cross into the session: a connector reports failures as
/// [`TransportEvent::Errored`] and the manager turns them into state.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Established connection failed.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Peer side of an in-process channel went away.
    #[error("Channel closed")]
    ChannelClosed,
}

/// Event tagged with the connection attempt that produced it.
#[derive(Debug)]
pub(crate) struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Where a connector reports lifecycle and inbound frames.
///
/// Each sink is bound to one connection attempt. Events sent through a sink
/// from an attempt the manager has since abandoned are discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub(crate) const fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Connection attempt this sink belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event.
    ///
    /// # Errors
    /// Returns error if the manager has been dropped.
    pub fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// Drives a single connection.
///
/// `run` opens a connection to `url`, reports [`TransportEvent::Opened`],
/// forwards every inbound text frame verbatim and in order, writes each
/// string received on `outbound` as one frame, and reports
/// [`TransportEvent::Closed`] or [`TransportEvent::Errored`] when the
/// connection ends. When `outbound` is closed the connector should close
/// the socket and return without reporting anything further.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Run one connection to completion.
    async fn run(&self, url: String, outbound: mpsc::UnboundedReceiver<String>, events: EventSink);
}
