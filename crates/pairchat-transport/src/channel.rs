//! In-process transport over channels.
//!
//! Useful for tests and for embedding a backend in the same process. Each
//! connection attempt hands a [`ChannelLink`] to the [`ChannelAcceptor`],
//! which plays the remote side.

use async_trait::async_trait;
use pairchat_core::TransportEvent;
use tokio::sync::mpsc;

use crate::{Connector, EventSink, TransportError};

/// Connector side of the channel pair.
pub struct ChannelConnector {
    links: mpsc::UnboundedSender<ChannelLink>,
}

impl ChannelConnector {
    /// Create a connector and the acceptor receiving its connections.
    #[must_use]
    pub fn new() -> (Self, ChannelAcceptor) {
        let (links, incoming) = mpsc::unbounded_channel();
        (Self { links }, ChannelAcceptor { incoming })
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn run(&self, url: String, outbound: mpsc::UnboundedReceiver<String>, events: EventSink) {
        let link = ChannelLink {
            url,
            outbound,
            events,
        };
        if self.links.send(link).is_err() {
            tracing::debug!("channel acceptor dropped; connection attempt stays pending");
        }
    }
}

/// Remote side of the channel pair.
pub struct ChannelAcceptor {
    incoming: mpsc::UnboundedReceiver<ChannelLink>,
}

impl ChannelAcceptor {
    /// Wait for the next connection attempt.
    pub async fn accept(&mut self) -> Option<ChannelLink> {
        self.incoming.recv().await
    }

    /// Take a pending connection attempt without waiting.
    pub fn try_accept(&mut self) -> Option<ChannelLink> {
        self.incoming.try_recv().ok()
    }
}

/// One in-process connection, seen from the remote side.
pub struct ChannelLink {
    url: String,
    outbound: mpsc::UnboundedReceiver<String>,
    events: EventSink,
}

impl ChannelLink {
    /// URL the client asked for.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Accept the connection.
    ///
    /// # Errors
    /// Returns error if the client side is gone.
    pub fn open(&self) -> Result<(), TransportError> {
        self.events.emit(TransportEvent::Opened)
    }

    /// Deliver one frame to the client.
    ///
    /// # Errors
    /// Returns error if the client side is gone.
    pub fn send_frame(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        self.events.emit(TransportEvent::FrameReceived(frame.into()))
    }

    /// Close the connection from the remote side.
    ///
    /// # Errors
    /// Returns error if the client side is gone.
    pub fn close(&self) -> Result<(), TransportError> {
        self.events.emit(TransportEvent::Closed)
    }

    /// Fail the connection.
    ///
    /// # Errors
    /// Returns error if the client side is gone.
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), TransportError> {
        self.events.emit(TransportEvent::Errored(reason.into()))
    }

    /// Receive the next frame the client sent.
    ///
    /// Returns `None` once the client has closed this connection.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Receive a frame the client sent, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }
}
