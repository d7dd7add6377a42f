//! Session context for one chat.

use pairchat_core::{
    ConnectionEndpoint, ConnectionState, SendError, TranscriptAssembler, TranscriptChange,
    TranscriptEntry, TransportEvent,
};
use pairchat_transport::{Connector, TransportManager};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Session identifier.
pub type SessionId = Uuid;

/// Capacity of the change feed before slow readers start lagging.
const CHANGE_CAPACITY: usize = 1024;

/// Read-only view of a session for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: SessionId,
    /// Connection state at snapshot time.
    pub state: ConnectionState,
    /// Transcript in display order.
    pub entries: Vec<TranscriptEntry>,
    /// Index of the entry still streaming, if any.
    pub open: Option<usize>,
}

/// One chat session.
///
/// Owns the transport and the transcript; readers only ever see snapshots
/// and change notifications. Events are applied strictly in the order the
/// transport delivers them.
pub struct ChatSession<C: Connector> {
    id: SessionId,
    transport: TransportManager<C>,
    transcript: TranscriptAssembler,
    changes: broadcast::Sender<TranscriptChange>,
}

impl<C: Connector> ChatSession<C> {
    /// Create an idle session.
    #[must_use]
    pub fn new(endpoint: ConnectionEndpoint, connector: C) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let id = Uuid::new_v4();
        tracing::debug!(%id, %endpoint, "session created");
        Self {
            id,
            transport: TransportManager::new(endpoint, connector),
            transcript: TranscriptAssembler::new(),
            changes,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Backend endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &ConnectionEndpoint {
        self.transport.endpoint()
    }

    /// Start connecting. See [`TransportManager::connect`].
    pub fn connect(&mut self) {
        self.transport.connect();
    }

    /// Release the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Receiver notified on every connection state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.subscribe()
    }

    /// Receiver for transcript changes.
    #[must_use]
    pub fn subscribe_changes(&self) -> broadcast::Receiver<TranscriptChange> {
        self.changes.subscribe()
    }

    /// Submit a user message.
    ///
    /// The message is sent as one frame and, once accepted by the
    /// transport, appended to the transcript right away. Empty input is
    /// ignored.
    ///
    /// # Errors
    /// Returns [`SendError::NotConnected`] if the connection is not open; the
    /// transcript is left unchanged.
    pub fn submit(&mut self, text: &str) -> Result<(), SendError> {
        if text.is_empty() {
            return Ok(());
        }
        self.transport.send(text)?;
        let change = self.transcript.push_user(text);
        self.notify(change);
        Ok(())
    }

    /// Wait for one transport event and apply it.
    ///
    /// Returns the event so the caller can react to lifecycle changes.
    pub async fn pump(&mut self) -> Option<TransportEvent> {
        let event = self.transport.next_event().await?;
        self.apply(&event);
        Some(event)
    }

    /// Apply one already-queued transport event, if any.
    pub fn try_pump(&mut self) -> Option<TransportEvent> {
        let event = self.transport.try_next_event()?;
        self.apply(&event);
        Some(event)
    }

    /// Apply events until the connection closes.
    ///
    /// Returns immediately if there is no live connection.
    pub async fn run_until_closed(&mut self) {
        while !self.state().can_connect() {
            match self.pump().await {
                Some(TransportEvent::Closed | TransportEvent::Errored(_)) | None => break,
                Some(_) => {}
            }
        }
    }

    fn apply(&mut self, event: &TransportEvent) {
        let Some(protocol_event) = event.protocol_event() else {
            return;
        };
        if let Some(change) = self.transcript.apply(protocol_event) {
            self.notify(change);
        }
    }

    fn notify(&self, change: TranscriptChange) {
        // No subscribers is fine; readers can always take a snapshot.
        let _ = self.changes.send(change);
    }

    /// The transcript.
    #[must_use]
    pub const fn transcript(&self) -> &TranscriptAssembler {
        &self.transcript
    }

    /// Snapshot for rendering.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state(),
            entries: self.transcript.snapshot(),
            open: self.transcript.open_index(),
        }
    }

    /// Snapshot as JSON.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }
}

#[cfg(feature = "websocket")]
impl ChatSession<pairchat_transport::WsConnector> {
    /// Create a WebSocket session for the backend next to `origin`.
    ///
    /// # Errors
    /// Returns error if the origin does not resolve to an endpoint.
    pub fn from_origin(
        origin: &str,
        config: &pairchat_core::ClientConfig,
    ) -> Result<Self, pairchat_core::ClientError> {
        let endpoint = ConnectionEndpoint::from_origin(origin, config)?;
        Ok(Self::new(endpoint, pairchat_transport::WsConnector::new()))
    }
}

impl<C: Connector> Drop for ChatSession<C> {
    fn drop(&mut self) {
        if self.state() != ConnectionState::Closed {
            tracing::debug!(id = %self.id, "session dropped; releasing connection");
            self.transport.close();
        }
    }
}
