//! Connection lifecycle management.

use std::sync::Arc;

use pairchat_core::{ConnectionEndpoint, ConnectionState, SendError, TransportEvent};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::WatchStream;

use crate::{
    Connector, EventSink,
    connector::TaggedEvent,
};

/// Live connection attempt.
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// Owns the single connection of a session.
///
/// State only changes through [`connect`](Self::connect),
/// [`close`](Self::close), and lifecycle events pulled by
/// [`next_event`](Self::next_event). Each connection attempt gets a new
/// generation number; events from any other generation are dropped, so a
/// closed socket can never deliver into a newer one.
///
/// Must be used from within a Tokio runtime.
pub struct TransportManager<C: Connector> {
    endpoint: ConnectionEndpoint,
    connector: Arc<C>,
    state_tx: watch::Sender<ConnectionState>,
    generation: u64,
    link: Option<Link>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
}

impl<C: Connector> TransportManager<C> {
    /// Create an idle manager for `endpoint`.
    #[must_use]
    pub fn new(endpoint: ConnectionEndpoint, connector: C) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            endpoint,
            connector: Arc::new(connector),
            state_tx,
            generation: 0,
            link: None,
            events_tx,
            events_rx,
        }
    }

    /// Endpoint this manager connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &ConnectionEndpoint {
        &self.endpoint
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Stream yielding the current state, then each change.
    #[must_use]
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.subscribe())
    }

    /// Start a connection attempt.
    ///
    /// Only acts from `Idle` or `Closed`; otherwise a no-op. Returns
    /// immediately in `Connecting`, progress arrives through
    /// [`next_event`](Self::next_event).
    pub fn connect(&mut self) {
        let state = self.state();
        if !state.can_connect() {
            tracing::debug!(%state, "connect ignored; connection already live");
            return;
        }

        self.generation += 1;
        let url = self.endpoint.ws_url();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        let connector = Arc::clone(&self.connector);

        tracing::info!(generation = self.generation, %url, "connecting");
        self.set_state(ConnectionState::Connecting);

        let task = tokio::spawn(async move {
            connector.run(url, outbound_rx, sink).await;
        });
        self.link = Some(Link { outbound, task });
    }

    /// Send one frame.
    ///
    /// # Errors
    /// Returns [`SendError::NotConnected`] unless the state is `Open`.
    /// Nothing is transmitted and the state is unchanged.
    pub fn send(&self, text: &str) -> Result<(), SendError> {
        if !self.state().is_open() {
            tracing::warn!(state = %self.state(), "send while not connected");
            return Err(SendError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(SendError::NotConnected)?;
        link.outbound.send(text.to_string()).map_err(|_| {
            tracing::warn!("connection task gone; send dropped");
            SendError::NotConnected
        })?;
        tracing::debug!(len = text.len(), "frame sent");
        Ok(())
    }

    /// Release the connection.
    ///
    /// Moves to `Closed` from any state. Frames not yet delivered from the
    /// released connection are never delivered. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.state() == ConnectionState::Closed && self.link.is_none() {
            return;
        }
        // Invalidate anything the old connection still has queued.
        self.generation += 1;
        if let Some(link) = self.link.take() {
            link.task.abort();
        }
        tracing::info!("connection closed locally");
        self.set_state(ConnectionState::Closed);
    }

    /// Wait for the next event from the current connection.
    ///
    /// Lifecycle events update the state before they are returned. Events
    /// from previous connections are skipped, as are frames arriving while
    /// the connection is not open.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            let tagged = self.events_rx.recv().await?;
            if let Some(event) = self.accept(tagged) {
                return Some(event);
            }
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        while let Ok(tagged) = self.events_rx.try_recv() {
            if let Some(event) = self.accept(tagged) {
                return Some(event);
            }
        }
        None
    }

    /// Filter one tagged event and apply its effect on the state.
    fn accept(&mut self, tagged: TaggedEvent) -> Option<TransportEvent> {
        let TaggedEvent { generation, event } = tagged;
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping stale event");
            return None;
        }

        if matches!(event, TransportEvent::FrameReceived(_)) {
            if !self.state().is_open() {
                tracing::warn!(state = %self.state(), "dropping frame outside open connection");
                return None;
            }
            return Some(event);
        }

        match &event {
            TransportEvent::Opened => tracing::info!(endpoint = %self.endpoint, "connected"),
            TransportEvent::Closed => tracing::info!("connection closed by peer"),
            TransportEvent::Errored(reason) => tracing::warn!(%reason, "connection failed"),
            TransportEvent::FrameReceived(_) => {}
        }

        let next = self.state().transition(&event);
        if next == ConnectionState::Closed {
            // The connector has finished; the socket is not reused and
            // anything it still emits is stale.
            self.generation += 1;
            self.link = None;
        }
        self.set_state(next);
        Some(event)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                tracing::debug!(from = %state, to = %next, "state change");
                *state = next;
                true
            }
        });
    }
}

impl<C: Connector> Drop for TransportManager<C> {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::{ChannelAcceptor, ChannelConnector};

    fn manager() -> (TransportManager<ChannelConnector>, ChannelAcceptor) {
        let (connector, acceptor) = ChannelConnector::new();
        let endpoint = ConnectionEndpoint::new("127.0.0.1", 3001, "/ws");
        (TransportManager::new(endpoint, connector), acceptor)
    }

    #[tokio::test]
    async fn test_connect_open_close() {
        let (mut manager, mut acceptor) = manager();
        assert_eq!(manager.state(), ConnectionState::Idle);

        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let link = acceptor.accept().await.unwrap();
        assert_eq!(link.url(), "ws://127.0.0.1:3001/ws");
        link.open().unwrap();

        assert_eq!(manager.next_event().await, Some(TransportEvent::Opened));
        assert_eq!(manager.state(), ConnectionState::Open);

        link.close().unwrap();
        assert_eq!(manager.next_event().await, Some(TransportEvent::Closed));
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_is_noop_while_live() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        manager.connect();

        let link = acceptor.accept().await.unwrap();
        link.open().unwrap();
        manager.next_event().await;
        manager.connect();

        assert!(acceptor.try_accept().is_none());
        assert_eq!(manager.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let (mut manager, mut acceptor) = manager();
        assert_eq!(manager.send("x"), Err(SendError::NotConnected));

        manager.connect();
        let mut link = acceptor.accept().await.unwrap();
        assert_err!(manager.send("x"));
        assert!(link.try_recv().is_none());

        link.open().unwrap();
        manager.next_event().await;
        assert_ok!(manager.send("hello"));
        assert_eq!(link.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_frames_delivered_verbatim_in_order() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        let link = acceptor.accept().await.unwrap();
        link.open().unwrap();
        for frame in ["[START]", "", "  a ", "[END]"] {
            link.send_frame(frame).unwrap();
        }

        assert_eq!(manager.next_event().await, Some(TransportEvent::Opened));
        for frame in ["[START]", "", "  a ", "[END]"] {
            assert_eq!(
                manager.next_event().await,
                Some(TransportEvent::FrameReceived(frame.to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        let mut link = acceptor.accept().await.unwrap();
        link.open().unwrap();
        manager.next_event().await;

        let mut status = manager.subscribe();
        status.borrow_and_update();

        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(status.has_changed().unwrap());
        status.borrow_and_update();

        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(!status.has_changed().unwrap());

        // The remote side observes the release.
        assert_eq!(link.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_from_idle() {
        let (mut manager, _acceptor) = manager();
        manager.close();
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_errored_attempt_closes() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        let link = acceptor.accept().await.unwrap();
        link.fail("connection refused").unwrap();

        assert_eq!(
            manager.next_event().await,
            Some(TransportEvent::Errored("connection refused".into()))
        );
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(manager.send("x"), Err(SendError::NotConnected));
    }

    #[tokio::test]
    async fn test_reconnect_drops_stale_events() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        let old = acceptor.accept().await.unwrap();
        old.open().unwrap();
        manager.next_event().await;
        manager.close();

        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        let new = acceptor.accept().await.unwrap();

        old.send_frame("stale").unwrap();
        old.close().unwrap();
        new.open().unwrap();
        new.send_frame("fresh").unwrap();

        assert_eq!(manager.next_event().await, Some(TransportEvent::Opened));
        assert_eq!(
            manager.next_event().await,
            Some(TransportEvent::FrameReceived("fresh".into()))
        );
        assert_eq!(manager.state(), ConnectionState::Open);
        assert!(manager.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_frames_after_peer_close_dropped() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        let link = acceptor.accept().await.unwrap();
        link.open().unwrap();
        link.send_frame("partial").unwrap();
        link.close().unwrap();
        link.send_frame(" after-close").unwrap();
        link.open().unwrap();

        assert_eq!(manager.next_event().await, Some(TransportEvent::Opened));
        assert_eq!(
            manager.next_event().await,
            Some(TransportEvent::FrameReceived("partial".into()))
        );
        assert_eq!(manager.next_event().await, Some(TransportEvent::Closed));
        assert!(manager.try_next_event().is_none());
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_frames_after_error_dropped() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        let link = acceptor.accept().await.unwrap();
        link.open().unwrap();
        link.fail("reset").unwrap();
        link.send_frame("late").unwrap();

        assert_eq!(manager.next_event().await, Some(TransportEvent::Opened));
        assert!(matches!(manager.next_event().await, Some(TransportEvent::Errored(_))));
        assert!(manager.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_frames_before_open_dropped() {
        let (mut manager, mut acceptor) = manager();
        manager.connect();
        let link = acceptor.accept().await.unwrap();
        link.send_frame("early").unwrap();
        link.open().unwrap();
        link.send_frame("on time").unwrap();

        assert_eq!(manager.next_event().await, Some(TransportEvent::Opened));
        assert_eq!(
            manager.next_event().await,
            Some(TransportEvent::FrameReceived("on time".into()))
        );
        assert!(manager.try_next_event().is_none());
    }

    #[tokio::test]
    async fn test_state_stream_reports_changes() {
        use futures::StreamExt;

        let (mut manager, mut acceptor) = manager();
        let mut states = manager.state_stream();
        assert_eq!(states.next().await, Some(ConnectionState::Idle));

        manager.connect();
        assert_eq!(states.next().await, Some(ConnectionState::Connecting));

        acceptor.accept().await.unwrap().open().unwrap();
        manager.next_event().await;
        assert_eq!(states.next().await, Some(ConnectionState::Open));
    }
}
