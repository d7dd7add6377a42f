//! Wire protocol for the streaming backend.
//!
//! Every inbound text frame is exactly one event. Two literal frames are
//! reserved as message boundaries; anything else is content.

use serde::{Deserialize, Serialize};

/// Frame opening a peer message.
pub const START_SENTINEL: &str = "[START]";

/// Frame closing a peer message.
pub const END_SENTINEL: &str = "[END]";

/// Event decoded from one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// The backend started a new generation.
    BeginPeerMessage,
    /// The backend finished the current generation.
    EndPeerMessage,
    /// Generated text, appended verbatim. May be empty.
    TextFragment(String),
}

impl ProtocolEvent {
    /// Decode a frame.
    ///
    /// Sentinels only match exactly; surrounding whitespace makes the frame
    /// an ordinary fragment.
    #[must_use]
    pub fn decode(frame: impl Into<String>) -> Self {
        let frame = frame.into();
        match frame.as_str() {
            START_SENTINEL => Self::BeginPeerMessage,
            END_SENTINEL => Self::EndPeerMessage,
            _ => Self::TextFragment(frame),
        }
    }
}

/// Lifecycle and data events produced by a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket opened.
    Opened,
    /// Socket closed by either side.
    Closed,
    /// Socket failed. The message is informational only.
    Errored(String),
    /// Text frame received.
    FrameReceived(String),
}

impl TransportEvent {
    /// Decode the frame carried by this event, if any.
    #[must_use]
    pub fn protocol_event(&self) -> Option<ProtocolEvent> {
        if let Self::FrameReceived(frame) = self {
            Some(ProtocolEvent::decode(frame.as_str()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(ProtocolEvent::decode("[START]"), ProtocolEvent::BeginPeerMessage);
        assert_eq!(ProtocolEvent::decode("[END]"), ProtocolEvent::EndPeerMessage);
    }

    #[test]
    fn test_near_sentinels_are_content() {
        for frame in [" [START]", "[START]\n", "[start]", "[END] ", "[START][END]"] {
            assert_eq!(
                ProtocolEvent::decode(frame),
                ProtocolEvent::TextFragment(frame.to_string()),
                "{frame:?} should be content"
            );
        }
    }

    #[test]
    fn test_empty_frame_is_fragment() {
        assert_eq!(
            ProtocolEvent::decode(""),
            ProtocolEvent::TextFragment(String::new())
        );
    }

    #[test]
    fn test_transport_event_decoding() {
        assert_eq!(TransportEvent::Opened.protocol_event(), None);
        assert_eq!(
            TransportEvent::FrameReceived("[END]".into()).protocol_event(),
            Some(ProtocolEvent::EndPeerMessage)
        );
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&ProtocolEvent::TextFragment("hi".into())).unwrap();
        assert_eq!(json, r#"{"type":"text_fragment","text":"hi"}"#);

        let parsed: ProtocolEvent = serde_json::from_str(r#"{"type":"begin_peer_message"}"#).unwrap();
        assert_eq!(parsed, ProtocolEvent::BeginPeerMessage);
    }
}
