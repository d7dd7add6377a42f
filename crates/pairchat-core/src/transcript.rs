//! Transcript reassembly from streamed protocol events.
//!
//! The assembler owns the transcript. Entries are only ever appended; a peer
//! entry grows while it is open and becomes immutable once sealed. User
//! entries are sealed from creation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolEvent;

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Authored locally.
    User,
    /// Streamed from the backend.
    Peer,
}

impl Role {
    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Peer => "LLM",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Who wrote it.
    pub sender: Role,
    /// Text so far.
    pub content: String,
}

impl TranscriptEntry {
    fn new(sender: Role, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
        }
    }
}

/// What an operation did to the transcript.
///
/// Lets a UI repaint only what changed, or coalesce several changes into one
/// repaint. Indices are positions in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum TranscriptChange {
    /// A new entry was added.
    Appended(usize),
    /// Text was appended to an open entry.
    Extended(usize),
    /// An open entry was sealed.
    Sealed(usize),
}

/// Folds protocol events into an ordered transcript.
///
/// Invariant: at most one entry is open, and if one is, it is the most
/// recently appended peer entry.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAssembler {
    entries: Vec<TranscriptEntry>,
    open: Option<usize>,
}

impl TranscriptAssembler {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded event.
    ///
    /// Malformed sequences are recovered from rather than rejected, so no
    /// inbound text is ever dropped:
    /// - a begin while an entry is open seals the open entry first;
    /// - an end with nothing open does nothing;
    /// - a fragment with nothing open opens a new peer entry.
    ///
    /// Returns `None` when the transcript did not change.
    pub fn apply(&mut self, event: ProtocolEvent) -> Option<TranscriptChange> {
        match event {
            ProtocolEvent::BeginPeerMessage => {
                if let Some(index) = self.open {
                    tracing::warn!(index, "begin received while a message is open; sealing it");
                }
                Some(self.open_peer_entry(String::new()))
            }
            ProtocolEvent::EndPeerMessage => {
                let Some(index) = self.open.take() else {
                    tracing::debug!("end received with no open message; ignoring");
                    return None;
                };
                Some(TranscriptChange::Sealed(index))
            }
            ProtocolEvent::TextFragment(text) => match self.open {
                Some(index) => {
                    self.entries[index].content.push_str(&text);
                    Some(TranscriptChange::Extended(index))
                }
                None => {
                    tracing::warn!(
                        len = text.len(),
                        "fragment received with no open message; opening one"
                    );
                    Some(self.open_peer_entry(text))
                }
            },
        }
    }

    /// Append a locally authored message.
    ///
    /// The entry is sealed immediately. Any open peer entry stays open, so a
    /// generation still streaming keeps receiving its fragments.
    pub fn push_user(&mut self, text: impl Into<String>) -> TranscriptChange {
        self.entries.push(TranscriptEntry::new(Role::User, text));
        TranscriptChange::Appended(self.entries.len() - 1)
    }

    fn open_peer_entry(&mut self, content: String) -> TranscriptChange {
        self.entries.push(TranscriptEntry::new(Role::Peer, content));
        let index = self.entries.len() - 1;
        self.open = Some(index);
        TranscriptChange::Appended(index)
    }

    /// Entries in display order.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Owned copy of the entries for a reader.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries.clone()
    }

    /// Index of the open entry, if any.
    #[must_use]
    pub const fn open_index(&self) -> Option<usize> {
        self.open
    }

    /// Whether the entry at `index` is still receiving fragments.
    #[must_use]
    pub fn is_open(&self, index: usize) -> bool {
        self.open == Some(index)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
