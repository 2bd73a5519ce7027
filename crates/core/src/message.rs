//! Message and Stanza domain types.
//!
//! A `Message` is what behaviours build, match and receive. A `Stanza` is its
//! transport-ready form: behaviour calls `send` → `Message::prepare` → the
//! agent's `Transport` carries the stanza → the receiving agent turns it back
//! into a `Message` and dispatches it to its behaviours.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::TransportError;
use crate::jid::Jid;

/// A message exchanged between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Recipient address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Jid>,

    /// Sender address. Filled in with the agent's own jid at send time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Jid>,

    /// The text content
    #[serde(default)]
    pub body: String,

    /// Conversation thread this message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,

    /// Free-form metadata (performative, ontology, language, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Message {
    /// Create an empty message addressed to `to`.
    pub fn new(to: Jid) -> Self {
        Self {
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_sender(mut self, sender: Jid) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build a reply: recipient and sender swapped, thread and metadata kept.
    pub fn make_reply(&self) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            to: self.sender.clone(),
            sender: self.to.clone(),
            body: String::new(),
            thread: self.thread.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Convert into the transport-ready form.
    ///
    /// Fails with [`TransportError::NoRecipient`] when `to` is unset.
    pub fn prepare(&self) -> Result<Stanza, TransportError> {
        let to = self.to.clone().ok_or(TransportError::NoRecipient)?;
        Ok(Stanza {
            id: self.id.clone(),
            to,
            from: self.sender.clone(),
            body: self.body.clone(),
            thread: self.thread.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            to: None,
            sender: None,
            body: String::new(),
            thread: None,
            metadata: BTreeMap::new(),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let to = self.to.as_ref().map(Jid::as_str).unwrap_or("?");
        let from = self.sender.as_ref().map(Jid::as_str).unwrap_or("?");
        write!(f, "<message id={} from={} to={}>", self.id, from, to)
    }
}

/// Transport-ready representation of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stanza {
    pub id: String,
    pub to: Jid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Jid>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Stanza {
    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::InvalidStanza(e.to_string()))
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| TransportError::InvalidStanza(e.to_string()))
    }
}

impl From<Stanza> for Message {
    fn from(stanza: Stanza) -> Self {
        Message {
            id: stanza.id,
            to: Some(stanza.to),
            sender: stanza.from,
            body: stanza.body,
            thread: stanza.thread,
            metadata: stanza.metadata,
        }
    }
}
