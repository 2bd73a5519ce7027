//! Shared test helpers for behaviour tests.

use async_trait::async_trait;
use spindle_core::error::TransportError;
use spindle_core::{InMemoryKnowledge, Jid, Stanza, Transport};
use std::sync::{Arc, Mutex};

use crate::context::AgentLink;

pub fn jid(s: &str) -> Jid {
    Jid::parse(s).unwrap()
}

/// Agent link with an in-memory store and a transport that records stanzas.
pub fn agent_link(agent: &str) -> AgentLink {
    agent_link_with(agent, Arc::new(RecordingTransport::default()))
}

pub fn agent_link_with(agent: &str, transport: Arc<dyn Transport>) -> AgentLink {
    AgentLink::new(jid(agent), Arc::new(InMemoryKnowledge::new()), transport)
}

/// Keeps every stanza it is asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Stanza>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Stanza> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, stanza: Stanza) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(stanza);
        Ok(())
    }
}

/// Fails every send.
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, stanza: Stanza) -> Result<(), TransportError> {
        Err(TransportError::DeliveryFailed {
            recipient: stanza.to.to_string(),
            reason: "link down".into(),
        })
    }
}
