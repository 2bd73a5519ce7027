//! Transport trait — the agent's outbound stream.
//!
//! A Transport carries prepared stanzas to other agents. How it does so
//! (XMPP session, in-process channels, ...) is the implementation's business;
//! the behaviour engine only calls `send` and propagates any failure.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::message::Stanza;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Deliver one stanza. No retry is performed by callers.
    async fn send(&self, stanza: Stanza) -> Result<(), TransportError>;
}
