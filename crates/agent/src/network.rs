//! In-process network — delivers stanzas between agents in the same process.
//!
//! Each agent registers its jid and gets back the receiving end of its
//! inbox. Delivery routes on the bare jid, so `bob@localhost/phone` reaches
//! whoever registered `bob@localhost`.

use async_trait::async_trait;
use spindle_core::error::TransportError;
use spindle_core::{Jid, Stanza, Transport};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Per-agent inbox capacity. Senders wait when a recipient falls this far behind.
const INBOX_CAPACITY: usize = 256;

/// Routing table shared by every clone.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    routes: Arc<RwLock<HashMap<Jid, mpsc::Sender<Stanza>>>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the inbox for `jid`. Registering again replaces the old inbox.
    pub fn register(&self, jid: &Jid) -> mpsc::Receiver<Stanza> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let bare = jid.bare();
        info!(jid = %bare, "Registered on network");
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(bare, tx);
        rx
    }

    pub fn unregister(&self, jid: &Jid) -> bool {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&jid.bare())
            .is_some()
    }

    pub fn is_registered(&self, jid: &Jid) -> bool {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&jid.bare())
    }

    fn route(&self, to: &Jid) -> Option<mpsc::Sender<Stanza>> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&to.bare())
            .cloned()
    }
}

#[async_trait]
impl Transport for InMemoryNetwork {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn send(&self, stanza: Stanza) -> Result<(), TransportError> {
        let to = stanza.to.clone();
        let tx = self
            .route(&to)
            .ok_or_else(|| TransportError::UnknownRecipient(to.to_string()))?;

        debug!(to = %to, id = %stanza.id, "Delivering stanza");
        tx.send(stanza)
            .await
            .map_err(|_| TransportError::Closed(to.bare().to_string()))
    }
}
