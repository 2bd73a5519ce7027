//! Domain event system — lifecycle and messaging events of behaviours.
//!
//! Events are published when a behaviour changes state or a message moves
//! through an agent. Other components subscribe to observe without coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BehaviourEvent {
    /// A behaviour entered its run loop
    Started {
        agent: String,
        behaviour: String,
        timestamp: DateTime<Utc>,
    },

    /// A behaviour's completion predicate held and `on_end` ran
    Finished {
        agent: String,
        behaviour: String,
        iterations: u64,
        timestamp: DateTime<Utc>,
    },

    /// A behaviour observed its kill flag and `on_end` ran
    Killed {
        agent: String,
        behaviour: String,
        iterations: u64,
        timestamp: DateTime<Utc>,
    },

    /// A hook or body returned an error
    Failed {
        agent: String,
        behaviour: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The dispatch router handled an inbound message
    MessageDispatched {
        agent: String,
        message_id: String,
        accepted_by: usize,
        timestamp: DateTime<Utc>,
    },

    /// A behaviour handed a message to the transport
    MessageSent {
        agent: String,
        behaviour: String,
        message_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for behaviour events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<BehaviourEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: BehaviourEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BehaviourEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
