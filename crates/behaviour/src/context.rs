//! What a running behaviour sees of the world.

use chrono::Utc;
use serde_json::Value;
use spindle_core::error::{KnowledgeError, TransportError};
use spindle_core::event::{BehaviourEvent, EventBus};
use spindle_core::{Jid, KnowledgeStore, Message, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::handle::BehaviourHandle;
use crate::queue::MessageQueue;
use crate::runtime::ExecutionContext;

/// The owning agent's collaborators, as seen by its behaviours.
///
/// Holds shared handles to the agent's parts rather than to the agent
/// itself, so behaviours never keep their agent alive.
#[derive(Clone)]
pub struct AgentLink {
    jid: Jid,
    knowledge: Arc<dyn KnowledgeStore>,
    stream: Arc<dyn Transport>,
    events: Arc<EventBus>,
}

impl AgentLink {
    pub fn new(jid: Jid, knowledge: Arc<dyn KnowledgeStore>, stream: Arc<dyn Transport>) -> Self {
        Self {
            jid,
            knowledge,
            stream,
            events: Arc::new(EventBus::default()),
        }
    }

    /// Publish lifecycle events on an existing bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeStore> {
        &self.knowledge
    }

    pub fn stream(&self) -> &Arc<dyn Transport> {
        &self.stream
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

/// Passed to every hook of a running behaviour.
pub struct BehaviourContext {
    handle: BehaviourHandle,
    queue: MessageQueue,
    agent: AgentLink,
    context: ExecutionContext,
}

impl BehaviourContext {
    pub(crate) fn new(
        handle: BehaviourHandle,
        queue: MessageQueue,
        agent: AgentLink,
        context: ExecutionContext,
    ) -> Self {
        Self {
            handle,
            queue,
            agent,
            context,
        }
    }

    pub fn handle(&self) -> &BehaviourHandle {
        &self.handle
    }

    pub fn agent(&self) -> &AgentLink {
        &self.agent
    }

    /// The owning agent's address.
    pub fn jid(&self) -> &Jid {
        &self.agent.jid
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn kill(&self) {
        self.handle.kill();
    }

    pub fn is_killed(&self) -> bool {
        self.handle.is_killed()
    }

    /// Send a message through the agent's outbound stream.
    ///
    /// A message without a sender gets the agent's jid written into it first;
    /// the caller sees that change. Transport failures are returned as is.
    pub async fn send(&self, message: &mut Message) -> Result<(), TransportError> {
        if message.sender.is_none() {
            message.sender = Some(self.agent.jid.clone());
            debug!(
                behaviour = %self.handle.name(),
                message_id = %message.id,
                "Adding agent's jid as sender to message"
            );
        }
        let stanza = message.prepare()?;
        self.agent.stream.send(stanza).await?;

        self.agent.events.publish(BehaviourEvent::MessageSent {
            agent: self.agent.jid.to_string(),
            behaviour: self.handle.name().to_string(),
            message_id: message.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Take the next message from this behaviour's inbox.
    ///
    /// `None` (or a zero duration) returns immediately; otherwise waits up to
    /// `timeout`. Returns `None` when nothing arrived.
    pub async fn receive(&mut self, timeout: Option<Duration>) -> Option<Message> {
        let msg = self.queue.receive(timeout).await;
        if msg.is_none()
            && let Some(t) = timeout.filter(|t| !t.is_zero())
        {
            debug!(behaviour = %self.handle.name(), timeout = ?t, "Receive timed out");
        }
        msg
    }

    /// Read an item from the agent's knowledge store.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, KnowledgeError> {
        self.agent.knowledge.get(key).await
    }

    /// Write an item to the agent's knowledge store.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), KnowledgeError> {
        self.agent.knowledge.set(key, value).await
    }
}
