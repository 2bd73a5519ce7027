//! The agent and its dispatch router.

use chrono::Utc;
use serde_json::Value;
use spindle_behaviour::{AgentLink, Behaviour, BehaviourHandle, Bound, ExecutionContext, ExitReason};
use spindle_config::{AppConfig, ConfigError};
use spindle_core::error::{BehaviourError, KnowledgeError};
use spindle_core::event::{BehaviourEvent, EventBus};
use spindle_core::{InMemoryKnowledge, Jid, KnowledgeStore, Message, Stanza, Template, Transport};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Composition root for a set of behaviours sharing one identity.
pub struct Agent {
    jid: Jid,
    knowledge: Arc<dyn KnowledgeStore>,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    context: ExecutionContext,
    behaviours: Mutex<Vec<BehaviourHandle>>,
}

impl Agent {
    /// Create an agent whose behaviours run on `context` and send through `transport`.
    ///
    /// Starts with an in-memory knowledge store and a private event bus.
    pub fn new(jid: Jid, transport: Arc<dyn Transport>, context: ExecutionContext) -> Self {
        Self {
            jid,
            knowledge: Arc::new(InMemoryKnowledge::new()),
            transport,
            events: Arc::new(EventBus::default()),
            context,
            behaviours: Mutex::new(Vec::new()),
        }
    }

    /// Create an agent from the `[agent]` section of the configuration.
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        context: ExecutionContext,
    ) -> Result<Self, ConfigError> {
        let jid = config.agent.jid()?;
        Ok(Self::new(jid, transport, context)
            .with_event_bus(Arc::new(EventBus::new(config.agent.event_capacity))))
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// What behaviours of this agent see of it.
    pub fn link(&self) -> AgentLink {
        AgentLink::new(self.jid.clone(), self.knowledge.clone(), self.transport.clone())
            .with_events(self.events.clone())
    }

    /// Bind `behaviour` to this agent without starting it.
    ///
    /// The result can be given a template or have messages enqueued before
    /// it is handed to [`Agent::add_bound`].
    pub fn bind(&self, behaviour: impl Behaviour) -> Bound {
        Bound::attach(behaviour, &self.context, self.link())
    }

    /// Bind and start `behaviour`, optionally restricted to messages matching `template`.
    pub fn add_behaviour(
        &self,
        behaviour: impl Behaviour,
        template: Option<Arc<dyn Template>>,
    ) -> BehaviourHandle {
        let mut bound = self.bind(behaviour);
        if let Some(template) = template {
            bound = bound.with_shared_template(template);
        }
        self.add_bound(bound)
    }

    /// Start an already bound behaviour and route messages to it.
    pub fn add_bound(&self, bound: Bound) -> BehaviourHandle {
        let handle = bound.start();
        info!(agent = %self.jid, behaviour = %handle.name(), id = %handle.id(), "Added behaviour");
        self.lock().push(handle.clone());
        handle
    }

    /// Snapshot of the behaviours still held by this agent.
    ///
    /// Finished behaviours are released on the next dispatch or `prune`.
    pub fn behaviours(&self) -> Vec<BehaviourHandle> {
        self.lock().clone()
    }

    /// Forget finished behaviours. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        release_finished(&self.jid, &mut self.lock())
    }

    /// Hand `message` to every live behaviour whose template accepts it.
    ///
    /// Finished behaviours are released first. Each accepting behaviour gets
    /// its own copy, in the order behaviours were added. Returns how many
    /// accepted.
    pub fn dispatch(&self, message: Message) -> usize {
        let targets: Vec<BehaviourHandle> = {
            let mut behaviours = self.lock();
            release_finished(&self.jid, &mut behaviours);
            behaviours
                .iter()
                .filter(|b| b.matches(&message))
                .cloned()
                .collect()
        };

        let mut accepted = 0;
        for behaviour in targets {
            match behaviour.enqueue(message.clone()) {
                Ok(()) => {
                    debug!(
                        agent = %self.jid,
                        behaviour = %behaviour.name(),
                        message_id = %message.id,
                        "Message enqueued"
                    );
                    accepted += 1;
                }
                Err(e) => debug!(agent = %self.jid, error = %e, "Behaviour no longer accepts messages"),
            }
        }

        if accepted == 0 {
            warn!(agent = %self.jid, message = %message, "No behaviour accepted message");
        }
        self.events.publish(BehaviourEvent::MessageDispatched {
            agent: self.jid.to_string(),
            message_id: message.id.clone(),
            accepted_by: accepted,
            timestamp: Utc::now(),
        });
        accepted
    }

    /// Dispatch every stanza arriving on `inbound` until the stream closes.
    ///
    /// Returns the number of stanzas handled.
    pub async fn serve(&self, mut inbound: mpsc::Receiver<Stanza>) -> u64 {
        info!(agent = %self.jid, "Serving inbound stanzas");
        let mut handled = 0;
        while let Some(stanza) = inbound.recv().await {
            self.dispatch(Message::from(stanza));
            handled += 1;
        }
        info!(agent = %self.jid, handled, "Inbound stream closed");
        handled
    }

    /// Kill every behaviour and wait for all of them to finish.
    pub async fn stop(&self) -> Vec<Result<ExitReason, BehaviourError>> {
        let behaviours = self.behaviours();
        info!(agent = %self.jid, count = behaviours.len(), "Stopping agent");
        for behaviour in &behaviours {
            behaviour.kill();
        }
        futures::future::join_all(behaviours.iter().map(|b| b.join())).await
    }

    /// Read from the agent's knowledge store.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, KnowledgeError> {
        self.knowledge.get(key).await
    }

    /// Write to the agent's knowledge store.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), KnowledgeError> {
        self.knowledge.set(key, value).await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BehaviourHandle>> {
        self.behaviours.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn release_finished(agent: &Jid, behaviours: &mut Vec<BehaviourHandle>) -> usize {
    let before = behaviours.len();
    behaviours.retain(|b| !b.is_done());
    let released = before - behaviours.len();
    if released > 0 {
        debug!(agent = %agent, released, "Released finished behaviours");
    }
    released
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("jid", &self.jid)
            .field("transport", &self.transport.name())
            .field("knowledge", &self.knowledge.name())
            .field("context", &self.context)
            .field("behaviours", &self.lock().len())
            .finish()
    }
}
