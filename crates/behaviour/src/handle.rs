//! The shared, cloneable face of a bound behaviour.
//!
//! The running behaviour owns its body and its queue's read side; everybody
//! else (the agent, the dispatch router, other behaviours) talks to it through
//! a [`BehaviourHandle`]: kill it, match and enqueue messages, observe its
//! state and wait for it to finish.

use serde::{Deserialize, Serialize};
use spindle_core::error::BehaviourError;
use spindle_core::{Message, Template};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::queue::QueueSender;

/// Unique identifier for a behaviour instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BehaviourId(pub String);

impl BehaviourId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for BehaviourId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BehaviourId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle position of a bound behaviour.
///
/// A behaviour that was never attached is just a value implementing
/// `Behaviour` and has no handle, so there is no "unbound" state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviourState {
    /// Queue allocated, owner recorded, not yet submitted
    Bound,
    /// Submitted to the execution context
    Running,
    /// Terminal
    Done,
}

/// Why a behaviour reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// `done()` reported completion
    Completed,
    /// The kill flag was observed
    Killed,
    /// A hook or the body returned an error; `on_end` did not run
    Failed(String),
    /// The task panicked
    Panicked(String),
    /// The task was dropped before finishing (its event loop shut down)
    Cancelled,
}

pub(crate) struct Shared {
    id: BehaviourId,
    name: String,
    killed: AtomicBool,
    template: OnceLock<Arc<dyn Template>>,
    inbox: QueueSender,
    state: watch::Sender<BehaviourState>,
    exit: Mutex<Option<ExitReason>>,
}

/// Cloneable handle to a bound behaviour.
#[derive(Clone)]
pub struct BehaviourHandle {
    shared: Arc<Shared>,
}

impl BehaviourHandle {
    pub(crate) fn new(name: String, inbox: QueueSender) -> Self {
        let (state, _) = watch::channel(BehaviourState::Bound);
        Self {
            shared: Arc::new(Shared {
                id: BehaviourId::new(),
                name,
                killed: AtomicBool::new(false),
                template: OnceLock::new(),
                inbox,
                state,
                exit: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &BehaviourId {
        &self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Ask the behaviour to stop at its next iteration boundary.
    ///
    /// Idempotent. An in-flight body invocation is not interrupted.
    pub fn kill(&self) {
        if !self.shared.killed.swap(true, Ordering::SeqCst) {
            info!(behaviour = %self.shared.name, id = %self.shared.id, "Killing behaviour");
        }
    }

    /// Whether `kill()` was ever called. Never goes back to false.
    pub fn is_killed(&self) -> bool {
        self.shared.killed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BehaviourState {
        *self.shared.state.borrow()
    }

    pub fn is_done(&self) -> bool {
        self.state() == BehaviourState::Done
    }

    /// Why the behaviour finished, `None` while it hasn't.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.shared
            .exit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn template(&self) -> Option<&Arc<dyn Template>> {
        self.shared.template.get()
    }

    /// Whether this behaviour should receive `message`. No template matches everything.
    pub fn matches(&self, message: &Message) -> bool {
        match self.shared.template.get() {
            Some(template) => template.matches(message),
            None => true,
        }
    }

    /// Append a message to the behaviour's inbox.
    pub fn enqueue(&self, message: Message) -> Result<(), BehaviourError> {
        match self.shared.inbox.enqueue(message) {
            Ok(()) => Ok(()),
            Err(dropped) => {
                debug!(
                    behaviour = %self.shared.name,
                    message_id = %dropped.id,
                    "Inbox closed, message dropped"
                );
                Err(BehaviourError::Closed(self.shared.name.clone()))
            }
        }
    }

    /// Wait until the behaviour is `Done`.
    ///
    /// Completion and kill are `Ok`; failures, panics and cancellation are
    /// reported as errors.
    pub async fn join(&self) -> Result<ExitReason, BehaviourError> {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `self`, so this only ends once Done is seen
        let _ = rx.wait_for(|s| *s == BehaviourState::Done).await;

        match self.exit_reason() {
            Some(ExitReason::Completed) => Ok(ExitReason::Completed),
            Some(ExitReason::Killed) => Ok(ExitReason::Killed),
            Some(ExitReason::Failed(reason)) => Err(BehaviourError::Failed(reason)),
            Some(ExitReason::Panicked(reason)) => Err(BehaviourError::Panicked {
                name: self.shared.name.clone(),
                reason,
            }),
            Some(ExitReason::Cancelled) | None => {
                Err(BehaviourError::Cancelled(self.shared.name.clone()))
            }
        }
    }

    pub(crate) fn set_template(&self, template: Arc<dyn Template>) -> bool {
        self.shared.template.set(template).is_ok()
    }

    pub(crate) fn mark_running(&self) {
        self.shared.state.send_replace(BehaviourState::Running);
    }

    /// Record the exit reason and enter `Done`. Only the first call counts.
    pub(crate) fn finish(&self, reason: ExitReason) {
        {
            let mut exit = self.shared.exit.lock().unwrap_or_else(|e| e.into_inner());
            if exit.is_some() {
                return;
            }
            *exit = Some(reason);
        }
        self.shared.state.send_replace(BehaviourState::Done);
    }
}

impl std::fmt::Debug for BehaviourHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviourHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("killed", &self.is_killed())
            .finish()
    }
}
