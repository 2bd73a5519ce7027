//! # Spindle Behaviour
//!
//! The behaviour engine: how a unit of agent work is bound to its owner,
//! scheduled on an execution context, fed messages and stopped.
//!
//! ```text
//! value ──attach──▶ Bound ──start──▶ Running ──done()/kill()──▶ Done
//! ```
//!
//! - [`Behaviour`] is the trait user code implements
//! - [`Bound`] attaches a behaviour to an agent and starts it
//! - [`BehaviourHandle`] is what everybody else holds: kill, enqueue, join
//! - [`ExecutionContext`] and [`AgentThread`] decide where behaviours run

pub mod behaviour;
pub mod context;
pub mod handle;
pub mod kinds;
pub mod lifecycle;
pub mod queue;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use behaviour::Behaviour;
pub use context::{AgentLink, BehaviourContext};
pub use handle::{BehaviourHandle, BehaviourId, BehaviourState, ExitReason};
pub use kinds::{Fsm, FsmState, OneShot, Periodic, Timeout};
pub use lifecycle::Bound;
pub use queue::{MessageQueue, QueueSender};
pub use runtime::{AgentThread, ExecutionContext};
