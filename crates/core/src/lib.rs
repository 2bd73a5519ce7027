//! # Spindle Core
//!
//! Domain types, traits, and error definitions for the Spindle multi-agent
//! behaviour engine. This crate has **no runtime of its own**. It defines the
//! domain model that the behaviour engine and the agent implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the behaviour engine is a trait here:
//! - [`Template`] decides which behaviour an inbound message goes to
//! - [`KnowledgeStore`] holds the state shared by an agent's behaviours
//! - [`Transport`] carries outbound stanzas to other agents
//!
//! Implementations can be swapped freely and mocked in tests.

pub mod error;
pub mod jid;
pub mod message;
pub mod template;
pub mod knowledge;
pub mod transport;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{BehaviourError, Error, JidError, KnowledgeError, Result, TransportError};
pub use jid::Jid;
pub use message::{Message, Stanza};
pub use template::{FnTemplate, MessageTemplate, Template, TemplateExt};
pub use knowledge::{InMemoryKnowledge, KnowledgeStore, get_as, set_as};
pub use transport::Transport;
pub use event::{BehaviourEvent, EventBus};
