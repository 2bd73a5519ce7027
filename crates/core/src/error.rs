//! Error types for the Spindle domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Spindle operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Knowledge store errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Behaviour lifecycle errors ---
    #[error("Behaviour error: {0}")]
    Behaviour(#[from] BehaviourError),

    // --- Addressing ---
    #[error("Invalid address: {0}")]
    Jid(#[from] JidError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Message has no recipient")]
    NoRecipient,

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Delivery failed to {recipient}: {reason}")]
    DeliveryFailed { recipient: String, reason: String },

    #[error("Transport stream closed: {0}")]
    Closed(String),

    #[error("Malformed stanza: {0}")]
    InvalidStanza(String),
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Value for '{key}' could not be converted: {reason}")]
    Conversion { key: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum BehaviourError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Behaviour {0} is no longer accepting messages")]
    Closed(String),

    #[error("Behaviour {name} panicked: {reason}")]
    Panicked { name: String, reason: String },

    #[error("Behaviour {0} was cancelled before it finished")]
    Cancelled(String),

    #[error("Period must be greater than zero")]
    InvalidPeriod,

    #[error("State machine has no initial state")]
    NoInitialState,

    #[error("Unknown state: {0}")]
    UnknownState(String),

    #[error("Transition {from} -> {to} was never registered")]
    InvalidTransition { from: String, to: String },

    #[error("Behaviour failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JidError {
    #[error("address is empty")]
    Empty,

    #[error("address '{0}' has no domain part")]
    MissingDomain(String),

    #[error("address '{0}' has an empty local part")]
    EmptyLocal(String),

    #[error("address '{0}' has an empty resource part")]
    EmptyResource(String),
}
