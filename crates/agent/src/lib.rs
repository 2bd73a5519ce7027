//! The agent: owner of behaviours and router of their messages.
//!
//! An [`Agent`] ties together everything its behaviours share:
//!
//! 1. **Identity**: the jid stamped on outgoing messages
//! 2. **Knowledge**: the store behind `ctx.get` / `ctx.set`
//! 3. **Transport**: where `ctx.send` delivers
//! 4. **Execution context**: where the behaviours run
//!
//! Inbound messages go through [`Agent::dispatch`], which hands a copy to
//! every live behaviour whose template accepts it.

pub mod agent;
pub mod network;

pub use agent::Agent;
pub use network::InMemoryNetwork;
