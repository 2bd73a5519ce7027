//! Ready-made behaviour kinds.
//!
//! Each wraps a body (any [`Behaviour`](crate::Behaviour)) and changes when
//! it runs or when it counts as done. A plain behaviour with no wrapper is
//! cyclic.

mod fsm;
mod one_shot;
mod periodic;
mod timeout;

pub use fsm::{Fsm, FsmState};
pub use one_shot::OneShot;
pub use periodic::Periodic;
pub use timeout::Timeout;
