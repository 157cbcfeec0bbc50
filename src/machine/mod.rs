//! The transition engine and its observers: the state machine itself,
//! state-change listeners, cancellation tokens, and the state transition
//! latch.

mod latch;
mod state_machine;

pub use latch::StateTransitionLatch;
pub use state_machine::{CancelToken, StateChangeListener, StateMachine};
