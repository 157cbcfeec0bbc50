//! Declaration and validation of state graphs.
//!
//! A [`TransitionMapBuilder`] collects states and transitions, then
//! `build()` enforces the structural invariants (single start, at least
//! one end, reachability, no dead ends) and freezes the graph into a
//! shareable [`TransitionMap`](crate::core::TransitionMap).

mod error;
mod map;
mod state;
mod transition;

pub use error::BuildError;
pub use map::TransitionMapBuilder;
pub use state::StateDecl;
pub use transition::TransitionDecl;
