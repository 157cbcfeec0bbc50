//! Statecraft: a hierarchical finite-state-machine engine.
//!
//! Statecraft orchestrates the lifecycle of application entities such as
//! workflows, connections, and replication units. Clients declare a state
//! graph with nested states, guarded transitions, and entry/exit/transition
//! actions; the engine accepts events, picks the matching transition,
//! fires actions in hierarchy order, diverts to an error state on action
//! failure, and notifies observers of every state change.
//!
//! # Core Concepts
//!
//! - **States** form a hierarchy; a transition crossing a composite
//!   boundary fires the exit and entry actions of everything between the
//!   two states' least common ancestor and the states themselves.
//! - **Guards** are pure predicates deciding which transition accepts an
//!   event.
//! - **Actions** run inside the machine's critical section and report
//!   rollback or failure through their return value.
//! - **The dispatcher** feeds a machine from a worker thread, with
//!   per-event futures, cancellation, and out-of-band preemption.
//!
//! # Example
//!
//! ```rust
//! use statecraft::{
//!     BasicEvent, Guard, StateDecl, StateKind, StateMachine, TransitionDecl,
//!     TransitionMapBuilder,
//! };
//! use std::sync::Arc;
//!
//! let mut builder: TransitionMapBuilder<()> = TransitionMapBuilder::new();
//! let pending = builder
//!     .add_state(StateDecl::new("PENDING", StateKind::Start))
//!     .unwrap();
//! let running = builder
//!     .add_state(StateDecl::new("RUNNING", StateKind::Active))
//!     .unwrap();
//! let done = builder
//!     .add_state(StateDecl::new("DONE", StateKind::End))
//!     .unwrap();
//!
//! builder
//!     .add_transition(TransitionDecl::new("begin").from(pending).to(running))
//!     .unwrap();
//! builder
//!     .add_transition(
//!         TransitionDecl::new("finish")
//!             .from(running)
//!             .to(done)
//!             .guard(Guard::regex("done").unwrap()),
//!     )
//!     .unwrap();
//!
//! let map = Arc::new(builder.build().unwrap());
//! let machine = StateMachine::new(map, ());
//!
//! machine.apply_event(&BasicEvent::new("go".to_string())).unwrap();
//! machine.apply_event(&BasicEvent::new("done".to_string())).unwrap();
//! assert!(machine.is_end());
//! ```

pub mod builder;
pub mod core;
pub mod dispatch;
pub mod machine;

pub use builder::{BuildError, StateDecl, TransitionDecl, TransitionMapBuilder};
pub use core::{
    action_fn, Action, ActionError, ActionKind, ActionRef, BasicEvent, Event, FnAction, FsmError,
    Guard, State, StateId, StateKind, Transition, TransitionLog, TransitionMap, TransitionRecord,
};
pub use dispatch::{Annotation, EventCompletionListener, EventDispatcher, EventRequest, EventStatus};
pub use machine::{CancelToken, StateChangeListener, StateMachine, StateTransitionLatch};
