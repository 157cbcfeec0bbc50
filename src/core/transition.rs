//! Transitions between states.
//!
//! A transition is a directed edge from an input state to an output state,
//! guarded by a predicate and optionally carrying an action fired when the
//! edge is taken.

use crate::core::action::ActionRef;
use crate::core::event::Event;
use crate::core::guard::Guard;
use crate::core::state::{State, StateId};
use std::fmt;

/// Directed, guarded edge of the state graph. Immutable once built.
pub struct Transition<E> {
    name: String,
    guard: Guard<E>,
    input: StateId,
    output: StateId,
    action: Option<ActionRef<E>>,
}

impl<E> fmt::Debug for Transition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("guard", &self.guard)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("action", &self.action.as_ref().map(|_| "Action(..)"))
            .finish()
    }
}

impl<E> Transition<E> {
    pub(crate) fn new(
        name: String,
        guard: Guard<E>,
        input: StateId,
        output: StateId,
        action: Option<ActionRef<E>>,
    ) -> Self {
        Transition {
            name,
            guard,
            input,
            output,
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guard(&self) -> &Guard<E> {
        &self.guard
    }

    pub fn input(&self) -> StateId {
        self.input
    }

    pub fn output(&self) -> StateId {
        self.output
    }

    pub fn action(&self) -> Option<&ActionRef<E>> {
        self.action.as_ref()
    }

    /// Evaluate the guard against an event arriving at the transition's
    /// input state.
    pub fn accept(&self, event: &dyn Event, entity: &E, input_state: &State) -> bool {
        self.guard.accept(event, entity, input_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::BasicEvent;
    use crate::core::state::StateKind;

    fn input_state() -> State {
        State::new(StateId(0), "WAITING".to_string(), StateKind::Active, None)
    }

    #[test]
    fn accept_delegates_to_the_guard() {
        let accepting: Transition<()> = Transition::new(
            "go".to_string(),
            Guard::Always,
            StateId(0),
            StateId(1),
            None,
        );
        let rejecting: Transition<()> = Transition::new(
            "stay".to_string(),
            Guard::negate(Guard::Always),
            StateId(0),
            StateId(1),
            None,
        );

        let state = input_state();
        assert!(accepting.accept(&BasicEvent::empty(), &(), &state));
        assert!(!rejecting.accept(&BasicEvent::empty(), &(), &state));
    }

    #[test]
    fn endpoints_and_name_are_exposed() {
        let t: Transition<()> = Transition::new(
            "go".to_string(),
            Guard::Always,
            StateId(2),
            StateId(5),
            None,
        );

        assert_eq!(t.name(), "go");
        assert_eq!(t.input(), StateId(2));
        assert_eq!(t.output(), StateId(5));
        assert!(t.action().is_none());
    }
}
