//! The frozen state transition map.
//!
//! A [`TransitionMap`] is produced by a successful
//! [`TransitionMapBuilder::build`](crate::builder::TransitionMapBuilder::build)
//! and is immutable from then on, so it can be shared across any number of
//! state machines behind an `Arc`.

use crate::core::action::ActionRef;
use crate::core::error::FsmError;
use crate::core::event::Event;
use crate::core::state::{State, StateId};
use crate::core::transition::Transition;
use std::fmt;
use tracing::debug;

/// Validated, immutable state graph: the states, their entry/exit actions,
/// and each state's outgoing transitions in declaration order.
pub struct TransitionMap<E> {
    states: Vec<State>,
    entry_actions: Vec<Option<ActionRef<E>>>,
    exit_actions: Vec<Option<ActionRef<E>>>,
    outgoing: Vec<Vec<Transition<E>>>,
    start: StateId,
    error: Option<StateId>,
}

impl<E> fmt::Debug for TransitionMap<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionMap")
            .field("states", &self.states)
            .field("outgoing", &self.outgoing)
            .field("start", &self.start)
            .field("error", &self.error)
            .finish()
    }
}

impl<E> TransitionMap<E> {
    pub(crate) fn from_parts(
        states: Vec<State>,
        entry_actions: Vec<Option<ActionRef<E>>>,
        exit_actions: Vec<Option<ActionRef<E>>>,
        outgoing: Vec<Vec<Transition<E>>>,
        start: StateId,
        error: Option<StateId>,
    ) -> Self {
        TransitionMap {
            states,
            entry_actions,
            exit_actions,
            outgoing,
            start,
            error,
        }
    }

    /// Look up a state by id. Ids are minted by the builder that produced
    /// this map; passing an id from another map is a logic error.
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    /// Look up a state by fully qualified name.
    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name() == name)
    }

    pub fn start_state(&self) -> &State {
        self.state(self.start)
    }

    pub fn error_state(&self) -> Option<&State> {
        self.error.map(|id| self.state(id))
    }

    pub(crate) fn error_state_id(&self) -> Option<StateId> {
        self.error
    }

    /// Outgoing transitions declared directly on `state`, in declaration
    /// order.
    pub fn transitions_from(&self, state: StateId) -> &[Transition<E>] {
        &self.outgoing[state.0]
    }

    pub(crate) fn entry_action(&self, state: StateId) -> Option<&ActionRef<E>> {
        self.entry_actions[state.0].as_ref()
    }

    pub(crate) fn exit_action(&self, state: StateId) -> Option<&ActionRef<E>> {
        self.exit_actions[state.0].as_ref()
    }

    /// Deepest state enclosing both arguments, or `None`.
    pub fn least_common_ancestor(&self, a: StateId, b: StateId) -> Option<StateId> {
        self.state(a).least_common_ancestor(self.state(b))
    }

    /// Resolve the transition to take for `event` arriving while the
    /// machine is in `from`.
    ///
    /// Walks the state hierarchy upward from `from`; at each level the
    /// transitions declared on that level are consulted in declaration
    /// order and the first accepting one wins. Fails with
    /// [`FsmError::NoExitTransitions`] when no level declares any
    /// transition, and with [`FsmError::NoMatchingTransition`] when
    /// transitions exist but none accepts.
    pub fn next_transition(
        &self,
        from: StateId,
        event: &dyn Event,
        entity: &E,
    ) -> Result<&Transition<E>, FsmError> {
        let mut level = Some(from);
        let mut saw_transitions = false;

        while let Some(id) = level {
            let candidates = &self.outgoing[id.0];
            if !candidates.is_empty() {
                saw_transitions = true;
            }
            for transition in candidates {
                if transition.accept(event, entity, self.state(transition.input())) {
                    debug!(
                        state = self.state(from).name(),
                        transition = transition.name(),
                        "matched transition"
                    );
                    return Ok(transition);
                }
            }
            level = self.state(id).parent();
        }

        let state = self.state(from).name().to_string();
        if saw_transitions {
            Err(FsmError::NoMatchingTransition { state })
        } else {
            Err(FsmError::NoExitTransitions { state })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateDecl, TransitionDecl, TransitionMapBuilder};
    use crate::core::event::BasicEvent;
    use crate::core::guard::Guard;
    use crate::core::state::StateKind;

    // Start -> Parent{Child} -> End, with transitions declared at
    // different hierarchy levels.
    fn hierarchical_map() -> (TransitionMap<()>, StateId, StateId, StateId, StateId) {
        let mut builder = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let parent = builder
            .add_state(StateDecl::new("PARENT", StateKind::Active))
            .unwrap();
        let child = builder
            .add_state(StateDecl::new("CHILD", StateKind::Active).parent(parent))
            .unwrap();
        let end = builder
            .add_state(StateDecl::new("END", StateKind::End))
            .unwrap();

        builder
            .add_transition(TransitionDecl::new("enter").from(start).to(child))
            .unwrap();
        // Declared on the parent, inherited by the child.
        builder
            .add_transition(
                TransitionDecl::new("finish")
                    .from(parent)
                    .to(end)
                    .guard(Guard::regex("done").unwrap()),
            )
            .unwrap();

        (builder.build().unwrap(), start, parent, child, end)
    }

    #[test]
    fn state_by_name_uses_qualified_names() {
        let (map, _, _, child, _) = hierarchical_map();
        assert_eq!(map.state_by_name("PARENT:CHILD").unwrap().id(), child);
        assert!(map.state_by_name("CHILD").is_none());
    }

    #[test]
    fn resolution_walks_up_the_hierarchy() {
        let (map, _, _, child, end) = hierarchical_map();
        let event = BasicEvent::new("done".to_string());

        let t = map.next_transition(child, &event, &()).unwrap();
        assert_eq!(t.name(), "finish");
        assert_eq!(t.output(), end);
    }

    #[test]
    fn unmatched_event_reports_no_matching_transition() {
        let (map, _, _, child, _) = hierarchical_map();
        let event = BasicEvent::new("nope".to_string());

        let err = map.next_transition(child, &event, &()).unwrap_err();
        assert!(matches!(err, FsmError::NoMatchingTransition { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn state_without_any_exits_reports_no_exit_transitions() {
        let (map, _, _, _, end) = hierarchical_map();

        let err = map
            .next_transition(end, &BasicEvent::empty(), &())
            .unwrap_err();
        assert!(matches!(err, FsmError::NoExitTransitions { .. }));
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let mut builder: TransitionMapBuilder<()> = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let a = builder
            .add_state(StateDecl::new("A", StateKind::End))
            .unwrap();
        let b = builder
            .add_state(StateDecl::new("B", StateKind::End))
            .unwrap();

        builder
            .add_transition(TransitionDecl::new("first").from(start).to(a))
            .unwrap();
        builder
            .add_transition(TransitionDecl::new("second").from(start).to(b))
            .unwrap();
        let map = builder.build().unwrap();

        let t = map.next_transition(start, &BasicEvent::empty(), &()).unwrap();
        assert_eq!(t.name(), "first");
    }
}
