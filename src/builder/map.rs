//! Builder for assembling and validating a transition map.

use crate::builder::error::BuildError;
use crate::builder::state::StateDecl;
use crate::builder::transition::TransitionDecl;
use crate::core::{ActionRef, Guard, State, StateId, Transition, TransitionMap};

/// Mutable staging area for a state graph.
///
/// States and transitions are declared incrementally; [`build`] validates
/// the whole graph and freezes it into an immutable
/// [`TransitionMap`].
///
/// # Example
///
/// ```rust
/// use statecraft::{StateDecl, StateKind, TransitionDecl, TransitionMapBuilder};
///
/// let mut builder: TransitionMapBuilder<()> = TransitionMapBuilder::new();
/// let pending = builder
///     .add_state(StateDecl::new("PENDING", StateKind::Start))
///     .unwrap();
/// let done = builder
///     .add_state(StateDecl::new("DONE", StateKind::End))
///     .unwrap();
/// builder
///     .add_transition(TransitionDecl::new("finish").from(pending).to(done))
///     .unwrap();
/// let map = builder.build().unwrap();
/// assert_eq!(map.start_state().name(), "PENDING");
/// ```
///
/// [`build`]: TransitionMapBuilder::build
pub struct TransitionMapBuilder<E> {
    states: Vec<State>,
    entry_actions: Vec<Option<ActionRef<E>>>,
    exit_actions: Vec<Option<ActionRef<E>>>,
    outgoing: Vec<Vec<Transition<E>>>,
    start: Option<StateId>,
    error: Option<StateId>,
}

impl<E> TransitionMapBuilder<E> {
    pub fn new() -> Self {
        TransitionMapBuilder {
            states: Vec::new(),
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
            outgoing: Vec::new(),
            start: None,
            error: None,
        }
    }

    /// Add a state to the graph, returning its id.
    ///
    /// Rejects duplicate qualified names and a second start state.
    pub fn add_state(&mut self, decl: StateDecl<E>) -> Result<StateId, BuildError> {
        let parent = match decl.parent {
            Some(id) => Some(
                self.states
                    .get(id.0)
                    .ok_or_else(|| BuildError::UnknownParent(decl.name.clone()))?,
            ),
            None => None,
        };

        let id = StateId(self.states.len());
        let state = State::new(id, decl.name, decl.kind, parent);

        if self.states.iter().any(|s| s.name() == state.name()) {
            return Err(BuildError::DuplicateState(state.name().to_string()));
        }
        if state.is_start() {
            if let Some(existing) = self.start {
                return Err(BuildError::DuplicateStartState {
                    existing: self.states[existing.0].name().to_string(),
                    new: state.name().to_string(),
                });
            }
            self.start = Some(id);
        }

        if let Some(parent_id) = state.parent() {
            self.states[parent_id.0].add_child(id);
        }
        self.states.push(state);
        self.entry_actions.push(decl.entry);
        self.exit_actions.push(decl.exit);
        self.outgoing.push(Vec::new());
        Ok(id)
    }

    /// Add a transition between two previously added states.
    pub fn add_transition(&mut self, decl: TransitionDecl<E>) -> Result<(), BuildError> {
        let transition = decl.finish()?;
        if self.states.get(transition.input().0).is_none()
            || self.states.get(transition.output().0).is_none()
        {
            return Err(BuildError::UnknownState(transition.name().to_string()));
        }
        self.outgoing[transition.input().0].push(transition);
        Ok(())
    }

    /// Add a self-loop transition on each of `states`, sharing one guard
    /// and action.
    ///
    /// The effect is an event that may fire, via the guard, only while the
    /// machine is in one of the named states. Each loop is named
    /// `name:stateQualifiedName`.
    pub fn add_transition_group(
        &mut self,
        name: &str,
        guard: Guard<E>,
        states: &[StateId],
        action: Option<ActionRef<E>>,
    ) -> Result<(), BuildError> {
        for &id in states {
            let state = self
                .states
                .get(id.0)
                .ok_or_else(|| BuildError::UnknownState(name.to_string()))?;
            let transition = Transition::new(
                format!("{}:{}", name, state.name()),
                guard.clone(),
                id,
                id,
                action.clone(),
            );
            self.outgoing[id.0].push(transition);
        }
        Ok(())
    }

    /// Designate the state control diverts to when a transition fails.
    pub fn set_error_state(&mut self, state: StateId) -> Result<(), BuildError> {
        if self.states.get(state.0).is_none() {
            return Err(BuildError::UnknownErrorState);
        }
        self.error = Some(state);
        Ok(())
    }

    /// Validate the graph and freeze it.
    ///
    /// Checks that the graph is non-empty with a start state and at least
    /// one end state, that every state other than the start and the error
    /// state is reachable through some inbound transition (transitions
    /// into a sub-state count for its enclosing states, except when the
    /// input already lies inside the enclosing state), and that every
    /// non-end state has a way out, directly or inherited from an
    /// enclosing state.
    pub fn build(self) -> Result<TransitionMap<E>, BuildError> {
        if self.states.is_empty() {
            return Err(BuildError::NoStates);
        }
        let start = self.start.ok_or(BuildError::MissingStartState)?;
        if !self.states.iter().any(|s| s.is_end()) {
            return Err(BuildError::MissingEndState);
        }

        // Inbound: walk each transition's output up through its enclosing
        // states. An enclosing state only accrues transitions whose input
        // is not one of its own sub-states; purely internal moves do not
        // count as an entry into the composite.
        let mut inbound = vec![false; self.states.len()];
        for transitions in &self.outgoing {
            for transition in transitions {
                let mut out = Some(transition.output());
                while let Some(id) = out {
                    inbound[id.0] = true;
                    let parent = self.states[id.0].parent();
                    if self.is_proper_ancestor(transition.input(), parent) {
                        break;
                    }
                    out = parent;
                }
            }
        }
        for state in &self.states {
            if !state.is_start() && !inbound[state.id().0] && Some(state.id()) != self.error {
                return Err(BuildError::UnreachableState(state.name().to_string()));
            }
        }

        // Outbound, pass one: the symmetric walk over inputs.
        let mut outbound = vec![false; self.states.len()];
        for transitions in &self.outgoing {
            for transition in transitions {
                let mut input = Some(transition.input());
                while let Some(id) = input {
                    outbound[id.0] = true;
                    let parent = self.states[id.0].parent();
                    if self.is_proper_ancestor(transition.output(), parent) {
                        break;
                    }
                    input = parent;
                }
            }
        }

        // Outbound, pass two: a state with no exit of its own inherits one
        // from the nearest enclosing state that has one.
        for state in &self.states {
            if !state.is_end() && !outbound[state.id().0] {
                let mut parent = state.parent();
                while let Some(id) = parent {
                    if outbound[id.0] {
                        outbound[state.id().0] = true;
                        break;
                    }
                    parent = self.states[id.0].parent();
                }
            }
        }
        for state in &self.states {
            if !state.is_end() && !outbound[state.id().0] {
                return Err(BuildError::DeadEndState(state.name().to_string()));
            }
        }

        Ok(TransitionMap::from_parts(
            self.states,
            self.entry_actions,
            self.exit_actions,
            self.outgoing,
            start,
            self.error,
        ))
    }

    // True if `ancestor` properly encloses `state`.
    fn is_proper_ancestor(&self, state: StateId, ancestor: Option<StateId>) -> bool {
        match ancestor {
            None => false,
            Some(a) => a != state && self.states[state.0].ancestors().contains(&a),
        }
    }
}

impl<E> Default for TransitionMapBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
