//! Fluent declaration of a transition.

use crate::builder::error::BuildError;
use crate::core::{ActionRef, Event, Guard, State, StateId, Transition};

/// Declares a transition to be added to a
/// [`TransitionMapBuilder`](crate::builder::TransitionMapBuilder).
///
/// The guard defaults to [`Guard::Always`] when none is given.
pub struct TransitionDecl<E> {
    name: String,
    from: Option<StateId>,
    to: Option<StateId>,
    guard: Option<Guard<E>>,
    action: Option<ActionRef<E>>,
}

impl<E> TransitionDecl<E> {
    pub fn new(name: impl Into<String>) -> Self {
        TransitionDecl {
            name: name.into(),
            from: None,
            to: None,
            guard: None,
            action: None,
        }
    }

    /// Set the input state (required).
    pub fn from(mut self, state: StateId) -> Self {
        self.from = Some(state);
        self
    }

    /// Set the output state (required).
    pub fn to(mut self, state: StateId) -> Self {
        self.to = Some(state);
        self
    }

    /// Guard the transition (optional; defaults to always accepting).
    pub fn guard(mut self, guard: Guard<E>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Guard the transition with a closure (optional).
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Event, &E, &State) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::custom(predicate));
        self
    }

    /// Action fired when the transition is taken (optional).
    pub fn action(mut self, action: ActionRef<E>) -> Self {
        self.action = Some(action);
        self
    }

    pub(crate) fn finish(self) -> Result<Transition<E>, BuildError> {
        let from = self.from.ok_or(BuildError::MissingFromState)?;
        let to = self.to.ok_or(BuildError::MissingToState)?;

        Ok(Transition::new(
            self.name,
            self.guard.unwrap_or(Guard::Always),
            from,
            to,
            self.action,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_validates_required_endpoints() {
        let missing_to: TransitionDecl<()> = TransitionDecl::new("go").from(StateId(0));
        assert!(matches!(missing_to.finish(), Err(BuildError::MissingToState)));

        let missing_from: TransitionDecl<()> = TransitionDecl::new("go").to(StateId(1));
        assert!(matches!(
            missing_from.finish(),
            Err(BuildError::MissingFromState)
        ));
    }

    #[test]
    fn guard_defaults_to_always() {
        let decl: TransitionDecl<()> = TransitionDecl::new("go").from(StateId(0)).to(StateId(1));
        let transition = decl.finish().unwrap();
        assert!(matches!(transition.guard(), Guard::Always));
    }

    #[test]
    fn when_installs_a_custom_guard() {
        let decl: TransitionDecl<u32> = TransitionDecl::new("go")
            .from(StateId(0))
            .to(StateId(1))
            .when(|_, entity, _| *entity == 7);
        let transition = decl.finish().unwrap();
        assert!(matches!(transition.guard(), Guard::Custom(_)));
    }
}
