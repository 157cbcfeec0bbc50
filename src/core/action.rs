//! Actions fired while taking a transition.
//!
//! Actions run serially inside the machine's critical section, on state
//! exit, on the transition itself, and on state entry. An action reports
//! failure through [`ActionError`]; the engine branches on the variant
//! rather than unwinding.

use crate::core::event::Event;
use crate::core::transition::Transition;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Distinguishes the position in the firing sequence an action is invoked
/// from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Exit,
    Transition,
    Entry,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Exit => "exit",
            ActionKind::Transition => "transition",
            ActionKind::Entry => "entry",
        };
        f.write_str(s)
    }
}

/// Failure signalled by an action.
///
/// `Rollback` aborts the transition cleanly: the machine keeps its current
/// state and the action is responsible for having undone its own partial
/// work. `Failure` sends the machine to the configured error state.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{message}")]
    Rollback { message: String },

    #[error("{message}")]
    Failure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ActionError {
    /// Abort the transition and keep the current state.
    pub fn rollback(message: impl Into<String>) -> Self {
        ActionError::Rollback {
            message: message.into(),
        }
    }

    /// Fail the transition and divert to the error state.
    pub fn failure(message: impl Into<String>) -> Self {
        ActionError::Failure {
            message: message.into(),
            source: None,
        }
    }

    /// Fail the transition, keeping the underlying cause.
    pub fn failure_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ActionError::Failure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Procedure run when a transition fires or a state is entered or exited.
///
/// Actions may perform I/O but must not call back into the same state
/// machine; they run while its lock is held.
pub trait Action<E>: Send + Sync {
    fn execute(
        &self,
        event: &dyn Event,
        entity: &mut E,
        transition: &Transition<E>,
        kind: ActionKind,
    ) -> Result<(), ActionError>;
}

/// Shared handle to an action.
pub type ActionRef<E> = Arc<dyn Action<E>>;

/// Adapter turning a closure into an [`Action`].
pub struct FnAction<F>(F);

impl<F> FnAction<F> {
    pub fn new(f: F) -> Self {
        FnAction(f)
    }
}

impl<E, F> Action<E> for FnAction<F>
where
    F: Fn(&dyn Event, &mut E, &Transition<E>, ActionKind) -> Result<(), ActionError>
        + Send
        + Sync,
{
    fn execute(
        &self,
        event: &dyn Event,
        entity: &mut E,
        transition: &Transition<E>,
        kind: ActionKind,
    ) -> Result<(), ActionError> {
        (self.0)(event, entity, transition, kind)
    }
}

/// Wrap a closure as a shared action handle.
pub fn action_fn<E, F>(f: F) -> ActionRef<E>
where
    F: Fn(&dyn Event, &mut E, &Transition<E>, ActionKind) -> Result<(), ActionError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnAction::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::BasicEvent;
    use crate::core::guard::Guard;
    use crate::core::state::StateId;

    fn dummy_transition() -> Transition<Vec<String>> {
        Transition::new(
            "t".to_string(),
            Guard::Always,
            StateId(0),
            StateId(1),
            None,
        )
    }

    #[test]
    fn closure_action_mutates_the_entity() {
        let action = action_fn(|_, entity: &mut Vec<String>, _, kind| {
            entity.push(kind.to_string());
            Ok(())
        });

        let mut entity = Vec::new();
        let transition = dummy_transition();
        action
            .execute(&BasicEvent::empty(), &mut entity, &transition, ActionKind::Entry)
            .unwrap();
        action
            .execute(&BasicEvent::empty(), &mut entity, &transition, ActionKind::Exit)
            .unwrap();

        assert_eq!(entity, vec!["entry".to_string(), "exit".to_string()]);
    }

    #[test]
    fn rollback_and_failure_render_their_message() {
        let rollback = ActionError::rollback("not ready");
        assert_eq!(rollback.to_string(), "not ready");

        let failure = ActionError::failure("broken pipe");
        assert_eq!(failure.to_string(), "broken pipe");
    }

    #[test]
    fn failure_with_keeps_the_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let failure = ActionError::failure_with("flush failed", cause);

        match &failure {
            ActionError::Failure { source, .. } => assert!(source.is_some()),
            _ => panic!("expected failure variant"),
        }
        assert!(std::error::Error::source(&failure).is_some());
    }

    #[test]
    fn action_kind_display_names() {
        assert_eq!(ActionKind::Exit.to_string(), "exit");
        assert_eq!(ActionKind::Transition.to_string(), "transition");
        assert_eq!(ActionKind::Entry.to_string(), "entry");
    }
}
