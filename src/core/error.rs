//! Runtime error taxonomy of the transition engine.

use thiserror::Error;

use crate::core::action::ActionKind;

/// Errors surfaced while applying events to a built state machine.
///
/// Configuration problems are reported separately, at build time, by
/// [`BuildError`](crate::builder::BuildError).
#[derive(Debug, Error)]
pub enum FsmError {
    /// The current state hierarchy has no outgoing transitions at all.
    #[error("no exit transitions from state '{state}'")]
    NoExitTransitions { state: String },

    /// Outgoing transitions exist but none accepted the event.
    #[error("no matching exit transition from state '{state}'")]
    NoMatchingTransition { state: String },

    /// An action aborted the transition; the current state is preserved.
    #[error("transition '{transition}' rolled back by {kind} action: {message}")]
    TransitionRollback {
        transition: String,
        kind: ActionKind,
        message: String,
    },

    /// An action failed the transition; the machine was diverted to the
    /// error state if one is configured.
    #[error("transition '{transition}' failed in {kind} action: {message}")]
    TransitionFailure {
        transition: String,
        kind: ActionKind,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The loop-protection bound was tripped.
    #[error("max transition count exceeded: state={state} transition count={count}")]
    MaxTransitionsExceeded { state: String, count: u64 },

    /// Event application was cancelled before it could commit.
    #[error("event application interrupted")]
    Interrupted,

    /// Generic engine failure, e.g. the error-state fallback itself failed.
    #[error("{message}")]
    Failure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl FsmError {
    /// True for both flavors of "no transition found for this event".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FsmError::NoExitTransitions { .. } | FsmError::NoMatchingTransition { .. }
        )
    }

    pub(crate) fn failure(message: impl Into<String>) -> Self {
        FsmError::Failure {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn failure_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FsmError::Failure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
