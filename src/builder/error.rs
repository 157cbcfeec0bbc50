//! Configuration errors raised while declaring or building a map.

use thiserror::Error;

/// Errors that can occur while assembling a transition map.
///
/// All of these are fatal: a map that fails to build cannot be used.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("state '{0}' is already present in the map")]
    DuplicateState(String),

    #[error("start state already defined: existing='{existing}' new='{new}'")]
    DuplicateStartState { existing: String, new: String },

    #[error("parent state is not in the map for state '{0}'")]
    UnknownParent(String),

    #[error("transition '{0}' references a state that is not in the map")]
    UnknownState(String),

    #[error("error state must be added to the map before it is designated")]
    UnknownErrorState,

    #[error("transition source state not specified. Call .from(state)")]
    MissingFromState,

    #[error("transition target state not specified. Call .to(state)")]
    MissingToState,

    #[error("state machine contains no states")]
    NoStates,

    #[error("state machine has no start state")]
    MissingStartState,

    #[error("state machine has no end state")]
    MissingEndState,

    #[error("state '{0}' has no inbound transitions, hence is unreachable")]
    UnreachableState(String),

    #[error("state '{0}' has no outbound transitions, hence is a dead end")]
    DeadEndState(String),

    #[error("invalid guard pattern")]
    InvalidPattern(#[from] regex::Error),
}
