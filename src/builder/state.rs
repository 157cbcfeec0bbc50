//! Fluent declaration of a state.

use crate::core::{ActionRef, StateId, StateKind};

/// Declares a state to be added to a
/// [`TransitionMapBuilder`](crate::builder::TransitionMapBuilder).
///
/// # Example
///
/// ```rust
/// use statecraft::{StateDecl, StateKind, TransitionMapBuilder};
///
/// let mut builder: TransitionMapBuilder<()> = TransitionMapBuilder::new();
/// let online = builder
///     .add_state(StateDecl::new("ONLINE", StateKind::Active))
///     .unwrap();
/// let syncing = builder
///     .add_state(StateDecl::new("SYNCING", StateKind::Active).parent(online))
///     .unwrap();
/// # let _ = syncing;
/// ```
pub struct StateDecl<E> {
    pub(crate) name: String,
    pub(crate) kind: StateKind,
    pub(crate) parent: Option<StateId>,
    pub(crate) entry: Option<ActionRef<E>>,
    pub(crate) exit: Option<ActionRef<E>>,
}

impl<E> StateDecl<E> {
    pub fn new(name: impl Into<String>, kind: StateKind) -> Self {
        StateDecl {
            name: name.into(),
            kind,
            parent: None,
            entry: None,
            exit: None,
        }
    }

    /// Enclose this state in `parent`.
    pub fn parent(mut self, parent: StateId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Action fired when the state is entered.
    pub fn on_entry(mut self, action: ActionRef<E>) -> Self {
        self.entry = Some(action);
        self
    }

    /// Action fired when the state is exited.
    pub fn on_exit(mut self, action: ActionRef<E>) -> Self {
        self.exit = Some(action);
        self
    }
}
