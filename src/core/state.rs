//! States of a finite state machine.
//!
//! States are characterized by a base name, a kind, an optional parent
//! state, and entry/exit actions held by the owning map. Sub-states are
//! states enclosed by a parent; the enclosing chain is precomputed at
//! construction so hierarchy walks never chase pointers at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classifies a state within the graph.
///
/// Every map has exactly one `Start` state and at least one `End` state;
/// everything else is `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    Start,
    Active,
    End,
}

/// Index of a state inside the map that minted it.
///
/// Ids are only meaningful for the builder/map pair that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

/// A single state in the graph.
///
/// Uniquely identified by its qualified name, which prefixes the base name
/// with every enclosing state (`parent:child`). Equality is qualified-name
/// equality. States are immutable once the map is built.
#[derive(Debug)]
pub struct State {
    id: StateId,
    base_name: String,
    qualified_name: String,
    kind: StateKind,
    parent: Option<StateId>,
    children: Vec<StateId>,
    // Enclosing chain from the outermost ancestor down to this state.
    ancestors: Vec<StateId>,
}

impl State {
    pub(crate) fn new(
        id: StateId,
        base_name: String,
        kind: StateKind,
        parent: Option<&State>,
    ) -> Self {
        let (qualified_name, ancestors) = match parent {
            None => (base_name.clone(), vec![id]),
            Some(p) => {
                let mut chain = p.ancestors.clone();
                chain.push(id);
                (format!("{}:{}", p.qualified_name, base_name), chain)
            }
        };
        State {
            id,
            base_name,
            qualified_name,
            kind,
            parent: parent.map(|p| p.id),
            children: Vec::new(),
            ancestors,
        }
    }

    pub(crate) fn add_child(&mut self, child: StateId) {
        self.children.push(child);
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    /// Fully qualified name including any enclosing states.
    pub fn name(&self) -> &str {
        &self.qualified_name
    }

    /// Name of this state without any parent prefix.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn is_start(&self) -> bool {
        self.kind == StateKind::Start
    }

    pub fn is_end(&self) -> bool {
        self.kind == StateKind::End
    }

    /// Immediately enclosing state, if this is a sub-state.
    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    /// States directly enclosed by this one. Empty if there are none.
    pub fn children(&self) -> &[StateId] {
        &self.children
    }

    /// Enclosing chain from the outermost ancestor down to this state
    /// itself.
    pub fn ancestors(&self) -> &[StateId] {
        &self.ancestors
    }

    /// True if this state is enclosed by another state.
    pub fn is_substate(&self) -> bool {
        self.parent.is_some()
    }

    /// True if `other` encloses this state, at any depth.
    pub fn is_substate_of(&self, other: &State) -> bool {
        other.id != self.id && self.ancestors.contains(&other.id)
    }

    /// Deepest state enclosing both `self` and `other`, or `None` if the
    /// two share no ancestor.
    pub fn least_common_ancestor(&self, other: &State) -> Option<StateId> {
        let mut least = None;
        for (a, b) in self.ancestors.iter().zip(other.ancestors.iter()) {
            if a == b {
                least = Some(*a);
            } else {
                break;
            }
        }
        least
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name == other.qualified_name
    }
}

impl Eq for State {}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}
