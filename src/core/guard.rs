//! Guard predicates for controlling state transitions.
//!
//! Guards are pure boolean functions over (event, entity, state) that
//! determine whether a transition accepts an event. The built-in guards
//! cover the common cases; `Custom` wraps an arbitrary predicate closure.

use crate::core::event::Event;
use crate::core::state::State;
use regex::Regex;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Pure predicate deciding whether a transition accepts an event.
///
/// Guards must be deterministic and free of side effects; they may be
/// evaluated any number of times while resolving a transition.
///
/// # Example
///
/// ```rust
/// use statecraft::{BasicEvent, Guard};
///
/// // Accepts only events whose dynamic type is BasicEvent<String>.
/// let by_type: Guard<()> = Guard::event_type::<BasicEvent<String>>();
///
/// // Accepts only string payloads matching the whole pattern.
/// let by_payload: Guard<()> = Guard::regex("foo.*").unwrap();
/// ```
pub enum Guard<E> {
    /// Accepts every event.
    Always,
    /// Inverts the inner guard.
    Not(Box<Guard<E>>),
    /// Accepts events whose dynamic type matches, regardless of payload.
    EventType(TypeId),
    /// Accepts events whose payload is a string fully matching the
    /// pattern.
    Regex(Regex),
    /// Arbitrary predicate supplied by the client.
    #[allow(clippy::type_complexity)]
    Custom(Arc<dyn Fn(&dyn Event, &E, &State) -> bool + Send + Sync>),
}

impl<E> Guard<E> {
    /// Guard accepting events of the concrete type `T`.
    ///
    /// Matches on the event object itself, not its payload.
    pub fn event_type<T: Event + 'static>() -> Self {
        Guard::EventType(TypeId::of::<T>())
    }

    /// Guard accepting string payloads that match `pattern` in full.
    ///
    /// The pattern is compiled once and anchored at both ends, so
    /// `"foo.*"` matches `"foobar"` but not `"xfoobar"`.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Guard::Regex(re))
    }

    /// Guard inverting `inner`.
    pub fn negate(inner: Guard<E>) -> Self {
        Guard::Not(Box::new(inner))
    }

    /// Guard evaluating an arbitrary predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&dyn Event, &E, &State) -> bool + Send + Sync + 'static,
    {
        Guard::Custom(Arc::new(predicate))
    }

    /// Evaluate the guard against an event arriving at `state`.
    pub fn accept(&self, event: &dyn Event, entity: &E, state: &State) -> bool {
        match self {
            Guard::Always => true,
            Guard::Not(inner) => !inner.accept(event, entity, state),
            Guard::EventType(type_id) => event.as_any().type_id() == *type_id,
            Guard::Regex(re) => match event.payload() {
                Some(payload) => {
                    if let Some(s) = payload.downcast_ref::<String>() {
                        re.is_match(s)
                    } else if let Some(s) = payload.downcast_ref::<&str>() {
                        re.is_match(s)
                    } else {
                        false
                    }
                }
                None => false,
            },
            Guard::Custom(predicate) => predicate(event, entity, state),
        }
    }
}

impl<E> Clone for Guard<E> {
    fn clone(&self) -> Self {
        match self {
            Guard::Always => Guard::Always,
            Guard::Not(inner) => Guard::Not(inner.clone()),
            Guard::EventType(type_id) => Guard::EventType(*type_id),
            Guard::Regex(re) => Guard::Regex(re.clone()),
            Guard::Custom(predicate) => Guard::Custom(Arc::clone(predicate)),
        }
    }
}

impl<E> fmt::Debug for Guard<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Always => f.write_str("Always"),
            Guard::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Guard::EventType(type_id) => f.debug_tuple("EventType").field(type_id).finish(),
            Guard::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Guard::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
