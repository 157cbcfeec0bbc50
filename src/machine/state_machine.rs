//! The transition engine.
//!
//! A state machine binds a frozen transition map to one entity and applies
//! events to it, one at a time, under a single lock. Applying an event
//! resolves a transition, fires exit/transition/entry actions in hierarchy
//! order, commits the new state, and notifies listeners.

use crate::core::{
    ActionError, ActionKind, Event, FsmError, State, StateId, Transition, TransitionLog,
    TransitionMap, TransitionRecord,
};
use crate::machine::latch::{LatchListener, StateTransitionLatch};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Cooperative cancellation flag for an in-flight event application.
///
/// The engine checks the token between action firings and before
/// committing a state change; a tripped token surfaces as
/// [`FsmError::Interrupted`] with no state change for the hop in
/// progress. Long-running actions may capture a clone and poll it
/// themselves.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer of committed state changes.
///
/// Listeners run inside the machine's critical section, after the state
/// pointer has moved. They must be fast and must not call back into the
/// same machine; hand work that needs the machine to another thread.
pub trait StateChangeListener<E>: Send + Sync {
    fn state_changed(&self, entity: &E, old: &State, new: &State);
}

struct MachineInner<E> {
    current: StateId,
    entity: E,
    transition_count: u64,
    max_transitions: u64,
    forward_chain: bool,
    listeners: Vec<Arc<dyn StateChangeListener<E>>>,
    history: TransitionLog,
}

/// A running state machine over one entity.
///
/// All mutation goes through the machine's internal lock; concurrent
/// callers of [`apply_event`](StateMachine::apply_event) are strictly
/// serialized and observers only ever see pre- or post-transition states.
pub struct StateMachine<E> {
    map: Arc<TransitionMap<E>>,
    inner: Mutex<MachineInner<E>>,
}

enum HopError {
    Rollback(FsmError),
    Failure(FsmError),
    Interrupted,
}

impl<E> StateMachine<E> {
    /// Create a machine positioned at the map's start state.
    pub fn new(map: Arc<TransitionMap<E>>, entity: E) -> Self {
        let current = map.start_state().id();
        StateMachine {
            map,
            inner: Mutex::new(MachineInner {
                current,
                entity,
                transition_count: 0,
                max_transitions: 0,
                forward_chain: false,
                listeners: Vec::new(),
                history: TransitionLog::new(),
            }),
        }
    }

    /// The frozen map this machine runs over.
    pub fn map(&self) -> &TransitionMap<E> {
        &self.map
    }

    /// Current state.
    pub fn state(&self) -> &State {
        self.map.state(self.inner.lock().current)
    }

    /// Run `f` against the entity under the machine lock.
    pub fn with_entity<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.inner.lock().entity)
    }

    /// True if the machine has reached an end state.
    pub fn is_end(&self) -> bool {
        self.state().is_end()
    }

    /// The map's designated error state, if any.
    pub fn error_state(&self) -> Option<&State> {
        self.map.error_state()
    }

    /// Snapshot of the transitions committed so far.
    pub fn history(&self) -> TransitionLog {
        self.inner.lock().history.clone()
    }

    /// Bound the total number of transitions this machine may take, as
    /// protection against transition loops. Zero (the default) means
    /// unbounded.
    pub fn set_max_transitions(&self, max: u64) {
        self.inner.lock().max_transitions = max;
    }

    /// When enabled, a committed transition immediately re-attempts
    /// resolution with the same event from the new state, chaining hops
    /// until no transition matches.
    pub fn set_forward_chain_enabled(&self, enabled: bool) {
        self.inner.lock().forward_chain = enabled;
    }

    pub fn is_forward_chain_enabled(&self) -> bool {
        self.inner.lock().forward_chain
    }

    pub fn add_listener(&self, listener: Arc<dyn StateChangeListener<E>>) {
        self.inner.lock().listeners.push(listener);
    }

    /// Remove a previously added listener.
    ///
    /// Returns true if the listener was found and removed.
    pub fn remove_listener(&self, listener: &Arc<dyn StateChangeListener<E>>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        let mut inner = self.inner.lock();
        match inner
            .listeners
            .iter()
            .position(|l| Arc::as_ptr(l) as *const () == target)
        {
            Some(index) => {
                inner.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Create a latch that completes when this machine reaches `expected`
    /// (or any of its sub-states), or the error state when `end_on_error`
    /// is set.
    ///
    /// Registration and the initial-state snapshot happen under the
    /// machine lock, so a transition can never slip between them
    /// unobserved.
    pub fn create_state_transition_latch(
        self: &Arc<Self>,
        expected: StateId,
        end_on_error: bool,
    ) -> StateTransitionLatch<E> {
        let (listener, receiver) = LatchListener::channel();
        let listener: Arc<LatchListener> = Arc::new(listener);
        {
            let mut inner = self.inner.lock();
            inner.listeners.push(listener.clone());
            listener.push(inner.current);
        }
        StateTransitionLatch::new(Arc::clone(self), expected, end_on_error, receiver, listener)
    }

    /// Apply an event, taking the first matching transition.
    ///
    /// Returns normally on success, including the benign case where the
    /// transition leads back to the same state.
    pub fn apply_event(&self, event: &dyn Event) -> Result<(), FsmError> {
        self.apply_event_cancellable(event, &CancelToken::new())
    }

    /// Apply an event with a cancellation token.
    ///
    /// A token tripped from another thread makes the application fail
    /// with [`FsmError::Interrupted`] at the next engine checkpoint; the
    /// hop in progress does not commit.
    pub fn apply_event_cancellable(
        &self,
        event: &dyn Event,
        cancel: &CancelToken,
    ) -> Result<(), FsmError> {
        let mut inner = self.inner.lock();
        self.apply_locked(&mut inner, event, cancel)
    }

    fn apply_locked(
        &self,
        inner: &mut MachineInner<E>,
        event: &dyn Event,
        cancel: &CancelToken,
    ) -> Result<(), FsmError> {
        let mut deferred: Option<FsmError> = None;
        let mut chained = false;

        loop {
            if cancel.is_cancelled() {
                return Err(FsmError::Interrupted);
            }

            if inner.max_transitions > 0 {
                inner.transition_count += 1;
                if inner.transition_count > inner.max_transitions {
                    return Err(FsmError::MaxTransitionsExceeded {
                        state: self.map.state(inner.current).name().to_string(),
                        count: inner.transition_count,
                    });
                }
            }

            let transition = match self.map.next_transition(inner.current, event, &inner.entity) {
                Ok(t) => t,
                // A chain ends quietly when nothing more matches.
                Err(e) if chained && e.is_not_found() => break,
                Err(e) => return Err(e),
            };
            let mut next = transition.output();
            debug!(
                input = self.map.state(inner.current).name(),
                transition = transition.name(),
                output = self.map.state(next).name(),
                "executing state transition"
            );

            match self.fire_actions(inner, event, transition, next, cancel) {
                Ok(()) => {}
                Err(HopError::Interrupted) => return Err(FsmError::Interrupted),
                Err(HopError::Rollback(e)) => {
                    debug!(
                        state = self.map.state(inner.current).name(),
                        transition = transition.name(),
                        "transition rolled back"
                    );
                    return Err(e);
                }
                Err(HopError::Failure(original)) => {
                    let Some(error_state) = self.map.error_state_id() else {
                        return Err(FsmError::failure_with(
                            "transition failed and no error state is configured",
                            original,
                        ));
                    };
                    // Divert to the error state; its entry action must
                    // succeed or the machine is beyond help.
                    if let Some(action) = self.map.entry_action(error_state) {
                        if let Err(e) =
                            action.execute(event, &mut inner.entity, transition, ActionKind::Entry)
                        {
                            error!(
                                state = self.map.state(error_state).name(),
                                error = %e,
                                "transition to error state failed"
                            );
                            return Err(FsmError::failure_with(
                                "transition to error state failed",
                                e,
                            ));
                        }
                    }
                    next = error_state;
                    if deferred.is_none() {
                        deferred = Some(original);
                    }
                }
            }

            if cancel.is_cancelled() {
                return Err(FsmError::Interrupted);
            }
            let changed = inner.current != next;
            if changed {
                let old = inner.current;
                inner.current = next;
                inner.history.record(TransitionRecord {
                    from: self.map.state(old).name().to_string(),
                    to: self.map.state(next).name().to_string(),
                    transition: transition.name().to_string(),
                    timestamp: Utc::now(),
                });
                debug!(state = self.map.state(next).name(), "entering new state");
                let (old_state, new_state) = (self.map.state(old), self.map.state(next));
                for listener in &inner.listeners {
                    listener.state_changed(&inner.entity, old_state, new_state);
                }
            }

            if changed && inner.forward_chain {
                chained = true;
                continue;
            }
            break;
        }

        match deferred {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // Fires exit actions from the current state up to (excluding) the
    // least common ancestor, the transition action, then entry actions
    // from below the ancestor down to the target. The ancestor's own
    // actions never fire; on a self-transition only the transition action
    // fires.
    fn fire_actions(
        &self,
        inner: &mut MachineInner<E>,
        event: &dyn Event,
        transition: &Transition<E>,
        next: StateId,
        cancel: &CancelToken,
    ) -> Result<(), HopError> {
        let current = inner.current;
        let lca = self.map.least_common_ancestor(current, next);

        if current != next {
            let mut exiting = Some(current);
            while let Some(id) = exiting {
                if Some(id) == lca {
                    break;
                }
                if let Some(action) = self.map.exit_action(id) {
                    if cancel.is_cancelled() {
                        return Err(HopError::Interrupted);
                    }
                    debug!(state = self.map.state(id).name(), "executing exit action");
                    action
                        .execute(event, &mut inner.entity, transition, ActionKind::Exit)
                        .map_err(|e| Self::hop_error(transition, ActionKind::Exit, e))?;
                }
                exiting = self.map.state(id).parent();
            }
        }

        if let Some(action) = transition.action() {
            if cancel.is_cancelled() {
                return Err(HopError::Interrupted);
            }
            debug!(transition = transition.name(), "executing transition action");
            action
                .execute(event, &mut inner.entity, transition, ActionKind::Transition)
                .map_err(|e| Self::hop_error(transition, ActionKind::Transition, e))?;
        }

        if current != next {
            let ancestors = self.map.state(next).ancestors();
            let first = match lca {
                None => 0,
                Some(l) => ancestors
                    .iter()
                    .position(|&id| id == l)
                    .map(|i| i + 1)
                    .unwrap_or(0),
            };
            for &id in &ancestors[first..] {
                if let Some(action) = self.map.entry_action(id) {
                    if cancel.is_cancelled() {
                        return Err(HopError::Interrupted);
                    }
                    debug!(state = self.map.state(id).name(), "executing entry action");
                    action
                        .execute(event, &mut inner.entity, transition, ActionKind::Entry)
                        .map_err(|e| Self::hop_error(transition, ActionKind::Entry, e))?;
                }
            }
        }

        Ok(())
    }

    fn hop_error(transition: &Transition<E>, kind: ActionKind, error: ActionError) -> HopError {
        match error {
            ActionError::Rollback { message } => HopError::Rollback(FsmError::TransitionRollback {
                transition: transition.name().to_string(),
                kind,
                message,
            }),
            ActionError::Failure { message, source } => {
                HopError::Failure(FsmError::TransitionFailure {
                    transition: transition.name().to_string(),
                    kind,
                    message,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateDecl, TransitionDecl, TransitionMapBuilder};
    use crate::core::{action_fn, ActionError, BasicEvent, Guard, StateKind};

    type Log = Vec<String>;

    fn trace(label: &str) -> crate::core::ActionRef<Log> {
        let label = label.to_string();
        action_fn(move |_, entity: &mut Log, _, _| {
            entity.push(label.clone());
            Ok(())
        })
    }

    // START -> WORKING -> DONE on "go" / "done" payloads.
    fn linear_machine() -> StateMachine<Log> {
        let mut builder = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let working = builder
            .add_state(
                StateDecl::new("WORKING", StateKind::Active)
                    .on_entry(trace("entry:WORKING"))
                    .on_exit(trace("exit:WORKING")),
            )
            .unwrap();
        let done = builder
            .add_state(StateDecl::new("DONE", StateKind::End).on_entry(trace("entry:DONE")))
            .unwrap();

        builder
            .add_transition(
                TransitionDecl::new("begin")
                    .from(start)
                    .to(working)
                    .action(trace("action:begin")),
            )
            .unwrap();
        builder
            .add_transition(
                TransitionDecl::new("finish")
                    .from(working)
                    .to(done)
                    .guard(Guard::regex("done").unwrap())
                    .action(trace("action:finish")),
            )
            .unwrap();

        StateMachine::new(Arc::new(builder.build().unwrap()), Vec::new())
    }

    #[test]
    fn events_drive_the_machine_to_its_end_state() {
        let machine = linear_machine();
        assert_eq!(machine.state().name(), "START");

        machine.apply_event(&BasicEvent::new("x".to_string())).unwrap();
        assert_eq!(machine.state().name(), "WORKING");
        assert!(!machine.is_end());

        machine
            .apply_event(&BasicEvent::new("done".to_string()))
            .unwrap();
        assert_eq!(machine.state().name(), "DONE");
        assert!(machine.is_end());
    }

    #[test]
    fn actions_fire_in_exit_transition_entry_order() {
        let machine = linear_machine();
        machine.apply_event(&BasicEvent::new("x".to_string())).unwrap();
        machine
            .apply_event(&BasicEvent::new("done".to_string()))
            .unwrap();

        let log = machine.with_entity(|e| e.clone());
        assert_eq!(
            log,
            vec![
                "action:begin",
                "entry:WORKING",
                "exit:WORKING",
                "action:finish",
                "entry:DONE",
            ]
        );
    }

    #[test]
    fn history_records_each_committed_hop() {
        let machine = linear_machine();
        machine.apply_event(&BasicEvent::new("x".to_string())).unwrap();
        machine
            .apply_event(&BasicEvent::new("done".to_string()))
            .unwrap();

        let history = machine.history();
        assert_eq!(history.path(), vec!["START", "WORKING", "DONE"]);
        assert_eq!(history.records()[0].transition, "begin");
    }

    #[test]
    fn self_transition_fires_only_the_transition_action() {
        let mut builder = TransitionMapBuilder::new();
        let start = builder
            .add_state(
                StateDecl::new("START", StateKind::Start)
                    .on_entry(trace("entry:START"))
                    .on_exit(trace("exit:START")),
            )
            .unwrap();
        let end = builder
            .add_state(StateDecl::new("END", StateKind::End))
            .unwrap();
        builder
            .add_transition(
                TransitionDecl::new("tick")
                    .from(start)
                    .to(start)
                    .guard(Guard::regex("tick").unwrap())
                    .action(trace("action:tick")),
            )
            .unwrap();
        builder
            .add_transition(TransitionDecl::new("finish").from(start).to(end))
            .unwrap();
        let machine = StateMachine::new(Arc::new(builder.build().unwrap()), Vec::new());

        machine
            .apply_event(&BasicEvent::new("tick".to_string()))
            .unwrap();

        assert_eq!(machine.state().name(), "START");
        assert_eq!(machine.with_entity(|e| e.clone()), vec!["action:tick"]);
        // No state change, no listener-visible transition.
        assert!(machine.history().is_empty());
    }

    #[test]
    fn rollback_preserves_state_and_suppresses_notification() {
        let mut builder: TransitionMapBuilder<Log> = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let end = builder
            .add_state(StateDecl::new("END", StateKind::End))
            .unwrap();
        builder
            .add_transition(
                TransitionDecl::new("finish")
                    .from(start)
                    .to(end)
                    .action(action_fn(|_, _, _, _| {
                        Err(ActionError::rollback("not ready"))
                    })),
            )
            .unwrap();
        let machine = StateMachine::new(Arc::new(builder.build().unwrap()), Vec::new());

        let err = machine.apply_event(&BasicEvent::empty()).unwrap_err();
        assert!(matches!(err, FsmError::TransitionRollback { .. }));
        assert_eq!(machine.state().name(), "START");
        assert!(machine.history().is_empty());
    }

    #[test]
    fn failure_diverts_to_the_error_state_and_is_reraised() {
        let mut builder = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let end = builder
            .add_state(StateDecl::new("END", StateKind::End))
            .unwrap();
        let failed = builder
            .add_state(StateDecl::new("FAILED", StateKind::End).on_entry(trace("entry:FAILED")))
            .unwrap();
        builder.set_error_state(failed).unwrap();
        builder
            .add_transition(
                TransitionDecl::new("finish")
                    .from(start)
                    .to(end)
                    .action(action_fn(|_, _, _, _| {
                        Err(ActionError::failure("broken"))
                    })),
            )
            .unwrap();
        let machine = StateMachine::new(Arc::new(builder.build().unwrap()), Vec::new());

        let err = machine.apply_event(&BasicEvent::empty()).unwrap_err();
        assert!(matches!(err, FsmError::TransitionFailure { .. }));
        assert_eq!(machine.state().name(), "FAILED");
        assert_eq!(machine.with_entity(|e| e.clone()), vec!["entry:FAILED"]);
        assert_eq!(machine.history().path(), vec!["START", "FAILED"]);
    }

    #[test]
    fn failure_without_error_state_becomes_generic_failure() {
        let mut builder: TransitionMapBuilder<Log> = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let end = builder
            .add_state(StateDecl::new("END", StateKind::End))
            .unwrap();
        builder
            .add_transition(
                TransitionDecl::new("finish")
                    .from(start)
                    .to(end)
                    .action(action_fn(|_, _, _, _| {
                        Err(ActionError::failure("broken"))
                    })),
            )
            .unwrap();
        let machine = StateMachine::new(Arc::new(builder.build().unwrap()), Vec::new());

        let err = machine.apply_event(&BasicEvent::empty()).unwrap_err();
        assert!(matches!(err, FsmError::Failure { .. }));
        assert_eq!(machine.state().name(), "START");
    }

    #[test]
    fn forward_chaining_runs_through_matching_states() {
        let mut builder = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let middle = builder
            .add_state(StateDecl::new("MIDDLE", StateKind::Active))
            .unwrap();
        let end = builder
            .add_state(StateDecl::new("END", StateKind::End))
            .unwrap();
        builder
            .add_transition(
                TransitionDecl::new("first")
                    .from(start)
                    .to(middle)
                    .action(trace("action:first")),
            )
            .unwrap();
        builder
            .add_transition(
                TransitionDecl::new("second")
                    .from(middle)
                    .to(end)
                    .action(trace("action:second")),
            )
            .unwrap();
        let machine = StateMachine::new(Arc::new(builder.build().unwrap()), Vec::new());
        machine.set_forward_chain_enabled(true);

        machine.apply_event(&BasicEvent::empty()).unwrap();

        // One event, two hops; the chain ends quietly at END.
        assert_eq!(machine.state().name(), "END");
        assert_eq!(
            machine.with_entity(|e| e.clone()),
            vec!["action:first", "action:second"]
        );
    }

    #[test]
    fn max_transitions_bound_trips() {
        let mut builder: TransitionMapBuilder<Log> = TransitionMapBuilder::new();
        let start = builder
            .add_state(StateDecl::new("START", StateKind::Start))
            .unwrap();
        let end = builder
            .add_state(StateDecl::new("END", StateKind::End))
            .unwrap();
        builder
            .add_transition(
                TransitionDecl::new("loop")
                    .from(start)
                    .to(start)
                    .guard(Guard::regex("tick").unwrap()),
            )
            .unwrap();
        builder
            .add_transition(TransitionDecl::new("finish").from(start).to(end))
            .unwrap();
        let machine = StateMachine::new(Arc::new(builder.build().unwrap()), Vec::new());
        machine.set_max_transitions(2);

        let tick = BasicEvent::new("tick".to_string());
        machine.apply_event(&tick).unwrap();
        machine.apply_event(&tick).unwrap();
        let err = machine.apply_event(&tick).unwrap_err();
        assert!(matches!(
            err,
            FsmError::MaxTransitionsExceeded { count: 3, .. }
        ));
    }

    #[test]
    fn listeners_run_in_registration_order_and_can_be_removed() {
        struct Tagged {
            tag: &'static str,
            seen: Mutex<Vec<String>>,
        }
        impl StateChangeListener<Log> for Tagged {
            fn state_changed(&self, _: &Log, old: &State, new: &State) {
                self.seen.lock().push(format!("{}:{}->{}", self.tag, old, new));
            }
        }

        let machine = linear_machine();
        let first = Arc::new(Tagged {
            tag: "a",
            seen: Mutex::new(Vec::new()),
        });
        let second = Arc::new(Tagged {
            tag: "b",
            seen: Mutex::new(Vec::new()),
        });
        machine.add_listener(first.clone());
        machine.add_listener(second.clone());

        machine.apply_event(&BasicEvent::new("x".to_string())).unwrap();
        assert_eq!(first.seen.lock().as_slice(), ["a:START->WORKING"]);
        assert_eq!(second.seen.lock().as_slice(), ["b:START->WORKING"]);

        let second_dyn: Arc<dyn StateChangeListener<Log>> = second.clone();
        assert!(machine.remove_listener(&second_dyn));
        assert!(!machine.remove_listener(&second_dyn));

        machine
            .apply_event(&BasicEvent::new("done".to_string()))
            .unwrap();
        assert_eq!(first.seen.lock().len(), 2);
        assert_eq!(second.seen.lock().len(), 1);
    }

    #[test]
    fn cancelled_token_interrupts_without_committing() {
        let machine = linear_machine();
        let token = CancelToken::new();
        token.cancel();

        let err = machine
            .apply_event_cancellable(&BasicEvent::new("x".to_string()), &token)
            .unwrap_err();
        assert!(matches!(err, FsmError::Interrupted));
        assert_eq!(machine.state().name(), "START");
    }
}
