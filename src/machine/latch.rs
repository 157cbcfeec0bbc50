//! Blocking wait for a state machine to reach a target state.
//!
//! A latch registers itself as a state-change listener and consumes state
//! notifications until the expected state (or, optionally, the error
//! state) shows up. Waiting for a composite state matches any of its
//! sub-states, since qualified names of sub-states extend the parent's.

use crate::core::{State, StateId};
use crate::machine::state_machine::{StateChangeListener, StateMachine};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Internal listener feeding observed states into the latch's channel.
pub(crate) struct LatchListener {
    tx: Sender<StateId>,
}

impl LatchListener {
    pub(crate) fn channel() -> (LatchListener, Receiver<StateId>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (LatchListener { tx }, rx)
    }

    pub(crate) fn push(&self, state: StateId) {
        let _ = self.tx.send(state);
    }
}

impl<E> StateChangeListener<E> for LatchListener {
    fn state_changed(&self, _entity: &E, _old: &State, new: &State) {
        let _ = self.tx.send(new.id());
    }
}

/// Waits for a machine to reach an expected state or the error state.
///
/// Created through
/// [`StateMachine::create_state_transition_latch`]; the machine's current
/// state at creation time is already in the latch's queue, so a machine
/// that is already where the caller wants it completes immediately.
pub struct StateTransitionLatch<E> {
    machine: Arc<StateMachine<E>>,
    expected: StateId,
    end_on_error: bool,
    receiver: Receiver<StateId>,
    listener: Arc<LatchListener>,
    current: Option<StateId>,
    done: bool,
    reached_expected: bool,
    reached_error: bool,
}

impl<E> StateTransitionLatch<E> {
    pub(crate) fn new(
        machine: Arc<StateMachine<E>>,
        expected: StateId,
        end_on_error: bool,
        receiver: Receiver<StateId>,
        listener: Arc<LatchListener>,
    ) -> Self {
        StateTransitionLatch {
            machine,
            expected,
            end_on_error,
            receiver,
            listener,
            current: None,
            done: false,
            reached_expected: false,
            reached_error: false,
        }
    }

    /// True if the latch completed, for either reason.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// True if the expected state was reached.
    pub fn is_expected(&self) -> bool {
        self.reached_expected
    }

    /// True if the latch completed by reaching the error state.
    pub fn is_error(&self) -> bool {
        self.reached_error
    }

    /// The most recent state observed by the latch.
    pub fn current_state(&self) -> Option<&State> {
        self.current.map(|id| self.machine.map().state(id))
    }

    /// Block until the machine reaches the expected state (or any of its
    /// sub-states), or the error state when `end_on_error` was requested.
    ///
    /// Returns the terminal state, or `None` if the feed was severed. The
    /// internal listener is removed on every exit path.
    pub fn wait(&mut self) -> Option<&State> {
        let outcome = loop {
            match self.receiver.recv() {
                Ok(state) => {
                    if self.examine(state) {
                        break Some(state);
                    }
                }
                Err(_) => break None,
            }
        };
        self.finish(outcome)
    }

    /// Like [`wait`](StateTransitionLatch::wait), but gives up after
    /// `timeout` and returns `None` with the latch not done.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<&State> {
        let deadline = Instant::now() + timeout;
        let outcome = loop {
            match self.receiver.recv_deadline(deadline) {
                Ok(state) => {
                    if self.examine(state) {
                        break Some(state);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    break None
                }
            }
        };
        self.finish(outcome)
    }

    fn examine(&mut self, state: StateId) -> bool {
        self.current = Some(state);
        let map = self.machine.map();
        let observed = map.state(state).name();
        // Prefix match so waiting on a composite accepts its sub-states.
        if observed.starts_with(map.state(self.expected).name()) {
            self.done = true;
            self.reached_expected = true;
            return true;
        }
        if self.end_on_error && map.error_state_id() == Some(state) {
            self.done = true;
            self.reached_error = true;
            return true;
        }
        false
    }

    fn finish(&mut self, outcome: Option<StateId>) -> Option<&State> {
        let listener: Arc<dyn StateChangeListener<E>> = self.listener.clone();
        self.machine.remove_listener(&listener);
        outcome.map(|id| self.machine.map().state(id))
    }
}
