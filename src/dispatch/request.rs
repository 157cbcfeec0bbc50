//! Pending event submissions.
//!
//! An [`EventRequest`] is the future half of a dispatcher submission: it
//! carries the event, tracks cancellation, and delivers the final
//! [`EventStatus`] to waiters. The status field is written exactly once.

use crate::dispatch::status::EventStatus;
use crate::core::Event;
use crate::machine::CancelToken;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Client data attached to a completed request by the completion listener
/// or the submitter.
pub type Annotation = Box<dyn Any + Send>;

/// Cancellation hook back into the dispatcher owning a request.
pub(crate) trait ActiveCanceller: Send + Sync {
    fn cancel_active(&self, request: &EventRequest, may_interrupt: bool) -> bool;
}

struct RequestState {
    started: bool,
    cancel_requested: bool,
    status: Option<EventStatus>,
    annotation: Option<Annotation>,
}

/// A submitted event and its eventual status.
///
/// Obtained from [`EventDispatcher::put`](crate::dispatch::EventDispatcher::put);
/// behaves like a future with blocking `get` and cooperative cancellation.
pub struct EventRequest {
    event: Arc<dyn Event>,
    canceller: Weak<dyn ActiveCanceller>,
    token: CancelToken,
    state: Mutex<RequestState>,
    completed: Condvar,
}

impl EventRequest {
    pub(crate) fn new(event: Arc<dyn Event>, canceller: Weak<dyn ActiveCanceller>) -> Self {
        EventRequest {
            event,
            canceller,
            token: CancelToken::new(),
            state: Mutex::new(RequestState {
                started: false,
                cancel_requested: false,
                status: None,
                annotation: None,
            }),
            completed: Condvar::new(),
        }
    }

    /// The event this request was created for.
    pub fn event(&self) -> &dyn Event {
        self.event.as_ref()
    }

    pub(crate) fn event_handle(&self) -> &Arc<dyn Event> {
        &self.event
    }

    /// Token tripped when the running request is interrupted.
    pub(crate) fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Block until the status is published.
    pub fn get(&self) -> EventStatus {
        let mut state = self.state.lock();
        loop {
            if let Some(status) = &state.status {
                return status.clone();
            }
            self.completed.wait(&mut state);
        }
    }

    /// Block until the status is published or `timeout` elapses.
    pub fn get_timeout(&self, timeout: Duration) -> Option<EventStatus> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(status) = &state.status {
                return Some(status.clone());
            }
            if self.completed.wait_until(&mut state, deadline).timed_out() {
                return state.status.clone();
            }
        }
    }

    /// Cancel this request.
    ///
    /// A request that has not started is flagged and will be reported as
    /// cancelled when dequeued, without firing any action. A finished
    /// request cannot be cancelled. A running request is cancelled only
    /// when `may_interrupt` permits interrupting the worker.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        {
            let mut state = self.state.lock();
            if state.status.is_some() {
                return false;
            }
            if !state.started {
                state.cancel_requested = true;
                return true;
            }
        }
        match self.canceller.upgrade() {
            Some(dispatcher) => dispatcher.cancel_active(self, may_interrupt),
            None => false,
        }
    }

    /// True once the status has been published.
    pub fn is_done(&self) -> bool {
        self.state.lock().status.is_some()
    }

    /// True if the published status says the event was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state
            .lock()
            .status
            .as_ref()
            .is_some_and(|s| s.is_cancelled())
    }

    /// True if cancellation was requested; it may not have been processed
    /// yet.
    pub fn is_cancel_requested(&self) -> bool {
        self.state.lock().cancel_requested
    }

    /// Attach client data to this request.
    pub fn set_annotation(&self, annotation: Annotation) {
        self.state.lock().annotation = Some(annotation);
    }

    /// Remove and return the client data attached to this request.
    pub fn take_annotation(&self) -> Option<Annotation> {
        self.state.lock().annotation.take()
    }

    pub(crate) fn mark_started(&self) {
        self.state.lock().started = true;
    }

    pub(crate) fn request_cancel(&self) {
        self.state.lock().cancel_requested = true;
    }

    /// Publish the final status and wake all waiters. Write-once: later
    /// calls are ignored.
    pub(crate) fn publish(&self, status: EventStatus) {
        let mut state = self.state.lock();
        if state.status.is_none() {
            state.status = Some(status);
            self.completed.notify_all();
        }
    }
}
