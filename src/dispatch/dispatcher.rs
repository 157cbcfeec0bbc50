//! Serialized off-thread event delivery.
//!
//! The dispatcher owns a FIFO queue of event requests and a single worker
//! thread that applies them to a state machine one at a time. Out-of-band
//! events preempt everything already queued or executing; the purge and
//! the enqueue happen under one lock so no normal event can slip in
//! between.

use crate::core::{Event, FsmError};
use crate::dispatch::request::{ActiveCanceller, Annotation, EventRequest};
use crate::dispatch::status::EventStatus;
use crate::machine::StateMachine;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Callback invoked by the worker after every event, including cancelled
/// ones. The returned annotation, if any, is stored on the request.
pub trait EventCompletionListener: Send {
    fn on_completion(&mut self, event: &dyn Event, status: &EventStatus) -> Option<Annotation>;
}

struct Queue {
    pending: VecDeque<Arc<EventRequest>>,
    current: Option<Arc<EventRequest>>,
    shutdown: bool,
}

struct Shared<E> {
    machine: Arc<StateMachine<E>>,
    queue: Mutex<Queue>,
    available: Condvar,
    listener: Mutex<Option<Box<dyn EventCompletionListener>>>,
}

/// Queued, serialized event delivery to one state machine.
///
/// Requests submitted before [`start`](EventDispatcher::start) accumulate
/// and are processed once the worker runs. Dropping the dispatcher stops
/// it.
pub struct EventDispatcher<E: Send + 'static> {
    shared: Arc<Shared<E>>,
    worker: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> EventDispatcher<E> {
    pub fn new(machine: Arc<StateMachine<E>>) -> Self {
        EventDispatcher {
            shared: Arc::new(Shared {
                machine,
                queue: Mutex::new(Queue {
                    pending: VecDeque::new(),
                    current: None,
                    shutdown: false,
                }),
                available: Condvar::new(),
                listener: Mutex::new(None),
            }),
            worker: None,
        }
    }

    /// Install the completion callback.
    pub fn set_listener(&self, listener: impl EventCompletionListener + 'static) {
        *self.shared.listener.lock() = Some(Box::new(listener));
    }

    /// True while the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Queue an event for processing and return its request.
    ///
    /// An event carrying the out-of-band marker is rerouted through
    /// [`put_out_of_band`](EventDispatcher::put_out_of_band).
    pub fn put(&self, event: Arc<dyn Event>) -> Arc<EventRequest> {
        if event.is_out_of_band() {
            self.put_out_of_band(event)
        } else {
            let mut queue = self.shared.queue.lock();
            self.enqueue(&mut queue, event)
        }
    }

    /// Cancel every pending and executing request, then queue `event`.
    ///
    /// Both steps happen under the queue lock, so at the moment the new
    /// request starts executing every earlier normal request has already
    /// been cancelled or has completed.
    pub fn put_out_of_band(&self, event: Arc<dyn Event>) -> Arc<EventRequest> {
        let mut queue = self.shared.queue.lock();
        Self::cancel_all(&mut queue);
        self.enqueue(&mut queue, event)
    }

    /// Cancel `request` if it is the one currently executing and
    /// interruption is permitted.
    pub fn cancel_active(&self, request: &Arc<EventRequest>, may_interrupt: bool) -> bool {
        self.shared.cancel_active(request, may_interrupt)
    }

    /// Spawn the worker thread under the given name.
    pub fn start(&mut self, name: &str) -> Result<(), FsmError> {
        if self.worker.is_some() {
            return Err(FsmError::failure("dispatcher thread already started"));
        }
        debug!(thread = name, "starting event dispatcher");
        self.shared.queue.lock().shutdown = false;
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(shared))
            .map_err(|e| FsmError::failure_with("failed to spawn dispatcher thread", e))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Cancel everything outstanding and join the worker.
    ///
    /// Every request still in the queue gets a cancelled status published,
    /// so no waiter hangs across a stop.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        info!("requesting dispatcher thread termination");
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            Self::cancel_all(&mut queue);
            self.shared.available.notify_all();
        }
        if handle.join().is_err() {
            error!("dispatcher thread terminated by panic");
        }
    }

    fn enqueue(&self, queue: &mut Queue, event: Arc<dyn Event>) -> Arc<EventRequest> {
        let canceller: Arc<dyn ActiveCanceller> = self.shared.clone() as Arc<dyn ActiveCanceller>;
        let request = Arc::new(EventRequest::new(event, Arc::downgrade(&canceller)));
        queue.pending.push_back(Arc::clone(&request));
        self.shared.available.notify_all();
        request
    }

    fn cancel_all(queue: &mut Queue) {
        for request in &queue.pending {
            request.request_cancel();
        }
        if let Some(current) = &queue.current {
            current.token().cancel();
        }
    }
}

impl<E: Send + 'static> Drop for EventDispatcher<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<E: Send + 'static> ActiveCanceller for Shared<E> {
    fn cancel_active(&self, request: &EventRequest, may_interrupt: bool) -> bool {
        let queue = self.queue.lock();
        match &queue.current {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), request) && may_interrupt => {
                current.token().cancel();
                true
            }
            _ => false,
        }
    }
}

impl<E: Send + 'static> Shared<E> {
    fn cancel_active(&self, request: &Arc<EventRequest>, may_interrupt: bool) -> bool {
        ActiveCanceller::cancel_active(self, request.as_ref(), may_interrupt)
    }

    /// Apply one request to the machine and publish its status.
    fn process(&self, request: &Arc<EventRequest>) {
        let status = if request.is_cancel_requested() {
            debug!("skipping cancelled event");
            EventStatus::cancelled(None)
        } else {
            request.mark_started();
            match self
                .machine
                .apply_event_cancellable(request.event(), request.token())
            {
                Ok(()) => EventStatus::success(),
                Err(FsmError::Interrupted) => {
                    debug!("event processing interrupted");
                    EventStatus::cancelled(Some(Arc::new(FsmError::Interrupted)))
                }
                Err(e) => {
                    debug!(error = %e, "failed to apply event");
                    EventStatus::failed(Arc::new(e))
                }
            }
        };
        self.complete(request, status);
    }

    /// Run the completion listener, then publish the status. The status
    /// write comes last and must happen even if the listener misbehaves.
    fn complete(&self, request: &Arc<EventRequest>, status: EventStatus) {
        {
            let mut listener = self.listener.lock();
            if let Some(listener) = listener.as_mut() {
                let event = Arc::clone(request.event_handle());
                match catch_unwind(AssertUnwindSafe(|| {
                    listener.on_completion(event.as_ref(), &status)
                })) {
                    Ok(Some(annotation)) => request.set_annotation(annotation),
                    Ok(None) => {}
                    Err(_) => error!("unexpected panic in event completion listener"),
                }
            }
        }
        request.publish(status);
    }
}

fn worker_loop<E: Send + 'static>(shared: Arc<Shared<E>>) {
    info!("event dispatcher running");
    loop {
        let next = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    break None;
                }
                if let Some(request) = queue.pending.pop_front() {
                    queue.current = Some(Arc::clone(&request));
                    break Some(request);
                }
                shared.available.wait(&mut queue);
            }
        };

        let Some(request) = next else {
            break;
        };
        shared.process(&request);
        shared.queue.lock().current = None;
    }

    // Publish a terminal status for everything still queued so no waiter
    // hangs across a stop.
    let drained: Vec<_> = {
        let mut queue = shared.queue.lock();
        queue.current = None;
        queue.pending.drain(..).collect()
    };
    for request in drained {
        shared.complete(&request, EventStatus::cancelled(None));
    }
    info!("dispatcher thread terminating");
}
