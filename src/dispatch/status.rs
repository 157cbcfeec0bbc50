//! Outcome of one dispatched event.

use crate::core::FsmError;
use std::sync::Arc;

/// Final status of an event request: applied, cancelled, or failed.
///
/// Exactly one status is published per request, and publishing it is what
/// releases anyone blocked in
/// [`EventRequest::get`](crate::dispatch::EventRequest::get).
#[derive(Clone, Debug)]
pub struct EventStatus {
    successful: bool,
    cancelled: bool,
    error: Option<Arc<FsmError>>,
}

impl EventStatus {
    pub(crate) fn success() -> Self {
        EventStatus {
            successful: true,
            cancelled: false,
            error: None,
        }
    }

    pub(crate) fn cancelled(error: Option<Arc<FsmError>>) -> Self {
        EventStatus {
            successful: false,
            cancelled: true,
            error,
        }
    }

    pub(crate) fn failed(error: Arc<FsmError>) -> Self {
        EventStatus {
            successful: false,
            cancelled: false,
            error: Some(error),
        }
    }

    /// True if the event was applied to the machine without error.
    pub fn is_successful(&self) -> bool {
        self.successful
    }

    /// True if the event was cancelled, before or during execution.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The failure or interruption cause, if any.
    pub fn error(&self) -> Option<&FsmError> {
        self.error.as_deref()
    }
}
