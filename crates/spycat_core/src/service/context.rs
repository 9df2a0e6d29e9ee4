//! Per-call context passed explicitly into every service operation.
//!
//! # Responsibility
//! - Carry the caller's request id, optional deadline and optional cancel
//!   signal into nested storage and breed-lookup calls.
//!
//! # Invariants
//! - The effective deadline of an operation never exceeds the caller's.
//! - Once cancelled, a signal stays cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Explicit cancellation handle shared between a caller and its operation.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Raw flag for code that cannot hold the notifier (SQLite progress
    /// handlers).
    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Caller-scoped context for one service call.
#[derive(Debug, Clone)]
pub struct CallContext {
    request_id: String,
    deadline: Option<Instant>,
    cancel: Option<CancelSignal>,
}

impl CallContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new("-")
    }
}
