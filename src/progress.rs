//! Progress notifications for a running conversion.
//!
//! The pipeline reports `(current, total, message)` through a
//! [`ProgressObserver`]. An observer can be a closure, a Tokio channel
//! sender, or any type implementing the trait, so the library never needs to
//! know whether the host is a terminal, a GUI, or a web socket.
//!
//! Events are emitted before the source is opened (`0/0`), before each page's
//! OCR attempt, on every escalation transition, and once more when the
//! document completes.
//!
//! # Example
//!
//! ```rust
//! use searchable_pdf::{ProgressEvent, ProgressObserver};
//! use std::sync::{Arc, Mutex};
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&log);
//! let observer = move |event: &ProgressEvent| {
//!     sink.lock().unwrap().push(event.message.clone());
//! };
//!
//! observer.on_progress(&ProgressEvent::new(1, 3, "Processing page 1/3..."));
//! assert_eq!(log.lock().unwrap().len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// One progress notification. `total == 0` means the page count is not known yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
        }
    }

    /// Completed fraction in `[0, 1]`; 0 while the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Receives progress events from the pipeline.
///
/// Implementations must be `Send + Sync`: the document run executes on a
/// blocking worker thread, not on the caller's thread.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards events into a Tokio channel. A closed receiver is ignored.
impl ProgressObserver for UnboundedSender<ProgressEvent> {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.send(event.clone());
    }
}

/// A no-op observer for callers that don't need progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Shared observer handle.
pub type SharedObserver = Arc<dyn ProgressObserver>;
