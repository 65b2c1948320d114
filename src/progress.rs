//! Progress-callback trait for workflow runs.
//!
//! Pass an [`Arc<dyn WorkflowProgressCallback>`] to
//! [`crate::workflow::run_workflow`] to receive events as the server reports
//! them. Callers can forward them to a terminal progress bar, a log, or
//! their own view state. All methods default to no-ops.
//!
//! # Example
//!
//! ```rust
//! use fileforge::WorkflowProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl WorkflowProgressCallback for CountingCallback {
//!     fn on_step_complete(&self, step: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("step {} done ({} so far)", step + 1, done);
//!     }
//! }
//! ```

use crate::api::ActionResult;
use crate::error::RecordError;
use std::sync::Arc;

/// Called by the workflow runner as the event stream is consumed.
pub trait WorkflowProgressCallback: Send + Sync {
    /// Called once after validation, before the request is sent.
    fn on_run_start(&self, total_steps: usize) {
        let _ = total_steps;
    }

    /// Step `step` (0-indexed) started; `label` is the server's echo.
    fn on_step_start(&self, step: usize, label: &str, total_steps: usize) {
        let _ = (step, label, total_steps);
    }

    fn on_step_complete(&self, step: usize) {
        let _ = step;
    }

    /// The status panel text changed, e.g. `"Processing: Resize Image\nStep 2 of 3"`.
    fn on_status(&self, text: &str) {
        let _ = text;
    }

    /// A record was malformed or refused; the run continues.
    fn on_record_skipped(&self, error: &RecordError) {
        let _ = error;
    }

    /// The server produced the final file.
    fn on_complete(&self, result: &ActionResult) {
        let _ = result;
    }

    /// The run failed (server `error` event, transport failure, rejection
    /// before streaming began).
    fn on_error(&self, detail: &str) {
        let _ = detail;
    }

    /// Step visuals have returned to neutral after a successful run.
    fn on_states_cleared(&self) {}
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl WorkflowProgressCallback for NoopProgressCallback {}

/// Convenience alias for a shared callback.
pub type ProgressCallback = Arc<dyn WorkflowProgressCallback>;
