//! The workflow builder and its streamed execution.
//!
//! ```text
//! steps ──▶ runner ──▶ sse ──▶ events ──▶ board
//! (author)  (submit)   (frame) (decode)   (step states)
//! ```
//!
//! 1. [`steps`] ordered step descriptors, defaults and the config modal
//! 2. [`runner`] validate, submit one multipart request, follow the body
//! 3. [`sse`] split the chunked body into blank-line-delimited records
//! 4. [`events`] decode the `data:` payload of each record
//! 5. [`board`] `pending → processing → completed` per step and arrow

pub mod board;
pub mod events;
pub mod runner;
pub mod sse;
pub mod steps;

pub use board::{Applied, ArrowState, ProgressText, RunState, StepBoard, StepState};
pub use events::WorkflowEvent;
pub use runner::{
    decode_events, execute_stream, follow, hold_then_clear, run_workflow, start_and_follow, EventStream, StreamItem,
};
pub use steps::{ConfigInput, ConfigModal, StepConfig, StepId, StepKind, Workflow, WorkflowStep};
