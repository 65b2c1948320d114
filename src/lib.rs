//! # fileforge
//!
//! Client library for the File Forge conversion service: PDF tools, image
//! tools and multi-step workflows whose progress is streamed back as events.
//!
//! ## Why this crate?
//!
//! The service does all of the heavy lifting server-side. What is left for a
//! client is still easy to get subtly wrong: credentials must ride on every
//! request (as a header, or a query parameter for plain download links),
//! a `401`/`403` must turn into a login prompt rather than a generic failure,
//! and the workflow's chunked event stream must be reassembled into records
//! regardless of where the network splits it. This crate does that once,
//! behind a typed API, and keeps the per-step progress in an explicit state
//! machine that front ends can render from.
//!
//! ## Workflow Overview
//!
//! ```text
//! file + steps
//!  │
//!  ├─ 1. Validate   input file present, steps configured
//!  ├─ 2. Submit     one multipart POST (file + JSON step list)
//!  ├─ 3. Frame      split the body on blank lines into records
//!  ├─ 4. Decode     `data:` payload → step_start / step_complete / complete / error
//!  ├─ 5. Board      pending → processing → completed per step and arrow
//!  └─ 6. Result     "{message}: {filename}" + authenticated download link
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileforge::{ClientConfig, ForgeClient, NoopProgressCallback, StepBoard, StepKind, Workflow};
//! use fileforge::files::{pick, FileKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ForgeClient::new(ClientConfig::default())?;
//!     let input = pick("scan.pdf", FileKind::WorkflowInput)?;
//!
//!     let mut workflow = Workflow::new();
//!     workflow.add_palette_step(StepKind::PdfToWord);
//!
//!     let mut board = StepBoard::new(workflow.len());
//!     let result = fileforge::run_workflow(&client, Some(&input), &workflow, &mut board, &NoopProgressCallback).await?;
//!     println!("{}", result.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileforge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fileforge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod actions;
pub mod api;
pub mod auth;
pub mod config;
pub mod crop;
pub mod error;
pub mod files;
pub mod progress;
pub mod session;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use actions::{dispatch, Action, CropRect, ResizeSpec};
pub use api::ActionResult;
pub use auth::{CredentialStore, FileCredentialStore, ForgeClient, LoginPrompt, MemoryCredentialStore};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use crop::{AutoRegionWidget, CropAdapter, CropOptions, CropWidget};
pub use error::{ForgeError, RecordError};
pub use files::{FileKind, SelectedFile};
pub use progress::{NoopProgressCallback, ProgressCallback, WorkflowProgressCallback};
pub use session::{render_panel, ImageMode, Panel, PanelView, ResultView, Session, Tool};
pub use workflow::{run_workflow, ArrowState, RunState, StepBoard, StepKind, StepState, Workflow, WorkflowEvent};
