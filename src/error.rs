//! Error types for the fileforge client library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ForgeError`]: **Fatal.** The operation cannot proceed or has been
//!   aborted (no file chosen, credential rejected, server said no, the
//!   connection dropped). Returned as `Err(ForgeError)` from every
//!   request-issuing function.
//!
//! * [`RecordError`]: **Non-fatal.** One event record of a streamed workflow
//!   response could not be used (bad JSON, unknown event, a transition the
//!   step board refuses). The run keeps reading; the error is logged and
//!   handed to the progress callback.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fileforge library.
#[derive(Debug, Error)]
pub enum ForgeError {
    // ── Client-side validation ────────────────────────────────────────────
    /// A precondition failed before any request was built. The message is
    /// meant for the user verbatim.
    #[error("{0}")]
    Validation(String),

    /// The chosen file does not exist.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The chosen file exists but the picker does not accept it.
    #[error("{reason}")]
    InvalidFile { path: PathBuf, reason: String },

    // ── Authentication ────────────────────────────────────────────────────
    /// The server answered 401 or 403. The login prompt has already been
    /// shown by the time this is returned.
    #[error("Authentication required. Please enter your API Key.")]
    AuthRequired,

    // ── Server-reported failures ──────────────────────────────────────────
    /// Non-success HTTP status; `detail` is the JSON `detail` field or the
    /// plain-text body.
    #[error("{detail}")]
    Server { status: u16, detail: String },

    /// The workflow stream delivered an `error` event.
    #[error("{0}")]
    Workflow(String),

    /// The crop preview for a HEIC image could not be produced.
    #[error("Could not load HEIC preview: {0}")]
    PreviewFailed(String),

    // ── Transport ─────────────────────────────────────────────────────────
    /// Network failure, dropped stream or unreadable response body.
    #[error("{0}")]
    Transport(String),

    // ── Local I/O ─────────────────────────────────────────────────────────
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// True for the failures that happen before anything is sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ForgeError::Validation(_)
                | ForgeError::FileNotFound { .. }
                | ForgeError::InvalidFile { .. }
        )
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(e: reqwest::Error) -> Self {
        ForgeError::Transport(e.to_string())
    }
}

/// A non-fatal problem with a single event record of a workflow stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The `data:` payload was not a JSON event the client understands.
    #[error("malformed event record: {detail}")]
    Malformed { detail: String },

    /// The event was well-formed but the step board refused it
    /// (out-of-range index, or a transition that would skip or reverse).
    #[error("rejected event for step {step}: {detail}")]
    Rejected { step: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_required_display() {
        let msg = ForgeError::AuthRequired.to_string();
        assert_eq!(msg, "Authentication required. Please enter your API Key.");
    }

    #[test]
    fn server_error_displays_detail_verbatim() {
        let e = ForgeError::Server {
            status: 400,
            detail: "Incorrect password".into(),
        };
        assert_eq!(e.to_string(), "Incorrect password");
    }

    #[test]
    fn preview_failed_display() {
        let e = ForgeError::PreviewFailed("Preview generation failed".into());
        assert_eq!(
            e.to_string(),
            "Could not load HEIC preview: Preview generation failed"
        );
    }

    #[test]
    fn validation_classification() {
        assert!(ForgeError::Validation("x".into()).is_validation());
        assert!(ForgeError::FileNotFound { path: "a".into() }.is_validation());
        assert!(!ForgeError::AuthRequired.is_validation());
        assert!(!ForgeError::Transport("reset".into()).is_validation());
    }

    #[test]
    fn record_error_display() {
        let e = RecordError::Rejected {
            step: 2,
            detail: "already completed".into(),
        };
        assert!(e.to_string().contains("step 2"));
    }
}
