//! Wire types and endpoint paths of the File Forge HTTP API.
//!
//! The server is an external collaborator; nothing here knows how files are
//! converted. Its `filename`, `message` and `detail` strings are opaque.

use crate::error::ForgeError;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use serde::{Deserialize, Serialize};

pub const CONVERT_TO_WORD: &str = "api/pdf/convert-to-word";
pub const REMOVE_PASSWORD: &str = "api/pdf/remove-password";
pub const HEIC_TO_JPEG: &str = "api/image/heic-to-jpeg";
pub const RESIZE_IMAGE: &str = "api/image/resize";
pub const CROP_IMAGE: &str = "api/image/crop";
pub const WORKFLOW_EXECUTE: &str = "api/workflow/execute";
pub const DOWNLOAD: &str = "api/download";

/// Header carrying the credential on programmatic requests.
pub const API_KEY_HEADER: &str = "X-API-Key";
/// Query parameter carrying the credential on plain download links.
pub const API_KEY_QUERY: &str = "api_key";

/// Success body of every single-shot action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub filename: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ActionResult {
    /// Result panel text: `"{message}: {filename}"`.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.message, self.filename)
    }
}

/// JSON error body (`{"detail": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

/// True if the response declares a JSON body.
pub fn is_json(response: &Response) -> bool {
    content_type(response).is_some_and(|ct| ct.contains("application/json"))
}

/// True if the response declares a server-sent event stream.
pub fn is_event_stream(response: &Response) -> bool {
    content_type(response).is_some_and(|ct| ct.contains("text/event-stream"))
}

fn content_type(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Turn a non-success response into [`ForgeError::Server`].
///
/// JSON bodies contribute their `detail`; anything else is surfaced as text.
/// `fallback` is used when the JSON body carries no detail.
pub async fn error_from_response(response: Response, fallback: &str) -> ForgeError {
    let status = response.status().as_u16();
    let detail = if is_json(&response) {
        match response.json::<ErrorBody>().await {
            Ok(body) => body.detail.unwrap_or_else(|| fallback.to_string()),
            Err(e) => return ForgeError::Transport(e.to_string()),
        }
    } else {
        match response.text().await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback.to_string(),
            Err(e) => return ForgeError::Transport(e.to_string()),
        }
    };
    ForgeError::Server { status, detail }
}

/// Decode a single-shot action response.
pub async fn read_action_result(response: Response, fallback: &str) -> Result<ActionResult, ForgeError> {
    if response.status().is_success() {
        response
            .json::<ActionResult>()
            .await
            .map_err(|e| ForgeError::Transport(format!("unreadable result body: {e}")))
    } else {
        Err(error_from_response(response, fallback).await)
    }
}
