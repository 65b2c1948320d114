//! Single-shot action dispatchers.
//!
//! Each [`Action`] knows its endpoint, the multipart fields it adds next to
//! the `file` part, the status text shown while it runs, and the client-side
//! checks that must pass before anything is sent. [`dispatch`] is the one
//! code path that turns an action and a selected file into a request.

use crate::api::{self, ActionResult};
use crate::auth::ForgeClient;
use crate::error::ForgeError;
use crate::files::{FileKind, SelectedFile};
use reqwest::multipart::Form;
use tracing::{debug, info};

/// How an image should be resized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeSpec {
    /// Explicit pixel size; at least one side must be given.
    Dimensions {
        width: Option<u32>,
        height: Option<u32>,
    },
    /// Scale both sides by a percentage.
    Percentage(u32),
    /// Re-encode until the file is at most this many kilobytes.
    TargetSize { kb: Option<u32> },
}

impl ResizeSpec {
    /// Value of the `mode` form field.
    pub fn mode(&self) -> &'static str {
        match self {
            ResizeSpec::Dimensions { .. } => "dimensions",
            ResizeSpec::Percentage(_) => "percentage",
            ResizeSpec::TargetSize { .. } => "target_size",
        }
    }
}

/// Integer crop rectangle in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A conversion the server performs on one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ConvertToWord {
        use_ai: bool,
        password: Option<String>,
    },
    RemovePassword {
        password: String,
    },
    HeicToJpeg {
        quality: u8,
    },
    Resize(ResizeSpec),
    Crop(CropRect),
}

impl Action {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Action::ConvertToWord { .. } => api::CONVERT_TO_WORD,
            Action::RemovePassword { .. } => api::REMOVE_PASSWORD,
            Action::HeicToJpeg { .. } => api::HEIC_TO_JPEG,
            Action::Resize(_) => api::RESIZE_IMAGE,
            Action::Crop(_) => api::CROP_IMAGE,
        }
    }

    /// Which picker the input file must have passed.
    pub fn input_kind(&self) -> FileKind {
        match self {
            Action::ConvertToWord { .. } | Action::RemovePassword { .. } => FileKind::Pdf,
            _ => FileKind::Image,
        }
    }

    /// Text for the status panel while the request is in flight.
    pub fn status_text(&self) -> &'static str {
        match self {
            Action::ConvertToWord { use_ai: true, .. } => {
                "Analyzing layout with AI (this may take a while)..."
            }
            Action::ConvertToWord { use_ai: false, .. } => "Converting PDF to Word...",
            Action::RemovePassword { .. } => "Removing password...",
            Action::HeicToJpeg { .. } => "Converting HEIC to JPEG...",
            Action::Resize(_) => "Resizing image...",
            Action::Crop(_) => "Cropping image...",
        }
    }

    fn fallback_error(&self) -> &'static str {
        match self {
            Action::ConvertToWord { .. } => "Conversion failed",
            Action::RemovePassword { .. } => "Password removal failed",
            Action::HeicToJpeg { .. } => "Conversion failed",
            Action::Resize(_) => "Resize failed",
            Action::Crop(_) => "Crop failed",
        }
    }

    /// Client-side checks; a failure means no request is made.
    pub fn validate(&self) -> Result<(), ForgeError> {
        let fail = |msg: &str| Err(ForgeError::Validation(msg.to_string()));
        match self {
            Action::RemovePassword { password } if password.is_empty() => {
                fail("Please enter a password.")
            }
            Action::Resize(ResizeSpec::Dimensions {
                width: None,
                height: None,
            }) => fail("Please enter at least width or height."),
            Action::Resize(ResizeSpec::TargetSize { kb: None }) => {
                fail("Please enter a target size.")
            }
            _ => Ok(()),
        }
    }

    /// Form fields other than `file`, in submission order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Action::ConvertToWord { use_ai, password } => {
                let mut f = vec![("use_ai", use_ai.to_string())];
                if let Some(p) = password.as_ref().filter(|p| !p.is_empty()) {
                    f.push(("password", p.clone()));
                }
                f
            }
            Action::RemovePassword { password } => vec![("password", password.clone())],
            Action::HeicToJpeg { quality } => vec![("quality", quality.to_string())],
            Action::Resize(spec) => {
                let mut f = vec![("mode", spec.mode().to_string())];
                match spec {
                    ResizeSpec::Dimensions { width, height } => {
                        if let Some(w) = width {
                            f.push(("width", w.to_string()));
                        }
                        if let Some(h) = height {
                            f.push(("height", h.to_string()));
                        }
                    }
                    ResizeSpec::Percentage(p) => f.push(("percentage", p.to_string())),
                    ResizeSpec::TargetSize { kb } => {
                        if let Some(kb) = kb {
                            f.push(("target_size_kb", kb.to_string()));
                        }
                    }
                }
                f
            }
            Action::Crop(r) => vec![
                ("x", r.x.to_string()),
                ("y", r.y.to_string()),
                ("width", r.width.to_string()),
                ("height", r.height.to_string()),
            ],
        }
    }
}

/// Submit `action` against the selected file.
///
/// Validation failures (no file, missing required input) return before any
/// request is built. Server errors carry the server's `detail` verbatim.
pub async fn dispatch(
    client: &ForgeClient,
    file: Option<&SelectedFile>,
    action: &Action,
) -> Result<ActionResult, ForgeError> {
    let file = file.ok_or_else(|| ForgeError::Validation("Please select a file first.".into()))?;
    action.validate()?;

    let mut form = Form::new().part("file", file.to_part().await?);
    for (name, value) in action.fields() {
        form = form.text(name, value);
    }

    info!("{} ({})", action.status_text(), file.name);
    let response = client.post_form(action.endpoint(), form).await?;
    let result = api::read_action_result(response, action.fallback_error()).await?;
    debug!("Action finished: {}", result.summary());
    Ok(result)
}
