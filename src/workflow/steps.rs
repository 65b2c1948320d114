//! Workflow authoring: the ordered list of step descriptors.
//!
//! Steps execute strictly left to right. They are appended with their kind's
//! default configuration, optionally edited through a [`ConfigModal`], and
//! removed by position. There is no re-ordering.

use crate::error::ForgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Server-side operation a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[serde(alias = "convert_word")]
    PdfToWord,
    RemovePassword,
    ResizeImage,
    CropImage,
    HeicToJpeg,
}

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        StepKind::PdfToWord,
        StepKind::RemovePassword,
        StepKind::ResizeImage,
        StepKind::CropImage,
        StepKind::HeicToJpeg,
    ];

    /// Wire name used in the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::PdfToWord => "pdf_to_word",
            StepKind::RemovePassword => "remove_password",
            StepKind::ResizeImage => "resize_image",
            StepKind::CropImage => "crop_image",
            StepKind::HeicToJpeg => "heic_to_jpeg",
        }
    }

    /// Palette label and icon.
    pub fn palette(self) -> (&'static str, &'static str) {
        match self {
            StepKind::PdfToWord => ("PDF to Word", "fa-file-word"),
            StepKind::RemovePassword => ("Remove Password", "fa-unlock"),
            StepKind::ResizeImage => ("Resize Image", "fa-compress"),
            StepKind::CropImage => ("Crop Image", "fa-crop"),
            StepKind::HeicToJpeg => ("HEIC to JPEG", "fa-image"),
        }
    }

    /// Kinds whose configuration modal opens as soon as they are added.
    pub fn needs_config(self) -> bool {
        matches!(self, StepKind::RemovePassword | StepKind::ResizeImage)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf_to_word" | "convert_word" => Ok(StepKind::PdfToWord),
            "remove_password" => Ok(StepKind::RemovePassword),
            "resize_image" => Ok(StepKind::ResizeImage),
            "crop_image" => Ok(StepKind::CropImage),
            "heic_to_jpeg" => Ok(StepKind::HeicToJpeg),
            other => Err(ForgeError::Validation(format!("Unknown step type: {other}"))),
        }
    }
}

/// Step-specific options, serialised as the step's `config` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepConfig {
    PdfToWord {
        #[serde(skip_serializing_if = "Option::is_none")]
        use_ai: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    RemovePassword {
        password: String,
    },
    ResizeImage {
        mode: String,
        percentage: u32,
    },
    CropImage {
        #[serde(skip_serializing_if = "Option::is_none")]
        x: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        y: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    HeicToJpeg {
        #[serde(skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
    },
}

/// Percentage used when a resize step has no usable value.
pub const DEFAULT_RESIZE_PERCENTAGE: u32 = 50;

impl StepConfig {
    /// Configuration a freshly added step starts with.
    pub fn default_for(kind: StepKind) -> Self {
        match kind {
            StepKind::PdfToWord => StepConfig::PdfToWord {
                use_ai: None,
                password: None,
            },
            StepKind::RemovePassword => StepConfig::RemovePassword {
                password: String::new(),
            },
            StepKind::ResizeImage => StepConfig::ResizeImage {
                mode: "percentage".into(),
                percentage: DEFAULT_RESIZE_PERCENTAGE,
            },
            StepKind::CropImage => StepConfig::CropImage {
                x: None,
                y: None,
                width: None,
                height: None,
            },
            StepKind::HeicToJpeg => StepConfig::HeicToJpeg { quality: None },
        }
    }

    /// Set one option from its textual form (`key=value` on the command line).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ForgeError> {
        let bad = |what: &str| {
            ForgeError::Validation(format!("Invalid value '{value}' for {what}"))
        };
        match (self, key) {
            (StepConfig::PdfToWord { use_ai, .. }, "use_ai") => {
                *use_ai = Some(value.parse().map_err(|_| bad("use_ai"))?);
            }
            (StepConfig::PdfToWord { password, .. }, "password") => {
                *password = (!value.is_empty()).then(|| value.to_string());
            }
            (StepConfig::RemovePassword { password }, "password") => {
                *password = value.to_string();
            }
            (StepConfig::ResizeImage { percentage, .. }, "percentage") => {
                *percentage = parse_percentage(value);
            }
            (StepConfig::CropImage { x, .. }, "x") => *x = Some(value.parse().map_err(|_| bad("x"))?),
            (StepConfig::CropImage { y, .. }, "y") => *y = Some(value.parse().map_err(|_| bad("y"))?),
            (StepConfig::CropImage { width, .. }, "width") => {
                *width = Some(value.parse().map_err(|_| bad("width"))?)
            }
            (StepConfig::CropImage { height, .. }, "height") => {
                *height = Some(value.parse().map_err(|_| bad("height"))?)
            }
            (StepConfig::HeicToJpeg { quality }, "quality") => {
                let q: u8 = value.parse().map_err(|_| bad("quality"))?;
                if !(1..=100).contains(&q) {
                    return Err(bad("quality"));
                }
                *quality = Some(q);
            }
            (_, other) => {
                return Err(ForgeError::Validation(format!("Unknown option '{other}'")));
            }
        }
        Ok(())
    }
}

/// Leading-integer parse with the resize default for anything unusable
/// (empty, non-numeric, zero).
pub fn parse_percentage(raw: &str) -> u32 {
    let digits: String = raw.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => DEFAULT_RESIZE_PERCENTAGE,
        Ok(p) => p,
    }
}

/// Timestamp-based step identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

/// One entry of the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    pub id: StepId,
    pub kind: StepKind,
    pub label: String,
    pub icon: String,
    pub config: StepConfig,
}

/// What is sent to the server for one step (`icon` and `id` stay local).
#[derive(Debug, Clone, Serialize)]
pub struct StepPayload<'a> {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub label: &'a str,
    pub config: &'a StepConfig,
}

/// The open configuration modal, bound to a step index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigModal {
    pub index: usize,
    pub kind: StepKind,
    pub title: String,
}

/// Raw modal input, as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigInput {
    Password(String),
    Percentage(String),
}

/// The ordered step list plus the config modal bound to it.
#[derive(Debug, Default)]
pub struct Workflow {
    steps: Vec<WorkflowStep>,
    modal: Option<ConfigModal>,
    last_id: u64,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn modal(&self) -> Option<&ConfigModal> {
        self.modal.as_ref()
    }

    fn next_id(&mut self) -> StepId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_id = now.max(self.last_id + 1);
        StepId(self.last_id)
    }

    /// Append a step with its kind's defaults. Kinds that need configuration
    /// open the modal immediately; closing it without saving keeps the
    /// defaults. Returns the new step's index.
    pub fn add_step(&mut self, kind: StepKind, label: impl Into<String>, icon: impl Into<String>) -> usize {
        let id = self.next_id();
        self.steps.push(WorkflowStep {
            id,
            kind,
            label: label.into(),
            icon: icon.into(),
            config: StepConfig::default_for(kind),
        });
        let index = self.steps.len() - 1;
        if kind.needs_config() {
            self.open_config(index);
        }
        index
    }

    /// Append a step using the palette label and icon.
    pub fn add_palette_step(&mut self, kind: StepKind) -> usize {
        let (label, icon) = kind.palette();
        self.add_step(kind, label, icon)
    }

    /// Remove the step at `index`; later steps shift down by one. Any open
    /// modal is closed, since its index may no longer name the same step.
    pub fn remove_step(&mut self, index: usize) -> Option<WorkflowStep> {
        if index >= self.steps.len() {
            return None;
        }
        self.modal = None;
        Some(self.steps.remove(index))
    }

    /// Open the modal for a configurable step. Returns `None` for an unknown
    /// index or a kind without modal options.
    pub fn open_config(&mut self, index: usize) -> Option<&ConfigModal> {
        let step = self.steps.get(index)?;
        if !step.kind.needs_config() {
            return None;
        }
        self.modal = Some(ConfigModal {
            index,
            kind: step.kind,
            title: format!("Configure: {}", step.label),
        });
        self.modal.as_ref()
    }

    pub fn close_config(&mut self) {
        self.modal = None;
    }

    /// Apply modal input to the bound step and close the modal. Does nothing
    /// when no modal is open.
    pub fn save_config(&mut self, input: ConfigInput) -> Result<(), ForgeError> {
        let Some(modal) = self.modal.take() else {
            return Ok(());
        };
        let step = self
            .steps
            .get_mut(modal.index)
            .ok_or_else(|| ForgeError::Internal(format!("modal bound to missing step {}", modal.index)))?;
        match (&mut step.config, input) {
            (StepConfig::RemovePassword { password }, ConfigInput::Password(p)) => *password = p,
            (StepConfig::ResizeImage { percentage, .. }, ConfigInput::Percentage(raw)) => {
                *percentage = parse_percentage(&raw)
            }
            (_, _) => {
                return Err(ForgeError::Validation(format!(
                    "That setting does not apply to step \"{}\"",
                    step.label
                )));
            }
        }
        Ok(())
    }

    /// Mutable access for programmatic configuration.
    pub fn config_mut(&mut self, index: usize) -> Option<&mut StepConfig> {
        self.steps.get_mut(index).map(|s| &mut s.config)
    }

    /// Drop every step and close the modal.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.modal = None;
    }

    /// Step-level preconditions for a run.
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.steps.is_empty() {
            return Err(ForgeError::Validation(
                "Please add at least one step to your workflow.".into(),
            ));
        }
        for step in &self.steps {
            if let StepConfig::RemovePassword { password } = &step.config {
                if password.is_empty() {
                    return Err(ForgeError::Validation(format!(
                        "Please configure the password for \"{}\" step.",
                        step.label
                    )));
                }
            }
        }
        Ok(())
    }

    /// The `steps` form field: a JSON array of `{type, label, config}`.
    pub fn payload_json(&self) -> Result<String, ForgeError> {
        let payload: Vec<StepPayload<'_>> = self
            .steps
            .iter()
            .map(|s| StepPayload {
                kind: s.kind,
                label: &s.label,
                config: &s.config,
            })
            .collect();
        serde_json::to_string(&payload).map_err(|e| ForgeError::Internal(format!("steps encode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn resize_defaults_to_fifty_percent_and_opens_modal() {
        let mut wf = Workflow::new();
        let i = wf.add_step(StepKind::ResizeImage, "Resize", "fa-compress");
        assert_eq!(
            wf.steps()[i].config,
            StepConfig::ResizeImage {
                mode: "percentage".into(),
                percentage: 50
            }
        );
        let modal = wf.modal().unwrap();
        assert_eq!(modal.index, 0);
        assert_eq!(modal.title, "Configure: Resize");
    }

    #[test]
    fn closing_modal_keeps_defaults() {
        let mut wf = Workflow::new();
        wf.add_palette_step(StepKind::RemovePassword);
        wf.close_config();
        assert!(wf.modal().is_none());
        assert_eq!(
            wf.steps()[0].config,
            StepConfig::RemovePassword {
                password: String::new()
            }
        );
    }

    #[test]
    fn unconfigurable_step_does_not_open_modal() {
        let mut wf = Workflow::new();
        wf.add_palette_step(StepKind::PdfToWord);
        assert!(wf.modal().is_none());
        assert!(wf.open_config(0).is_none());
    }

    #[test]
    fn save_config_applies_and_closes() {
        let mut wf = Workflow::new();
        wf.add_palette_step(StepKind::RemovePassword);
        wf.save_config(ConfigInput::Password("hunter2".into())).unwrap();
        assert!(wf.modal().is_none());
        assert_eq!(
            wf.steps()[0].config,
            StepConfig::RemovePassword {
                password: "hunter2".into()
            }
        );
    }

    #[test]
    fn percentage_fallback() {
        assert_eq!(parse_percentage("75"), 75);
        assert_eq!(parse_percentage("40abc"), 40);
        assert_eq!(parse_percentage(""), 50);
        assert_eq!(parse_percentage("0"), 50);
        assert_eq!(parse_percentage("abc"), 50);

        let mut wf = Workflow::new();
        wf.add_palette_step(StepKind::ResizeImage);
        wf.save_config(ConfigInput::Percentage("nope".into())).unwrap();
        assert_eq!(
            wf.steps()[0].config,
            StepConfig::ResizeImage {
                mode: "percentage".into(),
                percentage: 50
            }
        );
    }

    #[test]
    fn removal_shifts_indices_and_closes_modal() {
        let mut wf = Workflow::new();
        wf.add_palette_step(StepKind::PdfToWord);
        wf.add_palette_step(StepKind::HeicToJpeg);
        wf.add_palette_step(StepKind::ResizeImage);
        assert_eq!(wf.modal().unwrap().index, 2);

        let removed = wf.remove_step(0).unwrap();
        assert_eq!(removed.kind, StepKind::PdfToWord);
        assert!(wf.modal().is_none());
        assert_eq!(wf.steps()[1].kind, StepKind::ResizeImage);
        assert!(wf.remove_step(5).is_none());
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut wf = Workflow::new();
        for _ in 0..20 {
            wf.add_palette_step(StepKind::CropImage);
        }
        let ids: Vec<_> = wf.steps().iter().map(|s| s.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_password_blocks_run() {
        let mut wf = Workflow::new();
        assert_eq!(
            wf.validate().unwrap_err().to_string(),
            "Please add at least one step to your workflow."
        );
        wf.add_step(StepKind::RemovePassword, "Unlock PDF", "fa-unlock");
        assert_eq!(
            wf.validate().unwrap_err().to_string(),
            "Please configure the password for \"Unlock PDF\" step."
        );
        wf.save_config(ConfigInput::Password("pw".into())).unwrap();
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn payload_shape() {
        let mut wf = Workflow::new();
        wf.add_palette_step(StepKind::RemovePassword);
        wf.save_config(ConfigInput::Password("pw".into())).unwrap();
        wf.add_palette_step(StepKind::PdfToWord);
        wf.config_mut(1).unwrap().set("use_ai", "true").unwrap();
        wf.add_palette_step(StepKind::HeicToJpeg);

        let v: Value = serde_json::from_str(&wf.payload_json().unwrap()).unwrap();
        assert_eq!(
            v,
            json!([
                {"type": "remove_password", "label": "Remove Password", "config": {"password": "pw"}},
                {"type": "pdf_to_word", "label": "PDF to Word", "config": {"use_ai": true}},
                {"type": "heic_to_jpeg", "label": "HEIC to JPEG", "config": {}}
            ])
        );
    }

    #[test]
    fn kind_parsing_accepts_alias() {
        assert_eq!("convert_word".parse::<StepKind>().unwrap(), StepKind::PdfToWord);
        assert_eq!("crop_image".parse::<StepKind>().unwrap(), StepKind::CropImage);
        assert!("sharpen".parse::<StepKind>().is_err());
        let k: StepKind = serde_json::from_str("\"convert_word\"").unwrap();
        assert_eq!(k, StepKind::PdfToWord);
    }

    #[test]
    fn config_set_rejects_unknown_option() {
        let mut c = StepConfig::default_for(StepKind::CropImage);
        c.set("width", "300").unwrap();
        assert!(c.set("colour", "red").is_err());
        assert!(c.set("x", "-1").is_err());
        let mut q = StepConfig::default_for(StepKind::HeicToJpeg);
        assert!(q.set("quality", "0").is_err());
        q.set("quality", "90").unwrap();
        assert_eq!(q, StepConfig::HeicToJpeg { quality: Some(90) });
    }
}
