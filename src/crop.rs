//! Crop editing: a widget interface, the adapter that owns it, and the HEIC
//! preview detour.
//!
//! The adapter guarantees exactly one live widget instance: entering crop
//! mode always releases the previous one first. HEIC/HEIF images cannot be
//! decoded locally, so the adapter first asks the server for a JPEG preview
//! and attaches the widget to that. The crop request itself is still made
//! against the original file; only the selection comes from the preview.

use crate::actions::{self, Action, CropRect};
use crate::auth::ForgeClient;
use crate::error::ForgeError;
use crate::files::SelectedFile;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Widget options, mirroring the editor's fixed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CropOptions {
    /// 1 = the crop box may not leave the image.
    pub view_mode: u8,
    /// Initial crop box size as a fraction of each image side.
    pub auto_crop_area: f32,
    pub movable: bool,
    pub zoomable: bool,
    pub rotatable: bool,
    pub scalable: bool,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            view_mode: 1,
            auto_crop_area: 0.8,
            movable: false,
            zoomable: true,
            rotatable: false,
            scalable: false,
        }
    }
}

/// An interactive crop selector bound to one image at a time.
pub trait CropWidget: Send {
    /// Bind to `image`, replacing any previous binding.
    fn attach(&mut self, image: &Path, options: &CropOptions) -> Result<(), ForgeError>;

    /// Drop the binding.
    fn release(&mut self);

    /// Move the selection (the user dragging the crop box).
    fn select(&mut self, rect: CropRect) -> Result<(), ForgeError>;

    /// Current selection in integer image pixels.
    fn selection(&self) -> Option<CropRect>;
}

/// Headless widget: reads the image size and starts with a centred box of
/// `auto_crop_area` per side. Selections are clamped to the image when
/// `view_mode` is 1.
#[derive(Debug, Default)]
pub struct AutoRegionWidget {
    dims: Option<(u32, u32)>,
    clamp: bool,
    selection: Option<CropRect>,
}

impl AutoRegionWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.dims
    }
}

impl CropWidget for AutoRegionWidget {
    fn attach(&mut self, image: &Path, options: &CropOptions) -> Result<(), ForgeError> {
        let (w, h) = image::image_dimensions(image).map_err(|e| ForgeError::InvalidFile {
            path: image.to_path_buf(),
            reason: format!("Could not read image: {e}"),
        })?;
        let area = options.auto_crop_area.clamp(0.0, 1.0);
        let cw = ((w as f32 * area).round() as u32).clamp(1, w.max(1));
        let ch = ((h as f32 * area).round() as u32).clamp(1, h.max(1));
        self.dims = Some((w, h));
        self.clamp = options.view_mode >= 1;
        self.selection = Some(CropRect {
            x: (w - cw) / 2,
            y: (h - ch) / 2,
            width: cw,
            height: ch,
        });
        debug!("Crop widget attached to {}x{} image", w, h);
        Ok(())
    }

    fn release(&mut self) {
        self.dims = None;
        self.selection = None;
    }

    fn select(&mut self, rect: CropRect) -> Result<(), ForgeError> {
        let Some((w, h)) = self.dims else {
            return Err(ForgeError::Validation("Please start cropping first.".into()));
        };
        let mut rect = rect;
        if self.clamp {
            rect.x = rect.x.min(w.saturating_sub(1));
            rect.y = rect.y.min(h.saturating_sub(1));
            rect.width = rect.width.min(w - rect.x);
            rect.height = rect.height.min(h - rect.y);
        }
        if rect.width == 0 || rect.height == 0 {
            return Err(ForgeError::Validation("Crop area must not be empty.".into()));
        }
        self.selection = Some(rect);
        Ok(())
    }

    fn selection(&self) -> Option<CropRect> {
        self.selection
    }
}

/// Owner of the single live crop widget.
pub struct CropAdapter {
    widget: Box<dyn CropWidget>,
    options: CropOptions,
    live: bool,
    /// Server-made preview for HEIC sources; deleted on release.
    preview: Option<NamedTempFile>,
}

impl Default for CropAdapter {
    fn default() -> Self {
        Self::new(Box::new(AutoRegionWidget::new()))
    }
}

impl std::fmt::Debug for CropAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CropAdapter")
            .field("live", &self.live)
            .field("preview", &self.preview.as_ref().map(|p| p.path().to_path_buf()))
            .finish()
    }
}

impl CropAdapter {
    pub fn new(widget: Box<dyn CropWidget>) -> Self {
        Self {
            widget,
            options: CropOptions::default(),
            live: false,
            preview: None,
        }
    }

    pub fn with_options(mut self, options: CropOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Path of the HEIC preview the widget is bound to, if any.
    pub fn preview_path(&self) -> Option<&Path> {
        self.preview.as_ref().map(|p| p.path())
    }

    /// Enter crop mode for `file`. Any live widget is released first.
    ///
    /// For HEIC/HEIF sources a preview is fetched from the server; failing to
    /// get one leaves crop mode off and returns
    /// [`ForgeError::PreviewFailed`] (or [`ForgeError::AuthRequired`]).
    pub async fn enter(&mut self, client: &ForgeClient, file: &SelectedFile) -> Result<(), ForgeError> {
        self.release();
        if file.is_heic() {
            let preview = fetch_preview(client, file).await?;
            self.widget.attach(preview.path(), &self.options)?;
            self.preview = Some(preview);
        } else {
            self.widget.attach(&file.path, &self.options)?;
        }
        self.live = true;
        info!("Crop mode ready for {}", file.name);
        Ok(())
    }

    /// Leave crop mode. Safe to call when nothing is live.
    pub fn release(&mut self) {
        if self.live {
            self.widget.release();
            self.live = false;
        }
        self.preview = None;
    }

    pub fn select(&mut self, rect: CropRect) -> Result<(), ForgeError> {
        if !self.live {
            return Err(ForgeError::Validation("Please start cropping first.".into()));
        }
        self.widget.select(rect)
    }

    /// The crop action for the current selection.
    pub fn crop_action(&self) -> Result<Action, ForgeError> {
        if !self.live {
            return Err(ForgeError::Validation("Please start cropping first.".into()));
        }
        self.widget
            .selection()
            .map(Action::Crop)
            .ok_or_else(|| ForgeError::Validation("Please start cropping first.".into()))
    }
}

/// Ask the server to transcode `file` and download the JPEG it produced.
async fn fetch_preview(client: &ForgeClient, file: &SelectedFile) -> Result<NamedTempFile, ForgeError> {
    let quality = client.config().preview_quality;
    let failed = |e: ForgeError| match e {
        ForgeError::AuthRequired => e,
        ForgeError::Server { detail, .. } => ForgeError::PreviewFailed(detail),
        other => ForgeError::PreviewFailed(other.to_string()),
    };

    let result = actions::dispatch(client, Some(file), &Action::HeicToJpeg { quality })
        .await
        .map_err(failed)?;
    let tmp = tempfile::Builder::new()
        .prefix("fileforge-preview-")
        .suffix(".jpg")
        .tempfile()
        .map_err(|e| ForgeError::PreviewFailed(format!("tempfile: {e}")))?;
    client
        .download(&result.filename, tmp.path())
        .await
        .map_err(failed)?;
    debug!("Preview for {} stored at {}", file.name, tmp.path().display());
    Ok(tmp)
}
