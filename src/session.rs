//! The session view-model: which tool is open, what is selected, and what
//! each tool's panel shows.
//!
//! Every handler takes the session explicitly, so resets are deterministic
//! and testable. Each tool owns a single [`Panel`]; because a panel is one
//! enum value, "status and result visible at once" cannot be represented.
//! [`render_panel`] is the pure projection a front end draws from.
//!
//! Resetting runs the base reset first, then every registered
//! [`ResetHook`] in registration order. The workflow builder registers its
//! own hook so its step list and board are emptied with everything else.

use crate::actions::{self, Action};
use crate::api::ActionResult;
use crate::auth::ForgeClient;
use crate::crop::CropAdapter;
use crate::error::ForgeError;
use crate::files::{self, FileKind, SelectedFile};
use crate::progress::WorkflowProgressCallback;
use crate::workflow::{self, StepBoard, Workflow};
use reqwest::Url;
use std::path::Path;
use tracing::{debug, info, warn};

/// Top-level page the user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Home,
    Pdf,
    Image,
    Workflow,
}

/// Sub-mode of the image tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageMode {
    #[default]
    Convert,
    Resize,
    Crop,
}

/// What the result panel shows after a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    /// "{message}: {filename}"
    pub text: String,
    pub filename: String,
    pub download_url: Url,
    pub link_text: String,
}

impl ResultView {
    pub fn new(client: &ForgeClient, result: &ActionResult) -> Result<Self, ForgeError> {
        Ok(Self {
            text: result.summary(),
            filename: result.filename.clone(),
            download_url: client.download_url(&result.filename)?,
            link_text: format!("Download {}", result.filename),
        })
    }
}

/// The status/result area of one tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Panel {
    #[default]
    Hidden,
    Status(String),
    Result(ResultView),
}

/// Visibility projection of a [`Panel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelView<'a> {
    pub status: Option<&'a str>,
    pub result: Option<&'a ResultView>,
}

impl PanelView<'_> {
    pub fn status_visible(&self) -> bool {
        self.status.is_some()
    }

    pub fn result_visible(&self) -> bool {
        self.result.is_some()
    }
}

pub fn render_panel(panel: &Panel) -> PanelView<'_> {
    match panel {
        Panel::Hidden => PanelView {
            status: None,
            result: None,
        },
        Panel::Status(text) => PanelView {
            status: Some(text),
            result: None,
        },
        Panel::Result(view) => PanelView {
            status: None,
            result: Some(view),
        },
    }
}

/// Everything a reset touches.
#[derive(Debug, Default)]
pub struct SessionState {
    pub tool: Tool,
    pub pdf_file: Option<SelectedFile>,
    pub image_file: Option<SelectedFile>,
    pub workflow_file: Option<SelectedFile>,
    pub image_mode: ImageMode,
    pub workflow: Workflow,
    pub board: StepBoard,
    pub crop: CropAdapter,
    pub pdf_panel: Panel,
    pub image_panel: Panel,
    pub workflow_panel: Panel,
    /// Last message reported to the user.
    pub alert: Option<String>,
}

impl SessionState {
    pub fn panel(&self, tool: Tool) -> Option<&Panel> {
        match tool {
            Tool::Home => None,
            Tool::Pdf => Some(&self.pdf_panel),
            Tool::Image => Some(&self.image_panel),
            Tool::Workflow => Some(&self.workflow_panel),
        }
    }

    fn panel_mut(&mut self, tool: Tool) -> Option<&mut Panel> {
        match tool {
            Tool::Home => None,
            Tool::Pdf => Some(&mut self.pdf_panel),
            Tool::Image => Some(&mut self.image_panel),
            Tool::Workflow => Some(&mut self.workflow_panel),
        }
    }

    fn set_panel(&mut self, tool: Tool, panel: Panel) {
        if let Some(slot) = self.panel_mut(tool) {
            *slot = panel;
        }
    }

    fn hide_panels(&mut self) {
        self.pdf_panel = Panel::Hidden;
        self.image_panel = Panel::Hidden;
        self.workflow_panel = Panel::Hidden;
    }

    fn file(&self, tool: Tool) -> Option<&SelectedFile> {
        match tool {
            Tool::Pdf => self.pdf_file.as_ref(),
            Tool::Image => self.image_file.as_ref(),
            Tool::Workflow => self.workflow_file.as_ref(),
            Tool::Home => None,
        }
    }
}

/// Extra reset step, run after the base reset.
pub type ResetHook = Box<dyn Fn(&mut SessionState) + Send + Sync>;

fn reset_workflow(state: &mut SessionState) {
    state.workflow.clear();
    state.board = StepBoard::default();
}

/// One user's session against a File Forge server.
pub struct Session {
    client: ForgeClient,
    state: SessionState,
    hooks: Vec<ResetHook>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client", &self.client)
            .field("state", &self.state)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Session {
    pub fn new(client: ForgeClient) -> Self {
        Self {
            client,
            state: SessionState::default(),
            hooks: vec![Box::new(reset_workflow)],
        }
    }

    pub fn client(&self) -> &ForgeClient {
        &self.client
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.state.workflow
    }

    /// Register a hook to run after the base reset and all earlier hooks.
    pub fn add_reset_hook(&mut self, hook: impl Fn(&mut SessionState) + Send + Sync + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Clear selections, panels and the workflow, and return home.
    pub fn reset(&mut self) {
        let st = &mut self.state;
        st.crop.release();
        st.tool = Tool::Home;
        st.pdf_file = None;
        st.image_file = None;
        st.workflow_file = None;
        st.image_mode = ImageMode::Convert;
        st.alert = None;
        st.hide_panels();
        for hook in &self.hooks {
            hook(&mut self.state);
        }
        debug!("Session reset");
    }

    /// Switch tools. Going home is a full reset; any other switch hides
    /// stale panels and leaves crop mode when the image tool is closed.
    pub fn navigate(&mut self, tool: Tool) {
        if tool == Tool::Home {
            self.reset();
            return;
        }
        if self.state.tool == Tool::Image && tool != Tool::Image {
            self.state.crop.release();
        }
        self.state.hide_panels();
        self.state.alert = None;
        self.state.tool = tool;
    }

    pub fn go_home(&mut self) {
        self.navigate(Tool::Home);
    }

    pub fn select_pdf(&mut self, path: impl AsRef<Path>) -> Result<(), ForgeError> {
        let file = self.pick(path, FileKind::Pdf)?;
        self.state.pdf_file = Some(file);
        self.state.pdf_panel = Panel::Hidden;
        Ok(())
    }

    /// Select an image. In crop mode the widget is re-attached to it.
    pub async fn select_image(&mut self, path: impl AsRef<Path>) -> Result<(), ForgeError> {
        let file = self.pick(path, FileKind::Image)?;
        self.state.image_file = Some(file);
        self.state.image_panel = Panel::Hidden;
        if self.state.image_mode == ImageMode::Crop {
            self.start_crop().await?;
        }
        Ok(())
    }

    pub fn select_workflow_input(&mut self, path: impl AsRef<Path>) -> Result<(), ForgeError> {
        let file = self.pick(path, FileKind::WorkflowInput)?;
        self.state.workflow_file = Some(file);
        self.state.workflow_panel = Panel::Hidden;
        Ok(())
    }

    fn pick(&mut self, path: impl AsRef<Path>, kind: FileKind) -> Result<SelectedFile, ForgeError> {
        files::pick(path, kind).map_err(|e| self.report(e))
    }

    /// Switch the image tool's mode. Leaving crop releases the widget;
    /// entering it attaches the widget when an image is selected.
    pub async fn set_image_mode(&mut self, mode: ImageMode) -> Result<(), ForgeError> {
        let previous = self.state.image_mode;
        self.state.image_mode = mode;
        if previous == ImageMode::Crop && mode != ImageMode::Crop {
            self.state.crop.release();
        }
        if mode == ImageMode::Crop && previous != ImageMode::Crop && self.state.image_file.is_some() {
            self.start_crop().await?;
        }
        Ok(())
    }

    async fn start_crop(&mut self) -> Result<(), ForgeError> {
        let st = &mut self.state;
        let Some(file) = st.image_file.as_ref() else {
            return Ok(());
        };
        if file.is_heic() {
            st.image_panel = Panel::Status("Generating preview...".into());
        }
        let entered = st.crop.enter(&self.client, file).await;
        st.image_panel = Panel::Hidden;
        entered.map_err(|e| self.report(e))
    }

    /// Move the crop selection of the live widget.
    pub fn select_crop(&mut self, rect: actions::CropRect) -> Result<(), ForgeError> {
        self.state.crop.select(rect).map_err(|e| self.report(e))
    }

    /// Run a single-shot action against the file of its tool.
    ///
    /// The status panel is shown only once validation has passed; it is
    /// replaced by the result panel on success and hidden on any failure.
    pub async fn run_action(&mut self, action: &Action) -> Result<ActionResult, ForgeError> {
        let tool = match action.input_kind() {
            FileKind::Pdf => Tool::Pdf,
            _ => Tool::Image,
        };
        if self.state.file(tool).is_none() {
            return Err(self.report(ForgeError::Validation("Please select a file first.".into())));
        }
        action.validate().map_err(|e| self.report(e))?;

        self.state.alert = None;
        self.state.set_panel(tool, Panel::Status(action.status_text().to_string()));
        let outcome = actions::dispatch(&self.client, self.state.file(tool), action).await;
        self.finish(tool, outcome)
    }

    /// Crop the selected image with the live widget's selection.
    pub async fn crop(&mut self) -> Result<ActionResult, ForgeError> {
        let action = self.state.crop.crop_action().map_err(|e| self.report(e))?;
        self.run_action(&action).await
    }

    /// Execute the workflow on the selected input, following its events.
    ///
    /// The status panel starts from the board's progress text. While the
    /// run is in flight the session is borrowed, so front ends follow the
    /// changing text through [`WorkflowProgressCallback::on_status`]. The
    /// result panel appears as soon as the server reports completion; step
    /// states stay completed for the configured hold and are then cleared.
    pub async fn run_workflow(
        &mut self,
        progress: &dyn WorkflowProgressCallback,
    ) -> Result<ActionResult, ForgeError> {
        if self.state.workflow_file.is_none() {
            return Err(self.report(ForgeError::Validation("Please select an input file first.".into())));
        }
        self.state.workflow.validate().map_err(|e| self.report(e))?;

        self.state.alert = None;
        let st = &mut self.state;
        st.board.begin(st.workflow.len());
        st.workflow_panel = st
            .board
            .progress()
            .map(|p| Panel::Status(p.to_string()))
            .unwrap_or_default();
        let outcome = workflow::start_and_follow(
            &self.client,
            st.workflow_file.as_ref(),
            &st.workflow,
            &mut st.board,
            progress,
        )
        .await;
        let result = self.finish(Tool::Workflow, outcome)?;

        let hold = self.client.config().completed_hold;
        workflow::hold_then_clear(hold, &mut self.state.board, progress).await;
        Ok(result)
    }

    fn finish(&mut self, tool: Tool, outcome: Result<ActionResult, ForgeError>) -> Result<ActionResult, ForgeError> {
        let view = outcome.and_then(|result| ResultView::new(&self.client, &result).map(|v| (result, v)));
        match view {
            Ok((result, view)) => {
                info!("{}", view.text);
                self.state.set_panel(tool, Panel::Result(view));
                Ok(result)
            }
            Err(e) => {
                self.state.set_panel(tool, Panel::Hidden);
                Err(self.report(e))
            }
        }
    }

    fn report(&mut self, e: ForgeError) -> ForgeError {
        if !e.is_validation() {
            warn!("{e}");
        }
        self.state.alert = Some(e.to_string());
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{CropRect, ResizeSpec};
    use crate::progress::NoopProgressCallback;
    use crate::workflow::StepKind;
    use crate::ClientConfig;
    use image::{Rgb, RgbImage};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn session() -> Session {
        let config = ClientConfig::builder()
            .base_url("http://127.0.0.1:9")
            .no_credentials_file()
            .build()
            .unwrap();
        Session::new(ForgeClient::new(config).unwrap())
    }

    fn fixtures() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("doc.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n%%EOF\n").unwrap();
        let png = dir.path().join("pic.png");
        RgbImage::from_pixel(40, 20, Rgb([0, 0, 0])).save(&png).unwrap();
        (dir, pdf, png)
    }

    #[test]
    fn render_never_shows_status_and_result_together() {
        let view = ResultView {
            text: "Converted: out.docx".into(),
            filename: "out.docx".into(),
            download_url: Url::parse("http://h/api/download/out.docx").unwrap(),
            link_text: "Download out.docx".into(),
        };
        for panel in [Panel::Hidden, Panel::Status("Working...".into()), Panel::Result(view)] {
            let v = render_panel(&panel);
            assert!(!(v.status_visible() && v.result_visible()), "{panel:?}");
        }
    }

    #[tokio::test]
    async fn reset_clears_files_panels_and_steps() {
        let (_dir, pdf, png) = fixtures();
        let mut s = session();
        s.navigate(Tool::Pdf);
        s.select_pdf(&pdf).unwrap();
        s.select_image(&png).await.unwrap();
        s.select_workflow_input(&pdf).unwrap();
        s.workflow_mut().add_palette_step(StepKind::ResizeImage);
        s.set_image_mode(ImageMode::Crop).await.unwrap();
        assert!(s.state().crop.is_live());
        s.state.pdf_panel = Panel::Status("Converting PDF to Word...".into());

        s.go_home();
        let st = s.state();
        assert_eq!(st.tool, Tool::Home);
        assert!(st.pdf_file.is_none() && st.image_file.is_none() && st.workflow_file.is_none());
        assert!(st.workflow.is_empty());
        assert!(!st.crop.is_live());
        assert_eq!(st.image_mode, ImageMode::Convert);
        for tool in [Tool::Pdf, Tool::Image, Tool::Workflow] {
            assert_eq!(st.panel(tool), Some(&Panel::Hidden));
        }
    }

    #[test]
    fn hooks_run_in_registration_order_after_base_reset() {
        let mut s = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = seen.clone();
        s.add_reset_hook(move |st| a.lock().unwrap().push(("first", st.workflow.len())));
        let b = seen.clone();
        s.add_reset_hook(move |st| b.lock().unwrap().push(("second", st.workflow.len())));
        s.workflow_mut().add_palette_step(StepKind::HeicToJpeg);
        s.reset();
        // The built-in workflow hook has already emptied the list.
        assert_eq!(*seen.lock().unwrap(), vec![("first", 0), ("second", 0)]);
    }

    #[test]
    fn switching_tools_hides_stale_panels() {
        let mut s = session();
        s.navigate(Tool::Pdf);
        s.state.pdf_panel = Panel::Status("Removing password...".into());
        s.navigate(Tool::Workflow);
        assert_eq!(s.state().pdf_panel, Panel::Hidden);
        assert_eq!(s.state().tool, Tool::Workflow);
    }

    #[test]
    fn reselecting_hides_that_tools_panel() {
        let (_dir, pdf, _) = fixtures();
        let mut s = session();
        s.state.workflow_panel = Panel::Status("x".into());
        s.state.pdf_panel = Panel::Status("Converting PDF to Word...".into());
        s.select_pdf(&pdf).unwrap();
        assert_eq!(s.state().pdf_panel, Panel::Hidden);
        assert_eq!(s.state().workflow_panel, Panel::Status("x".into()));
    }

    #[test]
    fn rejected_pick_keeps_previous_selection() {
        let (_dir, pdf, png) = fixtures();
        let mut s = session();
        s.select_pdf(&pdf).unwrap();
        let err = s.select_pdf(&png).unwrap_err();
        assert_eq!(err.to_string(), "Please select a PDF file.");
        assert_eq!(s.state().pdf_file.as_ref().unwrap().name, "doc.pdf");
        assert_eq!(s.state().alert.as_deref(), Some("Please select a PDF file."));
    }

    #[tokio::test]
    async fn validation_failure_never_shows_status() {
        let (_dir, _, png) = fixtures();
        let mut s = session();
        let err = s
            .run_action(&Action::Resize(ResizeSpec::Percentage(50)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please select a file first.");

        s.select_image(&png).await.unwrap();
        let err = s
            .run_action(&Action::Resize(ResizeSpec::Dimensions {
                width: None,
                height: None,
            }))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(s.state().image_panel, Panel::Hidden);
    }

    #[tokio::test]
    async fn transport_failure_hides_status() {
        let (_dir, pdf, _) = fixtures();
        let mut s = session();
        s.select_pdf(&pdf).unwrap();
        let err = s
            .run_action(&Action::ConvertToWord {
                use_ai: false,
                password: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Transport(_)));
        assert_eq!(s.state().pdf_panel, Panel::Hidden);
    }

    #[tokio::test]
    async fn crop_mode_follows_image_selection() {
        let (_dir, _, png) = fixtures();
        let mut s = session();
        s.navigate(Tool::Image);
        s.set_image_mode(ImageMode::Crop).await.unwrap();
        assert!(!s.state().crop.is_live());
        assert_eq!(s.crop().await.unwrap_err().to_string(), "Please start cropping first.");

        s.select_image(&png).await.unwrap();
        assert!(s.state().crop.is_live());
        s.select_crop(CropRect {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        })
        .unwrap();

        s.set_image_mode(ImageMode::Resize).await.unwrap();
        assert!(!s.state().crop.is_live());
        s.set_image_mode(ImageMode::Crop).await.unwrap();
        assert!(s.state().crop.is_live());
        s.navigate(Tool::Pdf);
        assert!(!s.state().crop.is_live());
    }

    #[tokio::test]
    async fn workflow_requires_input_and_steps() {
        let (_dir, pdf, _) = fixtures();
        let mut s = session();
        let err = s.run_workflow(&NoopProgressCallback).await.unwrap_err();
        assert_eq!(err.to_string(), "Please select an input file first.");
        s.select_workflow_input(&pdf).unwrap();
        let err = s.run_workflow(&NoopProgressCallback).await.unwrap_err();
        assert_eq!(err.to_string(), "Please add at least one step to your workflow.");
        assert_eq!(s.state().workflow_panel, Panel::Hidden);
    }
}
