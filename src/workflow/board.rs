//! Per-step progress state machine of a workflow run.
//!
//! Each step card moves `Pending → Processing → Completed` and only in that
//! order; the arrow leading into step `i` (between `i-1` and `i`) follows
//! step `i`. All transitions are driven by server events. The board never
//! guesses progress on its own. An event that would skip or reverse a state
//! is refused with [`RecordError::Rejected`] and leaves the board unchanged.

use crate::api::ActionResult;
use crate::error::RecordError;
use crate::workflow::events::WorkflowEvent;
use std::fmt;

/// Visual state of one step card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepState {
    /// No run in progress (or states cleared after one).
    #[default]
    Neutral,
    Pending,
    Processing,
    Completed,
}

/// Visual state of the connector leading into a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrowState {
    #[default]
    Neutral,
    Processing,
    Completed,
}

/// Overall state of the run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded(ActionResult),
    Failed(String),
}

/// Progress line shown in the status panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressText {
    pub message: String,
    pub current: usize,
    pub total: usize,
}

impl fmt::Display for ProgressText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\nStep {} of {}", self.message, self.current, self.total)
    }
}

/// What applying an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    StepStarted { step: usize, label: String, total: usize },
    StepCompleted { step: usize },
    Succeeded(ActionResult),
    Failed(String),
}

/// Step and arrow states for one workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepBoard {
    steps: Vec<StepState>,
    /// `arrows[i - 1]` leads into step `i`.
    arrows: Vec<ArrowState>,
    progress: Option<ProgressText>,
    run: RunState,
}

impl StepBoard {
    /// Neutral board for `len` steps.
    pub fn new(len: usize) -> Self {
        Self {
            steps: vec![StepState::Neutral; len],
            arrows: vec![ArrowState::Neutral; len.saturating_sub(1)],
            progress: None,
            run: RunState::Idle,
        }
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn arrows(&self) -> &[ArrowState] {
        &self.arrows
    }

    pub fn step(&self, index: usize) -> Option<StepState> {
        self.steps.get(index).copied()
    }

    /// State of the arrow leading into step `index` (`None` for step 0).
    pub fn arrow_into(&self, index: usize) -> Option<ArrowState> {
        index.checked_sub(1).and_then(|i| self.arrows.get(i).copied())
    }

    pub fn progress(&self) -> Option<&ProgressText> {
        self.progress.as_ref()
    }

    pub fn run(&self) -> &RunState {
        &self.run
    }

    /// Start a run over `len` steps: every step pending, arrows neutral.
    pub fn begin(&mut self, len: usize) {
        *self = Self::new(len);
        self.steps.fill(StepState::Pending);
        self.run = RunState::Running;
        self.progress = Some(ProgressText {
            message: "Starting workflow...".into(),
            current: 0,
            total: len,
        });
    }

    /// Return every card and arrow to neutral. The run state is kept.
    pub fn clear(&mut self) {
        self.steps.fill(StepState::Neutral);
        self.arrows.fill(ArrowState::Neutral);
        self.progress = None;
    }

    /// Abort the run with `detail`, clearing all visual states.
    pub fn fail(&mut self, detail: impl Into<String>) {
        self.clear();
        self.run = RunState::Failed(detail.into());
    }

    /// Apply one server event.
    pub fn apply(&mut self, event: &WorkflowEvent) -> Result<Applied, RecordError> {
        if self.run != RunState::Running {
            return Err(RecordError::Rejected {
                step: 0,
                detail: "no run in progress".into(),
            });
        }
        match event {
            WorkflowEvent::StepStart { step, label, total } => {
                let step = *step;
                self.transition(step, StepState::Pending, StepState::Processing)?;
                if let Some(arrow) = step.checked_sub(1).and_then(|i| self.arrows.get_mut(i)) {
                    if *arrow == ArrowState::Neutral {
                        *arrow = ArrowState::Processing;
                    }
                }
                self.progress = Some(ProgressText {
                    message: format!("Processing: {label}"),
                    current: step + 1,
                    total: *total,
                });
                Ok(Applied::StepStarted {
                    step,
                    label: label.clone(),
                    total: *total,
                })
            }
            WorkflowEvent::StepComplete { step, .. } => {
                let step = *step;
                self.transition(step, StepState::Processing, StepState::Completed)?;
                if let Some(arrow) = step.checked_sub(1).and_then(|i| self.arrows.get_mut(i)) {
                    *arrow = ArrowState::Completed;
                }
                Ok(Applied::StepCompleted { step })
            }
            WorkflowEvent::Complete { filename, message } => {
                let result = ActionResult {
                    filename: filename.clone(),
                    message: message.clone(),
                    status: None,
                };
                self.progress = None;
                self.run = RunState::Succeeded(result.clone());
                Ok(Applied::Succeeded(result))
            }
            WorkflowEvent::Error { detail } => {
                self.fail(detail.clone());
                Ok(Applied::Failed(detail.clone()))
            }
        }
    }

    fn transition(&mut self, step: usize, from: StepState, to: StepState) -> Result<(), RecordError> {
        let len = self.steps.len();
        let state = self.steps.get_mut(step).ok_or_else(|| RecordError::Rejected {
            step,
            detail: format!("workflow has {len} steps"),
        })?;
        if *state != from {
            return Err(RecordError::Rejected {
                step,
                detail: format!("cannot move from {state:?} to {to:?}"),
            });
        }
        *state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(step: usize, total: usize) -> WorkflowEvent {
        WorkflowEvent::StepStart {
            step,
            label: format!("S{step}"),
            total,
        }
    }

    fn done(step: usize) -> WorkflowEvent {
        WorkflowEvent::StepComplete { step, total: None }
    }

    #[test]
    fn begin_marks_all_pending() {
        let mut b = StepBoard::new(3);
        assert!(b.steps().iter().all(|s| *s == StepState::Neutral));
        b.begin(3);
        assert!(b.steps().iter().all(|s| *s == StepState::Pending));
        assert_eq!(b.arrows().len(), 2);
        assert_eq!(b.progress().unwrap().to_string(), "Starting workflow...\nStep 0 of 3");
        assert_eq!(b.run(), &RunState::Running);
    }

    #[test]
    fn full_run_moves_forward_only() {
        let mut b = StepBoard::new(2);
        b.begin(2);

        b.apply(&start(0, 2)).unwrap();
        assert_eq!(b.step(0), Some(StepState::Processing));
        assert_eq!(b.arrow_into(0), None);
        assert_eq!(b.progress().unwrap().to_string(), "Processing: S0\nStep 1 of 2");

        b.apply(&done(0)).unwrap();
        assert_eq!(b.step(0), Some(StepState::Completed));

        b.apply(&start(1, 2)).unwrap();
        assert_eq!(b.arrow_into(1), Some(ArrowState::Processing));
        assert_eq!(b.step(1), Some(StepState::Processing));

        b.apply(&done(1)).unwrap();
        assert_eq!(b.arrow_into(1), Some(ArrowState::Completed));
        assert_eq!(b.step(1), Some(StepState::Completed));

        let applied = b
            .apply(&WorkflowEvent::Complete {
                filename: "out.jpg".into(),
                message: "Workflow completed (2 steps)".into(),
            })
            .unwrap();
        assert!(matches!(applied, Applied::Succeeded(_)));
        // Completed states remain until cleared.
        assert_eq!(b.step(1), Some(StepState::Completed));
        b.clear();
        assert!(b.steps().iter().all(|s| *s == StepState::Neutral));
        assert!(b.arrows().iter().all(|a| *a == ArrowState::Neutral));
    }

    #[test]
    fn skipping_processing_is_rejected() {
        let mut b = StepBoard::new(2);
        b.begin(2);
        let e = b.apply(&done(0)).unwrap_err();
        assert!(matches!(e, RecordError::Rejected { step: 0, .. }));
        assert_eq!(b.step(0), Some(StepState::Pending));
    }

    #[test]
    fn reversing_is_rejected() {
        let mut b = StepBoard::new(1);
        b.begin(1);
        b.apply(&start(0, 1)).unwrap();
        b.apply(&done(0)).unwrap();
        assert!(b.apply(&start(0, 1)).is_err());
        assert!(b.apply(&done(0)).is_err());
        assert_eq!(b.step(0), Some(StepState::Completed));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut b = StepBoard::new(1);
        b.begin(1);
        assert!(b.apply(&start(4, 5)).is_err());
    }

    #[test]
    fn arrow_completes_only_with_its_step() {
        let mut b = StepBoard::new(3);
        b.begin(3);
        for i in 0..3 {
            b.apply(&start(i, 3)).unwrap();
            if i > 0 {
                assert_ne!(b.arrow_into(i), Some(ArrowState::Completed));
            }
            b.apply(&done(i)).unwrap();
            if i > 0 {
                assert_eq!(b.step(i), Some(StepState::Completed));
                assert_eq!(b.arrow_into(i), Some(ArrowState::Completed));
            }
        }
    }

    #[test]
    fn error_event_clears_states() {
        let mut b = StepBoard::new(2);
        b.begin(2);
        b.apply(&start(0, 2)).unwrap();
        let applied = b
            .apply(&WorkflowEvent::Error {
                detail: "Unknown step type: blur".into(),
            })
            .unwrap();
        assert_eq!(applied, Applied::Failed("Unknown step type: blur".into()));
        assert!(b.steps().iter().all(|s| *s == StepState::Neutral));
        assert_eq!(b.run(), &RunState::Failed("Unknown step type: blur".into()));
    }

    #[test]
    fn events_outside_a_run_are_rejected() {
        let mut b = StepBoard::new(1);
        assert!(b.apply(&start(0, 1)).is_err());
    }
}
