//! Workflow execution: submit the pipeline, then follow its event stream.
//!
//! The request is a single multipart upload (`file` plus the JSON `steps`
//! array). A rejection before streaming starts comes back as an ordinary
//! error response; after that every update arrives as an event record.
//! [`decode_events`] turns any chunked body into a stream of events, so the
//! read loop is the same for a live response and for a test fixture.

use crate::api::{self, ActionResult};
use crate::auth::ForgeClient;
use crate::error::{ForgeError, RecordError};
use crate::files::SelectedFile;
use crate::progress::WorkflowProgressCallback;
use crate::workflow::board::{Applied, StepBoard};
use crate::workflow::events::{parse_record, WorkflowEvent};
use crate::workflow::sse::RecordBuffer;
use crate::workflow::steps::Workflow;
use futures::stream::{self, StreamExt};
use reqwest::multipart::Form;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// One item of a decoded workflow stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Event(WorkflowEvent),
    /// A record that could not be decoded; reading continues.
    Skipped(RecordError),
}

/// A boxed stream of decoded records. An `Err` item is a transport failure
/// and is always the last item.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamItem, ForgeError>> + Send>>;

struct DecodeState<S> {
    body: Pin<Box<S>>,
    buffer: RecordBuffer,
    queue: VecDeque<StreamItem>,
    ended: bool,
}

/// Decode a chunked body into workflow events.
///
/// Chunk boundaries do not matter: the same bytes yield the same items
/// however they are split.
pub fn decode_events<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        buffer: RecordBuffer::new(),
        queue: VecDeque::new(),
        ended: false,
    };
    let s = stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.queue.pop_front() {
                return Some((Ok(item), st));
            }
            if st.ended {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.push(chunk.as_ref());
                    while let Some(record) = st.buffer.next_record() {
                        match parse_record(&record) {
                            Ok(Some(event)) => st.queue.push_back(StreamItem::Event(event)),
                            Ok(None) => debug!("Ignoring record without data line"),
                            Err(e) => st.queue.push_back(StreamItem::Skipped(e)),
                        }
                    }
                }
                Some(Err(e)) => {
                    st.ended = true;
                    return Some((Err(ForgeError::Transport(e.to_string())), st));
                }
                None => {
                    st.ended = true;
                    if st.buffer.remaining() > 0 {
                        debug!("Discarding {} bytes of unterminated record", st.buffer.remaining());
                    }
                }
            }
        }
    });
    Box::pin(s)
}

/// Check preconditions and submit the workflow. Returns the decoded event
/// stream once the server has accepted the request.
pub async fn execute_stream(
    client: &ForgeClient,
    file: Option<&SelectedFile>,
    workflow: &Workflow,
) -> Result<EventStream, ForgeError> {
    let file = file.ok_or_else(|| ForgeError::Validation("Please select an input file first.".into()))?;
    workflow.validate()?;

    let form = Form::new()
        .part("file", file.to_part().await?)
        .text("steps", workflow.payload_json()?);

    info!("Starting workflow: {} step(s) on {}", workflow.len(), file.name);
    let response = client.post_form(api::WORKFLOW_EXECUTE, form).await?;

    if !response.status().is_success() && !api::is_event_stream(&response) {
        return Err(api::error_from_response(response, "Workflow execution failed").await);
    }
    Ok(decode_events(response.bytes_stream()))
}

/// Run a workflow to completion, driving `board` from the server's events.
///
/// On success the completed states stay on the board for the configured
/// hold time and are then cleared. On any failure after submission the
/// board is cleared immediately. Nothing is retried: a dropped connection
/// ends the run.
pub async fn run_workflow(
    client: &ForgeClient,
    file: Option<&SelectedFile>,
    workflow: &Workflow,
    board: &mut StepBoard,
    progress: &dyn WorkflowProgressCallback,
) -> Result<ActionResult, ForgeError> {
    let result = start_and_follow(client, file, workflow, board, progress).await?;
    hold_then_clear(client.config().completed_hold, board, progress).await;
    Ok(result)
}

/// Validate, submit and follow a run up to its terminal event.
///
/// Completed states are left on the board; callers show the result and then
/// call [`hold_then_clear`]. On failure the board is already cleared.
pub async fn start_and_follow(
    client: &ForgeClient,
    file: Option<&SelectedFile>,
    workflow: &Workflow,
    board: &mut StepBoard,
    progress: &dyn WorkflowProgressCallback,
) -> Result<ActionResult, ForgeError> {
    // Validate before touching the board so a refused run leaves no trace.
    if file.is_none() {
        return Err(ForgeError::Validation("Please select an input file first.".into()));
    }
    workflow.validate()?;

    board.begin(workflow.len());
    progress.on_run_start(workflow.len());
    report_status(board, progress);

    let outcome = match execute_stream(client, file, workflow).await {
        Ok(events) => follow(events, board, progress).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            info!("Workflow complete: {}", result.summary());
            progress.on_complete(&result);
            Ok(result)
        }
        Err(e) => {
            warn!("Workflow failed: {e}");
            board.fail(e.to_string());
            progress.on_error(&e.to_string());
            Err(e)
        }
    }
}

/// Keep completed states visible for `hold`, then return them to neutral.
pub async fn hold_then_clear(hold: Duration, board: &mut StepBoard, progress: &dyn WorkflowProgressCallback) {
    if !hold.is_zero() {
        tokio::time::sleep(hold).await;
    }
    board.clear();
    progress.on_states_cleared();
}

fn report_status(board: &StepBoard, progress: &dyn WorkflowProgressCallback) {
    if let Some(text) = board.progress() {
        progress.on_status(&text.to_string());
    }
}

/// Consume `events` until a terminal event or the end of the stream.
pub async fn follow(
    mut events: EventStream,
    board: &mut StepBoard,
    progress: &dyn WorkflowProgressCallback,
) -> Result<ActionResult, ForgeError> {
    while let Some(item) = events.next().await {
        let event = match item? {
            StreamItem::Event(event) => event,
            StreamItem::Skipped(e) => {
                warn!("Skipping workflow record: {e}");
                progress.on_record_skipped(&e);
                continue;
            }
        };
        debug!("Workflow event: {:?}", event);
        match board.apply(&event) {
            Ok(Applied::StepStarted { step, label, total }) => {
                progress.on_step_start(step, &label, total);
                report_status(board, progress);
            }
            Ok(Applied::StepCompleted { step }) => progress.on_step_complete(step),
            Ok(Applied::Succeeded(result)) => return Ok(result),
            Ok(Applied::Failed(detail)) => return Err(ForgeError::Workflow(detail)),
            Err(e) => {
                warn!("Skipping workflow record: {e}");
                progress.on_record_skipped(&e);
            }
        }
    }
    Err(ForgeError::Transport(
        "stream ended before the workflow finished".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgressCallback;
    use crate::workflow::board::{RunState, StepState};

    const BODY: &str = concat!(
        "data: {\"event\": \"step_start\", \"step\": 0, \"total\": 2, \"label\": \"Remove Password\"}\n\n",
        "data: {\"event\": \"step_complete\", \"step\": 0, \"total\": 2, \"label\": \"Remove Password\"}\n\n",
        "data: {\"event\": \"step_start\", \"step\": 1, \"total\": 2, \"label\": \"PDF to Word\"}\n\n",
        "data: {\"event\": \"step_complete\", \"step\": 1, \"total\": 2, \"label\": \"PDF to Word\"}\n\n",
        "data: {\"event\": \"complete\", \"message\": \"Workflow completed (2 steps)\", \"filename\": \"doc.docx\"}\n\n",
    );

    fn chunked(body: &str, size: usize) -> EventStream {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            body.as_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect();
        decode_events(stream::iter(chunks))
    }

    async fn collect(events: EventStream) -> Vec<StreamItem> {
        events.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn chunk_size_does_not_change_events() {
        let whole = collect(chunked(BODY, BODY.len())).await;
        assert_eq!(whole.len(), 5);
        for size in [1, 2, 3, 7, 64] {
            assert_eq!(collect(chunked(BODY, size)).await, whole, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn malformed_record_does_not_stop_the_stream() {
        let body = format!("data: {{oops\n\n{BODY}");
        let items = collect(chunked(&body, 5)).await;
        assert!(matches!(items[0], StreamItem::Skipped(RecordError::Malformed { .. })));
        assert_eq!(items.len(), 6);

        let mut board = StepBoard::new(2);
        board.begin(2);
        let result = follow(chunked(&body, 5), &mut board, &NoopProgressCallback)
            .await
            .unwrap();
        assert_eq!(result.summary(), "Workflow completed (2 steps): doc.docx");
        assert_eq!(board.steps(), &[StepState::Completed, StepState::Completed]);
    }

    #[tokio::test]
    async fn truncated_stream_is_a_transport_failure() {
        let cut = &BODY[..BODY.find("data: {\"event\": \"complete\"").unwrap()];
        let mut board = StepBoard::new(2);
        board.begin(2);
        let err = follow(chunked(cut, 16), &mut board, &NoopProgressCallback)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Transport(_)));
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(BODY.as_bytes()[..40].to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")),
        ];
        let mut board = StepBoard::new(2);
        board.begin(2);
        let err = follow(decode_events(stream::iter(chunks)), &mut board, &NoopProgressCallback)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn error_event_fails_the_run() {
        let body = concat!(
            "data: {\"event\": \"step_start\", \"step\": 0, \"total\": 1, \"label\": \"Unlock\"}\n\n",
            "data: {\"event\": \"error\", \"detail\": \"Password required for unlock step\"}\n\n",
            "data: {\"event\": \"step_complete\", \"step\": 0}\n\n",
        );
        let mut board = StepBoard::new(1);
        board.begin(1);
        let err = follow(chunked(body, 9), &mut board, &NoopProgressCallback)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Workflow(ref d) if d == "Password required for unlock step"));
        assert_eq!(board.steps(), &[StepState::Neutral]);
        assert!(matches!(board.run(), RunState::Failed(_)));
    }
}
