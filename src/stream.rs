//! Background conversion with a stream of progress events.
//!
//! ## Why?
//!
//! A UI must stay responsive while hundreds of images are validated and
//! embedded. [`spawn_conversion`] runs the pipeline on tokio's blocking pool
//! and hands back a [`ConversionHandle`]: the caller polls
//! [`ConversionHandle::events`] from its own loop, may call
//! [`ConversionHandle::cancel`] at any time, and awaits
//! [`ConversionHandle::finish`] for the result.
//!
//! Events are forwarded through an unbounded channel, so a slow consumer
//! never blocks the pipeline. Any sink already set on the config still
//! receives every call, and its answer to
//! [`ProgressSink::confirm_oversized`] is the one that counts.

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::Img2PdfError;
use crate::output::{ConversionResult, Diagnostics, OversizeWarning};
use crate::progress::{CancellationFlag, ProgressCallback, ProgressEvent, ProgressSink, Stage};
use crate::selection::SelectionState;
use futures::stream::{self, Stream};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Everything a run reports, in the order it happened.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Stage(Stage),
    Progress(ProgressEvent),
    /// Oversized images found; sent before the confirmation is requested.
    OversizeWarnings(Vec<OversizeWarning>),
    /// Always the last event of a run.
    Finished(ConversionResult),
}

/// A boxed stream of pipeline events.
pub type EventStream = Pin<Box<dyn Stream<Item = PipelineEvent> + Send>>;

struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
    inner: Option<ProgressCallback>,
}

impl ChannelSink {
    fn send(&self, event: PipelineEvent) {
        // The receiver may have been dropped; the run carries on regardless.
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl ProgressSink for ChannelSink {
    fn on_stage(&self, stage: Stage) {
        self.send(PipelineEvent::Stage(stage));
        if let Some(inner) = &self.inner {
            inner.on_stage(stage);
        }
    }

    fn on_progress(&self, event: &ProgressEvent) {
        self.send(PipelineEvent::Progress(event.clone()));
        if let Some(inner) = &self.inner {
            inner.on_progress(event);
        }
    }

    fn confirm_oversized(&self, warnings: &[OversizeWarning]) -> bool {
        self.send(PipelineEvent::OversizeWarnings(warnings.to_vec()));
        self.inner
            .as_ref()
            .map_or(true, |inner| inner.confirm_oversized(warnings))
    }

    fn on_complete(&self, result: &ConversionResult) {
        self.send(PipelineEvent::Finished(result.clone()));
        if let Some(inner) = &self.inner {
            inner.on_complete(result);
        }
    }
}

/// A conversion running in the background.
pub struct ConversionHandle {
    events: Option<mpsc::UnboundedReceiver<PipelineEvent>>,
    cancellation: CancellationFlag,
    task: JoinHandle<ConversionResult>,
}

impl ConversionHandle {
    /// Take the event stream. Only the first call gets events; later calls
    /// return an empty stream.
    ///
    /// The stream ends after [`PipelineEvent::Finished`].
    pub fn events(&mut self) -> EventStream {
        match self.events.take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(stream::empty()),
        }
    }

    /// Ask the run to stop before its next image.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// The flag [`cancel`](Self::cancel) sets, for sharing with a signal handler.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Wait for the run to end.
    pub async fn finish(self) -> ConversionResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => ConversionResult::from_error(
                &Img2PdfError::Internal(format!("conversion task failed: {e}")),
                Diagnostics::default(),
            ),
        }
    }
}

/// Start a conversion on the blocking pool and return immediately.
///
/// Must be called from within a tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use imgs2pdf::{spawn_conversion, ConversionConfig, PipelineEvent, Selection, SelectionState};
///
/// # #[tokio::main]
/// # async fn main() {
/// let selection = SelectionState::with_default_output(Selection::Directory("scans".into()));
/// let mut handle = spawn_conversion(selection, ConversionConfig::default());
/// let mut events = handle.events();
/// while let Some(event) = events.next().await {
///     if let PipelineEvent::Progress(p) = event {
///         println!("{:?} {}/{}", p.stage, p.current_index, p.total);
///     }
/// }
/// let result = handle.finish().await;
/// println!("success: {}", result.is_success());
/// # }
/// ```
pub fn spawn_conversion(selection: SelectionState, config: ConversionConfig) -> ConversionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancellation = config.cancellation.clone();

    let mut config = config;
    let inner = config.progress_sink.take();
    config.progress_sink = Some(Arc::new(ChannelSink { tx, inner }));

    // `config` (and with it the last sender) is dropped when the task ends,
    // which closes the event stream.
    let task = tokio::task::spawn_blocking(move || convert(selection, &config));

    ConversionHandle {
        events: Some(rx),
        cancellation,
        task,
    }
}
