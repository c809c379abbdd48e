//! The pipeline controller and the blocking / async entry points.
//!
//! ## Why a state machine?
//!
//! A run walks `Idle → Collecting → Validating → PolicyCheck → Assembling →
//! Done` and never goes back. Making the stage explicit lets the progress
//! sink mirror it, and guarantees a controller produces exactly one
//! [`ConversionResult`]. A failed run is finished; the caller starts a new
//! one with a corrected selection.
//!
//! ## Why no `Result`?
//!
//! Every error, and every panic inside the pipeline or the sink, is folded
//! into [`ConversionResult::Failure`] here. Nothing a single conversion does
//! can take down the host process.

use crate::config::ConversionConfig;
use crate::error::Img2PdfError;
use crate::output::{ConversionResult, Diagnostics};
use crate::pipeline::assemble::{self, DocumentInfo};
use crate::pipeline::validate::{self, ImageCandidate};
use crate::pipeline::{collect, order, policy};
use crate::progress::{
    CancellationFlag, NoopProgressSink, ProgressCallback, ProgressEvent, ProgressSink, Stage,
};
use crate::selection::SelectionState;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One conversion at a time per process.
static RUN_LOCK: Mutex<()> = Mutex::new(());

/// Drives a single run from selection to PDF.
///
/// Construct one per run; a controller that has reached [`Stage::Done`]
/// refuses to run again. Runs are serialised process-wide: [`run`](Self::run)
/// waits for any other controller to finish first.
pub struct PipelineController {
    config: ConversionConfig,
    sink: ProgressCallback,
    state: Stage,
    diagnostics: Diagnostics,
}

impl PipelineController {
    pub fn new(config: ConversionConfig) -> Self {
        let sink = config
            .progress_sink
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressSink));
        Self {
            config,
            sink,
            state: Stage::Idle,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Current stage.
    pub fn state(&self) -> Stage {
        self.state
    }

    /// Run the pipeline over `selection` and return its only result.
    pub fn run(&mut self, selection: SelectionState) -> ConversionResult {
        if self.state != Stage::Idle {
            return ConversionResult::from_error(
                &Img2PdfError::Internal(format!(
                    "controller already used (state {:?}); start a new run",
                    self.state
                )),
                Diagnostics::default(),
            );
        }

        let _guard = RUN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&selection)))
            .unwrap_or_else(|payload| {
                Err(Img2PdfError::Internal(format!(
                    "pipeline panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        self.state = Stage::Done;
        self.diagnostics.stats.duration_ms = started.elapsed().as_millis() as u64;
        let diagnostics = std::mem::take(&mut self.diagnostics);

        let result = match outcome {
            Ok(output_path) => {
                info!(
                    "Conversion complete: {} pages in {}ms → {}",
                    diagnostics.stats.pages,
                    diagnostics.stats.duration_ms,
                    output_path.display()
                );
                ConversionResult::Success {
                    output_path,
                    diagnostics,
                }
            }
            Err(e) => {
                match e {
                    Img2PdfError::Cancelled => info!("Conversion cancelled"),
                    ref other => warn!("Conversion failed: {}", other),
                }
                ConversionResult::from_error(&e, diagnostics)
            }
        };

        let sink = Arc::clone(&self.sink);
        let notified = panic::catch_unwind(AssertUnwindSafe(|| {
            sink.on_stage(Stage::Done);
            sink.on_complete(&result);
        }));
        if notified.is_err() {
            warn!("Progress sink panicked while reporting completion");
        }
        result
    }

    fn advance(&mut self, next: Stage) -> Result<(), Img2PdfError> {
        if next <= self.state {
            return Err(Img2PdfError::Internal(format!(
                "illegal stage transition {:?} → {:?}",
                self.state, next
            )));
        }
        debug!("Stage {:?} → {:?}", self.state, next);
        self.state = next;
        self.sink.on_stage(next);
        Ok(())
    }

    fn execute(&mut self, selection: &SelectionState) -> Result<PathBuf, Img2PdfError> {
        let output_path = selection.output_path();
        info!(
            "Starting conversion: {:?} → {}",
            selection.selection(),
            output_path.display()
        );

        // ── Step 1: Collect and order ────────────────────────────────────
        self.advance(Stage::Collecting)?;
        let paths = order::natural_sort(collect::collect(selection.selection(), &self.config)?);
        self.diagnostics.stats.candidates = paths.len();

        // ── Step 2: Validate each candidate ──────────────────────────────
        self.advance(Stage::Validating)?;
        let total = paths.len();
        let candidates = validate::validate_all(
            &paths,
            item_checkpoint(&self.sink, &self.config.cancellation, Stage::Validating, total),
        )?;

        // ── Step 3: Policy ───────────────────────────────────────────────
        self.advance(Stage::PolicyCheck)?;
        let decision = policy::classify(&candidates, &self.config);
        self.diagnostics.exclusions = decision.exclusions;
        self.diagnostics.warnings = decision.warnings;
        self.diagnostics.stats.valid = decision.valid_count;

        for w in &self.diagnostics.warnings {
            warn!("Image at or above {} px: {}", self.config.max_pixels, w);
        }
        if !decision.proceedable {
            return Err(match self.diagnostics.warnings.first() {
                Some(w) if decision.blocking => Img2PdfError::ResolutionLimitExceeded {
                    path: w.path.clone(),
                    width: w.width,
                    height: w.height,
                    pixels: w.pixels(),
                    limit: self.config.max_pixels,
                },
                _ => Img2PdfError::NoValidImages { total },
            });
        }
        if !self.diagnostics.warnings.is_empty()
            && !self.sink.confirm_oversized(&self.diagnostics.warnings)
        {
            info!("Oversized images were not confirmed");
            return Err(Img2PdfError::Cancelled);
        }
        check_cancelled(&self.config.cancellation)?;

        // ── Step 4: Assemble ─────────────────────────────────────────────
        self.advance(Stage::Assembling)?;
        let valid: Vec<ImageCandidate> = candidates.into_iter().filter(|c| c.is_valid()).collect();
        let info = DocumentInfo {
            title: self.config.title.clone(),
        };
        let report = assemble::assemble(
            &valid,
            &output_path,
            &info,
            item_checkpoint(&self.sink, &self.config.cancellation, Stage::Assembling, valid.len()),
        )?;

        let stats = &mut self.diagnostics.stats;
        stats.pages = report.pages;
        stats.embedded_direct = report.embedded_direct;
        stats.reencoded = report.reencoded;
        stats.output_bytes = report.bytes;
        Ok(output_path)
    }
}

/// Report the item just finished, then honour cancellation before the next.
fn item_checkpoint<'a>(
    sink: &'a ProgressCallback,
    cancellation: &'a CancellationFlag,
    stage: Stage,
    total: usize,
) -> impl FnMut(usize, Option<&ImageCandidate>) -> Result<(), Img2PdfError> + 'a {
    move |done, last| {
        if let Some(candidate) = last {
            emit(sink.as_ref(), stage, done, total, &candidate.path);
        }
        check_cancelled(cancellation)
    }
}

fn emit(sink: &dyn ProgressSink, stage: Stage, index: usize, total: usize, path: &Path) {
    sink.on_progress(&ProgressEvent {
        stage,
        current_index: index,
        total,
        current_path: path.to_path_buf(),
    });
}

fn check_cancelled(flag: &CancellationFlag) -> Result<(), Img2PdfError> {
    if flag.is_cancelled() {
        Err(Img2PdfError::Cancelled)
    } else {
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Convert `selection` into a PDF, blocking the current thread.
///
/// Runs are serialised process-wide: if another conversion is in progress
/// this call waits for it to finish first.
///
/// Never fails: errors, cancellation and panics all come back as
/// [`ConversionResult::Failure`].
pub fn convert(selection: SelectionState, config: &ConversionConfig) -> ConversionResult {
    PipelineController::new(config.clone()).run(selection)
}

/// Async wrapper around [`convert`].
///
/// The pipeline does blocking file I/O, so it runs on tokio's blocking pool
/// and never stalls the caller's executor.
///
/// # Example
/// ```rust,no_run
/// use imgs2pdf::{convert_async, ConversionConfig, Selection, SelectionState};
///
/// # #[tokio::main]
/// # async fn main() {
/// let selection = SelectionState::with_default_output(Selection::Directory("scans".into()));
/// let result = convert_async(selection, ConversionConfig::default()).await;
/// match result.output_path() {
///     Some(p) => println!("wrote {}", p.display()),
///     None => eprintln!("{:?}", result.failure_kind()),
/// }
/// # }
/// ```
pub async fn convert_async(selection: SelectionState, config: ConversionConfig) -> ConversionResult {
    match tokio::task::spawn_blocking(move || convert(selection, &config)).await {
        Ok(result) => result,
        Err(e) => ConversionResult::from_error(
            &Img2PdfError::Internal(format!("conversion task failed: {e}")),
            Diagnostics::default(),
        ),
    }
}
