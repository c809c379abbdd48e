//! Progress sink and cooperative cancellation.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::ConversionConfigBuilder::progress_sink`] to receive an
//! event after every validated and every embedded image.
//!
//! The pipeline calls the sink synchronously from the thread that runs the
//! conversion (usually a `spawn_blocking` worker). Keeping a UI responsive is
//! the sink's business: forward events to a channel, a progress bar, or a
//! window message queue. [`crate::stream::spawn_conversion`] does the channel
//! forwarding for you.
//!
//! # Example
//!
//! ```rust
//! use imgs2pdf::{ConversionConfig, ProgressEvent, ProgressSink};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ProgressSink for Counter {
//!     fn on_progress(&self, event: &ProgressEvent) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{:?} {}/{}", event.stage, event.current_index, event.total);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_sink(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{ConversionResult, OversizeWarning};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pipeline stage, in the order a run walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Collecting,
    Validating,
    PolicyCheck,
    Assembling,
    Done,
}

/// One per-item step within [`Stage::Validating`] or [`Stage::Assembling`].
///
/// Emitted after the item finished; `current_index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub current_index: usize,
    pub total: usize,
    pub current_path: PathBuf,
}

/// Receives events from a running conversion.
///
/// All methods have default implementations so callers only override what
/// they care about. Implementations must be `Send + Sync`: the run executes
/// off the caller's thread.
pub trait ProgressSink: Send + Sync {
    /// Called when the run enters `stage`.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after each item of the validating and assembling stages.
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = event;
    }

    /// Called once when the policy flagged oversized images in advisory mode.
    ///
    /// Return `false` to stop before assembly; the run then ends as
    /// [`crate::FailureKind::Cancelled`]. The default proceeds.
    fn confirm_oversized(&self, warnings: &[OversizeWarning]) -> bool {
        let _ = warnings;
        true
    }

    /// Called once with the terminal result.
    fn on_complete(&self, result: &ConversionResult) {
        let _ = result;
    }
}

/// A sink that ignores everything. Used when no sink is configured.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ProgressSink>;

/// Shared cooperative cancellation flag.
///
/// Cloning shares the flag. The pipeline checks it between items, so an
/// image that is already being validated or embedded always finishes first.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
