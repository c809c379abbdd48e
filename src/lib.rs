//! # imgs2pdf
//!
//! Merge a folder (or a hand-picked list) of images into one PDF, one page
//! per image, without touching the pixels.
//!
//! ## Why this crate?
//!
//! Most image-to-PDF tools decode every photo and re-compress it, which costs
//! quality, time and memory. Here JPEG files are embedded byte-for-byte and
//! most PNG files keep their compressed data as well. Everything else gets a
//! single lossless re-encode. Pages are sized to the image, the document is
//! written one image at a time, and the output only appears once it is
//! complete.
//!
//! ## Pipeline Overview
//!
//! ```text
//! selection
//!  │
//!  ├─ 1. Collect   explicit files, or supported files in a directory
//!  ├─ 2. Order     natural sort: img1, img2, img10
//!  ├─ 3. Validate  header-only read; bad files become exclusions
//!  ├─ 4. Policy    no valid images? oversized images? (advisory or strict)
//!  └─ 5. Assemble  stream pages into a temp file, then rename into place
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgs2pdf::{convert, ConversionConfig, Selection, SelectionState};
//!
//! let selection = SelectionState::new(
//!     Selection::Directory("scans".into()),
//!     "scans/result",
//!     "scans.pdf",
//! );
//! let result = convert(selection, &ConversionConfig::default());
//! for excluded in &result.diagnostics().exclusions {
//!     eprintln!("skipped {excluded}");
//! }
//! match result.output_path() {
//!     Some(path) => println!("wrote {}", path.display()),
//!     None => eprintln!("failed: {:?}", result.failure_kind()),
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgs2pdf` binary (clap + indicatif + dialoguer + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! imgs2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod selection;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_async, PipelineController};
pub use error::{CandidateError, FailureKind, Img2PdfError};
pub use output::{ConversionResult, Diagnostics, Exclusion, OversizeWarning, RunStats};
pub use progress::{
    CancellationFlag, NoopProgressSink, ProgressCallback, ProgressEvent, ProgressSink, Stage,
};
pub use selection::{Selection, SelectionState};
pub use stream::{spawn_conversion, ConversionHandle, EventStream, PipelineEvent};
