//! Configuration for an image-to-PDF run.
//!
//! All tunable behaviour lives in [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. The config is cloned into each run; the only
//! shared state it carries is the progress sink and the cancellation flag,
//! both reference-counted so the caller keeps a handle on them.

use crate::error::Img2PdfError;
use crate::progress::{CancellationFlag, ProgressCallback};
use std::fmt;

/// Pixel area at which an image is flagged as oversized (40 MP).
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// Extensions collected from a directory, compared case-insensitively.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff"];

/// Configuration for a conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use imgs2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .max_pixels(25_000_000)
///     .recursive(true)
///     .title("Scans")
///     .build()
///     .unwrap();
/// assert!(!config.strict_resolution);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Resolution ceiling as pixel area (`width * height`). Default: 40 000 000.
    ///
    /// Images at or above it are reported as oversize hazards. Such PDFs are
    /// valid but slow to render and large on disk.
    pub max_pixels: u64,

    /// Block assembly when an image hits the ceiling. Default: false.
    ///
    /// When false the hazard is advisory: the sink's
    /// [`crate::ProgressSink::confirm_oversized`] decides whether to go on.
    pub strict_resolution: bool,

    /// Descend into sub-directories when collecting from a folder. Default: false.
    pub recursive: bool,

    /// Lower-case extensions (without dot) collected from a folder.
    pub extensions: Vec<String>,

    /// `/Title` written into the PDF info dictionary. Default: None.
    pub title: Option<String>,

    /// Receives stage and per-item events.
    pub progress_sink: Option<ProgressCallback>,

    /// Checked between items; clone it before starting the run to cancel later.
    pub cancellation: CancellationFlag,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_pixels: DEFAULT_MAX_PIXELS,
            strict_resolution: false,
            recursive: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            title: None,
            progress_sink: None,
            cancellation: CancellationFlag::new(),
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_pixels", &self.max_pixels)
            .field("strict_resolution", &self.strict_resolution)
            .field("recursive", &self.recursive)
            .field("extensions", &self.extensions)
            .field("title", &self.title)
            .field(
                "progress_sink",
                &self.progress_sink.as_ref().map(|_| "<dyn ProgressSink>"),
            )
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when `ext` (with or without leading dot) is on the allow-list.
    pub fn is_supported_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_pixels(mut self, px: u64) -> Self {
        self.config.max_pixels = px.max(1);
        self
    }

    pub fn strict_resolution(mut self, v: bool) -> Self {
        self.config.strict_resolution = v;
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    /// Replace the extension allow-list. Entries are normalised to lower case
    /// without a leading dot.
    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn progress_sink(mut self, sink: ProgressCallback) -> Self {
        self.config.progress_sink = Some(sink);
        self
    }

    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.config.cancellation = flag;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Img2PdfError> {
        let c = &self.config;
        if c.max_pixels == 0 {
            return Err(Img2PdfError::InvalidConfig(
                "max_pixels must be ≥ 1".into(),
            ));
        }
        if c.extensions.is_empty() {
            return Err(Img2PdfError::InvalidConfig(
                "at least one image extension must be allowed".into(),
            ));
        }
        Ok(self.config)
    }
}
