//! Header-level validation of candidate files.
//!
//! The format is sniffed from the file content (not the extension) and the
//! dimensions are read with [`image::ImageReader::into_dimensions`], which
//! parses only the header for every supported codec. Pixel data is never
//! decoded here.
//!
//! Every failure is captured on the candidate itself. A corrupt file never
//! prevents its siblings from being validated.

use crate::error::{CandidateError, Img2PdfError};
use image::{ImageError, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Formats the assembler knows how to place on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Bmp,
    Gif,
    Tiff,
}

impl SourceFormat {
    fn from_image_format(f: ImageFormat) -> Option<Self> {
        match f {
            ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
            ImageFormat::Png => Some(SourceFormat::Png),
            ImageFormat::Bmp => Some(SourceFormat::Bmp),
            ImageFormat::Gif => Some(SourceFormat::Gif),
            ImageFormat::Tiff => Some(SourceFormat::Tiff),
            _ => None,
        }
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            SourceFormat::Jpeg => ImageFormat::Jpeg,
            SourceFormat::Png => ImageFormat::Png,
            SourceFormat::Bmp => ImageFormat::Bmp,
            SourceFormat::Gif => ImageFormat::Gif,
            SourceFormat::Tiff => ImageFormat::Tiff,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceFormat::Jpeg => "JPEG",
            SourceFormat::Png => "PNG",
            SourceFormat::Bmp => "BMP",
            SourceFormat::Gif => "GIF",
            SourceFormat::Tiff => "TIFF",
        };
        f.write_str(s)
    }
}

/// One file considered for inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub path: PathBuf,
    /// Detected format; `None` until validated or when unrecognised.
    pub format: Option<SourceFormat>,
    pub width: u32,
    pub height: u32,
    pub error: Option<CandidateError>,
}

impl ImageCandidate {
    /// An unvalidated candidate.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            width: 0,
            height: 0,
            error: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.format.is_some() && self.width > 0 && self.height > 0
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn invalid(mut self, err: CandidateError) -> Self {
        warn!("Excluding '{}': {}", self.path.display(), err);
        self.error = Some(err);
        self
    }
}

/// Validate one path. Never fails: problems land in `candidate.error`.
pub fn validate(path: &Path) -> ImageCandidate {
    let candidate = ImageCandidate::new(path);

    if !path.is_file() {
        return candidate.invalid(CandidateError::NotFound);
    }

    let header = panic::catch_unwind(AssertUnwindSafe(|| read_header(path))).unwrap_or_else(|_| {
        Err(CandidateError::Corrupt {
            detail: "decoder panicked while reading the header".into(),
        })
    });

    match header {
        Ok((format, width, height)) => {
            debug!(
                "Validated '{}': {} {}x{}",
                path.display(),
                format,
                width,
                height
            );
            ImageCandidate {
                format: Some(format),
                width,
                height,
                ..candidate
            }
        }
        Err(err) => candidate.invalid(err),
    }
}

/// Validate `paths` in order.
///
/// `checkpoint(done, last)` runs before the first file (`done == 0`) and after
/// each one; an error from it stops validation and is returned as-is.
pub fn validate_all<F>(paths: &[PathBuf], mut checkpoint: F) -> Result<Vec<ImageCandidate>, Img2PdfError>
where
    F: FnMut(usize, Option<&ImageCandidate>) -> Result<(), Img2PdfError>,
{
    let mut out = Vec::with_capacity(paths.len());
    checkpoint(0, None)?;
    for path in paths {
        let candidate = validate(path);
        checkpoint(out.len() + 1, Some(&candidate))?;
        out.push(candidate);
    }
    Ok(out)
}

fn read_header(path: &Path) -> Result<(SourceFormat, u32, u32), CandidateError> {
    let unreadable = |e: std::io::Error| CandidateError::Unreadable {
        detail: e.to_string(),
    };

    // `ImageReader::open` would seed the format from the extension.
    let file = File::open(path).map_err(unreadable)?;
    let reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(unreadable)?;

    let format = match reader.format() {
        None => {
            return Err(CandidateError::UnsupportedFormat {
                detail: "content is not a recognised image".into(),
            })
        }
        Some(f) => SourceFormat::from_image_format(f).ok_or_else(|| {
            CandidateError::UnsupportedFormat {
                detail: format!("{f:?} images are not supported"),
            }
        })?,
    };

    let (width, height) = reader.into_dimensions().map_err(|e| match e {
        ImageError::Unsupported(u) => CandidateError::UnsupportedFormat {
            detail: u.to_string(),
        },
        ImageError::IoError(io) => CandidateError::Corrupt {
            detail: io.to_string(),
        },
        other => CandidateError::Corrupt {
            detail: other.to_string(),
        },
    })?;

    if width == 0 || height == 0 {
        return Err(CandidateError::ZeroDimensions);
    }
    Ok((format, width, height))
}
