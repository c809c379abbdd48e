//! Aggregate go/no-go decision over validated candidates.
//!
//! Pure classification: no I/O, no prompting. Whether an advisory warning
//! stops the run is up to the caller's sink.

use crate::config::ConversionConfig;
use crate::output::{Exclusion, OversizeWarning};
use crate::pipeline::validate::ImageCandidate;

/// Outcome of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    /// At least one candidate is valid, and (in strict mode) none is oversized.
    pub proceedable: bool,
    pub warnings: Vec<OversizeWarning>,
    pub exclusions: Vec<Exclusion>,
    /// Oversize warnings block assembly (strict mode).
    pub blocking: bool,
    pub valid_count: usize,
}

/// Classify `candidates` against `config`.
///
/// An image is oversized when its pixel area is at or above
/// `config.max_pixels`. Invalid candidates become exclusions in input order.
pub fn classify(candidates: &[ImageCandidate], config: &ConversionConfig) -> PolicyDecision {
    let mut warnings = Vec::new();
    let mut exclusions = Vec::new();
    let mut valid_count = 0;

    for c in candidates {
        if !c.is_valid() {
            if let Some(reason) = c.error.clone() {
                exclusions.push(Exclusion {
                    path: c.path.clone(),
                    reason,
                });
            }
            continue;
        }
        valid_count += 1;
        if c.pixels() >= config.max_pixels {
            warnings.push(OversizeWarning {
                path: c.path.clone(),
                width: c.width,
                height: c.height,
            });
        }
    }

    let blocking = config.strict_resolution && !warnings.is_empty();
    PolicyDecision {
        proceedable: valid_count > 0 && !blocking,
        warnings,
        exclusions,
        blocking,
        valid_count,
    }
}
