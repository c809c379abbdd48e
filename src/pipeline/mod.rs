//! Pipeline stages for image-to-PDF conversion.
//!
//! Each submodule implements exactly one step and is independently testable.
//! [`crate::convert::PipelineController`] runs them in order.
//!
//! ## Data Flow
//!
//! ```text
//! collect ──▶ order ──▶ validate ──▶ policy ──▶ embed + assemble
//! (paths)   (natural)  (headers)   (go/no-go)  (streamed PDF)
//! ```
//!
//! 1. [`collect`]: expand the selection into candidate paths
//! 2. [`order`]: natural sort by file name (`img2` before `img10`)
//! 3. [`validate`]: sniff format and read dimensions; failures stay on the
//!    candidate instead of aborting the run
//! 4. [`policy`]: pure classification into exclusions, oversize warnings
//!    and a proceed decision
//! 5. [`embed`]: turn one image into a PDF image stream, reusing the
//!    original encoded bytes when the PDF can hold them as-is
//! 6. [`assemble`]: write pages one at a time into a temp file, then rename

pub mod assemble;
pub mod collect;
pub mod embed;
pub mod order;
pub mod policy;
pub mod validate;
