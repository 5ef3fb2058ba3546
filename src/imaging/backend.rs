//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs
//! from an image codec: identify (oriented dimensions) and render (decode,
//! rotate, crop, resize, encode in one pass).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Backends are synchronous; async callers move them onto the
//! blocking pool (see [`LocalRenderer`](crate::render::LocalRenderer)).

use super::params::RenderParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image codec backends.
///
/// Implementations must be deterministic: the same params over the same
/// source produce byte-identical output.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions after EXIF orientation is applied.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Execute a render and return the encoded bytes.
    fn render(&self, params: &RenderParams) -> Result<Vec<u8>, BackendError>;
}
