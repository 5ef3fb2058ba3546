//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`render`](crate::render) module (which decides what
//! to render from a photo and its edits) and the [`backend`](super::backend)
//! (which does the actual pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing render planning.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality, 1-100, default 90. Clamped on construction.
//! - [`RenderParams`]: everything one render needs, from source path to encoder settings.

use super::calculations::CropRegion;
use crate::types::{OutputFormat, QuarterTurns, Size};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Convert a `[0, 1]` quality fraction to the encoder scale.
    pub fn from_fraction(fraction: f32) -> Self {
        let fraction = if fraction.is_finite() { fraction } else { 1.0 };
        Self::new((fraction.clamp(0.0, 1.0) * 100.0).round() as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for one render: decode, rotate, crop, resize, encode.
///
/// Steps run in that order. The crop region is expressed in the coordinate
/// space produced after rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub source: PathBuf,
    pub rotation: Option<QuarterTurns>,
    pub crop: Option<CropRegion>,
    /// Aspect-fit bounding box. `None` keeps the (cropped) size.
    pub target: Option<Size>,
    pub format: OutputFormat,
    pub quality: Quality,
}
