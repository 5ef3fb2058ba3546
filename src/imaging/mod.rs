//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image` decoder dimensions + EXIF orientation |
//! | **Rotate / crop / resize** | `image::DynamicImage` (Lanczos3) |
//! | **Encode JPEG / PNG** | `image` encoders |
//! | **Encode WebP** | `webp` (lossy, libwebp) |
//! | **APPn segments** | custom JPEG marker scanner |
//!
//! The module is split into:
//! - **Calculations**: pure functions for geometry (unit testable)
//! - **Parameters**: data describing one render
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Segments**: JFIF/XMP/ICC/IPTC extraction from JPEG bytes

pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;
pub mod segments;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{
    CropRegion, CustomSizeSide, crop_region_from_work, edited_size, reduce_to_pixel_budget,
    resolve_custom_size,
};
pub use params::{Quality, RenderParams};
pub use rust_backend::{RustBackend, is_supported_image};
