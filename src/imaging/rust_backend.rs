//! Pure Rust image codec backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Rotate | `DynamicImage::rotate90` / `rotate180` / `rotate270` |
//! | Crop | `DynamicImage::crop_imm` |
//! | Resize | `DynamicImage::resize` (aspect-fit) with `Lanczos3` filter |
//! | Encode → JPEG / PNG | `image::codecs::{jpeg, png}` |
//! | Encode → WebP | `webp` (libwebp, lossy with quality) |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{Quality, RenderParams};
use crate::types::{OutputFormat, QuarterTurns};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;

/// File extensions this backend can decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `path` has an extension this backend decodes.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

fn decode_failed(path: &Path, e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
}

/// Load and decode an image from disk, applying its EXIF orientation.
fn load_oriented(path: &Path) -> Result<DynamicImage, BackendError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| decode_failed(path, e))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| decode_failed(path, e))?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn rotate(img: DynamicImage, turns: Option<QuarterTurns>) -> DynamicImage {
    match turns {
        Some(QuarterTurns::One) => img.rotate90(),
        Some(QuarterTurns::Two) => img.rotate180(),
        Some(QuarterTurns::Three) => img.rotate270(),
        None => img,
    }
}

/// Encode to the requested format. Quality is ignored for PNG.
fn encode(img: &DynamicImage, format: OutputFormat, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let result = match format {
        OutputFormat::Jpg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
            rgb.write_with_encoder(encoder)
        }
        OutputFormat::Png => img.write_with_encoder(PngEncoder::new(&mut buf)),
        OutputFormat::Webp => return Ok(encode_webp(img, quality)),
    };
    result.map_err(|e| BackendError::ProcessingFailed(format!("{format} encode failed: {e}")))?;
    Ok(buf)
}

/// Lossy WebP via libwebp. `image`'s own WebP encoder is lossless-only.
fn encode_webp(img: &DynamicImage, quality: Quality) -> Vec<u8> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    encoder.encode(quality.value() as f32).to_vec()
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let mut decoder = ImageReader::open(path)?
            .with_guessed_format()?
            .into_decoder()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
            })?;
        let (width, height) = decoder.dimensions();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        Ok(if swaps_axes(orientation) {
            Dimensions {
                width: height,
                height: width,
            }
        } else {
            Dimensions { width, height }
        })
    }

    fn render(&self, params: &RenderParams) -> Result<Vec<u8>, BackendError> {
        let img = load_oriented(&params.source)?;
        let img = rotate(img, params.rotation);

        let img = match params.crop {
            Some(region) => img.crop_imm(region.left, region.top, region.width, region.height),
            None => img,
        };

        let img = match params.target {
            Some(target) => img.resize(target.width, target.height, FilterType::Lanczos3),
            None => img,
        };

        encode(&img, params.format, params.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::calculations::CropRegion;
    use crate::test_helpers::{ExifEntry, create_test_jpeg, write_jpeg_with_exif};
    use crate::types::Size;
    use image::GenericImageView;

    fn params(source: &Path, format: OutputFormat) -> RenderParams {
        RenderParams {
            source: source.to_path_buf(),
            rotation: None,
            crop: None,
            target: None,
            format,
            quality: Quality::new(85),
        }
    }

    fn decoded_dims(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported_image(Path::new("a/IMG_0001.JPG")));
        assert!(is_supported_image(Path::new("scan.tiff")));
        assert!(!is_supported_image(Path::new("clip.mov")));
        assert!(!is_supported_image(Path::new("no_extension")));
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 200, 150);

        let backend = RustBackend::new();
        let dims = backend.identify(&path).unwrap();
        assert_eq!(dims.width, 200);
        assert_eq!(dims.height, 150);
    }

    #[test]
    fn identify_applies_exif_orientation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        // Orientation 6 = rotate 90° clockwise to display
        write_jpeg_with_exif(&path, 200, 100, &[ExifEntry::short(0x0112, 6)], &[]);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!((dims.width, dims.height), (100, 200));
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let backend = RustBackend::new();
        let result = backend.identify(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn render_plain_png_keeps_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 120, 80);

        let bytes = RustBackend::new()
            .render(&params(&source, OutputFormat::Png))
            .unwrap();
        assert_eq!(decoded_dims(&bytes), (120, 80));
    }

    #[test]
    fn render_quarter_turn_swaps_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 200, 100);

        let bytes = RustBackend::new()
            .render(&RenderParams {
                rotation: Some(QuarterTurns::One),
                ..params(&source, OutputFormat::Png)
            })
            .unwrap();
        assert_eq!(decoded_dims(&bytes), (100, 200));
    }

    #[test]
    fn render_crops_after_rotation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 200, 100);

        // After a quarter turn the canvas is 100x200; a 60x150 region fits only then
        let bytes = RustBackend::new()
            .render(&RenderParams {
                rotation: Some(QuarterTurns::Three),
                crop: Some(CropRegion {
                    left: 20,
                    top: 30,
                    width: 60,
                    height: 150,
                }),
                ..params(&source, OutputFormat::Png)
            })
            .unwrap();
        assert_eq!(decoded_dims(&bytes), (60, 150));
    }

    #[test]
    fn render_resize_is_aspect_fit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 400, 300);

        // Custom width 200 → oversized height bound leaves height free
        let bytes = RustBackend::new()
            .render(&RenderParams {
                target: Some(Size::new(200, 20_000)),
                ..params(&source, OutputFormat::Jpg)
            })
            .unwrap();
        assert_eq!(decoded_dims(&bytes), (200, 150));
    }

    #[test]
    fn render_webp_output_decodes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 300, 200);

        let bytes = RustBackend::new()
            .render(&RenderParams {
                target: Some(Size::new(150, 150)),
                ..params(&source, OutputFormat::Webp)
            })
            .unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(decoded_dims(&bytes), (150, 100));
    }

    #[test]
    fn render_is_deterministic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 160, 90);
        let p = RenderParams {
            rotation: Some(QuarterTurns::Two),
            target: Some(Size::new(80, 80)),
            ..params(&source, OutputFormat::Png)
        };

        let backend = RustBackend::new();
        assert_eq!(backend.render(&p).unwrap(), backend.render(&p).unwrap());
    }

    #[test]
    fn render_corrupt_source_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("broken.jpg");
        std::fs::write(&source, b"definitely not a jpeg").unwrap();

        let result = RustBackend::new().render(&params(&source, OutputFormat::Jpg));
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }
}
