//! CLI output formatting.
//!
//! Output leads with the photo's identity (its filename) and shows details as
//! indented context lines.
//!
//! ## Metadata summary
//!
//! ```text
//! IMG_0042.JPG
//!     Size: 6000 x 4000
//!     Camera: Canon EOS 5D Mark IV
//!     Exposure: 1/250 s  f/2.8  ISO 400  50 mm
//!     Created: 2021-07-04 18:22:03
//!     Orientation: 1
//!     Tags: world:The Great Pug, player:alice
//! ```
//!
//! ## Raw segments
//!
//! ```text
//! ifd0
//!     Make: Canon
//!     XResolution: 72
//! makerNote
//!     <2048 bytes>
//! ```
//!
//! ## Export / thumbnail
//!
//! ```text
//! 001 IMG_0042.JPG → /exports/IMG_0042_001.jpg
//! 002 IMG_0043.JPG: master file missing: /photos/IMG_0043.JPG
//! ```
//!
//! Each `format_*` function returns `Vec<String>` and is pure. The `print_*`
//! wrappers write to stdout.

use crate::metadata::reader::{ExifData, ExifValue};
use crate::metadata::{MetaData, SegmentData};
use std::fmt::Display;
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Number without a trailing `.0`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// `1/250 s` for fractions of a second, `2 s` otherwise.
fn format_exposure(seconds: f64) -> String {
    if seconds > 0.0 && seconds < 1.0 {
        format!("1/{} s", (1.0 / seconds).round() as u64)
    } else {
        format!("{} s", format_number(seconds))
    }
}

fn format_value(value: &ExifValue) -> String {
    match value {
        ExifValue::Number(n) => format_number(*n),
        ExifValue::Numbers(ns) => ns
            .iter()
            .map(|n| format_number(*n))
            .collect::<Vec<_>>()
            .join(", "),
        ExifValue::Text(s) => s.clone(),
        ExifValue::List(items) => items.join(", "),
        ExifValue::Bytes(b) => format!("<{} bytes>", b.len()),
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Format a metadata summary.
pub fn format_metadata(path: &Path, meta: &MetaData) -> Vec<String> {
    let pad = indent(1);
    let mut lines = vec![file_label(path)];

    if let (Some(w), Some(h)) = (meta.img_width, meta.img_height) {
        let assumed = match (meta.img_width_assumed, meta.img_height_assumed) {
            (Some(aw), Some(ah)) => format!(" (assumed {} x {})", aw, ah),
            _ => String::new(),
        };
        lines.push(format!("{pad}Size: {} x {}{}", w, h, assumed));
    }
    if let Some(camera) = &meta.camera {
        lines.push(format!("{pad}Camera: {}", camera));
    }

    let mut exposure = Vec::new();
    if let Some(t) = meta.exposure_time {
        exposure.push(format_exposure(t));
    }
    if let Some(f) = meta.aperture {
        exposure.push(format!("f/{}", format_number(f)));
    }
    if let Some(iso) = meta.iso {
        exposure.push(format!("ISO {}", iso));
    }
    if let Some(mm) = meta.focal_length {
        exposure.push(format!("{} mm", format_number(mm)));
    }
    if !exposure.is_empty() {
        lines.push(format!("{pad}Exposure: {}", exposure.join("  ")));
    }

    if let Some(created) = meta.created_at {
        lines.push(format!("{pad}Created: {}", created.format("%Y-%m-%d %H:%M:%S")));
    }
    lines.push(format!("{pad}Orientation: {}", meta.orientation));
    if !meta.tags.is_empty() {
        lines.push(format!("{pad}Tags: {}", meta.tags.join(", ")));
    }

    if let Some(name) = &meta.world_name {
        match &meta.world_id {
            Some(id) => lines.push(format!("{pad}World: {} ({})", name, id)),
            None => lines.push(format!("{pad}World: {}", name)),
        }
    }
    if let Some(organizer) = &meta.organizer {
        lines.push(format!("{pad}Organizer: {}", organizer));
    }
    if let Some(permission) = meta.permission {
        lines.push(format!("{pad}Permission: {}", permission));
    }
    lines
}

pub fn print_metadata(path: &Path, meta: &MetaData) {
    for line in format_metadata(path, meta) {
        println!("{}", line);
    }
}

/// Format raw segments, one block per segment in canonical order.
pub fn format_exif(data: &ExifData) -> Vec<String> {
    let pad = indent(1);
    let mut lines = Vec::new();
    for (segment, content) in data.segments() {
        lines.push(segment.name().to_string());
        match content {
            SegmentData::Fields(fields) => {
                for (key, value) in fields {
                    lines.push(format!("{pad}{}: {}", key, format_value(value)));
                }
            }
            SegmentData::Bytes(bytes) => {
                lines.push(format!("{pad}<{} bytes>", bytes.len()));
            }
        }
    }
    lines
}

pub fn print_exif(data: &ExifData) {
    for line in format_exif(data) {
        println!("{}", line);
    }
}

// ============================================================================
// Export and thumbnails
// ============================================================================

/// One line per processed photo: `→ output` on success, the error otherwise.
pub fn format_result<E: Display>(index: usize, master: &Path, result: &Result<PathBuf, E>) -> String {
    match result {
        Ok(path) => format!(
            "{} {} \u{2192} {}",
            format_index(index),
            file_label(master),
            path.display()
        ),
        Err(e) => format!("{} {}: {}", format_index(index), file_label(master), e),
    }
}

/// Closing line of a batch.
pub fn format_summary(verb: &str, succeeded: usize, failed: usize) -> String {
    if failed == 0 {
        format!("{} {} photos", verb, succeeded)
    } else {
        format!("{} {} photos, {} failed", verb, succeeded, failed)
    }
}
