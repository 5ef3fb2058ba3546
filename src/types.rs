//! Shared types used across the pipeline.
//!
//! [`Photo`] and [`PhotoWork`] are owned by the storage layer. The pipeline
//! receives them as read-only snapshots: it reads geometry and timestamps and
//! never writes back. Both serialize with camelCase keys so edit state can be
//! exchanged with a UI as JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub type PhotoId = u64;

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A single image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: PhotoId,
    /// Directory of the original image, e.g. `/specs/photos`.
    pub master_dir: PathBuf,
    /// Filename of the original image without directory, e.g. `IMG_9700.JPG`.
    pub master_filename: String,
    /// Width of the original image after EXIF orientation is applied.
    pub master_width: u32,
    /// Height of the original image after EXIF orientation is applied.
    pub master_height: u32,
    pub master_is_raw: bool,
    /// Width after all edits. `None` means unedited.
    #[serde(default)]
    pub edited_width: Option<u32>,
    #[serde(default)]
    pub edited_height: Option<u32>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub updated_at: i64,
    pub imported_at: i64,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub trashed: bool,
}

impl Photo {
    pub fn master_path(&self) -> PathBuf {
        self.master_dir.join(&self.master_filename)
    }

    /// Dimensions after edits, falling back to the master dimensions.
    pub fn display_size(&self) -> Size {
        Size {
            width: self.edited_width.unwrap_or(self.master_width),
            height: self.edited_height.unwrap_or(self.master_height),
        }
    }

    /// Return a copy whose edited dimensions reflect `work`.
    ///
    /// Must be re-run by the owner whenever the photo's work changes.
    pub fn with_work(&self, work: &PhotoWork) -> Photo {
        let edited =
            crate::imaging::calculations::edited_size(self.master_width, self.master_height, work);
        let unchanged = edited == Size::new(self.master_width, self.master_height);
        Photo {
            edited_width: (!unchanged).then_some(edited.width),
            edited_height: (!unchanged).then_some(edited.height),
            ..self.clone()
        }
    }
}

/// Clockwise rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuarterTurns {
    One,
    Two,
    Three,
}

impl QuarterTurns {
    pub fn degrees(self) -> u32 {
        u32::from(u8::from(self)) * 90
    }

    /// Whether the rotation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, QuarterTurns::One | QuarterTurns::Three)
    }
}

impl TryFrom<u8> for QuarterTurns {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(QuarterTurns::One),
            2 => Ok(QuarterTurns::Two),
            3 => Ok(QuarterTurns::Three),
            other => Err(format!("rotationTurns must be 1, 2 or 3, got {other}")),
        }
    }
}

impl From<QuarterTurns> for u8 {
    fn from(turns: QuarterTurns) -> u8 {
        match turns {
            QuarterTurns::One => 1,
            QuarterTurns::Two => 2,
            QuarterTurns::Three => 3,
        }
    }
}

/// Crop rectangle in the projected space of the rotated image.
///
/// `x`/`y` are offsets of the top-left corner from the canvas center, so a
/// crop covering the whole image has `x = -width / 2`, `y = -height / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Pending, non-destructive edits of a photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoWork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_turns: Option<QuarterTurns>,
    /// Tilt angle in degrees. Carried for the editing model; not rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tilt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_rect: Option<CropRect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Webp,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
        }
    }

    /// Whether `quality` has any effect for this format.
    pub fn is_lossy(self) -> bool {
        !matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "webp" => Ok(OutputFormat::Webp),
            "png" => Ok(OutputFormat::Png),
            other => Err(other.to_string()),
        }
    }
}

/// How to encode a rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub format: OutputFormat,
    /// Fraction in `[0, 1]`. Ignored for PNG.
    pub quality: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpg,
            quality: 0.9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::sample_photo;

    #[test]
    fn quarter_turns_parse_from_json_numbers() {
        let work: PhotoWork = serde_json::from_str(r#"{"rotationTurns": 3}"#).unwrap();
        assert_eq!(work.rotation_turns, Some(QuarterTurns::Three));
        assert_eq!(QuarterTurns::Three.degrees(), 270);
    }

    #[test]
    fn quarter_turns_reject_out_of_range() {
        assert!(serde_json::from_str::<PhotoWork>(r#"{"rotationTurns": 4}"#).is_err());
        assert!(serde_json::from_str::<PhotoWork>(r#"{"rotationTurns": 0}"#).is_err());
    }

    #[test]
    fn photo_work_roundtrips_camel_case() {
        let json = r#"{"rotationTurns":1,"cropRect":{"x":-10.0,"y":-20.0,"width":20.0,"height":40.0}}"#;
        let work: PhotoWork = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&work).unwrap(), json);
    }

    #[test]
    fn master_path_joins_dir_and_filename() {
        let photo = sample_photo("/photos/2024", "IMG_0001.JPG", 4000, 3000);
        assert_eq!(
            photo.master_path(),
            PathBuf::from("/photos/2024/IMG_0001.JPG")
        );
    }

    #[test]
    fn with_work_sets_edited_size_only_when_changed() {
        let photo = sample_photo("/p", "a.jpg", 4000, 3000);

        let rotated = photo.with_work(&PhotoWork {
            rotation_turns: Some(QuarterTurns::One),
            ..Default::default()
        });
        assert_eq!(rotated.display_size(), Size::new(3000, 4000));
        assert_eq!(rotated.edited_width, Some(3000));

        let untouched = photo.with_work(&PhotoWork::default());
        assert_eq!(untouched.edited_width, None);
        assert_eq!(untouched.display_size(), Size::new(4000, 3000));
    }

    #[test]
    fn output_format_parse_and_display() {
        assert_eq!("jpeg".parse::<OutputFormat>(), Ok(OutputFormat::Jpg));
        assert_eq!("webp".parse::<OutputFormat>(), Ok(OutputFormat::Webp));
        assert!("gif".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Png.to_string(), "png");
        assert!(!OutputFormat::Png.is_lossy());
    }
}
