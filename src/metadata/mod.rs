//! Metadata extraction from source images.
//!
//! Two views of the same file:
//!
//! - [`MetadataExtractor::extract_summary`] produces a normalised
//!   [`MetaData`] for import. It never fails: unreadable files fall back to
//!   the filesystem creation time, upright orientation and no tags.
//! - [`MetadataExtractor::extract_raw_segments`] returns every readable
//!   segment as [`ExifData`] for detailed inspection, without normalisation.
//!
//! ## Normalisation rules
//!
//! | Field | Source |
//! |---|---|
//! | `camera` | `Make` + `Model`, brand shortened and de-duplicated |
//! | `iso` | `PhotographicSensitivity`, first element if it is an array |
//! | `createdAt` | first of `DateTimeOriginal`, `DateTime`, `DateTimeDigitized`, `xmp:ModifyDate` |
//! | `orientation` | `Orientation`, default 1 |
//! | `imgWidthAssumed` | `PixelXDimension`/`PixelYDimension` when they differ from `ImageWidth`/`ImageLength` |
//! | `tags`, world fields | MakerNote [payload](payload) |

pub mod payload;
pub mod reader;

use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, warn};
use payload::{Permission, decode_payload};
use reader::{ExifData, ExifValue, KamadakReader, MetadataReader, ReadError, Segment};
use serde::Serialize;
use std::path::Path;

pub use reader::SegmentData;

/// Verbose EXIF brand strings and their short forms.
const SIMPLIFIED_BRAND_NAMES: &[(&str, &str)] = &[
    ("CASIO COMPUTER CO.,LTD.", "CASIO"),
    ("NIKON CORPORATION", "Nikon"),
    ("OLYMPUS IMAGING CORP.", "Olympus"),
];

/// Segments the summary needs.
const SUMMARY_SEGMENTS: &[Segment] = &[
    Segment::Ifd0,
    Segment::Exif,
    Segment::Xmp,
    Segment::MakerNote,
];

/// Normalised summary of a photo's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_height: Option<u32>,
    /// Lower-confidence dimensions; some cameras swap them when in-camera
    /// auto-rotation is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_width_assumed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_height_assumed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    /// F-number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    /// Millimetres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    /// Local wall-clock time as recorded by the camera.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    /// EXIF orientation, 1 (upright) to 8.
    pub orientation: u16,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<Permission>,
}

/// Reads and normalises metadata through a [`MetadataReader`].
pub struct MetadataExtractor<R = KamadakReader> {
    reader: R,
}

impl MetadataExtractor<KamadakReader> {
    pub fn new() -> Self {
        Self::with_reader(KamadakReader::new())
    }
}

impl Default for MetadataExtractor<KamadakReader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: MetadataReader> MetadataExtractor<R> {
    pub fn with_reader(reader: R) -> Self {
        Self { reader }
    }

    /// Normalised summary for `path`. Falls back to filesystem data on any
    /// read failure.
    pub fn extract_summary(&self, path: &Path) -> MetaData {
        match self.reader.read_segments(path, SUMMARY_SEGMENTS, false) {
            Ok(data) => summarize(&data),
            Err(e) => {
                warn!(
                    "Reading EXIF data from {} failed, continuing without: {}",
                    path.display(),
                    e
                );
                fallback_metadata(path)
            }
        }
    }

    /// All readable segments of `path`, or `None` if nothing could be read.
    pub fn extract_raw_segments(&self, path: &Path) -> Option<ExifData> {
        match self.reader.read_segments(path, &Segment::ALL, true) {
            Ok(data) => Some(data),
            Err(ReadError::NoMetadata(_)) => None,
            Err(e) => {
                debug!("Raw metadata of {} unavailable: {}", path.display(), e);
                None
            }
        }
    }
}

fn fallback_metadata(path: &Path) -> MetaData {
    let created_at = std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .ok()
        .map(|time| DateTime::<Local>::from(time).naive_local());
    MetaData {
        created_at,
        orientation: 1,
        ..MetaData::default()
    }
}

/// Look a key up in the first segment that has it.
fn lookup<'a>(data: &'a ExifData, segments: &[Segment], key: &str) -> Option<&'a ExifValue> {
    segments.iter().find_map(|s| data.get(*s, key))
}

fn text<'a>(data: &'a ExifData, key: &str) -> Option<&'a str> {
    lookup(data, &[Segment::Ifd0, Segment::Exif], key)
        .and_then(ExifValue::as_text)
        .map(|s| s.trim_end_matches('\0'))
        .filter(|s| !s.trim().is_empty())
}

fn number(data: &ExifData, key: &str) -> Option<f64> {
    lookup(data, &[Segment::Ifd0, Segment::Exif], key)
        .and_then(ExifValue::first_number)
        .filter(|n| n.is_finite())
}

fn dimension(data: &ExifData, key: &str) -> Option<u32> {
    number(data, key)
        .filter(|n| *n > 0.0)
        .map(|n| n as u32)
}

/// Join make and model into one camera name.
///
/// ```text
/// Make = 'Canon', Model = 'Canon EOS 30D'                → 'Canon EOS 30D'
/// Make = 'SONY', Model = 'DSC-N2'                        → 'SONY DSC-N2'
/// Make = 'NIKON CORPORATION', Model = 'NIKON D7200'      → 'Nikon D7200'
/// Make = 'CASIO COMPUTER CO.,LTD.', Model = 'EX-Z5     ' → 'CASIO EX-Z5'
/// ```
pub fn normalize_camera(make: Option<&str>, model: Option<&str>) -> Option<String> {
    let (Some(make), Some(model)) = (make, model) else {
        return model.map(str::to_string);
    };

    let brand = make.trim();
    let brand = SIMPLIFIED_BRAND_NAMES
        .iter()
        .find(|(verbose, _)| *verbose == brand)
        .map_or(brand, |(_, short)| *short);

    let model = match model.get(..brand.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(brand) => &model[brand.len()..],
        _ => model,
    };

    Some(format!("{} {}", brand, model.trim()))
}

/// Parse an EXIF (`2021:07:04 18:30:00`) or ISO 8601 timestamp.
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y:%m:%d %H:%M:%S")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_local()))
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
}

fn created_at(data: &ExifData) -> Option<NaiveDateTime> {
    let candidates = [
        text(data, "DateTimeOriginal"),
        text(data, "DateTime"),
        text(data, "DateTimeDigitized"),
        data.get(Segment::Xmp, "xmp:ModifyDate")
            .and_then(ExifValue::as_text),
    ];
    candidates.into_iter().flatten().find_map(parse_timestamp)
}

/// Payload text stored in the MakerNote, if any.
fn maker_note(data: &ExifData) -> Option<String> {
    let bytes = data.bytes(Segment::MakerNote)?;
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_matches(char::from(0)).trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn summarize(data: &ExifData) -> MetaData {
    let img_width = dimension(data, "ImageWidth");
    let img_height = dimension(data, "ImageLength");

    let mut meta = MetaData {
        img_width,
        img_height,
        camera: normalize_camera(text(data, "Make"), text(data, "Model")),
        exposure_time: number(data, "ExposureTime"),
        iso: number(data, "PhotographicSensitivity").map(|n| n as u32),
        aperture: number(data, "FNumber"),
        focal_length: number(data, "FocalLength"),
        created_at: created_at(data),
        orientation: number(data, "Orientation")
            .map(|n| n as u16)
            .filter(|o| *o != 0)
            .unwrap_or(1),
        ..MetaData::default()
    };

    if let (Some(w), Some(h)) = (
        dimension(data, "PixelXDimension"),
        dimension(data, "PixelYDimension"),
    ) && (Some(w), Some(h)) != (img_width, img_height)
    {
        meta.img_width_assumed = Some(w);
        meta.img_height_assumed = Some(h);
    }

    if let Some(note) = maker_note(data) {
        match decode_payload(&note) {
            Ok(payload) => {
                meta.tags = payload.tags();
                meta.world_id = Some(payload.room.world_id);
                meta.world_name = Some(payload.room.world_name);
                meta.organizer = payload.room.organizer;
                meta.permission = payload.room.permission;
            }
            Err(e) => warn!("Ignoring undecodable MakerNote payload: {}", e),
        }
    }

    meta
}
