//! Raw metadata segments and the reader capability that produces them.
//!
//! [`ExifData`] is a map-of-maps keyed by [`Segment`]. Each segment is either
//! a key→value mapping or, for `makerNote` and `userComment`, opaque bytes.
//! It is meant for on-demand inspection and is never normalised.
//!
//! [`KamadakReader`] fills the TIFF-derived segments with `kamadak-exif` and
//! the JPEG application segments with the in-crate
//! [`segments`](crate::imaging::segments) scanner.

use crate::imaging::segments::{self, AppSegments};
use exif::{Context, In, Tag};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),
    #[error("no metadata found in {}", .0.display())]
    NoMetadata(PathBuf),
}

/// Named metadata segments of an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Segment {
    Ifd0,
    Ifd1,
    Exif,
    Gps,
    Interop,
    Jfif,
    Iptc,
    Xmp,
    Icc,
    MakerNote,
    UserComment,
}

impl Segment {
    pub const ALL: [Segment; 11] = [
        Segment::Ifd0,
        Segment::Ifd1,
        Segment::Exif,
        Segment::Gps,
        Segment::Interop,
        Segment::Jfif,
        Segment::Iptc,
        Segment::Xmp,
        Segment::Icc,
        Segment::MakerNote,
        Segment::UserComment,
    ];

    /// Key used for the segment in JSON output.
    pub fn name(self) -> &'static str {
        match self {
            Segment::Ifd0 => "ifd0",
            Segment::Ifd1 => "ifd1",
            Segment::Exif => "exif",
            Segment::Gps => "gps",
            Segment::Interop => "interop",
            Segment::Jfif => "jfif",
            Segment::Iptc => "iptc",
            Segment::Xmp => "xmp",
            Segment::Icc => "icc",
            Segment::MakerNote => "makerNote",
            Segment::UserComment => "userComment",
        }
    }

    /// Segments stored inside the TIFF/EXIF structure.
    fn is_tiff(self) -> bool {
        !self.is_app()
    }

    /// Segments stored in separate JPEG APPn markers.
    fn is_app(self) -> bool {
        matches!(
            self,
            Segment::Jfif | Segment::Iptc | Segment::Xmp | Segment::Icc
        )
    }
}

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExifValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
    List(Vec<String>),
    Bytes(Vec<u8>),
}

impl ExifValue {
    /// Scalar number, or the first element of a non-empty number array.
    pub fn first_number(&self) -> Option<f64> {
        match self {
            ExifValue::Number(n) => Some(*n),
            ExifValue::Numbers(ns) => ns.first().copied(),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ExifValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExifValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SegmentData {
    Fields(BTreeMap<String, ExifValue>),
    Bytes(Vec<u8>),
}

/// Raw metadata of one file, grouped by segment. Absent segments are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExifData {
    segments: BTreeMap<Segment, SegmentData>,
}

impl ExifData {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, segment: Segment) -> Option<&SegmentData> {
        self.segments.get(&segment)
    }

    pub fn segments(&self) -> impl Iterator<Item = (Segment, &SegmentData)> {
        self.segments.iter().map(|(s, d)| (*s, d))
    }

    pub fn fields(&self, segment: Segment) -> Option<&BTreeMap<String, ExifValue>> {
        match self.segments.get(&segment)? {
            SegmentData::Fields(fields) => Some(fields),
            SegmentData::Bytes(_) => None,
        }
    }

    pub fn bytes(&self, segment: Segment) -> Option<&[u8]> {
        match self.segments.get(&segment)? {
            SegmentData::Bytes(bytes) => Some(bytes),
            SegmentData::Fields(_) => None,
        }
    }

    pub fn get(&self, segment: Segment, key: &str) -> Option<&ExifValue> {
        self.fields(segment)?.get(key)
    }

    /// Insert a field, creating the segment's map on first use.
    pub fn insert_field(&mut self, segment: Segment, key: impl Into<String>, value: ExifValue) {
        let data = self
            .segments
            .entry(segment)
            .or_insert_with(|| SegmentData::Fields(BTreeMap::new()));
        if let SegmentData::Fields(fields) = data {
            fields.insert(key.into(), value);
        }
    }

    pub fn insert_bytes(&mut self, segment: Segment, bytes: Vec<u8>) {
        self.segments.insert(segment, SegmentData::Bytes(bytes));
    }

    /// Keep only the listed segments.
    pub fn retain(&mut self, wanted: &[Segment]) {
        self.segments.retain(|s, _| wanted.contains(s));
    }
}

/// Capability to read raw binary metadata segments from an image file.
pub trait MetadataReader: Send + Sync {
    /// Read the requested `segments` from `path`.
    ///
    /// With `translate_values` set, values are rendered human-readable
    /// (`"1/250 s"`, `"row 0 at top and column 0 at left"`); otherwise they
    /// stay numeric. Fails when the file cannot be read or holds none of the
    /// requested segments.
    fn read_segments(
        &self,
        path: &Path,
        segments: &[Segment],
        translate_values: bool,
    ) -> Result<ExifData, ReadError>;
}

/// Production reader backed by `kamadak-exif`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KamadakReader;

impl KamadakReader {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataReader for KamadakReader {
    fn read_segments(
        &self,
        path: &Path,
        wanted: &[Segment],
        translate_values: bool,
    ) -> Result<ExifData, ReadError> {
        let bytes = std::fs::read(path)?;
        let mut data = ExifData::default();

        if wanted.iter().any(|s| s.is_tiff()) {
            match exif::Reader::new().read_from_container(&mut Cursor::new(&bytes)) {
                Ok(exif) => collect_tiff_segments(&exif, translate_values, &mut data),
                // A container without an EXIF block can still carry XMP and friends
                Err(exif::Error::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if wanted.iter().any(|s| s.is_app()) {
            collect_app_segments(&segments::scan_jpeg(&bytes), &mut data);
        }

        data.retain(wanted);
        if data.is_empty() {
            return Err(ReadError::NoMetadata(path.to_path_buf()));
        }
        Ok(data)
    }
}

fn tiff_segment(field: &exif::Field) -> Option<Segment> {
    if field.tag == Tag::MakerNote {
        return Some(Segment::MakerNote);
    }
    if field.tag == Tag::UserComment {
        return Some(Segment::UserComment);
    }
    let context = field.tag.context();
    if context == Context::Tiff && field.ifd_num == In::THUMBNAIL {
        return Some(Segment::Ifd1);
    }
    if field.ifd_num != In::PRIMARY {
        return None;
    }
    Some(match context {
        Context::Tiff => Segment::Ifd0,
        Context::Exif => Segment::Exif,
        Context::Gps => Segment::Gps,
        Context::Interop => Segment::Interop,
        _ => return None,
    })
}

fn collect_tiff_segments(exif: &exif::Exif, translate_values: bool, data: &mut ExifData) {
    for field in exif.fields() {
        let Some(segment) = tiff_segment(field) else {
            continue;
        };

        if matches!(segment, Segment::MakerNote | Segment::UserComment) {
            match &field.value {
                exif::Value::Undefined(bytes, _) => data.insert_bytes(segment, bytes.clone()),
                exif::Value::Ascii(parts) => data.insert_bytes(segment, parts.concat()),
                other => debug!("Skipping {} stored as {:?}", field.tag, other),
            }
            continue;
        }

        let value = if translate_values {
            Some(ExifValue::Text(
                field.display_value().with_unit(exif).to_string(),
            ))
        } else {
            raw_value(&field.value)
        };
        if let Some(value) = value {
            data.insert_field(segment, field.tag.to_string(), value);
        }
    }
}

fn numbers<T: Copy>(values: &[T], convert: impl Fn(T) -> f64) -> Vec<f64> {
    values.iter().map(|&v| convert(v)).collect()
}

/// Convert a TIFF value without human-readable translation.
fn raw_value(value: &exif::Value) -> Option<ExifValue> {
    use exif::Value;

    let values = match value {
        Value::Ascii(parts) => {
            let mut texts: Vec<String> = parts
                .iter()
                .map(|p| {
                    String::from_utf8_lossy(p)
                        .trim_end_matches('\0')
                        .to_string()
                })
                .collect();
            return match texts.len() {
                0 => None,
                1 => texts.pop().map(ExifValue::Text),
                _ => Some(ExifValue::List(texts)),
            };
        }
        Value::Undefined(bytes, _) => return Some(ExifValue::Bytes(bytes.clone())),
        Value::Byte(v) => numbers(v, f64::from),
        Value::Short(v) => numbers(v, f64::from),
        Value::Long(v) => numbers(v, f64::from),
        Value::SByte(v) => numbers(v, f64::from),
        Value::SShort(v) => numbers(v, f64::from),
        Value::SLong(v) => numbers(v, f64::from),
        Value::Float(v) => numbers(v, f64::from),
        Value::Double(v) => v.clone(),
        Value::Rational(v) => v.iter().map(|r| r.to_f64()).collect(),
        Value::SRational(v) => v.iter().map(|r| r.to_f64()).collect(),
        _ => return None,
    };

    match values.as_slice() {
        [] => None,
        [single] => Some(ExifValue::Number(*single)),
        _ => Some(ExifValue::Numbers(values)),
    }
}

fn collect_app_segments(app: &AppSegments, data: &mut ExifData) {
    if let Some(jfif) = &app.jfif {
        let version = format!("{}.{:02}", jfif.version_major, jfif.version_minor);
        data.insert_field(Segment::Jfif, "JFIFVersion", ExifValue::Text(version));
        for (key, value) in [
            ("ResolutionUnit", f64::from(jfif.density_units)),
            ("XResolution", f64::from(jfif.x_density)),
            ("YResolution", f64::from(jfif.y_density)),
            ("ThumbnailWidth", f64::from(jfif.thumbnail_width)),
            ("ThumbnailHeight", f64::from(jfif.thumbnail_height)),
        ] {
            data.insert_field(Segment::Jfif, key, ExifValue::Number(value));
        }
    }

    if let Some(packet) = &app.xmp {
        for (key, value) in segments::parse_xmp(packet) {
            data.insert_field(Segment::Xmp, key, ExifValue::Text(value));
        }
    }

    if let Some(profile) = &app.icc {
        for (key, value) in segments::parse_icc_header(profile) {
            data.insert_field(Segment::Icc, key, ExifValue::Text(value));
        }
    }

    if let Some(iim) = &app.iptc {
        let mut grouped: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for dataset in segments::parse_iptc(iim) {
            grouped.entry(dataset.name).or_default().push(dataset.value);
        }
        for (name, mut values) in grouped {
            let value = if name == "Keywords" || values.len() > 1 {
                ExifValue::List(values)
            } else {
                match values.pop() {
                    Some(single) => ExifValue::Text(single),
                    None => continue,
                }
            };
            data.insert_field(Segment::Iptc, name, value);
        }
    }
}
