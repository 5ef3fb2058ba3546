//! Shared test utilities for the darkroom test suite.
//!
//! Provides sample [`Photo`] records, synthetic JPEG masters and a tiny
//! EXIF block assembler so metadata tests run against real bytes instead of
//! checked-in fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let photo = write_master(tmp.path(), "IMG_0001.jpg", 400, 300);
//!
//! write_jpeg_with_exif(
//!     &tmp.path().join("tagged.jpg"),
//!     64,
//!     48,
//!     &[ExifEntry::ascii(0x010F, "Canon"), ExifEntry::short(0x0112, 6)],
//!     &[ExifEntry::short(0x8827, 200)],
//! );
//! ```

use std::path::Path;

use crate::types::Photo;

// =========================================================================
// Photos
// =========================================================================

/// An unedited photo record for `dir/filename`. The file is not created.
pub fn sample_photo(dir: impl AsRef<Path>, filename: &str, width: u32, height: u32) -> Photo {
    Photo {
        id: 1,
        master_dir: dir.as_ref().to_path_buf(),
        master_filename: filename.to_string(),
        master_width: width,
        master_height: height,
        master_is_raw: false,
        edited_width: None,
        edited_height: None,
        created_at: 1_600_000_000_000,
        updated_at: 1_600_000_000_000,
        imported_at: 1_600_000_000_000,
        flagged: false,
        trashed: false,
    }
}

/// Write a synthetic JPEG master into `dir` and return its photo record.
pub fn write_master(dir: &Path, filename: &str, width: u32, height: u32) -> Photo {
    create_test_jpeg(&dir.join(filename), width, height);
    sample_photo(dir, filename, width, height)
}

// =========================================================================
// Synthetic images
// =========================================================================

/// Encode a gradient JPEG of the given size.
pub fn test_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// Write a gradient JPEG to `path`.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, test_jpeg_bytes(width, height)).unwrap();
}

// =========================================================================
// EXIF assembly
// =========================================================================

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_UNDEFINED: u16 = 7;
const EXIF_IFD_POINTER: u16 = 0x8769;

/// One TIFF directory entry.
#[derive(Debug, Clone)]
pub struct ExifEntry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

impl ExifEntry {
    pub fn ascii(tag: u16, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            kind: TYPE_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    pub fn short(tag: u16, value: u16) -> Self {
        Self {
            tag,
            kind: TYPE_SHORT,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            kind: TYPE_LONG,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn rational(tag: u16, numerator: u32, denominator: u32) -> Self {
        let mut data = numerator.to_le_bytes().to_vec();
        data.extend_from_slice(&denominator.to_le_bytes());
        Self {
            tag,
            kind: TYPE_RATIONAL,
            count: 1,
            data,
        }
    }

    pub fn undefined(tag: u16, bytes: &[u8]) -> Self {
        Self {
            tag,
            kind: TYPE_UNDEFINED,
            count: bytes.len() as u32,
            data: bytes.to_vec(),
        }
    }

    fn out_of_line_len(&self) -> usize {
        if self.data.len() <= 4 {
            0
        } else {
            self.data.len() + self.data.len() % 2
        }
    }
}

fn ifd_len(entries: &[ExifEntry]) -> usize {
    2 + 12 * entries.len() + 4 + entries.iter().map(ExifEntry::out_of_line_len).sum::<usize>()
}

/// Append an IFD (entries, next-IFD offset 0, then value data) at the end
/// of `tiff`.
fn append_ifd(tiff: &mut Vec<u8>, entries: &[ExifEntry]) {
    let start = tiff.len();
    let mut data_offset = start + 2 + 12 * entries.len() + 4;
    let mut data_area = Vec::new();

    tiff.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        tiff.extend_from_slice(&entry.tag.to_le_bytes());
        tiff.extend_from_slice(&entry.kind.to_le_bytes());
        tiff.extend_from_slice(&entry.count.to_le_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            tiff.extend_from_slice(&inline);
        } else {
            tiff.extend_from_slice(&(data_offset as u32).to_le_bytes());
            data_area.extend_from_slice(&entry.data);
            if entry.data.len() % 2 == 1 {
                data_area.push(0);
            }
            data_offset += entry.out_of_line_len();
        }
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(&data_area);
}

/// Little-endian TIFF block with IFD0 and, if `exif` is non-empty, an Exif
/// sub-IFD linked from IFD0.
pub fn build_tiff(ifd0: &[ExifEntry], exif: &[ExifEntry]) -> Vec<u8> {
    let mut primary = ifd0.to_vec();
    if !exif.is_empty() {
        // Pointer value is the offset right after IFD0; its length is fixed
        primary.push(ExifEntry::long(EXIF_IFD_POINTER, 0));
        let exif_offset = 8 + ifd_len(&primary);
        if let Some(pointer) = primary.last_mut() {
            pointer.data = (exif_offset as u32).to_le_bytes().to_vec();
        }
    }
    primary.sort_by_key(|e| e.tag);
    let mut exif = exif.to_vec();
    exif.sort_by_key(|e| e.tag);

    let mut tiff = b"II*\0".to_vec();
    tiff.extend_from_slice(&8u32.to_le_bytes());
    append_ifd(&mut tiff, &primary);
    if !exif.is_empty() {
        append_ifd(&mut tiff, &exif);
    }
    tiff
}

/// Write a JPEG of the given size carrying an EXIF APP1 segment.
pub fn write_jpeg_with_exif(
    path: &Path,
    width: u32,
    height: u32,
    ifd0: &[ExifEntry],
    exif: &[ExifEntry],
) {
    let jpeg = test_jpeg_bytes(width, height);
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&build_tiff(ifd0, exif));

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, out).unwrap();
}
