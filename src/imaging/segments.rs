//! JPEG application-segment scanner.
//!
//! Walks the marker stream of a JPEG up to start-of-scan and picks out the
//! APPn payloads that carry metadata outside the TIFF/EXIF block:
//!
//! | Marker | Signature | Content |
//! |---|---|---|
//! | APP0  | `JFIF\0` | JFIF header (version, density, thumbnail size) |
//! | APP1  | `http://ns.adobe.com/xap/1.0/\0` | XMP packet (UTF-8 XML) |
//! | APP2  | `ICC_PROFILE\0` | ICC profile, possibly split across chunks |
//! | APP13 | `Photoshop 3.0\0` | 8BIM resources; 0x0404 holds IPTC-IIM |
//!
//! Non-JPEG input simply yields no segments. Parsing never fails: truncated
//! or malformed blocks are skipped.

use regex::Regex;
use std::sync::LazyLock;

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const APP2: u8 = 0xE2;
const APP13: u8 = 0xED;
const SOS: u8 = 0xDA;

const JFIF_SIGNATURE: &[u8] = b"JFIF\0";
const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_SIGNATURE: &[u8] = b"ICC_PROFILE\0";
const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const BIM_MARKER: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Raw metadata payloads found in a JPEG's APPn segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSegments {
    pub jfif: Option<JfifHeader>,
    pub xmp: Option<String>,
    /// Reassembled ICC profile bytes.
    pub icc: Option<Vec<u8>>,
    /// Raw IPTC-IIM datasets.
    pub iptc: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JfifHeader {
    pub version_major: u8,
    pub version_minor: u8,
    /// 0 = aspect ratio only, 1 = dots per inch, 2 = dots per cm.
    pub density_units: u8,
    pub x_density: u16,
    pub y_density: u16,
    pub thumbnail_width: u8,
    pub thumbnail_height: u8,
}

/// One decoded IPTC record-2 dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IptcDataset {
    pub name: &'static str,
    pub value: String,
}

/// Scan a JPEG byte stream for metadata-bearing APPn segments.
pub fn scan_jpeg(data: &[u8]) -> AppSegments {
    let mut found = AppSegments::default();
    if !data.starts_with(&[0xFF, 0xD8]) {
        return found;
    }

    let mut icc_chunks: Vec<(u8, &[u8])> = Vec::new();
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        // Fill bytes and standalone markers carry no length
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        if marker == SOS {
            break;
        }

        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            break;
        }
        let seg_start = pos + 4;
        let seg_end = (pos + 2 + seg_len).min(data.len());
        let payload = &data[seg_start..seg_end];

        match marker {
            APP0 if payload.starts_with(JFIF_SIGNATURE) => {
                found.jfif = parse_jfif(&payload[JFIF_SIGNATURE.len()..]);
            }
            APP1 if payload.starts_with(XMP_SIGNATURE) => {
                let packet = &payload[XMP_SIGNATURE.len()..];
                found.xmp = Some(String::from_utf8_lossy(packet).into_owned());
            }
            APP2 if payload.starts_with(ICC_SIGNATURE) => {
                let chunk = &payload[ICC_SIGNATURE.len()..];
                // Sequence number (1-based) and chunk count precede the data
                if chunk.len() > 2 {
                    icc_chunks.push((chunk[0], &chunk[2..]));
                }
            }
            APP13 => {
                if let Some(iim) = extract_iptc_from_8bim(payload) {
                    found.iptc = Some(iim.to_vec());
                }
            }
            _ => {}
        }

        pos += 2 + seg_len;
    }

    if !icc_chunks.is_empty() {
        icc_chunks.sort_by_key(|(seq, _)| *seq);
        found.icc = Some(icc_chunks.iter().flat_map(|(_, c)| c.iter().copied()).collect());
    }
    found
}

fn parse_jfif(data: &[u8]) -> Option<JfifHeader> {
    if data.len() < 9 {
        return None;
    }
    Some(JfifHeader {
        version_major: data[0],
        version_minor: data[1],
        density_units: data[2],
        x_density: u16::from_be_bytes([data[3], data[4]]),
        y_density: u16::from_be_bytes([data[5], data[6]]),
        thumbnail_width: data[7],
        thumbnail_height: data[8],
    })
}

/// Extract IPTC-IIM bytes from a Photoshop 8BIM resource block.
fn extract_iptc_from_8bim(segment: &[u8]) -> Option<&[u8]> {
    let data = segment.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(segment);

    let mut pos = 0;
    while pos + 12 <= data.len() {
        // "8BIM" (4) + resource id (2) + pascal name + data length (4) + data
        if &data[pos..pos + 4] != BIM_MARKER {
            pos += 1;
            continue;
        }
        pos += 4;

        let resource_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
        pos += 2;

        // Pascal string padded to even total length
        let pascal_len = data[pos] as usize;
        pos += 1 + pascal_len + ((1 + pascal_len) % 2);

        if pos + 4 > data.len() {
            break;
        }
        let res_len =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if pos + res_len > data.len() {
            break;
        }
        if resource_id == IPTC_RESOURCE_ID {
            return Some(&data[pos..pos + res_len]);
        }
        pos += res_len + (res_len % 2);
    }

    None
}

fn iptc_dataset_name(dataset: u8) -> Option<&'static str> {
    Some(match dataset {
        0 => "ApplicationRecordVersion",
        5 => "ObjectName",
        10 => "Urgency",
        15 => "Category",
        20 => "SupplementalCategories",
        25 => "Keywords",
        40 => "SpecialInstructions",
        55 => "DateCreated",
        60 => "TimeCreated",
        80 => "By-line",
        85 => "By-lineTitle",
        90 => "City",
        92 => "Sub-location",
        95 => "Province-State",
        100 => "Country-PrimaryLocationCode",
        101 => "Country-PrimaryLocationName",
        103 => "OriginalTransmissionReference",
        105 => "Headline",
        110 => "Credit",
        115 => "Source",
        116 => "CopyrightNotice",
        120 => "Caption-Abstract",
        122 => "Writer-Editor",
        _ => return None,
    })
}

/// Decode IPTC-IIM record 2 datasets.
///
/// Each dataset is `0x1C`, record, dataset number, big-endian u16 length,
/// then the value. Unknown datasets and other records are skipped; the
/// version dataset is binary and rendered as a number.
pub fn parse_iptc(data: &[u8]) -> Vec<IptcDataset> {
    let mut datasets = Vec::new();
    let mut pos = 0;

    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            pos += 1;
            continue;
        }

        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        pos += 5;

        if pos + length > data.len() {
            break;
        }
        let raw = &data[pos..pos + length];
        pos += length;

        if record != 2 {
            continue;
        }
        let Some(name) = iptc_dataset_name(dataset) else {
            continue;
        };
        let value = if dataset == 0 && raw.len() == 2 {
            u16::from_be_bytes([raw[0], raw[1]]).to_string()
        } else {
            String::from_utf8_lossy(raw).trim().to_string()
        };
        if !value.is_empty() {
            datasets.push(IptcDataset { name, value });
        }
    }

    datasets
}

static XMP_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z][\w-]*):([A-Za-z][\w-]*)="([^"]*)""#).unwrap());

static XMP_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][\w-]*:[A-Za-z][\w-]*)>([^<]*)</([A-Za-z][\w-]*:[A-Za-z][\w-]*)>")
        .unwrap()
});

/// Namespaces that describe packet structure rather than photo properties.
const XMP_STRUCTURAL_PREFIXES: &[&str] = &["xmlns", "rdf", "x", "xml"];

/// Flatten the simple properties of an XMP packet into `prefix:Name` pairs.
///
/// Picks up properties written as attributes (`xmp:Rating="5"`) and as
/// text-only elements (`<xmp:ModifyDate>…</xmp:ModifyDate>`). Structured
/// values (`rdf:Bag`, `rdf:Seq`, nested resources) are not expanded.
/// Later occurrences of a key replace earlier ones.
pub fn parse_xmp(packet: &str) -> Vec<(String, String)> {
    let mut properties: Vec<(String, String)> = Vec::new();
    let mut push = |key: String, value: &str| {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match properties.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value.to_string(),
            None => properties.push((key, value.to_string())),
        }
    };

    for caps in XMP_ATTRIBUTE.captures_iter(packet) {
        if XMP_STRUCTURAL_PREFIXES.contains(&&caps[1]) {
            continue;
        }
        push(format!("{}:{}", &caps[1], &caps[2]), &caps[3]);
    }

    for caps in XMP_ELEMENT.captures_iter(packet) {
        let (open, close) = (&caps[1], &caps[3]);
        let prefix = open.split(':').next().unwrap_or_default();
        if open != close || XMP_STRUCTURAL_PREFIXES.contains(&prefix) {
            continue;
        }
        push(open.to_string(), &caps[2]);
    }

    properties
}

fn icc_signature(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == '\0' || c == ' ')
        .to_string()
}

/// Summarise the fixed 128-byte ICC profile header.
pub fn parse_icc_header(profile: &[u8]) -> Vec<(&'static str, String)> {
    if profile.len() < 128 {
        return Vec::new();
    }
    let be_u16 = |at: usize| u16::from_be_bytes([profile[at], profile[at + 1]]);
    let be_u32 = |at: usize| {
        u32::from_be_bytes([profile[at], profile[at + 1], profile[at + 2], profile[at + 3]])
    };

    let intent = match be_u32(64) {
        0 => "Perceptual",
        1 => "Media-Relative Colorimetric",
        2 => "Saturation",
        3 => "ICC-Absolute Colorimetric",
        _ => "Unknown",
    };

    vec![
        ("ProfileSize", be_u32(0).to_string()),
        ("ProfileCMMType", icc_signature(&profile[4..8])),
        (
            "ProfileVersion",
            format!("{}.{}.{}", profile[8], profile[9] >> 4, profile[9] & 0x0F),
        ),
        ("ProfileClass", icc_signature(&profile[12..16])),
        ("ColorSpaceData", icc_signature(&profile[16..20])),
        ("ProfileConnectionSpace", icc_signature(&profile[20..24])),
        (
            "ProfileDateTime",
            format!(
                "{:04}:{:02}:{:02} {:02}:{:02}:{:02}",
                be_u16(24),
                be_u16(26),
                be_u16(28),
                be_u16(30),
                be_u16(32),
                be_u16(34)
            ),
        ),
        ("ProfileFileSignature", icc_signature(&profile[36..40])),
        ("PrimaryPlatform", icc_signature(&profile[40..44])),
        ("RenderingIntent", intent.to_string()),
        ("ProfileCreator", icc_signature(&profile[80..84])),
    ]
}
