//! Export file naming.
//!
//! An export's base path comes from its [`FileNameStyle`]:
//!
//! - `like-original`: `IMG_0042.CR2` → `<folder>/IMG_0042`
//! - `sequence` with prefix `trip-` at batch index 4 → `<folder>/trip-5`
//!
//! Candidates are then produced by appending a collision suffix and the
//! format extension: `IMG_0042.jpg`, `IMG_0042_001.jpg`, `IMG_0042_002.jpg`, …
//! up to [`MAX_SUFFIX`].

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Highest collision suffix tried before giving up.
pub const MAX_SUFFIX: u32 = 99_999;

/// How exported files are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "kebab-case")]
pub enum FileNameStyle {
    /// Keep the master's filename stem.
    LikeOriginal,
    /// `<prefix><index + 1>`.
    Sequence { prefix: String },
}

/// Path of the export without collision suffix or extension.
pub fn export_base_path(
    folder: &Path,
    style: &FileNameStyle,
    master_filename: &str,
    index_in_batch: usize,
) -> PathBuf {
    match style {
        FileNameStyle::LikeOriginal => {
            let stem = Path::new(master_filename)
                .file_stem()
                .map(OsString::from)
                .unwrap_or_else(|| OsString::from(master_filename));
            folder.join(stem)
        }
        FileNameStyle::Sequence { prefix } => {
            folder.join(format!("{}{}", prefix, index_in_batch + 1))
        }
    }
}

/// Collision suffix for the `counter`-th attempt: `""`, `"_001"`, `"_002"`, …
pub fn suffix_for(counter: u32) -> String {
    if counter == 0 {
        String::new()
    } else {
        format!("_{:03}", counter)
    }
}

/// `base` + suffix + `.extension`.
pub fn candidate_path(base: &Path, counter: u32, extension: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix_for(counter));
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// All candidate paths in probing order.
pub fn candidate_paths<'a>(base: &'a Path, extension: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    (0..=MAX_SUFFIX).map(move |counter| candidate_path(base, counter, extension))
}
