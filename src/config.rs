//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `darkroom.toml` files. Stock
//! defaults are the base layer; a user file only needs the keys it changes.
//!
//! ## Config File Location
//!
//! The CLI reads `darkroom.toml` from the working directory, or the file
//! passed with `--config`.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [export]
//! small_pixels = 6000         # Pixel budget of the "small" preset
//! medium_pixels = 200000      # Pixel budget of the "medium" preset
//! large_pixels = 1000000      # Pixel budget of the "large" preset
//!
//! [thumbnails]
//! directory = "thumbnails"    # Where <photo id>.<ext> files are stored
//! max_width = 1024            # Bounding box for grid thumbnails
//! max_height = 320
//! format = "webp"             # jpg, webp or png
//! quality = 0.92              # 0.0-1.0, ignored for png
//!
//! [metadata]
//! tool = "exiftool"           # Program that copies tags onto exports
//! timeout_secs = 30           # Kill the tool after this long
//!
//! [render]
//! delegate = false            # Run renders on a dedicated render task
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::types::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "darkroom.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `darkroom.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pixel budgets of the export size presets.
    pub export: ExportConfig,
    /// Thumbnail storage and encoding.
    pub thumbnails: ThumbnailsConfig,
    /// External metadata propagation tool.
    pub metadata: MetadataToolConfig,
    /// Where renders run.
    pub render: RenderConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.export;
        if e.small_pixels == 0 || e.medium_pixels == 0 || e.large_pixels == 0 {
            return Err(ConfigError::Validation(
                "export pixel budgets must be non-zero".into(),
            ));
        }
        if !(e.small_pixels <= e.medium_pixels && e.medium_pixels <= e.large_pixels) {
            return Err(ConfigError::Validation(
                "export budgets must satisfy small <= medium <= large".into(),
            ));
        }
        if self.thumbnails.max_width == 0 || self.thumbnails.max_height == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_width and max_height must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.thumbnails.quality) {
            return Err(ConfigError::Validation(
                "thumbnails.quality must be 0.0-1.0".into(),
            ));
        }
        if self.metadata.tool.trim().is_empty() {
            return Err(ConfigError::Validation(
                "metadata.tool must not be empty".into(),
            ));
        }
        if self.metadata.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "metadata.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Export size presets, as maximum pixel counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub small_pixels: u64,
    pub medium_pixels: u64,
    pub large_pixels: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            small_pixels: 6_000,
            medium_pixels: 200_000,
            large_pixels: 1_000_000,
        }
    }
}

/// Thumbnail settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    pub directory: PathBuf,
    pub max_width: u32,
    pub max_height: u32,
    pub format: OutputFormat,
    pub quality: f32,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("thumbnails"),
            max_width: 1024,
            max_height: 320,
            format: OutputFormat::Webp,
            quality: 0.92,
        }
    }
}

/// External metadata tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataToolConfig {
    pub tool: String,
    pub timeout_secs: u64,
}

impl MetadataToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MetadataToolConfig {
    fn default() -> Self {
        Self {
            tool: "exiftool".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Render placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// When set, renders are sent over a channel to a dedicated render task
    /// instead of running inline on the blocking pool.
    pub delegate: bool,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PipelineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from [`CONFIG_FILE_NAME`] in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<PipelineConfig, ConfigError> {
    load_config_file(&dir.join(CONFIG_FILE_NAME))
}

/// Like [`load_config`], for an explicit file path.
pub fn load_config_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `darkroom.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Darkroom Configuration
# ======================
#
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Export size presets
# ---------------------------------------------------------------------------
# Presets cap the total pixel count of the exported image. Aspect ratio is
# preserved and images are never upscaled.
[export]
small_pixels = 6000
medium_pixels = 200000
large_pixels = 1000000

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
# One file per photo, named <photo id>.<format>. Existing files are reused;
# delete them to force regeneration after an edit.
[thumbnails]
directory = "thumbnails"

# Bounding box for the grid view. The image is scaled to fit inside it.
max_width = 1024
max_height = 320

# Output format: "jpg", "webp" or "png".
format = "webp"

# Encoding quality from 0.0 to 1.0 (ignored for png).
quality = 0.92

# ---------------------------------------------------------------------------
# Metadata propagation
# ---------------------------------------------------------------------------
# When an export asks for metadata, this program copies all tags from the
# master onto the exported file:
#   <tool> -charset utf8 -overwrite_original -tagsFromFile <master> <export>
# A failure is logged and the export is kept.
[metadata]
tool = "exiftool"

# Kill the tool if it runs longer than this many seconds.
timeout_secs = 30

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# Send render jobs to a dedicated render task over a channel instead of
# running them inline.
delegate = false
"##
}
