//! Photo export: size policy, rendering, collision-free naming, metadata
//! propagation and timestamp preservation.
//!
//! ## Steps of [`Exporter::export_photo`]
//!
//! 1. Resolve the target box from the size policy ([`SizePresets`]).
//! 2. Fetch the photo's pending edits.
//! 3. Render through the configured [`Renderer`].
//! 4. Build the base path from the [`FileNameStyle`].
//! 5. Claim the first free candidate (`name.jpg`, `name_001.jpg`, …) with a
//!    create-exclusive open, or truncate the first one when overwriting.
//! 6. Write the bytes.
//! 7. Optionally copy the master's metadata with an external tool. Failures
//!    are logged and the export is kept.
//! 8. Copy the master's access/modification times onto the export.

use crate::config::{ExportConfig, MetadataToolConfig};
use crate::imaging::calculations::{CustomSizeSide, reduce_to_pixel_budget, resolve_custom_size};
use crate::naming::{FileNameStyle, MAX_SUFFIX, candidate_paths, export_base_path};
use crate::render::{RenderError, RenderRequest, Renderer};
use crate::store::{PhotoWorkSource, StoreError};
use crate::types::{OutputFormat, Photo, RenderOptions, Size};
use log::{debug, info, warn};
use serde::Deserialize;
use std::ffi::OsString;
use std::fs::FileTimes;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("unsupported {field}: {value:?}")]
    UnsupportedOption { field: &'static str, value: String },
    #[error("master file missing: {}", .0.display())]
    MasterMissing(PathBuf),
    #[error("could not load edits: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("no free file name for {} up to suffix _{}", .0.display(), MAX_SUFFIX)]
    NoFreeFileName(PathBuf),
}

impl ExportError {
    /// Whether the photo's master file is gone, so the caller can mark the
    /// photo unavailable.
    pub fn is_master_missing(&self) -> bool {
        matches!(self, ExportError::MasterMissing(_))
    }
}

#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("could not start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("metadata tool exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("metadata tool timed out after {0:?}")]
    TimedOut(Duration),
}

/// Target size policy of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeType {
    Small,
    Medium,
    Large,
    /// Edited size, no resize.
    Original,
    Custom { side: CustomSizeSide, pixels: u32 },
}

/// Fully validated export options.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub render: RenderOptions,
    pub size: SizeType,
    pub with_metadata: bool,
    pub file_name_style: FileNameStyle,
    pub folder: PathBuf,
}

/// Export options as sent by a UI: enums arrive as plain strings.
///
/// ```json
/// {
///   "format": "jpg", "quality": 0.9, "size": "custom",
///   "customSizeSide": "width", "customSizePixels": 1024,
///   "withMetadata": true, "fileNameStyle": "sequence",
///   "fileNamePrefix": "Photo_", "folderPath": "/exports"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub format: String,
    #[serde(default = "default_quality")]
    pub quality: f32,
    pub size: String,
    #[serde(default)]
    pub custom_size_side: Option<String>,
    #[serde(default)]
    pub custom_size_pixels: Option<u32>,
    #[serde(default)]
    pub with_metadata: bool,
    pub file_name_style: String,
    #[serde(default)]
    pub file_name_prefix: Option<String>,
    pub folder_path: PathBuf,
}

fn default_quality() -> f32 {
    RenderOptions::default().quality
}

fn unsupported(field: &'static str, value: impl Into<String>) -> ExportError {
    ExportError::UnsupportedOption {
        field,
        value: value.into(),
    }
}

impl TryFrom<ExportRequest> for ExportOptions {
    type Error = ExportError;

    fn try_from(req: ExportRequest) -> Result<Self, Self::Error> {
        let format = req
            .format
            .parse::<OutputFormat>()
            .map_err(|v| unsupported("format", v))?;

        let size = match req.size.as_str() {
            "S" => SizeType::Small,
            "M" => SizeType::Medium,
            "L" => SizeType::Large,
            "original" => SizeType::Original,
            "custom" => {
                let side_str = req.custom_size_side.unwrap_or_default();
                let side = side_str
                    .parse::<CustomSizeSide>()
                    .map_err(|v| unsupported("customSizeSide", v))?;
                let pixels = req
                    .custom_size_pixels
                    .filter(|p| *p > 0)
                    .ok_or_else(|| unsupported("customSizePixels", "missing or zero"))?;
                SizeType::Custom { side, pixels }
            }
            other => return Err(unsupported("size", other)),
        };

        let file_name_style = match req.file_name_style.as_str() {
            "like-original" => FileNameStyle::LikeOriginal,
            "sequence" => FileNameStyle::Sequence {
                prefix: req.file_name_prefix.unwrap_or_default(),
            },
            other => return Err(unsupported("fileNameStyle", other)),
        };

        Ok(ExportOptions {
            render: RenderOptions {
                format,
                quality: req.quality,
            },
            size,
            with_metadata: req.with_metadata,
            file_name_style,
            folder: req.folder_path,
        })
    }
}

/// Pixel budgets of the named size presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePresets {
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

impl Default for SizePresets {
    fn default() -> Self {
        Self::from(&ExportConfig::default())
    }
}

impl From<&ExportConfig> for SizePresets {
    fn from(config: &ExportConfig) -> Self {
        Self {
            small: config.small_pixels,
            medium: config.medium_pixels,
            large: config.large_pixels,
        }
    }
}

impl SizePresets {
    /// Bounding box for `size`, or `None` to keep the edited size.
    ///
    /// Presets are computed from the photo's edited dimensions, falling back
    /// to the master dimensions for unedited photos.
    pub fn target_size(&self, size: SizeType, photo: &Photo) -> Option<Size> {
        let display = photo.display_size();
        let budget = |pixels| Some(reduce_to_pixel_budget(display.width, display.height, pixels));
        match size {
            SizeType::Small => budget(self.small),
            SizeType::Medium => budget(self.medium),
            SizeType::Large => budget(self.large),
            SizeType::Original => None,
            SizeType::Custom { side, pixels } => Some(resolve_custom_size(side, pixels)),
        }
    }
}

/// External program that copies metadata from the master onto an export.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTool {
    program: String,
    timeout: Duration,
}

impl MetadataTool {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the tool.
    pub fn args(source: &Path, target: &Path) -> Vec<OsString> {
        vec![
            "-charset".into(),
            "utf8".into(),
            "-overwrite_original".into(),
            "-tagsFromFile".into(),
            source.as_os_str().to_owned(),
            target.as_os_str().to_owned(),
        ]
    }

    /// Run the tool, killing it if it exceeds the timeout.
    pub async fn copy_metadata(&self, source: &Path, target: &Path) -> Result<(), PropagationError> {
        let child = Command::new(&self.program)
            .args(Self::args(source, target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PropagationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PropagationError::TimedOut(self.timeout))??;

        if !output.status.success() {
            return Err(PropagationError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{}: {}", self.program, stdout.trim());
        }
        Ok(())
    }
}

impl From<&MetadataToolConfig> for MetadataTool {
    fn from(config: &MetadataToolConfig) -> Self {
        Self::new(config.tool.clone(), config.timeout())
    }
}

impl Default for MetadataTool {
    fn default() -> Self {
        Self::from(&MetadataToolConfig::default())
    }
}

/// Open the first free candidate path for writing.
async fn claim_output(
    base: &Path,
    extension: &str,
    overwrite: bool,
) -> Result<(PathBuf, tokio::fs::File), ExportError> {
    for candidate in candidate_paths(base, extension) {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        match options.open(&candidate).await {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ExportError::NoFreeFileName(base.to_path_buf()))
}

/// Write the rendered bytes to a claimed file. A failed write removes the
/// file so no truncated export is left under the claimed name.
async fn write_claimed<W>(path: &Path, file: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;
    if let Err(e) = written {
        if let Err(remove) = tokio::fs::remove_file(path).await {
            warn!("Removing partial export {} failed: {}", path.display(), remove);
        }
        return Err(e);
    }
    Ok(())
}

/// Give `target` the access and modification times of `source`.
async fn copy_file_times(source: &Path, target: &Path) -> io::Result<()> {
    let meta = tokio::fs::metadata(source).await?;
    let times = FileTimes::new()
        .set_accessed(meta.accessed()?)
        .set_modified(meta.modified()?);
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(target)
        .await?
        .into_std()
        .await;
    file.set_times(times)
}

/// Drives exports. Cheap to share behind an `Arc`.
pub struct Exporter {
    renderer: Arc<dyn Renderer>,
    works: Arc<dyn PhotoWorkSource>,
    presets: SizePresets,
    metadata_tool: MetadataTool,
}

impl Exporter {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        works: Arc<dyn PhotoWorkSource>,
        presets: SizePresets,
        metadata_tool: MetadataTool,
    ) -> Self {
        Self {
            renderer,
            works,
            presets,
            metadata_tool,
        }
    }

    /// Export one photo and return the path written.
    ///
    /// `index_in_batch` numbers `sequence` file names. With `overwrite` the
    /// unsuffixed name is reused even if it exists.
    pub async fn export_photo(
        &self,
        photo: &Photo,
        index_in_batch: usize,
        options: &ExportOptions,
        overwrite: bool,
    ) -> Result<PathBuf, ExportError> {
        let master = photo.master_path();
        if !tokio::fs::try_exists(&master).await.unwrap_or(false) {
            return Err(ExportError::MasterMissing(master));
        }

        let target_size = self.presets.target_size(options.size, photo);
        let work = self.works.photo_work(photo).await?;
        let bytes = self
            .renderer
            .render(RenderRequest {
                photo: photo.clone(),
                work,
                target_size,
                options: options.render,
            })
            .await?;

        tokio::fs::create_dir_all(&options.folder).await?;
        let base = export_base_path(
            &options.folder,
            &options.file_name_style,
            &photo.master_filename,
            index_in_batch,
        );
        let (path, mut file) =
            claim_output(&base, options.render.format.extension(), overwrite).await?;
        write_claimed(&path, &mut file, &bytes).await?;
        drop(file);

        if options.with_metadata
            && let Err(e) = self.metadata_tool.copy_metadata(&master, &path).await
        {
            warn!("Copying metadata to {} failed: {}", path.display(), e);
        }

        copy_file_times(&master, &path).await?;
        info!("Exported {}", path.display());
        Ok(path)
    }
}
