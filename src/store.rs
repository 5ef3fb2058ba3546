//! Sources of pending edits ([`PhotoWork`]) for photos.
//!
//! The pipeline never owns edit state; it asks a [`PhotoWorkSource`] for a
//! snapshot whenever it renders. Two sources ship with the crate:
//!
//! - [`MemoryWorkStore`]: an in-memory map keyed by photo id, for embedding
//!   applications and tests.
//! - [`JsonWorkStore`]: a per-directory `darkroom.json` sidecar next to the
//!   masters, used by the CLI.
//!
//! ## Sidecar format
//!
//! ```json
//! {
//!   "version": 1,
//!   "photos": {
//!     "IMG_0001.JPG": { "rotationTurns": 1, "cropRect": { "x": -500, "y": -400, "width": 1000, "height": 800 } }
//!   }
//! }
//! ```
//!
//! A missing sidecar or a photo without an entry means "no edits".

use crate::types::{Photo, PhotoId, PhotoWork};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Name of the edit sidecar within a master directory.
pub const SIDECAR_FILENAME: &str = "darkroom.json";

/// Version of the sidecar format.
const SIDECAR_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid edit sidecar {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unsupported sidecar version {found} in {}", path.display())]
    Version { path: PathBuf, found: u32 },
}

/// Read-only access to the pending edits of a photo.
#[async_trait]
pub trait PhotoWorkSource: Send + Sync {
    async fn photo_work(&self, photo: &Photo) -> Result<PhotoWork, StoreError>;
}

/// In-memory edit store.
#[derive(Debug, Default)]
pub struct MemoryWorkStore {
    works: RwLock<HashMap<PhotoId, PhotoWork>>,
}

impl MemoryWorkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: PhotoId, work: PhotoWork) {
        self.works
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, work);
    }
}

#[async_trait]
impl PhotoWorkSource for MemoryWorkStore {
    async fn photo_work(&self, photo: &Photo) -> Result<PhotoWork, StoreError> {
        let works = self.works.read().unwrap_or_else(PoisonError::into_inner);
        Ok(works.get(&photo.id).cloned().unwrap_or_default())
    }
}

/// Contents of a `darkroom.json` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkManifest {
    pub version: u32,
    /// Edits keyed by master filename.
    #[serde(default)]
    pub photos: BTreeMap<String, PhotoWork>,
}

impl Default for WorkManifest {
    fn default() -> Self {
        Self {
            version: SIDECAR_VERSION,
            photos: BTreeMap::new(),
        }
    }
}

impl WorkManifest {
    /// Load the sidecar of `dir`. A missing file yields an empty manifest.
    pub async fn load(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(SIDECAR_FILENAME);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|source| StoreError::Json { path: path.clone(), source })?;
        if manifest.version != SIDECAR_VERSION {
            return Err(StoreError::Version {
                path,
                found: manifest.version,
            });
        }
        Ok(manifest)
    }

    /// Write the sidecar into `dir`.
    pub async fn save(&self, dir: &Path) -> Result<(), StoreError> {
        let path = dir.join(SIDECAR_FILENAME);
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| StoreError::Json { path: path.clone(), source })?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Edit store backed by `darkroom.json` sidecars in each master directory.
///
/// Sidecars are re-read on every lookup so edits made by other tools are
/// picked up without a restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWorkStore;

impl JsonWorkStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhotoWorkSource for JsonWorkStore {
    async fn photo_work(&self, photo: &Photo) -> Result<PhotoWork, StoreError> {
        let manifest = WorkManifest::load(&photo.master_dir).await?;
        Ok(manifest
            .photos
            .get(&photo.master_filename)
            .cloned()
            .unwrap_or_default())
    }
}
