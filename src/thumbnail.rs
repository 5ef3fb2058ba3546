//! Grid thumbnails, one file per photo id.
//!
//! Generation runs through a [`JobQueue`] whose merge rule lets a newer
//! request for the same photo replace the queued one, so at most one job per
//! photo is ever waiting. A thumbnail that already exists is assumed valid;
//! callers invalidate it with [`ThumbnailService::delete_thumbnail`] after
//! edits.

use crate::config::ThumbnailsConfig;
use crate::queue::{JobError, JobHandle, JobQueue};
use crate::render::{RenderError, RenderRequest, Renderer};
use crate::store::{PhotoWorkSource, StoreError};
use crate::types::{Photo, PhotoId, RenderOptions, Size};
use futures::FutureExt;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("master file missing: {}", .0.display())]
    MasterMissing(PathBuf),
    #[error("could not load edits: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ThumbnailError {
    pub fn is_master_missing(&self) -> bool {
        matches!(self, ThumbnailError::MasterMissing(_))
    }
}

struct Generator {
    renderer: Arc<dyn Renderer>,
    works: Arc<dyn PhotoWorkSource>,
    directory: PathBuf,
    max_size: Size,
    options: RenderOptions,
}

impl Generator {
    fn path_for(&self, id: PhotoId) -> PathBuf {
        self.directory
            .join(format!("{}.{}", id, self.options.format.extension()))
    }

    async fn generate(&self, photo: Photo) -> Result<PathBuf, ThumbnailError> {
        let path = self.path_for(photo.id);
        if tokio::fs::try_exists(&path).await? {
            debug!("Thumbnail {} already present", path.display());
            return Ok(path);
        }

        let master = photo.master_path();
        if !tokio::fs::try_exists(&master).await.unwrap_or(false) {
            return Err(ThumbnailError::MasterMissing(master));
        }

        let work = self.works.photo_work(&photo).await?;
        let bytes = self
            .renderer
            .render(RenderRequest {
                photo,
                work,
                target_size: Some(self.max_size),
                options: self.options,
            })
            .await?;

        tokio::fs::create_dir_all(&self.directory).await?;
        tokio::fs::write(&path, bytes).await?;
        info!("Stored {}", path.display());
        Ok(path)
    }
}

pub type ThumbnailHandle = JobHandle<PathBuf, ThumbnailError>;

/// Produces and caches thumbnails on a serial queue.
///
/// Must be created inside a tokio runtime.
pub struct ThumbnailService {
    generator: Arc<Generator>,
    queue: JobQueue<Photo, PathBuf, ThumbnailError>,
}

impl ThumbnailService {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        works: Arc<dyn PhotoWorkSource>,
        config: &ThumbnailsConfig,
    ) -> Self {
        let generator = Arc::new(Generator {
            renderer,
            works,
            directory: config.directory.clone(),
            max_size: Size::new(config.max_width, config.max_height),
            options: RenderOptions {
                format: config.format,
                quality: config.quality,
            },
        });

        let worker = Arc::clone(&generator);
        let queue = JobQueue::new(
            |new: &Photo, pending: &Photo| (new.id == pending.id).then(|| new.clone()),
            move |photo: Photo| {
                let generator = Arc::clone(&worker);
                async move { generator.generate(photo).await }.boxed()
            },
        );

        Self { generator, queue }
    }

    pub fn directory(&self) -> &Path {
        &self.generator.directory
    }

    /// Where the thumbnail of `id` is stored.
    pub fn thumbnail_path(&self, id: PhotoId) -> PathBuf {
        self.generator.path_for(id)
    }

    /// Queue generation without waiting for it.
    pub fn request(&self, photo: Photo) -> ThumbnailHandle {
        self.queue.submit(photo)
    }

    /// Make sure the thumbnail of `photo` exists and return its path.
    pub async fn ensure_thumbnail(
        &self,
        photo: &Photo,
    ) -> Result<PathBuf, JobError<ThumbnailError>> {
        self.request(photo.clone()).result().await
    }

    /// Remove the stored thumbnail of `id`. Missing files are ignored.
    pub async fn delete_thumbnail(&self, id: PhotoId) -> Result<(), ThumbnailError> {
        let path = self.thumbnail_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
