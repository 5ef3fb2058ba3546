//! Edit-aware rendering of a photo into encoded bytes.
//!
//! [`plan_render`] turns a photo, its pending edits and a target box into
//! backend [`RenderParams`]: the quarter-turn rotation, the crop region in
//! rotated coordinates, the aspect-fit target and the encoder settings.
//!
//! Two [`Renderer`]s execute plans:
//!
//! - [`LocalRenderer`] runs the codec backend on tokio's blocking pool.
//! - [`RemoteRenderer`] sends the request over a channel to whatever task
//!   runs [`serve_renders`], typically a dedicated render worker, and awaits
//!   the reply. Both produce identical bytes for the same request.
//!
//! ```text
//! RemoteRenderer ──mpsc(RenderJob)──► serve_renders ──► inner Renderer
//!       ▲                                   │
//!       └──────────── oneshot(bytes) ───────┘
//! ```

use crate::imaging::calculations::crop_region_from_work;
use crate::imaging::{BackendError, ImageBackend, Quality, RenderParams};
use crate::types::{Photo, PhotoWork, RenderOptions, Size};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Backend(#[from] BackendError),
    #[error("remote render failed: {0}")]
    Remote(String),
    #[error("render service is not running")]
    Disconnected,
    #[error("render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Everything needed to render one image.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub photo: Photo,
    pub work: PhotoWork,
    /// Aspect-fit bounding box. `None` renders at edited size.
    pub target_size: Option<Size>,
    pub options: RenderOptions,
}

/// Build backend parameters for a request.
pub fn plan_render(request: &RenderRequest) -> RenderParams {
    let photo = &request.photo;
    RenderParams {
        source: photo.master_path(),
        rotation: request.work.rotation_turns,
        crop: crop_region_from_work(&request.work, photo.master_width, photo.master_height),
        target: request.target_size,
        format: request.options.format,
        quality: Quality::from_fraction(request.options.quality),
    }
}

/// Produces encoded image bytes for a render request.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, RenderError>;
}

/// Renders in-process on the blocking thread pool.
pub struct LocalRenderer<B> {
    backend: Arc<B>,
}

impl<B: ImageBackend + 'static> LocalRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: ImageBackend + 'static> Renderer for LocalRenderer<B> {
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, RenderError> {
        let params = plan_render(&request);
        debug!(
            "Rendering {} (rotation {:?}, crop {:?}, target {:?}, {})",
            params.source.display(),
            params.rotation,
            params.crop,
            params.target,
            params.format
        );
        let backend = Arc::clone(&self.backend);
        let bytes = tokio::task::spawn_blocking(move || backend.render(&params)).await??;
        Ok(bytes)
    }
}

/// A render request in flight to a [`serve_renders`] loop.
pub struct RenderJob {
    pub request: RenderRequest,
    reply: oneshot::Sender<Result<Vec<u8>, String>>,
}

impl RenderJob {
    /// Deliver the outcome. Errors cross the channel as messages.
    pub fn respond(self, result: Result<Vec<u8>, RenderError>) {
        // Requester may have given up
        let _ = self.reply.send(result.map_err(|e| e.to_string()));
    }
}

/// Renders by delegating to a render service over a channel.
#[derive(Clone)]
pub struct RemoteRenderer {
    tx: mpsc::Sender<RenderJob>,
}

impl RemoteRenderer {
    /// Create a renderer and the receiving end for the service loop.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RenderJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Renderer for RemoteRenderer {
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, RenderError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(RenderJob { request, reply })
            .await
            .map_err(|_| RenderError::Disconnected)?;
        match response.await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(message)) => Err(RenderError::Remote(message)),
            Err(_) => Err(RenderError::Disconnected),
        }
    }
}

/// Serve render jobs with `renderer` until every sender is dropped.
///
/// Jobs are handled one at a time in arrival order.
pub async fn serve_renders(mut rx: mpsc::Receiver<RenderJob>, renderer: Arc<dyn Renderer>) {
    while let Some(job) = rx.recv().await {
        let result = renderer.render(job.request.clone()).await;
        if let Err(e) = &result {
            warn!(
                "Render of {} failed: {}",
                job.request.photo.master_filename, e
            );
        }
        job.respond(result);
    }
    debug!("Render service stopped");
}
