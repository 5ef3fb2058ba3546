//! # Darkroom
//!
//! The image-processing core of a desktop photo manager: metadata
//! extraction at import, edit-aware rendering, collision-safe export and a
//! per-photo thumbnail cache.
//!
//! # Data Flow
//!
//! ```text
//! Photo + PhotoWork + RenderOptions
//!     │
//!     ├─► imaging::calculations   (target size, crop region)
//!     ├─► render                  (decode → rotate → crop → resize → encode)
//!     └─► export / thumbnail      (file on disk)
//!
//! metadata   (runs independently at import: MetaData + tags)
//! ```
//!
//! Photos and their edits are owned by a storage collaborator. Everything in
//! this crate receives them as read-only snapshots through
//! [`store::PhotoWorkSource`] and never writes edit state back.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | `Photo`, `PhotoWork`, `Size`, `OutputFormat`, `RenderOptions` |
//! | [`imaging`] | Geometry, codec backend, JPEG segment scanner |
//! | [`metadata`] | EXIF/XMP/IPTC reading and normalisation into `MetaData` |
//! | [`queue`] | Serial job queue that coalesces pending submissions |
//! | [`render`] | Render planning, local and channel-delegated renderers |
//! | [`store`] | Sources of pending edits (in-memory, JSON sidecar) |
//! | [`naming`] | Export file names and collision suffixes |
//! | [`export`] | Export orchestration: size policy, naming, metadata copy |
//! | [`thumbnail`] | Thumbnail cache on top of the job queue |
//! | [`config`] | `darkroom.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Master Geometry Is Post-Orientation
//!
//! `Photo::master_width/height` describe the image as displayed, after its
//! EXIF orientation is applied. The backend applies orientation on decode, so
//! rotation and crop coordinates from the editor line up with what the user
//! saw.
//!
//! ## Renders Behind a Trait
//!
//! Callers hold an `Arc<dyn Renderer>`. Rendering can run on the blocking pool
//! ([`render::LocalRenderer`]) or be delegated over a channel to a dedicated
//! render task ([`render::RemoteRenderer`]). Both produce the same bytes; each
//! call awaits exactly one reply.
//!
//! ## External Metadata Copy
//!
//! Exports can carry the master's metadata across by invoking `exiftool`.
//! The tool is optional: a missing binary, a failure or a timeout is logged
//! and the export still succeeds.

pub mod config;
pub mod export;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod queue;
pub mod render;
pub mod store;
pub mod thumbnail;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
