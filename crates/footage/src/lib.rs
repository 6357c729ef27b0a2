//! Camera footage retrieval engine.
//!
//! Converts policy alerts (or an explicit time range) into download tasks,
//! negotiates per-task media sessions, resolves segmented-media manifests and
//! streams footage segment by segment to local files, muxing in companion
//! audio where a camera has one. Many tasks run concurrently under a bounded
//! worker pool with per-task failure isolation.

pub mod alerts;
pub mod api;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod mux;
pub mod scheduler;
pub mod segment;
pub mod session;
pub mod task;

pub use alerts::{AlertSource, PolicyAlert};
pub use api::ApiClient;
pub use config::EngineConfig;
pub use directory::{DeviceDirectory, DeviceMapping};
pub use engine::DownloadEngine;
pub use error::EngineError;
pub use manifest::{Manifest, ManifestProvider, ManifestResolver, StreamKind};
pub use mux::{FfmpegMuxer, Muxer};
pub use scheduler::{Scheduler, TaskOutcome, TaskRunner};
pub use segment::{HttpMediaFetcher, MediaFetcher, SegmentStream};
pub use session::{MediaSession, SessionNegotiator, SessionProvider};
pub use task::{derive_tasks, manual_tasks, AlertOrigin, DownloadTask, TaskWindow};
