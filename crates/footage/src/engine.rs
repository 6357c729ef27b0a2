// Per-task download orchestration.
//
// One engine run covers one task end to end: negotiate a session, resolve the
// manifest, stream the video, repeat for audio when the device has a
// companion audio gateway, then hand both files to the muxer. Stream ordering
// within a task is fixed (video, audio, mux); ordering across tasks is the
// scheduler's business.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::config::EngineConfig;
use crate::directory::DeviceMapping;
use crate::error::EngineError;
use crate::manifest::{ManifestProvider, ManifestResolver, StreamKind};
use crate::mux::{FfmpegMuxer, Muxer};
use crate::segment::{HttpMediaFetcher, MediaFetcher, SegmentStream};
use crate::session::{SessionNegotiator, SessionProvider};
use crate::task::{DownloadTask, TaskWindow};

pub struct DownloadEngine {
    sessions: Arc<dyn SessionProvider>,
    manifests: Arc<dyn ManifestProvider>,
    stream: SegmentStream<dyn MediaFetcher>,
    muxer: Arc<dyn Muxer>,
    output_dir: PathBuf,
}

impl DownloadEngine {
    /// Production wiring: HTTP session negotiation, manifest resolution and
    /// segment fetching, ffmpeg muxing.
    pub fn from_config(config: &EngineConfig, api: ApiClient) -> Self {
        let fetcher: Arc<dyn MediaFetcher> = Arc::new(HttpMediaFetcher::new(api.clone()));
        Self {
            sessions: Arc::new(SessionNegotiator::new(api.clone())),
            manifests: Arc::new(ManifestResolver::new(api, config.use_wan)),
            stream: SegmentStream::new(fetcher),
            muxer: Arc::new(FfmpegMuxer::new()),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Explicit wiring, used by tests to substitute fakes at every seam.
    pub fn with_parts(
        sessions: Arc<dyn SessionProvider>,
        manifests: Arc<dyn ManifestProvider>,
        fetcher: Arc<dyn MediaFetcher>,
        muxer: Arc<dyn Muxer>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            sessions,
            manifests,
            stream: SegmentStream::new(fetcher),
            muxer,
            output_dir,
        }
    }

    /// Run one task to completion, returning the path of the final artifact.
    ///
    /// Always downloads video. When the device has a companion audio gateway
    /// (from the task itself or the mapping), audio is downloaded too and the
    /// pair is muxed; on mux success the intermediates are removed, on mux
    /// failure they are kept for manual recovery and the error propagates.
    pub async fn run(
        &self,
        task: &DownloadTask,
        mapping: &HashMap<String, DeviceMapping>,
    ) -> Result<PathBuf, EngineError> {
        let companion = task.companion_audio_id.clone().or_else(|| {
            mapping
                .get(&task.device_id)
                .and_then(|m| m.companion_audio_id.clone())
        });

        // Historical quirk kept for name-collision compatibility: paired
        // intermediates use .webm, video-only output uses .mp4.
        let extension = if companion.is_some() { "webm" } else { "mp4" };
        let stem = output_stem(task);
        let video_path = self.output_dir.join(format!("{stem}_video.{extension}"));

        info!(
            device_id = %task.device_id,
            device_name = %task.device_name,
            start_time = task.window.start_time,
            duration = task.window.duration,
            "saving footage"
        );

        self.download_stream(&task.device_id, StreamKind::Video, &task.window, &video_path)
            .await?;

        let Some(gateway_id) = companion else {
            info!(output = %video_path.display(), "video-only download complete");
            return Ok(video_path);
        };

        let audio_path = self.output_dir.join(format!("{stem}_audio.{extension}"));
        self.download_stream(&gateway_id, StreamKind::Audio, &task.window, &audio_path)
            .await?;

        let combined_name = match &task.origin {
            Some(_) => format!("{stem}_combined.mp4"),
            None => format!("{stem}_videoWithAudio.mp4"),
        };
        let combined_path = self.output_dir.join(combined_name);

        match self.muxer.mux(&video_path, &audio_path, &combined_path).await {
            Ok(()) => {
                // The combined artifact exists at this point; a leftover
                // intermediate is worth a warning, not a task failure.
                for intermediate in [&audio_path, &video_path] {
                    if let Err(e) = tokio::fs::remove_file(intermediate).await {
                        warn!(
                            path = %intermediate.display(),
                            error = %e,
                            "failed to remove intermediate file"
                        );
                    }
                }
                info!(output = %combined_path.display(), "combined output created, intermediates removed");
                Ok(combined_path)
            }
            Err(e) => {
                error!(
                    error = %e,
                    video = %video_path.display(),
                    audio = %audio_path.display(),
                    "mux failed, keeping intermediate files"
                );
                Err(e)
            }
        }
    }

    async fn download_stream(
        &self,
        device_id: &str,
        kind: StreamKind,
        window: &TaskWindow,
        path: &Path,
    ) -> Result<u64, EngineError> {
        let session = self.sessions.negotiate().await?;
        let manifest = self.manifests.resolve(device_id, kind, &session, window).await?;

        let mut file = tokio::fs::File::create(path).await?;
        let bytes = self
            .stream
            .download(&manifest, window, &session, &mut file)
            .await?;
        info!(kind = %kind, bytes, output = %path.display(), "stream written");
        Ok(bytes)
    }
}

/// Deterministic file-name stem for a task's outputs.
///
/// Alert-derived tasks carry the alert type and id so re-runs of the same
/// alert collide by name instead of piling up duplicates.
fn output_stem(task: &DownloadTask) -> String {
    let name = sanitize(&task.device_name);
    match &task.origin {
        Some(origin) => {
            let timestamp = chrono::DateTime::from_timestamp(task.window.start_time, 0)
                .map(|t| t.format("%Y%m%d_%H%M%S").to_string())
                .unwrap_or_else(|| task.window.start_time.to_string());
            format!(
                "{name}_{}_{timestamp}_alert_{}_{}",
                task.device_id,
                sanitize(&origin.alert_type),
                sanitize(&origin.alert_id)
            )
        }
        None => format!("{name}_{}_{}", task.device_id, task.window.start_time),
    }
}

fn sanitize(value: &str) -> String {
    value.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::session::MediaSession;
    use crate::task::AlertOrigin;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSessions;

    #[async_trait]
    impl SessionProvider for FakeSessions {
        async fn negotiate(&self) -> Result<MediaSession, EngineError> {
            Ok(MediaSession::for_tests("tok"))
        }
    }

    struct FakeManifests;

    #[async_trait]
    impl ManifestProvider for FakeManifests {
        async fn resolve(
            &self,
            _device_id: &str,
            kind: StreamKind,
            _session: &MediaSession,
            _window: &TaskWindow,
        ) -> Result<Manifest, EngineError> {
            let host = match kind {
                StreamKind::Video => "cam",
                StreamKind::Audio => "gw",
            };
            Ok(Manifest {
                mpd_uri: format!("https://{host}.local/vod/clip.mpd"),
                info: mpd::MpdInfo {
                    init_name: "seg_init.mp4".to_owned(),
                    segment_pattern: "seg_$Number$.m4v".to_owned(),
                    start_index: 1,
                },
            })
        }
    }

    /// Serves fixed bytes for every URI.
    struct FakeFetcher;

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(&self, uri: &str, _cookie: &str) -> Result<Bytes, EngineError> {
            Ok(Bytes::from(format!("[{uri}]")))
        }
    }

    /// Writes a marker to the output file and counts invocations.
    struct FakeMuxer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeMuxer {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Muxer for FakeMuxer {
        async fn mux(
            &self,
            _video: &Path,
            _audio: &Path,
            output: &Path,
        ) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::mux("simulated failure"));
            }
            tokio::fs::write(output, b"MUXED").await?;
            Ok(())
        }
    }

    /// Merges by removing its inputs itself, so the engine's own cleanup
    /// finds nothing left to delete.
    struct ConsumingMuxer;

    #[async_trait]
    impl Muxer for ConsumingMuxer {
        async fn mux(
            &self,
            video: &Path,
            audio: &Path,
            output: &Path,
        ) -> Result<(), EngineError> {
            tokio::fs::remove_file(video).await?;
            tokio::fs::remove_file(audio).await?;
            tokio::fs::write(output, b"MUXED").await?;
            Ok(())
        }
    }

    fn engine(muxer: Arc<dyn Muxer>, dir: &Path) -> DownloadEngine {
        DownloadEngine::with_parts(
            Arc::new(FakeSessions),
            Arc::new(FakeManifests),
            Arc::new(FakeFetcher),
            muxer,
            dir.to_owned(),
        )
    }

    fn task(companion: Option<&str>) -> DownloadTask {
        DownloadTask {
            device_id: "cam-1".to_owned(),
            device_name: "Front Door".to_owned(),
            window: TaskWindow {
                start_time: 1_700_000_000,
                duration: 8,
            },
            companion_audio_id: companion.map(str::to_owned),
            origin: None,
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn camera_without_companion_produces_single_video_file() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(FakeMuxer::new(false));
        let engine = engine(muxer.clone(), dir.path());

        let artifact = engine.run(&task(None), &HashMap::new()).await.unwrap();

        assert_eq!(
            files_in(dir.path()),
            vec!["FrontDoor_cam-1_1700000000_video.mp4".to_owned()]
        );
        assert!(artifact.ends_with("FrontDoor_cam-1_1700000000_video.mp4"));
        assert_eq!(muxer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn camera_with_companion_produces_only_combined_file() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(FakeMuxer::new(false));
        let engine = engine(muxer.clone(), dir.path());

        let artifact = engine
            .run(&task(Some("gw-1")), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(
            files_in(dir.path()),
            vec!["FrontDoor_cam-1_1700000000_videoWithAudio.mp4".to_owned()]
        );
        assert!(artifact.ends_with("FrontDoor_cam-1_1700000000_videoWithAudio.mp4"));
        assert_eq!(muxer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn companion_falls_back_to_device_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(FakeMuxer::new(false));
        let engine = engine(muxer.clone(), dir.path());

        let mut mapping = HashMap::new();
        mapping.insert(
            "cam-1".to_owned(),
            DeviceMapping {
                device_id: "cam-1".to_owned(),
                device_name: "Front Door".to_owned(),
                companion_audio_id: Some("gw-9".to_owned()),
            },
        );

        engine.run(&task(None), &mapping).await.unwrap();
        assert_eq!(muxer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mux_failure_keeps_both_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = Arc::new(FakeMuxer::new(true));
        let engine = engine(muxer, dir.path());

        let result = engine.run(&task(Some("gw-1")), &HashMap::new()).await;

        assert!(matches!(result, Err(EngineError::Mux { .. })));
        assert_eq!(
            files_in(dir.path()),
            vec![
                "FrontDoor_cam-1_1700000000_audio.webm".to_owned(),
                "FrontDoor_cam-1_1700000000_video.webm".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_intermediates_after_mux_do_not_fail_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(ConsumingMuxer), dir.path());

        let artifact = engine
            .run(&task(Some("gw-1")), &HashMap::new())
            .await
            .unwrap();

        assert!(artifact.ends_with("FrontDoor_cam-1_1700000000_videoWithAudio.mp4"));
        assert_eq!(
            files_in(dir.path()),
            vec!["FrontDoor_cam-1_1700000000_videoWithAudio.mp4".to_owned()]
        );
    }

    #[test]
    fn alert_origin_shapes_the_file_stem() {
        let mut task = task(None);
        task.origin = Some(AlertOrigin {
            alert_id: "a-42".to_owned(),
            alert_type: "MOTION DETECTED".to_owned(),
            timestamp_ms: 1_700_000_000_000,
        });
        let stem = output_stem(&task);
        assert!(stem.starts_with("FrontDoor_cam-1_"));
        assert!(stem.ends_with("_alert_MOTIONDETECTED_a42"));
    }

    #[test]
    fn sanitize_keeps_alphanumerics_only() {
        assert_eq!(sanitize("Front Door #2 (east)"), "FrontDoor2east");
    }
}
