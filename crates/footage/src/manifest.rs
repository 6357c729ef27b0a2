// Manifest resolution.
//
// A stream download starts by resolving the device's VOD URI template,
// substituting the task window into it, and fetching the resulting manifest
// document under the session credential. The document itself is handed to the
// `mpd` parser; this module only deals in the URIs around it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ApiClient;
use crate::error::EngineError;
use crate::session::MediaSession;
use crate::task::TaskWindow;

const CAMERA_MEDIA_URI_PATH: &str = "/api/camera/getMediaUris";
const AUDIO_MEDIA_URI_PATH: &str = "/api/audiogateway/getMediaUris";

const START_TIME_PLACEHOLDER: &str = "{START_TIME}";
const DURATION_PLACEHOLDER: &str = "{DURATION}";

/// Trailing filenames a VOD manifest URI is known to end in. Segment URIs are
/// derived by replacing this suffix with a segment name.
pub const URI_FILE_ENDINGS: [&str; 2] = ["clip.mpd", "file.mpd"];

/// Which of a device pair's streams is being downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, Self::Audio)
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CameraMediaUriQuery<'a> {
    camera_uuid: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayMediaUriQuery<'a> {
    gateway_uuid: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaUris {
    #[serde(default)]
    wan_vod_mpd_uri_template: Option<String>,
    #[serde(default)]
    lan_vod_mpd_uris_templates: Vec<String>,
}

/// A resolved manifest: the substituted URI it was fetched from plus the
/// segment naming facts parsed out of it. Read-only for the segment loop.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub mpd_uri: String,
    pub info: mpd::MpdInfo,
}

impl Manifest {
    /// URI of the initialization segment.
    pub fn init_segment_uri(&self) -> Result<String, EngineError> {
        self.substitute(&self.info.init_name)
    }

    /// URI of the data segment at zero-based download index `i`.
    pub fn segment_uri(&self, i: u64) -> Result<String, EngineError> {
        self.substitute(&self.info.segment_name(i))
    }

    fn substitute(&self, segment_name: &str) -> Result<String, EngineError> {
        for ending in URI_FILE_ENDINGS {
            if self.mpd_uri.contains(ending) {
                return Ok(self.mpd_uri.replace(ending, segment_name));
            }
        }
        Err(EngineError::UnknownManifestSuffix {
            uri: self.mpd_uri.clone(),
        })
    }
}

/// Seam for manifest resolution.
#[async_trait]
pub trait ManifestProvider: Send + Sync {
    async fn resolve(
        &self,
        device_id: &str,
        kind: StreamKind,
        session: &MediaSession,
        window: &TaskWindow,
    ) -> Result<Manifest, EngineError>;
}

/// Resolves a device's manifest for one task window.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    api: ApiClient,
    use_wan: bool,
}

impl ManifestResolver {
    pub fn new(api: ApiClient, use_wan: bool) -> Self {
        Self { api, use_wan }
    }

    fn pick_template(
        &self,
        device_id: &str,
        uris: MediaUris,
    ) -> Result<String, EngineError> {
        if self.use_wan {
            uris.wan_vod_mpd_uri_template
                .ok_or_else(|| EngineError::media_uri(device_id, "no WAN VOD template"))
        } else {
            uris.lan_vod_mpd_uris_templates
                .into_iter()
                .next()
                .ok_or_else(|| EngineError::media_uri(device_id, "no LAN VOD templates"))
        }
    }
}

#[async_trait]
impl ManifestProvider for ManifestResolver {
    async fn resolve(
        &self,
        device_id: &str,
        kind: StreamKind,
        session: &MediaSession,
        window: &TaskWindow,
    ) -> Result<Manifest, EngineError> {
        let uris: MediaUris = match kind {
            StreamKind::Video => {
                self.api
                    .post_json(
                        CAMERA_MEDIA_URI_PATH,
                        &CameraMediaUriQuery {
                            camera_uuid: device_id,
                        },
                        "camera media uri fetch",
                    )
                    .await?
            }
            StreamKind::Audio => {
                self.api
                    .post_json(
                        AUDIO_MEDIA_URI_PATH,
                        &GatewayMediaUriQuery {
                            gateway_uuid: device_id,
                        },
                        "audio media uri fetch",
                    )
                    .await?
            }
        };

        let template = self.pick_template(device_id, uris)?;
        let mpd_uri = substitute_window(&template, window);
        debug!(%mpd_uri, kind = %kind, "fetching manifest");

        let document = self.api.get_text(&mpd_uri, &session.cookie_value()).await?;
        let info = mpd::MpdInfo::parse(&document, kind.is_audio())?;

        Ok(Manifest { mpd_uri, info })
    }
}

fn substitute_window(template: &str, window: &TaskWindow) -> String {
    template
        .replace(START_TIME_PLACEHOLDER, &window.start_time.to_string())
        .replace(DURATION_PLACEHOLDER, &window.duration.to_string())
}
