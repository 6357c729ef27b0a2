// Device directory resolution.
//
// Builds the per-run table of eligible cameras and their companion audio
// gateways. The table is built once, wrapped in an `Arc`, and read-only for
// the rest of the run.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::error::EngineError;

const CAMERA_STATE_PATH: &str = "/api/camera/getMinimalCameraStateList";
const AUDIO_GATEWAY_STATE_PATH: &str = "/api/audiogateway/getMinimalAudioGatewayStateList";

/// Connectivity state that excludes a camera from the run.
const UNHEALTHY_STATUS: &str = "RED";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraState {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub connection_status: String,
    #[serde(default)]
    pub location_uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioGatewayState {
    pub uuid: String,
    #[serde(default)]
    pub associated_cameras: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CameraStateEnvelope {
    #[serde(default)]
    camera_states: Vec<CameraState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioGatewayEnvelope {
    #[serde(default)]
    audio_gateway_states: Vec<AudioGatewayState>,
}

/// One eligible camera, with its companion audio gateway when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMapping {
    pub device_id: String,
    pub device_name: String,
    pub companion_audio_id: Option<String>,
}

/// Resolves the set of eligible cameras and their audio companions.
#[derive(Debug, Clone)]
pub struct DeviceDirectory {
    api: ApiClient,
}

impl DeviceDirectory {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch the camera and audio-gateway directories and build the mapping.
    ///
    /// Cameras in an unhealthy connectivity state are dropped, then the
    /// location and device filters are applied together.
    pub async fn resolve(
        &self,
        location_filter: Option<&str>,
        device_filter: Option<&str>,
    ) -> Result<HashMap<String, DeviceMapping>, EngineError> {
        let cameras: CameraStateEnvelope = self
            .api
            .post_json(
                CAMERA_STATE_PATH,
                &empty_body(),
                "camera directory fetch",
            )
            .await?;
        let gateways: AudioGatewayEnvelope = self
            .api
            .post_json(
                AUDIO_GATEWAY_STATE_PATH,
                &empty_body(),
                "audio gateway directory fetch",
            )
            .await?;

        let mapping = build_mapping(
            cameras.camera_states,
            gateways.audio_gateway_states,
            location_filter,
            device_filter,
        );
        info!(devices = mapping.len(), "resolved device directory");
        Ok(mapping)
    }
}

// Both state endpoints take an empty JSON object.
fn empty_body() -> HashMap<String, String> {
    HashMap::new()
}

/// Pure mapping construction, separated from the fetches for testability.
///
/// Companion association is first-match-wins: once a camera has a companion
/// gateway, later gateways listing the same camera do not overwrite it. The
/// remote data listing one camera under several gateways is inconsistent to
/// begin with; this policy just makes the outcome deterministic.
pub fn build_mapping(
    cameras: Vec<CameraState>,
    gateways: Vec<AudioGatewayState>,
    location_filter: Option<&str>,
    device_filter: Option<&str>,
) -> HashMap<String, DeviceMapping> {
    let mut mapping = HashMap::new();

    for cam in cameras {
        if cam.connection_status == UNHEALTHY_STATUS {
            debug!(uuid = %cam.uuid, "skipping unhealthy camera");
            continue;
        }
        if let Some(location) = location_filter
            && cam.location_uuid.as_deref() != Some(location)
        {
            continue;
        }
        if let Some(device) = device_filter
            && cam.uuid != device
        {
            continue;
        }

        mapping.insert(
            cam.uuid.clone(),
            DeviceMapping {
                device_id: cam.uuid,
                device_name: cam.name,
                companion_audio_id: None,
            },
        );
    }

    for gateway in gateways {
        for camera_uuid in &gateway.associated_cameras {
            if let Some(entry) = mapping.get_mut(camera_uuid)
                && entry.companion_audio_id.is_none()
            {
                entry.companion_audio_id = Some(gateway.uuid.clone());
            }
        }
    }

    mapping
}
