// Policy alert retrieval.
//
// Alerts drive the automatic footage-selection mode: each retrieved alert is
// later expanded into a buffered download window by `task::derive_tasks`.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::ApiClient;

const ALERTS_PATH: &str = "/api/event/getPolicyAlerts";

/// One alert record as returned by the remote feed.
///
/// Field names vary across alert generations, hence the `timestampMs` /
/// `eventStartMs` and `deviceUuid` / `cameraUuid` fallback pairs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAlert {
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub event_start_ms: Option<i64>,
    #[serde(default)]
    pub event_end_ms: Option<i64>,
    #[serde(default)]
    pub device_uuid: Option<String>,
    #[serde(default)]
    pub camera_uuid: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub camera_name: Option<String>,
    #[serde(default)]
    pub alert_id: Option<String>,
    #[serde(default)]
    pub alert_type: Option<String>,
}

impl PolicyAlert {
    /// Primary event timestamp, falling back to the alternate field.
    pub fn event_timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms.or(self.event_start_ms)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_uuid
            .as_deref()
            .or(self.camera_uuid.as_deref())
    }

    pub fn display_name(&self) -> &str {
        self.device_name
            .as_deref()
            .or(self.camera_name.as_deref())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertQuery<'a> {
    max_results: u32,
    location_filter: Option<&'a str>,
    device_filter: Option<&'a str>,
    before_timestamp_ms: Option<i64>,
    after_timestamp_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AlertsEnvelope {
    #[serde(default)]
    alerts: Vec<PolicyAlert>,
}

/// Fetches candidate alerts from the remote feed.
#[derive(Debug, Clone)]
pub struct AlertSource {
    api: ApiClient,
}

impl AlertSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Retrieve up to `max_results` alerts matching the filters.
    ///
    /// Any transport error or non-success status is logged and reported as an
    /// empty list; an empty result means "nothing to do", never an error the
    /// caller has to handle.
    pub async fn fetch_alerts(
        &self,
        max_results: u32,
        location_filter: Option<&str>,
        device_filter: Option<&str>,
        before_ms: Option<i64>,
        after_ms: Option<i64>,
    ) -> Vec<PolicyAlert> {
        let query = AlertQuery {
            max_results,
            location_filter,
            device_filter,
            before_timestamp_ms: before_ms,
            after_timestamp_ms: after_ms,
        };

        match self
            .api
            .post_json::<_, AlertsEnvelope>(ALERTS_PATH, &query, "alert retrieval")
            .await
        {
            Ok(envelope) => {
                info!(count = envelope.alerts.len(), "retrieved policy alerts");
                envelope.alerts
            }
            Err(e) => {
                error!(error = %e, "failed to retrieve policy alerts");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn timestamp_falls_back_to_event_start() {
        let alert: PolicyAlert = serde_json::from_value(serde_json::json!({
            "eventStartMs": 5_000,
            "cameraUuid": "cam-1",
        }))
        .unwrap();
        assert_eq!(alert.event_timestamp_ms(), Some(5_000));
        assert_eq!(alert.device_id(), Some("cam-1"));
        assert_eq!(alert.display_name(), "Unknown");
    }

    #[test]
    fn primary_fields_win_over_fallbacks() {
        let alert: PolicyAlert = serde_json::from_value(serde_json::json!({
            "timestampMs": 1_000,
            "eventStartMs": 2_000,
            "deviceUuid": "dev-1",
            "cameraUuid": "cam-1",
            "deviceName": "Lobby",
            "cameraName": "Other",
        }))
        .unwrap();
        assert_eq!(alert.event_timestamp_ms(), Some(1_000));
        assert_eq!(alert.device_id(), Some("dev-1"));
        assert_eq!(alert.display_name(), "Lobby");
    }

    #[tokio::test]
    async fn transport_failure_yields_empty_list() {
        // Nothing listens on this port; the request fails fast and the
        // contract says that surfaces as an empty list, not an error.
        let config = EngineConfig {
            api_base: "http://127.0.0.1:9".to_owned(),
            api_key: "key".to_owned(),
            ..EngineConfig::default()
        };
        let source = AlertSource::new(ApiClient::new(&config).unwrap());
        let alerts = source.fetch_alerts(10, None, None, None, None).await;
        assert!(alerts.is_empty());
    }
}
