// Download task derivation.
//
// Tasks come from two places: policy alerts expanded into buffered windows
// (`derive_tasks`) or an explicit start/duration applied to every eligible
// device (`manual_tasks`). Either way the result is an immutable record the
// scheduler consumes exactly once.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::alerts::PolicyAlert;
use crate::directory::DeviceMapping;

/// Default event length assumed when an alert has no end timestamp, before
/// buffering is applied.
pub const DEFAULT_EVENT_SECONDS: i64 = 120;

/// Provenance of an alert-derived task, retained for output file naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertOrigin {
    pub alert_id: String,
    pub alert_type: String,
    pub timestamp_ms: i64,
}

/// The requested footage window of one task.
///
/// `duration` is the literal window arithmetic and may come out non-positive
/// for out-of-order alert timestamps; such windows simply download zero
/// segments. Footage is served in fixed 2-second segments and any remainder
/// of `duration` is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskWindow {
    /// Start of the window, epoch seconds, clamped to be non-negative.
    pub start_time: i64,
    /// Window length in seconds.
    pub duration: i64,
}

impl TaskWindow {
    /// Number of 2-second segments covering the window.
    pub fn segment_count(&self) -> u64 {
        if self.duration > 0 {
            (self.duration / 2) as u64
        } else {
            0
        }
    }
}

/// One unit of download work: a device and a footage window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub device_id: String,
    pub device_name: String,
    pub window: TaskWindow,
    /// Companion audio device, when known at derivation time. Alert-derived
    /// tasks leave this unset and the engine consults the device mapping.
    pub companion_audio_id: Option<String>,
    pub origin: Option<AlertOrigin>,
}

/// Convert raw alerts into download tasks with `buffer_seconds` of padding on
/// both sides of the event.
///
/// Alerts missing a timestamp or device id are skipped with a warning; the
/// remaining alerts still produce tasks.
pub fn derive_tasks(alerts: &[PolicyAlert], buffer_seconds: i64) -> Vec<DownloadTask> {
    let mut tasks = Vec::with_capacity(alerts.len());

    for alert in alerts {
        let alert_id = alert.alert_id.as_deref().unwrap_or("unknown");

        let Some(timestamp_ms) = alert.event_timestamp_ms() else {
            warn!(alert_id, "alert missing timestamp information, skipping");
            continue;
        };
        let Some(device_id) = alert.device_id() else {
            warn!(alert_id, "alert missing device UUID, skipping");
            continue;
        };

        let start_time = (timestamp_ms.div_euclid(1000) - buffer_seconds).max(0);
        let duration = match alert.event_end_ms {
            Some(end_ms) => (end_ms - timestamp_ms).div_euclid(1000) + 2 * buffer_seconds,
            None => DEFAULT_EVENT_SECONDS + 2 * buffer_seconds,
        };

        let origin = AlertOrigin {
            alert_id: alert_id.to_owned(),
            alert_type: alert.alert_type.clone().unwrap_or_else(|| "alert".to_owned()),
            timestamp_ms,
        };

        info!(
            alert_id,
            device_id,
            start_time,
            duration,
            "prepared download task from alert"
        );

        tasks.push(DownloadTask {
            device_id: device_id.to_owned(),
            device_name: alert.display_name().to_owned(),
            window: TaskWindow {
                start_time,
                duration,
            },
            companion_audio_id: None,
            origin: Some(origin),
        });
    }

    info!(
        tasks = tasks.len(),
        alerts = alerts.len(),
        "prepared download tasks from alerts"
    );
    tasks
}

/// One task per eligible device for an explicit window.
pub fn manual_tasks(
    devices: &HashMap<String, DeviceMapping>,
    window: TaskWindow,
) -> Vec<DownloadTask> {
    devices
        .values()
        .map(|mapping| DownloadTask {
            device_id: mapping.device_id.clone(),
            device_name: mapping.device_name.clone(),
            window,
            companion_audio_id: mapping.companion_audio_id.clone(),
            origin: None,
        })
        .collect()
}
