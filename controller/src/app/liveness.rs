//! Device liveness derived from heartbeat recency.

use core::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::model::HeartbeatRecord;

/// Device online/offline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Online,
    Offline,
    /// No heartbeat was ever recorded. Distinct from `Offline`.
    NeverConnected,
}

/// Liveness summary returned to the web client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessReport {
    pub state: DeviceState,
    pub is_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds of the last heartbeat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_since_last_heartbeat: Option<i64>,
    #[serde(default, rename = "wifiSSID")]
    pub wifi_ssid: Option<String>,
    #[serde(default, rename = "wifiRSSI")]
    pub wifi_rssi: Option<i32>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Judge liveness of the device.
///
/// The device counts as online while the heartbeat is younger than `threshold`.
/// Heartbeats from the future (clock skew) count as zero seconds old.
pub(crate) fn assess(
    heartbeat: Option<&HeartbeatRecord>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> LivenessReport {
    let Some(hb) = heartbeat else {
        return LivenessReport {
            state: DeviceState::NeverConnected,
            is_connected: false,
            message: Some("Device has never connected".to_owned()),
            last_heartbeat: None,
            time_since_last_heartbeat: None,
            wifi_ssid: None,
            wifi_rssi: None,
            ip_address: None,
        };
    };

    let age_secs = (now - hb.last_heartbeat).num_seconds().max(0);
    let threshold_secs = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
    let online = age_secs < threshold_secs;

    LivenessReport {
        state: if online {
            DeviceState::Online
        } else {
            DeviceState::Offline
        },
        is_connected: online,
        message: None,
        last_heartbeat: Some(hb.last_heartbeat.timestamp()),
        time_since_last_heartbeat: Some(age_secs),
        wifi_ssid: hb.wifi_ssid.clone(),
        wifi_rssi: hb.wifi_rssi,
        ip_address: hb.ip_address.clone(),
    }
}
