//! Pull protocol types.
//!
//! These types match what the BLOOMIN8 firmware sends and expects on the
//! `/eink_pull` and `/eink_signal` endpoints.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::{read_json, write_json_atomic};
use crate::Error;

/// Query parameters of `GET /eink_pull`.
///
/// # Example
///
/// ```
/// use bloomin8_pull::PullRequest;
///
/// let request = PullRequest::from_query_string("device_id=frame1&battery=87");
/// assert_eq!(request.device_id.as_deref(), Some("frame1"));
/// assert_eq!(request.battery_level(), Some(87));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequest {
    /// Device identifier
    pub device_id: Option<String>,
    /// Identifier of this pull, echoed back on `/eink_signal`
    pub pull_id: Option<String>,
    /// Wake time the device was scheduled for
    pub cron_time: Option<String>,
    /// Battery level in percent, as sent
    pub battery: Option<String>,
}

impl PullRequest {
    /// Extract pull parameters from a query string.
    pub fn from_query_string(query: &str) -> Self {
        let mut params: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self {
            device_id: params.remove("device_id"),
            pull_id: params.remove("pull_id"),
            cron_time: params.remove("cron_time"),
            battery: params.remove("battery"),
        }
    }

    /// Battery level as an integer; `None` if absent or not a number.
    pub fn battery_level(&self) -> Option<i64> {
        self.battery.as_deref().and_then(|b| b.trim().parse().ok())
    }
}

/// Query parameters of `GET /eink_signal`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalRequest {
    /// Identifier of the pull being reported on
    pub pull_id: Option<String>,
    /// `"1"` when the device displayed the image
    pub success: Option<String>,
}

impl SignalRequest {
    /// Extract signal parameters from a query string.
    pub fn from_query_string(query: &str) -> Self {
        let mut params: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self {
            pull_id: params.remove("pull_id"),
            success: params.remove("success"),
        }
    }

    /// Whether the device reported success; `None` if it did not say.
    pub fn succeeded(&self) -> Option<bool> {
        self.success.as_deref().map(|s| s.trim() == "1")
    }
}

/// Response kind on `/eink_pull`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseKind {
    /// Show the image at `data.image_url`
    Show,
    /// Request failed
    Error,
}

/// Payload of a pull response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullData {
    /// Next wake time, ISO-8601 UTC with `Z` suffix
    pub next_cron_time: String,

    /// Absolute URL of the image to show
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Response for `GET /eink_pull`.
///
/// ```
/// use bloomin8_pull::PullResponse;
///
/// let response = PullResponse::show("2026-05-05T04:00:00Z", "http://ha.local/local/a_P.jpg");
/// let json = serde_json::to_string(&response).unwrap();
/// assert!(json.contains("\"type\":\"SHOW\""));
/// assert!(json.contains("\"next_cron_time\":\"2026-05-05T04:00:00Z\""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    /// HTTP-style status code, mirrored in the HTTP status
    pub status: u16,

    /// Response kind (absent on "no image")
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResponseKind>,

    /// Human readable message
    pub message: String,

    /// Scheduling and image data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PullData>,
}

impl PullResponse {
    /// Show an image and sleep until `next_cron_time`.
    pub fn show(next_cron_time: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            status: 200,
            kind: Some(ResponseKind::Show),
            message: "Image retrieved successfully".to_string(),
            data: Some(PullData {
                next_cron_time: next_cron_time.into(),
                image_url: Some(image_url.into()),
            }),
        }
    }

    /// Nothing to show; sleep until `next_cron_time`.
    pub fn no_image(next_cron_time: impl Into<String>) -> Self {
        Self {
            status: 204,
            kind: None,
            message: "No image available".to_string(),
            data: Some(PullData {
                next_cron_time: next_cron_time.into(),
                image_url: None,
            }),
        }
    }

    /// Rejected access token.
    pub fn unauthorized() -> Self {
        Self::error(401, "Unauthorized")
    }

    /// Error response with the given status.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: Some(ResponseKind::Error),
            message: message.into(),
            data: None,
        }
    }
}

/// Response for `GET /eink_signal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalResponse {
    /// HTTP-style status code
    pub status: u16,
    /// Response kind, only set on errors
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResponseKind>,
    /// Human readable message
    pub message: String,
}

impl SignalResponse {
    /// Feedback accepted.
    pub fn recorded() -> Self {
        Self {
            status: 200,
            kind: None,
            message: "Feedback recorded".to_string(),
        }
    }

    /// Rejected access token.
    pub fn unauthorized() -> Self {
        Self::error(401, "Unauthorized")
    }

    /// Error response with the given status.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: Some(ResponseKind::Error),
            message: message.into(),
        }
    }
}

/// Last known device status, persisted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Battery level in percent from the last pull
    #[serde(default)]
    pub battery: Option<i64>,

    /// Whether the last displayed image was reported as shown
    #[serde(default)]
    pub success: Option<bool>,

    /// Time of the last signal, ISO-8601 UTC
    #[serde(default)]
    pub last_seen: Option<String>,

    /// URL of the last published image
    #[serde(default)]
    pub last_image_url: Option<String>,

    /// Whether the frame is served images; unset means enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl DeviceState {
    /// Whether pulls may select and publish an image.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Load state from `path`; missing or unreadable state yields the default.
    pub fn load(path: &Path) -> Self {
        match read_json(path) {
            Ok(Some(state)) => state,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable device state: {}", e);
                Self::default()
            }
        }
    }

    /// Persist state to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        write_json_atomic(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pull_request_parsing() {
        let request = PullRequest::from_query_string(
            "device_id=frame%201&pull_id=abc&cron_time=2026-05-04T04:00:00Z&battery=55",
        );
        assert_eq!(request.device_id.as_deref(), Some("frame 1"));
        assert_eq!(request.pull_id.as_deref(), Some("abc"));
        assert_eq!(request.cron_time.as_deref(), Some("2026-05-04T04:00:00Z"));
        assert_eq!(request.battery_level(), Some(55));
    }

    #[test]
    fn test_pull_request_bad_battery() {
        let request = PullRequest::from_query_string("battery=full");
        assert_eq!(request.battery.as_deref(), Some("full"));
        assert_eq!(request.battery_level(), None);
        assert_eq!(PullRequest::default().battery_level(), None);
    }

    #[test]
    fn test_signal_request() {
        assert_eq!(
            SignalRequest::from_query_string("pull_id=a&success=1").succeeded(),
            Some(true)
        );
        assert_eq!(
            SignalRequest::from_query_string("success=0").succeeded(),
            Some(false)
        );
        assert_eq!(SignalRequest::from_query_string("").succeeded(), None);
    }

    #[test]
    fn test_show_response_serialization() {
        let response = PullResponse::show("2026-05-05T04:00:00Z", "http://h/local/a_P.jpg");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], 200);
        assert_eq!(json["type"], "SHOW");
        assert_eq!(json["data"]["image_url"], "http://h/local/a_P.jpg");
    }

    #[test]
    fn test_no_image_response_serialization() {
        let json = serde_json::to_string(&PullResponse::no_image("2026-05-05T04:00:00Z")).unwrap();
        assert!(json.contains("\"status\":204"));
        assert!(!json.contains("\"type\""));
        assert!(!json.contains("image_url"));
        assert!(json.contains("No image available"));
    }

    #[test]
    fn test_unauthorized_response() {
        let json = serde_json::to_string(&PullResponse::unauthorized()).unwrap();
        assert_eq!(
            json,
            r#"{"status":401,"type":"ERROR","message":"Unauthorized"}"#
        );
    }

    #[test]
    fn test_signal_unauthorized_response() {
        let json = serde_json::to_string(&SignalResponse::unauthorized()).unwrap();
        assert_eq!(
            json,
            r#"{"status":401,"type":"ERROR","message":"Unauthorized"}"#
        );

        let json = serde_json::to_string(&SignalResponse::recorded()).unwrap();
        assert_eq!(json, r#"{"status":200,"message":"Feedback recorded"}"#);
    }

    #[test]
    fn test_device_state_enabled_default() {
        let state: DeviceState = serde_json::from_str(r#"{"battery":50}"#).unwrap();
        assert_eq!(state.enabled, None);
        assert!(state.is_enabled());

        let state = DeviceState {
            enabled: Some(false),
            ..DeviceState::default()
        };
        assert!(!state.is_enabled());
    }

    #[test]
    fn test_device_state_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        assert_eq!(DeviceState::load(&path), DeviceState::default());

        let state = DeviceState {
            battery: Some(80),
            success: Some(true),
            last_seen: Some("2026-05-04T10:00:00Z".to_string()),
            last_image_url: None,
            enabled: Some(false),
        };
        state.save(&path).unwrap();
        assert_eq!(DeviceState::load(&path), state);
    }

    #[test]
    fn test_device_state_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "[1,2").unwrap();
        assert_eq!(DeviceState::load(&path), DeviceState::default());
    }
}
