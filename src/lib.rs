//! # bloomin8-pull
//!
//! Server-side core for BLOOMIN8 e-ink frames running in pull mode.
//!
//! The frame wakes up on its own schedule, calls the server, and is told which
//! image to show and when to wake up next. This crate provides:
//! - Image rotation that avoids recent repeats ([`rotation`])
//! - Wake scheduling on a fixed daily hour grid with drift tolerance ([`schedule`])
//! - Protocol types for the pull and signal endpoints
//! - Image publishing, device status persistence and token checks
//! - Optional axum integration
//!
//! ## Quick Start (axum)
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bloomin8_pull::{axum_ext, PullConfig, PullService};
//!
//! let config = PullConfig::load("/config/bloomin8_pull.yaml")?;
//! let app = axum_ext::router(Arc::new(PullService::new(config)?));
//! ```
//!
//! ## Pull Protocol
//!
//! | Endpoint | Method | Purpose |
//! |----------|--------|---------|
//! | `/eink_pull` | GET | Report battery, get image URL and next wake time |
//! | `/eink_signal` | GET | Report whether the image was displayed |
//!
//! The device authenticates with the `X-Access-Token` header and passes
//! `device_id`, `pull_id`, `cron_time` and `battery` as query parameters.
//! The next wake time is returned as `next_cron_time`, an ISO-8601 UTC
//! timestamp with second precision and a `Z` suffix.
//!
//! ## Feature Flags
//!
//! - `axum` - Axum extractors and router
//! - `full` - All features

pub mod auth;
pub mod config;
mod device;
mod error;
pub mod pool;
pub mod publish;
pub mod rotation;
pub mod schedule;
pub mod service;
pub mod store;

pub use auth::{AccessToken, AuthError};
pub use config::PullConfig;
pub use device::{
    DeviceState, PullData, PullRequest, PullResponse, ResponseKind, SignalRequest, SignalResponse,
};
pub use error::Error;
pub use pool::ImagePool;
pub use rotation::{RecencyHistory, RecencySelector, Selection};
pub use schedule::{WakeHours, WakeSchedule};
pub use service::PullService;
pub use store::{HistoryStore, JsonFileStore, MemoryStore};

// Re-export axum integration
#[cfg(feature = "axum")]
pub mod axum_ext;

use chrono::{DateTime, Utc};

/// Format a UTC instant as ISO-8601 with second precision and a `Z` suffix.
///
/// # Example
///
/// ```
/// use bloomin8_pull::format_utc_z;
/// use chrono::{TimeZone, Utc};
///
/// let t = Utc.with_ymd_and_hms(2026, 5, 4, 18, 0, 0).unwrap();
/// assert_eq!(format_utc_z(t), "2026-05-04T18:00:00Z");
/// ```
pub fn format_utc_z(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_utc_z_drops_subseconds() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap() + Duration::milliseconds(987);
        assert_eq!(format_utc_z(t), "2026-01-02T03:04:05Z");
    }
}
