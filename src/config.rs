//! Server configuration.
//!
//! # Example (YAML)
//!
//! ```yaml
//! access_token: "change-me"
//! image_dir: /config/www/bloomin8/originals
//! publish_dir: /config/www/bloomin8
//! publish_webpath: /local/bloomin8
//! wake_up_hours: "6,18"
//! timezone: "Europe/Berlin"
//! drift_minutes: 30
//! orientation: P
//! ```
//!
//! Only `access_token` is required; everything else has a default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::schedule::{WakeSchedule, DEFAULT_DRIFT_MINUTES};
use crate::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "BLOOMIN8_PULL_CONFIG";

/// Pull server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PullConfig {
    /// Token devices must send in `X-Access-Token`
    pub access_token: String,

    /// Directory holding the original images
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Directory the chosen image is published into
    #[serde(default = "default_publish_dir")]
    pub publish_dir: PathBuf,

    /// URL path under which `publish_dir` is served
    #[serde(default = "default_publish_webpath")]
    pub publish_webpath: String,

    /// Comma-separated wake hours (e.g. "6,18")
    #[serde(default = "default_wake_up_hours")]
    pub wake_up_hours: String,

    /// Timezone the wake hours are interpreted in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Drift window in minutes
    #[serde(default = "default_drift_minutes")]
    pub drift_minutes: u32,

    /// Orientation tag appended to published file names
    #[serde(default = "default_orientation")]
    pub orientation: String,

    /// Device status file
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Directory for image rotation history
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    /// Key the rotation history is stored under
    #[serde(default = "default_history_key")]
    pub history_key: String,
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("/config/www/bloomin8/originals")
}

fn default_publish_dir() -> PathBuf {
    PathBuf::from("/config/www/bloomin8")
}

fn default_publish_webpath() -> String {
    "/local/bloomin8".to_string()
}

fn default_wake_up_hours() -> String {
    "6,18".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_drift_minutes() -> u32 {
    DEFAULT_DRIFT_MINUTES
}

fn default_orientation() -> String {
    "P".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/config/bloomin8_pull_state.json")
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("/config/bloomin8_pull")
}

fn default_history_key() -> String {
    "originals".to_string()
}

impl PullConfig {
    /// Configuration with defaults for everything but the token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            image_dir: default_image_dir(),
            publish_dir: default_publish_dir(),
            publish_webpath: default_publish_webpath(),
            wake_up_hours: default_wake_up_hours(),
            timezone: default_timezone(),
            drift_minutes: default_drift_minutes(),
            orientation: default_orientation(),
            state_file: default_state_file(),
            history_dir: default_history_dir(),
            history_key: default_history_key(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from the file named by `BLOOMIN8_PULL_CONFIG`.
    pub fn from_env_path() -> Result<Self, Error> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_err(|_| Error::Config(format!("{} is not set", CONFIG_PATH_ENV)))?;
        Self::load(path)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid config YAML: {}", e)))
    }

    /// Build the wake schedule, validating hours and timezone.
    pub fn wake_schedule(&self) -> Result<WakeSchedule, Error> {
        WakeSchedule::from_config(&self.wake_up_hours, &self.timezone, self.drift_minutes)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.access_token.is_empty() {
            return Err(Error::Config("access_token must not be empty".to_string()));
        }
        self.wake_schedule().map(|_| ())
    }
}
