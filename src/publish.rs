//! Publishing the chosen image into the web-served directory.
//!
//! The publish directory only ever holds the image currently shown: it is
//! cleared before the chosen original is copied in under a name that carries
//! the display orientation.

use std::path::{Path, PathBuf};

use crate::Error;

/// Extension used when the chosen file has none.
const FALLBACK_EXTENSION: &str = ".jpg";

/// Name under which `chosen` is published, e.g. `beach.JPG` + `P` → `beach_P.jpg`.
///
/// # Example
///
/// ```
/// use bloomin8_pull::publish::published_name;
///
/// assert_eq!(published_name("beach.JPG", "P"), "beach_P.jpg");
/// assert_eq!(published_name("scan", "L"), "scan_L.jpg");
/// ```
pub fn published_name(chosen: &str, orientation: &str) -> String {
    let path = Path::new(chosen);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| chosen.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    format!("{}_{}{}", stem, orientation, ext)
}

/// Copies chosen images into the publish directory and builds their URLs.
#[derive(Debug, Clone)]
pub struct Publisher {
    /// Directory served by the web server
    pub publish_dir: PathBuf,
    /// URL path under which `publish_dir` is served (e.g. `/local/bloomin8`)
    pub publish_webpath: String,
    /// Orientation tag appended to published file names
    pub orientation: String,
}

impl Publisher {
    /// Create a publisher.
    pub fn new(
        publish_dir: impl Into<PathBuf>,
        publish_webpath: impl Into<String>,
        orientation: impl Into<String>,
    ) -> Self {
        Self {
            publish_dir: publish_dir.into(),
            publish_webpath: publish_webpath.into(),
            orientation: orientation.into(),
        }
    }

    /// Clear the publish directory and copy `source_dir/chosen` into it.
    ///
    /// Returns the published file name.
    pub fn publish(&self, source_dir: &Path, chosen: &str) -> Result<String, Error> {
        let name = published_name(chosen, &self.orientation);
        let src = source_dir.join(chosen);
        let dst = self.publish_dir.join(&name);

        std::fs::create_dir_all(&self.publish_dir)?;
        self.clear()?;
        std::fs::copy(&src, &dst).map_err(|e| {
            Error::Io(format!(
                "Failed to copy {} -> {}: {}",
                src.display(),
                dst.display(),
                e
            ))
        })?;

        tracing::debug!("Published {} as {}", src.display(), dst.display());
        Ok(name)
    }

    /// Absolute URL of a published file.
    ///
    /// `base_url` is scheme and host, e.g. `http://homeassistant.local:8123`.
    pub fn image_url(&self, base_url: &str, published_name: &str) -> String {
        format!(
            "{}{}/{}",
            base_url.trim_end_matches('/'),
            self.publish_webpath.trim_end_matches('/'),
            published_name
        )
    }

    /// Remove regular files from the publish directory.
    fn clear(&self) -> Result<(), Error> {
        for entry in std::fs::read_dir(&self.publish_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}
