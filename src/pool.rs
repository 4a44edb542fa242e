//! The set of images currently eligible for display.

use std::collections::BTreeSet;
use std::path::Path;

use crate::Error;

/// Extensions picked up by [`ImagePool::scan`] by default.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg"];

/// Image identifiers (file names) available on disk.
///
/// Rebuilt from the directory listing on every request; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePool {
    ids: BTreeSet<String>,
}

impl ImagePool {
    /// List regular files in `dir` whose name ends in one of `extensions`
    /// (case-insensitive).
    ///
    /// A missing directory is an empty pool.
    pub fn scan(dir: &Path, extensions: &[&str]) -> Result<Self, Error> {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Image directory {} does not exist", dir.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut ids = BTreeSet::new();
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if has_extension(&name, extensions) {
                ids.insert(name);
            }
        }
        Ok(Self { ids })
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the pool has no images.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is in the pool.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Identifiers in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ImagePool {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
}
