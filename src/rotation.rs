//! Image rotation that avoids recent repeats.
//!
//! Each selection draws uniformly from the pool minus the recently shown
//! images. The history is bounded relative to the pool size, so small pools
//! still rotate and large pools keep a useful memory:
//!
//! | Pool size | History capacity |
//! |-----------|------------------|
//! | ≤ 10      | 5                |
//! | 20        | 10               |
//! | ≥ 100     | 50               |
//!
//! When every image in the pool is in the history the whole pool becomes
//! eligible again, including the image shown last.
//!
//! # Example
//!
//! ```
//! use bloomin8_pull::rotation::RecencySelector;
//! use bloomin8_pull::store::MemoryStore;
//! use bloomin8_pull::ImagePool;
//!
//! let selector = RecencySelector::new(MemoryStore::new(), "originals");
//! let pool: ImagePool = ["a.jpg", "b.jpg", "c.jpg"].into_iter().collect();
//!
//! let selection = selector.select(&pool).unwrap();
//! assert!(pool.contains(&selection.chosen));
//! ```

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::pool::ImagePool;
use crate::store::HistoryStore;
use crate::Error;

/// Lower bound of the history capacity.
pub const RECENT_MIN: usize = 5;

/// Upper bound of the history capacity.
pub const RECENT_LIMIT: usize = 50;

/// History capacity for a pool of `pool_len` images: half the pool, clamped
/// to `RECENT_MIN..=RECENT_LIMIT`.
///
/// Odd pools round half to even, so 13 images keep 6 and 15 keep 8.
pub fn recent_max(pool_len: usize) -> usize {
    let half = pool_len / 2;
    let rounded = if pool_len % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    };
    rounded.clamp(RECENT_MIN, RECENT_LIMIT)
}

/// Recently chosen identifiers, oldest first.
///
/// Serialized as `{"recent": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyHistory {
    #[serde(default)]
    recent: Vec<String>,
}

impl RecencyHistory {
    /// Build a history from entries ordered oldest to newest.
    pub fn from_entries(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            recent: entries.into_iter().collect(),
        }
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> &[String] {
        &self.recent
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Whether `id` was shown recently.
    pub fn contains(&self, id: &str) -> bool {
        self.recent.iter().any(|r| r == id)
    }

    /// Keep only the newest `capacity` entries.
    pub fn truncate_to(&mut self, capacity: usize) {
        if self.recent.len() > capacity {
            let excess = self.recent.len() - capacity;
            self.recent.drain(..excess);
        }
    }

    /// Drop entries that are no longer in the pool.
    pub fn prune(&mut self, pool: &ImagePool) {
        self.recent.retain(|id| pool.contains(id));
    }

    /// Append `id` as the newest entry, evicting the oldest beyond `capacity`.
    pub fn push(&mut self, id: impl Into<String>, capacity: usize) {
        self.recent.push(id.into());
        self.truncate_to(capacity);
    }
}

/// Choose an image from `pool` given an already loaded `history`.
///
/// The history is resized to the pool's capacity and pruned before use, and
/// the returned history has the chosen image appended. Returns `None` for an
/// empty pool.
pub fn choose<R: Rng + ?Sized>(
    pool: &ImagePool,
    mut history: RecencyHistory,
    rng: &mut R,
) -> Option<(String, RecencyHistory)> {
    let capacity = recent_max(pool.len());
    history.truncate_to(capacity);
    history.prune(pool);

    let candidates: Vec<&str> = pool.iter().filter(|id| !history.contains(id)).collect();
    let chosen = if candidates.is_empty() {
        tracing::debug!(
            "All {} images shown recently, falling back to full pool",
            pool.len()
        );
        let all: Vec<&str> = pool.iter().collect();
        all.choose(rng)?.to_string()
    } else {
        candidates.choose(rng)?.to_string()
    };

    history.push(chosen.clone(), capacity);
    Some((chosen, history))
}

/// Outcome of a selection.
#[derive(Debug)]
pub struct Selection {
    /// The image to show.
    pub chosen: String,
    /// History after the selection (what was persisted, or attempted).
    pub history: RecencyHistory,
    /// Set when the history could not be saved. The selection is still valid;
    /// only the no-repeat memory for the next request is affected.
    pub warning: Option<Error>,
}

/// Picks images from a pool while persisting recent picks under one key.
#[derive(Debug)]
pub struct RecencySelector<S> {
    store: S,
    key: String,
}

impl<S: HistoryStore> RecencySelector<S> {
    /// Create a selector that keeps its history under `key` in `store`.
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The persistence key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Select using the thread-local RNG.
    pub fn select(&self, pool: &ImagePool) -> Result<Selection, Error> {
        self.select_with(pool, &mut rand::rng())
    }

    /// Select using the given RNG.
    ///
    /// Fails only with [`Error::EmptyPool`]. A history that cannot be loaded is
    /// treated as empty, and a failed save is reported in
    /// [`Selection::warning`].
    pub fn select_with<R: Rng + ?Sized>(
        &self,
        pool: &ImagePool,
        rng: &mut R,
    ) -> Result<Selection, Error> {
        if pool.is_empty() {
            return Err(Error::EmptyPool);
        }

        let history = self.load_history();
        let (chosen, history) = choose(pool, history, rng).ok_or(Error::EmptyPool)?;

        let warning = match self.store.save(&self.key, &history) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to save image history '{}': {}", self.key, e);
                Some(e)
            }
        };

        tracing::debug!(
            "Selected {} from {} images ({} recent)",
            chosen,
            pool.len(),
            history.len()
        );

        Ok(Selection {
            chosen,
            history,
            warning,
        })
    }

    /// Load the stored history, recovering from missing or corrupt state.
    pub fn load_history(&self) -> RecencyHistory {
        match self.store.load(&self.key) {
            Ok(history) => history.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable image history '{}': {}",
                    self.key,
                    e
                );
                RecencyHistory::default()
            }
        }
    }
}
