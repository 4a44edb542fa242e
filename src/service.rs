//! Request handling for the pull endpoints.
//!
//! [`PullService`] is transport-agnostic: it takes parsed requests, the
//! request's base URL and the current time, and returns protocol responses.
//! All filesystem work is blocking; async callers should run it on a blocking
//! thread (the axum integration does).

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::auth::{AccessToken, AuthError};
use crate::config::PullConfig;
use crate::device::{DeviceState, PullRequest, PullResponse, SignalRequest, SignalResponse};
use crate::pool::{ImagePool, ALLOWED_EXTENSIONS};
use crate::publish::Publisher;
use crate::rotation::RecencySelector;
use crate::schedule::WakeSchedule;
use crate::store::{HistoryStore, JsonFileStore};
use crate::{format_utc_z, Error};

/// Callback invoked with a snapshot of the device state after every change.
pub type StateObserver = Box<dyn Fn(&DeviceState) + Send + Sync>;

/// Pull server core: scheduling, rotation, publishing and device status.
pub struct PullService<S = JsonFileStore> {
    config: PullConfig,
    schedule: WakeSchedule,
    selector: RecencySelector<S>,
    publisher: Publisher,
    state: Mutex<DeviceState>,
    // Serializes save-and-notify so the file and observers see updates in order
    persist: Mutex<()>,
    observers: Vec<StateObserver>,
}

impl PullService<JsonFileStore> {
    /// Create a service that keeps rotation history in `config.history_dir`.
    pub fn new(config: PullConfig) -> Result<Self, Error> {
        let store = JsonFileStore::new(config.history_dir.clone());
        Self::with_store(config, store)
    }
}

impl<S: HistoryStore> PullService<S> {
    /// Create a service with a custom history store.
    ///
    /// Fails with [`Error::Config`] if the configuration is invalid.
    pub fn with_store(config: PullConfig, store: S) -> Result<Self, Error> {
        config.validate()?;
        let schedule = config.wake_schedule()?;
        let selector = RecencySelector::new(store, config.history_key.clone());
        let publisher = Publisher::new(
            config.publish_dir.clone(),
            config.publish_webpath.clone(),
            config.orientation.clone(),
        );
        let state = DeviceState::load(&config.state_file);

        tracing::info!(
            "Pull service ready: wake hours {:?} ({}), drift {}m, images from {}",
            schedule.hours().hours(),
            schedule.timezone(),
            config.drift_minutes,
            config.image_dir.display()
        );

        Ok(Self {
            config,
            schedule,
            selector,
            publisher,
            state: Mutex::new(state),
            persist: Mutex::new(()),
            observers: Vec::new(),
        })
    }

    /// Register a callback for device state changes.
    pub fn subscribe(&mut self, observer: impl Fn(&DeviceState) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The active configuration.
    pub fn config(&self) -> &PullConfig {
        &self.config
    }

    /// The wake schedule.
    pub fn schedule(&self) -> &WakeSchedule {
        &self.schedule
    }

    /// The rotation selector.
    pub fn selector(&self) -> &RecencySelector<S> {
        &self.selector
    }

    /// Snapshot of the current device state.
    pub fn state(&self) -> DeviceState {
        self.lock_state().clone()
    }

    /// Turn image serving on or off.
    ///
    /// While disabled, pulls still record the battery level and return the
    /// next wake time, but no image is selected or published.
    pub fn set_enabled(&self, enabled: bool) {
        tracing::info!("Image serving {}", if enabled { "enabled" } else { "disabled" });
        self.update_state(|state| state.enabled = Some(enabled));
    }

    /// Check a device token against the configured one.
    pub fn authorize(&self, token: &AccessToken) -> Result<(), AuthError> {
        token.validate(&self.config.access_token)
    }

    /// Handle `GET /eink_pull` using the thread-local RNG.
    pub fn handle_pull(
        &self,
        request: &PullRequest,
        base_url: &str,
        now: DateTime<Utc>,
    ) -> PullResponse {
        self.handle_pull_with(request, base_url, now, &mut rand::rng())
    }

    /// Handle `GET /eink_pull` with the given RNG.
    pub fn handle_pull_with<R: Rng + ?Sized>(
        &self,
        request: &PullRequest,
        base_url: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> PullResponse {
        tracing::debug!(
            "eink_pull request: device_id={:?} pull_id={:?} cron_time={:?} battery={:?}",
            request.device_id,
            request.pull_id,
            request.cron_time,
            request.battery
        );

        let battery = request.battery_level();
        let enabled = self.update_state(|state| {
            state.battery = battery;
            state.is_enabled()
        });

        let next_cron_time = format_utc_z(self.schedule.next_wake_utc(now));

        if !enabled {
            tracing::info!("Image serving disabled, next wake {}", next_cron_time);
            return PullResponse::no_image(next_cron_time);
        }

        let pool = match ImagePool::scan(&self.config.image_dir, ALLOWED_EXTENSIONS) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(
                    "Failed to list images in {}: {}",
                    self.config.image_dir.display(),
                    e
                );
                return PullResponse::error(500, "Failed to list images");
            }
        };
        if pool.is_empty() {
            tracing::info!("No images in {}", self.config.image_dir.display());
            return PullResponse::no_image(next_cron_time);
        }

        let selection = match self.selector.select_with(&pool, rng) {
            Ok(selection) => selection,
            Err(e) => {
                tracing::warn!("Image selection failed: {}", e);
                return PullResponse::no_image(next_cron_time);
            }
        };

        let published = match self.publisher.publish(&self.config.image_dir, &selection.chosen) {
            Ok(name) => name,
            Err(e) => {
                tracing::error!("Failed to publish image {}: {}", selection.chosen, e);
                return PullResponse::error(500, "Failed to publish image");
            }
        };

        let image_url = self.publisher.image_url(base_url, &published);
        self.update_state(|state| state.last_image_url = Some(image_url.clone()));

        tracing::info!(
            "Serving {} to {:?}, next wake {}",
            image_url,
            request.device_id,
            next_cron_time
        );
        PullResponse::show(next_cron_time, image_url)
    }

    /// Handle `GET /eink_signal`.
    pub fn handle_signal(&self, request: &SignalRequest, now: DateTime<Utc>) -> SignalResponse {
        tracing::debug!(
            "eink_signal request: pull_id={:?} success={:?}",
            request.pull_id,
            request.success
        );

        let success = request.succeeded();
        let last_seen = format_utc_z(now);
        self.update_state(|state| {
            state.success = success;
            state.last_seen = Some(last_seen);
        });
        SignalResponse::recorded()
    }

    fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f`, persist the result and notify observers.
    ///
    /// Updates are saved and published in the order they were applied.
    /// Persistence failures are logged and otherwise ignored.
    fn update_state<T>(&self, f: impl FnOnce(&mut DeviceState) -> T) -> T {
        let _persist = self
            .persist
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let (result, snapshot) = {
            let mut state = self.lock_state();
            let result = f(&mut state);
            (result, state.clone())
        };

        if let Err(e) = snapshot.save(&self.config.state_file) {
            tracing::warn!("Failed to persist device state: {}", e);
        }

        for observer in &self.observers {
            observer(&snapshot);
        }
        result
    }
}
