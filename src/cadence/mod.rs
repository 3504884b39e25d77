//! Gate for routine (foreground/timer) refreshes.
//!
//! A refresh is due once `refresh_threshold` has passed since the last one.
//! Anything inside `debounce_threshold` is rejected outright so a burst of
//! triggers from one gesture collapses into a single refresh.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub mod state;

pub use state::RefreshCadenceState;

use state::{PersistedCadence, CADENCE_SCHEMA_VERSION};

use crate::{
    storage::{write_json, KeyValueStore, CADENCE_KEY},
    utils::time::{duration_ms, elapsed_between},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(15 * 60);
pub const DEBOUNCE_THRESHOLD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CadenceConfig {
    #[serde(rename = "refreshThresholdMs", with = "duration_ms")]
    pub refresh_threshold: Duration,
    #[serde(rename = "debounceThresholdMs", with = "duration_ms")]
    pub debounce_threshold: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: REFRESH_THRESHOLD,
            debounce_threshold: DEBOUNCE_THRESHOLD,
        }
    }
}

pub struct CadenceTracker {
    storage: Arc<dyn KeyValueStore>,
    config: CadenceConfig,
    state: Mutex<RefreshCadenceState>,
    // Kept outside the mutex so a dropped cycle can clear it synchronously.
    refreshing: AtomicBool,
}

/// Holds the refreshing flag for one cycle; dropping it clears the flag even
/// when the cycle future is abandoned mid-flight.
pub struct RefreshingGuard<'a> {
    tracker: &'a CadenceTracker,
}

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.set_refreshing(false);
    }
}

impl CadenceTracker {
    pub async fn load(storage: Arc<dyn KeyValueStore>, config: CadenceConfig) -> Result<Self> {
        let raw = storage
            .get(CADENCE_KEY)
            .await
            .context("failed to read refresh cadence state")?;
        // Undecodable state reads as never refreshed; backend errors propagate.
        let persisted = match raw.map(serde_json::from_value::<PersistedCadence>) {
            Some(Ok(persisted)) => Some(persisted),
            Some(Err(err)) => {
                log_warn!("ignoring unreadable refresh cadence state: {err}");
                None
            }
            None => None,
        };

        let last_refresh_timestamp = persisted
            .filter(|p| p.version <= CADENCE_SCHEMA_VERSION)
            .and_then(|p| p.last_refresh_timestamp);

        Ok(Self {
            storage,
            config,
            state: Mutex::new(RefreshCadenceState {
                last_refresh_timestamp,
                ..Default::default()
            }),
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    pub async fn state(&self) -> RefreshCadenceState {
        let mut state = self.state.lock().await.clone();
        state.is_refreshing = self.is_refreshing();
        state
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    pub async fn should_refresh(&self) -> bool {
        self.should_refresh_at(Utc::now()).await
    }

    pub async fn should_refresh_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_refreshing() {
            return false;
        }

        let state = self.state.lock().await;

        let Some(last) = state.last_refresh_timestamp else {
            return true;
        };

        let Some(elapsed) = elapsed_between(last, now) else {
            // Stored timestamp is ahead of the clock; treat like a fresh refresh.
            return false;
        };

        if elapsed < self.config.debounce_threshold {
            log_debug!("refresh debounced, {}ms since last", elapsed.as_millis());
            return false;
        }

        elapsed >= self.config.refresh_threshold
    }

    pub async fn time_since_last_refresh(&self) -> Option<Duration> {
        self.time_since_last_refresh_at(Utc::now()).await
    }

    pub async fn time_since_last_refresh_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.state.lock().await;
        state
            .last_refresh_timestamp
            .map(|last| elapsed_between(last, now).unwrap_or(Duration::ZERO))
    }

    pub async fn set_last_refresh(&self) -> Result<()> {
        self.set_last_refresh_at(Utc::now()).await
    }

    pub async fn set_last_refresh_at(&self, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.last_refresh_timestamp = Some(now);
        next.refresh_error = None;

        write_json(
            self.storage.as_ref(),
            CADENCE_KEY,
            &PersistedCadence::from(&next),
        )
        .await?;
        *state = next;
        Ok(())
    }

    pub fn set_refreshing(&self, refreshing: bool) {
        self.refreshing.store(refreshing, Ordering::SeqCst);
    }

    /// Set the refreshing flag until the returned guard is dropped.
    pub fn begin_refresh(&self) -> RefreshingGuard<'_> {
        self.set_refreshing(true);
        RefreshingGuard { tracker: self }
    }

    /// Record (or clear) the last failure. Always ends the refreshing flag.
    pub async fn set_refresh_error(&self, error: Option<String>) {
        self.state.lock().await.refresh_error = error;
        self.set_refreshing(false);
    }

    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.storage.remove(CADENCE_KEY).await?;
        *state = RefreshCadenceState::default();
        self.set_refreshing(false);
        Ok(())
    }
}
