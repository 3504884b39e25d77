//! Durable single-slot cache of the last environmental reading.
//!
//! The envelope also carries when the advisory feed was last regenerated, so
//! the change detector can apply its staleness backstop across restarts.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    models::{DataSnapshot, EnvironmentUpdate, SNAPSHOT_SCHEMA_VERSION},
    storage::{write_json, KeyValueStore, SNAPSHOT_KEY},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub struct SnapshotStore {
    storage: Arc<dyn KeyValueStore>,
    state: Mutex<Option<DataSnapshot>>,
}

impl SnapshotStore {
    /// Hydrate from storage. Unreadable or future-schema envelopes count as absent.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let state = match storage.get(SNAPSHOT_KEY).await? {
            Some(raw) => decode_envelope(raw),
            None => None,
        };

        Ok(Self {
            storage,
            state: Mutex::new(state),
        })
    }

    pub async fn snapshot(&self) -> Option<DataSnapshot> {
        self.state.lock().await.clone()
    }

    pub async fn capture_snapshot(&self, update: &EnvironmentUpdate) -> Result<DataSnapshot> {
        self.capture_snapshot_at(update, Utc::now()).await
    }

    /// Merge `update` over the stored reading and stamp it with `now`.
    ///
    /// `last_advisor_refresh` is carried over untouched.
    pub async fn capture_snapshot_at(
        &self,
        update: &EnvironmentUpdate,
        now: DateTime<Utc>,
    ) -> Result<DataSnapshot> {
        let mut guard = self.state.lock().await;
        let previous = guard.as_ref();

        let environment = update.apply(previous.map(|s| &s.environment), now);
        let last_advisor_refresh = previous.map(|s| s.last_advisor_refresh).unwrap_or(0);
        let next = DataSnapshot::new(environment, last_advisor_refresh);

        write_json(self.storage.as_ref(), SNAPSHOT_KEY, &next).await?;
        log_debug!(
            "captured snapshot score={} aqi={} pollen={}",
            next.environment.score,
            next.environment.aqi,
            next.environment.pollen_index
        );
        *guard = Some(next.clone());
        Ok(next)
    }

    pub async fn mark_advisor_refreshed(&self) -> Result<()> {
        self.mark_advisor_refreshed_at(Utc::now()).await
    }

    /// No-op until a first snapshot has been captured.
    pub async fn mark_advisor_refreshed_at(&self, now: DateTime<Utc>) -> Result<()> {
        let mut guard = self.state.lock().await;
        let Some(current) = guard.as_ref() else {
            return Ok(());
        };

        let mut next = current.clone();
        next.set_last_advisor_refresh(now);
        write_json(self.storage.as_ref(), SNAPSHOT_KEY, &next).await?;
        *guard = Some(next);
        Ok(())
    }

    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        self.storage.remove(SNAPSHOT_KEY).await?;
        *guard = None;
        Ok(())
    }
}

fn decode_envelope(raw: Value) -> Option<DataSnapshot> {
    let version = raw.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version > u64::from(SNAPSHOT_SCHEMA_VERSION) {
        log_warn!(
            "ignoring stored snapshot with schema version {version} (supported {SNAPSHOT_SCHEMA_VERSION})"
        );
        return None;
    }

    match serde_json::from_value::<DataSnapshot>(raw) {
        Ok(mut snapshot) => {
            // v0 envelopes predate the version field; their fields are a subset of v1.
            snapshot.version = SNAPSHOT_SCHEMA_VERSION;
            Some(snapshot)
        }
        Err(err) => {
            log_warn!("ignoring unreadable stored snapshot: {err}");
            None
        }
    }
}
