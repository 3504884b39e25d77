use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::{optional_from_epoch_ms, to_epoch_ms};

use super::EnvironmentSnapshot;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Persisted envelope around the last captured reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    pub environment: EnvironmentSnapshot,
    /// Epoch milliseconds; `0` means the advisory was never refreshed.
    #[serde(default)]
    pub last_advisor_refresh: i64,
    #[serde(default)]
    pub version: u32,
}

impl DataSnapshot {
    pub fn new(environment: EnvironmentSnapshot, last_advisor_refresh: i64) -> Self {
        Self {
            environment,
            last_advisor_refresh,
            version: SNAPSHOT_SCHEMA_VERSION,
        }
    }

    pub fn last_advisor_refresh_at(&self) -> Option<DateTime<Utc>> {
        optional_from_epoch_ms(self.last_advisor_refresh)
    }

    pub fn set_last_advisor_refresh(&mut self, at: DateTime<Utc>) {
        self.last_advisor_refresh = to_epoch_ms(at);
    }
}
