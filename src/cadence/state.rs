use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CADENCE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshCadenceState {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_refresh_timestamp: Option<DateTime<Utc>>,
    /// Ephemeral; never written to storage.
    #[serde(skip)]
    pub is_refreshing: bool,
    #[serde(skip)]
    pub refresh_error: Option<String>,
}

/// On-disk shape of the cadence state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedCadence {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_refresh_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u32,
}

impl From<&RefreshCadenceState> for PersistedCadence {
    fn from(state: &RefreshCadenceState) -> Self {
        Self {
            last_refresh_timestamp: state.last_refresh_timestamp,
            version: CADENCE_SCHEMA_VERSION,
        }
    }
}
