use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::time::duration_ms;

pub const SCORE_THRESHOLD: f64 = 2.0;
pub const AQI_THRESHOLD: f64 = 15.0;
pub const POLLEN_THRESHOLD: f64 = 2.0;
pub const TEMPERATURE_THRESHOLD: f64 = 5.0;
pub const HUMIDITY_THRESHOLD: f64 = 10.0;
pub const ADVISOR_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Absolute deltas at or above which a field counts as changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionThresholds {
    /// Risk signals: crossing any of these regenerates the advisory.
    pub score: f64,
    pub aqi: f64,
    pub pollen_index: f64,

    /// Comfort signals: at most a moderate change.
    pub temperature: f64,
    pub humidity: f64,

    /// Advisory older than this is regenerated even without any change.
    #[serde(rename = "advisorMaxAgeMs", with = "duration_ms")]
    pub advisor_max_age: Duration,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            score: SCORE_THRESHOLD,
            aqi: AQI_THRESHOLD,
            pollen_index: POLLEN_THRESHOLD,
            temperature: TEMPERATURE_THRESHOLD,
            humidity: HUMIDITY_THRESHOLD,
            advisor_max_age: ADVISOR_MAX_AGE,
        }
    }
}
