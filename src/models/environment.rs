use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCORE: f64 = 0.0;
pub const DEFAULT_AQI: f64 = 0.0;
pub const DEFAULT_POLLEN_INDEX: f64 = 0.0;
pub const DEFAULT_TEMPERATURE: f64 = 20.0;
pub const DEFAULT_HUMIDITY: f64 = 50.0;

/// The factor that contributes most to the current health score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DominantDriver {
    Pollution,
    Pollen,
    Weather,
    Mixed,
}

impl Default for DominantDriver {
    fn default() -> Self {
        DominantDriver::Mixed
    }
}

impl DominantDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            DominantDriver::Pollution => "pollution",
            DominantDriver::Pollen => "pollen",
            DominantDriver::Weather => "weather",
            DominantDriver::Mixed => "mixed",
        }
    }
}

/// Live values computed by the caller after the cheap feeds refreshed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentEnvironmentData {
    pub score: f64,
    pub aqi: f64,
    pub pollen_index: f64,
    pub dominant_allergen: Option<String>,
    #[serde(default)]
    pub dominant_driver: DominantDriver,
    pub temperature: f64,
    pub humidity: f64,
}

/// Last successfully captured reading; the baseline for change detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub aqi: f64,
    #[serde(default)]
    pub pollen_index: f64,
    #[serde(default)]
    pub dominant_allergen: Option<String>,
    #[serde(default)]
    pub dominant_driver: DominantDriver,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_humidity")]
    pub humidity: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_humidity() -> f64 {
    DEFAULT_HUMIDITY
}

/// Partial update for [`EnvironmentSnapshot`]; `None` keeps the stored value.
///
/// `dominant_allergen` is doubly optional: `Some(None)` clears the allergen,
/// `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentUpdate {
    pub score: Option<f64>,
    pub aqi: Option<f64>,
    pub pollen_index: Option<f64>,
    pub dominant_allergen: Option<Option<String>>,
    pub dominant_driver: Option<DominantDriver>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl EnvironmentUpdate {
    /// Merge onto `base` (or the hard defaults when there is no prior snapshot).
    pub fn apply(
        &self,
        base: Option<&EnvironmentSnapshot>,
        timestamp: DateTime<Utc>,
    ) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            score: self
                .score
                .or(base.map(|b| b.score))
                .unwrap_or(DEFAULT_SCORE),
            aqi: self.aqi.or(base.map(|b| b.aqi)).unwrap_or(DEFAULT_AQI),
            pollen_index: self
                .pollen_index
                .or(base.map(|b| b.pollen_index))
                .unwrap_or(DEFAULT_POLLEN_INDEX),
            dominant_allergen: match &self.dominant_allergen {
                Some(value) => value.clone(),
                None => base.and_then(|b| b.dominant_allergen.clone()),
            },
            dominant_driver: self
                .dominant_driver
                .or(base.map(|b| b.dominant_driver))
                .unwrap_or_default(),
            temperature: self
                .temperature
                .or(base.map(|b| b.temperature))
                .unwrap_or(DEFAULT_TEMPERATURE),
            humidity: self
                .humidity
                .or(base.map(|b| b.humidity))
                .unwrap_or(DEFAULT_HUMIDITY),
            timestamp,
        }
    }
}

impl From<&CurrentEnvironmentData> for EnvironmentUpdate {
    fn from(current: &CurrentEnvironmentData) -> Self {
        Self {
            score: Some(current.score),
            aqi: Some(current.aqi),
            pollen_index: Some(current.pollen_index),
            dominant_allergen: Some(current.dominant_allergen.clone()),
            dominant_driver: Some(current.dominant_driver),
            temperature: Some(current.temperature),
            humidity: Some(current.humidity),
        }
    }
}
