use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magnitude of change between two readings, ordered from least to most.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    None,
    Minor,
    Moderate,
    Significant,
}

impl Default for ChangeType {
    fn default() -> Self {
        ChangeType::None
    }
}

impl ChangeType {
    /// Raise to `floor` if currently below it; never lowers.
    pub fn at_least(self, floor: ChangeType) -> ChangeType {
        self.max(floor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::None => "none",
            ChangeType::Minor => "minor",
            ChangeType::Moderate => "moderate",
            ChangeType::Significant => "significant",
        }
    }
}

/// Short code naming the primary trigger of a detection verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    InitialLoad,
    UserRequested,
    ScoreChanged,
    AqiChanged,
    PollenChanged,
    DominantDriverChanged,
    AllergenChanged,
    TimeThreshold,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::InitialLoad => "initial_load",
            ChangeReason::UserRequested => "user_requested",
            ChangeReason::ScoreChanged => "score_changed",
            ChangeReason::AqiChanged => "aqi_changed",
            ChangeReason::PollenChanged => "pollen_changed",
            ChangeReason::DominantDriverChanged => "dominant_driver_changed",
            ChangeReason::AllergenChanged => "allergen_changed",
            ChangeReason::TimeThreshold => "time_threshold",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangedField {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

/// Signed `current - previous` deltas, diagnostics only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDeltas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pollen_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

impl FieldDeltas {
    pub fn is_empty(&self) -> bool {
        self.values().all(|value| value.is_none())
    }

    /// True when any recorded delta is nonzero.
    pub fn any_nonzero(&self) -> bool {
        self.values().flatten().any(|value| value != 0.0)
    }

    fn values(&self) -> impl Iterator<Item = Option<f64>> {
        [
            self.score,
            self.aqi,
            self.pollen_index,
            self.temperature,
            self.humidity,
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetectionResult {
    pub has_change: bool,
    pub change_type: ChangeType,
    pub changed_fields: Vec<ChangedField>,
    pub should_refresh_advisor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<ChangeReason>,
    pub deltas: FieldDeltas,
}
