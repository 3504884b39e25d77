//! Decides whether a new reading differs enough from the stored one to
//! justify regenerating the advisory.
//!
//! Everything here is pure: the verdict depends only on the two readings, the
//! last advisory refresh time, the user-requested flag and the supplied `now`.

use chrono::{DateTime, Utc};
use serde_json::json;

pub mod rules;
pub mod thresholds;

pub use thresholds::DetectionThresholds;

use rules::FIELD_RULES;

use crate::{
    models::{
        ChangeDetectionResult, ChangeReason, ChangeType, ChangedField, CurrentEnvironmentData,
        EnvironmentSnapshot, FieldDeltas,
    },
    utils::time::elapsed_between,
};

#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    thresholds: DetectionThresholds,
}

impl ChangeDetector {
    pub fn new(thresholds: DetectionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    pub fn detect(
        &self,
        current: &CurrentEnvironmentData,
        previous: Option<&EnvironmentSnapshot>,
        last_advisor_refresh: Option<DateTime<Utc>>,
        user_requested: bool,
        now: DateTime<Utc>,
    ) -> ChangeDetectionResult {
        let Some(previous) = previous else {
            return forced(ChangeReason::InitialLoad);
        };

        if user_requested {
            return forced(ChangeReason::UserRequested);
        }

        let mut result = ChangeDetectionResult {
            deltas: raw_deltas(current, previous),
            ..Default::default()
        };

        for rule in FIELD_RULES {
            let Some(changed) = rule.evaluate(current, previous, &self.thresholds) else {
                continue;
            };
            result.changed_fields.push(changed);
            result.change_type = result.change_type.at_least(rule.tier);
            if rule.refreshes_advisor {
                result.should_refresh_advisor = true;
            }
            if result.change_reason.is_none() {
                result.change_reason = rule.reason;
            }
        }

        if !result.should_refresh_advisor && self.advisor_is_stale(last_advisor_refresh, now) {
            result.should_refresh_advisor = true;
            result.change_reason = Some(ChangeReason::TimeThreshold);
        }

        if result.changed_fields.is_empty() && result.deltas.any_nonzero() {
            result.change_type = ChangeType::Minor;
        }

        result.has_change =
            !result.changed_fields.is_empty() || result.change_type != ChangeType::None;
        result
    }

    fn advisor_is_stale(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last.and_then(|at| elapsed_between(at, now))
            .map_or(false, |age| age > self.thresholds.advisor_max_age)
    }
}

/// [`ChangeDetector::detect`] with default thresholds against the wall clock.
pub fn detect_changes(
    current: &CurrentEnvironmentData,
    previous: Option<&EnvironmentSnapshot>,
    last_advisor_refresh: Option<DateTime<Utc>>,
    user_requested: bool,
) -> ChangeDetectionResult {
    ChangeDetector::default().detect(
        current,
        previous,
        last_advisor_refresh,
        user_requested,
        Utc::now(),
    )
}

/// Short-circuit verdict; the single synthetic field is named after the reason.
fn forced(reason: ChangeReason) -> ChangeDetectionResult {
    ChangeDetectionResult {
        has_change: true,
        change_type: ChangeType::Significant,
        changed_fields: vec![ChangedField {
            field: reason.as_str().to_string(),
            old_value: json!(null),
            new_value: json!(reason.as_str()),
            delta: None,
        }],
        should_refresh_advisor: true,
        change_reason: Some(reason),
        deltas: FieldDeltas::default(),
    }
}

fn raw_deltas(current: &CurrentEnvironmentData, previous: &EnvironmentSnapshot) -> FieldDeltas {
    FieldDeltas {
        score: Some(current.score - previous.score),
        aqi: Some(current.aqi - previous.aqi),
        pollen_index: Some(current.pollen_index - previous.pollen_index),
        temperature: Some(current.temperature - previous.temperature),
        humidity: Some(current.humidity - previous.humidity),
    }
}
