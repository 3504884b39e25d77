//! Ordered field rules. Table order is reason precedence: the first matching
//! rule that carries a reason names the change.

use serde_json::{json, Value};

use crate::models::{ChangeReason, ChangeType, ChangedField, CurrentEnvironmentData, EnvironmentSnapshot};

use super::DetectionThresholds;

/// Receives the owning rule's `field` so the changed-field name has one source.
type Compare = fn(
    &'static str,
    &CurrentEnvironmentData,
    &EnvironmentSnapshot,
    &DetectionThresholds,
) -> Option<ChangedField>;

pub struct FieldRule {
    /// camelCase name reported in `changedFields`.
    pub field: &'static str,
    pub tier: ChangeType,
    /// `None` for comfort-only rules, which never name the change.
    pub reason: Option<ChangeReason>,
    pub refreshes_advisor: bool,
    pub compare: Compare,
}

pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: "score",
        tier: ChangeType::Significant,
        reason: Some(ChangeReason::ScoreChanged),
        refreshes_advisor: true,
        compare: |f, c, p, t| numeric(f, c.score, p.score, t.score),
    },
    FieldRule {
        field: "aqi",
        tier: ChangeType::Significant,
        reason: Some(ChangeReason::AqiChanged),
        refreshes_advisor: true,
        compare: |f, c, p, t| numeric(f, c.aqi, p.aqi, t.aqi),
    },
    FieldRule {
        field: "pollenIndex",
        tier: ChangeType::Significant,
        reason: Some(ChangeReason::PollenChanged),
        refreshes_advisor: true,
        compare: |f, c, p, t| numeric(f, c.pollen_index, p.pollen_index, t.pollen_index),
    },
    FieldRule {
        field: "dominantDriver",
        tier: ChangeType::Significant,
        reason: Some(ChangeReason::DominantDriverChanged),
        refreshes_advisor: true,
        compare: |f, c, p, _| {
            categorical(
                f,
                json!(p.dominant_driver.as_str()),
                json!(c.dominant_driver.as_str()),
            )
        },
    },
    FieldRule {
        field: "dominantAllergen",
        tier: ChangeType::Significant,
        reason: Some(ChangeReason::AllergenChanged),
        refreshes_advisor: true,
        compare: |f, c, p, _| categorical(f, json!(p.dominant_allergen), json!(c.dominant_allergen)),
    },
    FieldRule {
        field: "temperature",
        tier: ChangeType::Moderate,
        reason: None,
        refreshes_advisor: false,
        compare: |f, c, p, t| numeric(f, c.temperature, p.temperature, t.temperature),
    },
    FieldRule {
        field: "humidity",
        tier: ChangeType::Moderate,
        reason: None,
        refreshes_advisor: false,
        compare: |f, c, p, t| numeric(f, c.humidity, p.humidity, t.humidity),
    },
];

fn numeric(field: &str, current: f64, previous: f64, threshold: f64) -> Option<ChangedField> {
    let delta = current - previous;
    (delta.abs() >= threshold).then(|| ChangedField {
        field: field.to_string(),
        old_value: json!(previous),
        new_value: json!(current),
        delta: Some(delta),
    })
}

fn categorical(field: &str, previous: Value, current: Value) -> Option<ChangedField> {
    (previous != current).then(|| ChangedField {
        field: field.to_string(),
        old_value: previous,
        new_value: current,
        delta: None,
    })
}

impl FieldRule {
    pub fn evaluate(
        &self,
        current: &CurrentEnvironmentData,
        previous: &EnvironmentSnapshot,
        thresholds: &DetectionThresholds,
    ) -> Option<ChangedField> {
        (self.compare)(self.field, current, previous, thresholds)
    }
}
