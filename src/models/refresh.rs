use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ChangeDetectionResult;

/// What triggered a refresh cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RefreshReason {
    AppForeground,
    UserPull,
    Timer,
    Manual,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshReason::AppForeground => "appForeground",
            RefreshReason::UserPull => "userPull",
            RefreshReason::Timer => "timer",
            RefreshReason::Manual => "manual",
        }
    }

    /// Explicit user intent; always forces the advisory.
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, RefreshReason::UserPull)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedFeeds {
    pub health: bool,
    pub score: bool,
    pub advisor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub refresh_id: Uuid,
    pub success: bool,
    pub reason: RefreshReason,
    pub timestamp: DateTime<Utc>,
    pub refreshed: RefreshedFeeds,
    pub change_detection: Option<ChangeDetectionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the result was handed over from another in-flight cycle.
    #[serde(default)]
    pub coalesced: bool,
}

impl RefreshResult {
    pub fn begin(reason: RefreshReason, timestamp: DateTime<Utc>) -> Self {
        Self {
            refresh_id: Uuid::new_v4(),
            success: false,
            reason,
            timestamp,
            refreshed: RefreshedFeeds::default(),
            change_detection: None,
            error: None,
            coalesced: false,
        }
    }
}
