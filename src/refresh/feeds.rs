use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, CurrentEnvironmentData, ResolvedLocation};

/// The three remote feeds the client keeps cached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Raw environmental readings; cheap.
    #[serde(rename = "HEALTH.CURRENT")]
    HealthCurrent,
    /// Personalized score derived from the readings; cheap.
    #[serde(rename = "SCORE.PERSONALIZED")]
    ScorePersonalized,
    /// LLM-generated advisory; expensive.
    #[serde(rename = "ADVISOR.DATA")]
    AdvisorData,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::HealthCurrent => "HEALTH.CURRENT",
            FeedKind::ScorePersonalized => "SCORE.PERSONALIZED",
            FeedKind::AdvisorData => "ADVISOR.DATA",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedKey {
    pub kind: FeedKind,
    pub latitude: f64,
    pub longitude: f64,
}

impl FeedKey {
    pub fn new(kind: FeedKind, coordinates: Coordinates) -> Self {
        Self {
            kind,
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind.as_str(), self.latitude, self.longitude)
    }
}

/// Cache layer in front of the remote services.
#[async_trait]
pub trait FeedClient: Send + Sync + 'static {
    /// Drop the cached entry for `key` and resolve once it has been refetched.
    async fn invalidate_and_refetch(&self, key: &FeedKey) -> Result<()>;
}

/// Device location, already resolved and cached upstream.
pub trait LocationProvider: Send + Sync + 'static {
    /// Never fails; falls back to a default location.
    fn location_or_default(&self) -> ResolvedLocation;
}

/// A location that never moves.
#[derive(Debug, Clone)]
pub struct FixedLocation(pub ResolvedLocation);

impl FixedLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self(ResolvedLocation {
            coordinates: Coordinates::new(latitude, longitude),
            location_name: None,
        })
    }
}

impl LocationProvider for FixedLocation {
    fn location_or_default(&self) -> ResolvedLocation {
        self.0.clone()
    }
}

/// Caller-supplied read of the freshly computed values; `None` when unavailable.
pub type CurrentDataAccessor = Arc<dyn Fn() -> Option<CurrentEnvironmentData> + Send + Sync>;
