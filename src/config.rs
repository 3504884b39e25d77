use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cadence::CadenceConfig, detection::DetectionThresholds, utils::time::duration_ms,
};

pub const SETTLE_DELAY: Duration = Duration::from_millis(100);
pub const SCHEDULER_INTERVAL: Duration = Duration::from_secs(60);

/// Tunable policy values for the whole refresh pipeline.
///
/// Every field has a default, so a config file only needs the keys it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshConfig {
    pub cadence: CadenceConfig,
    pub detection: DetectionThresholds,
    /// Pause between the cheap feeds completing and reading current data.
    #[serde(rename = "settleDelayMs", with = "duration_ms")]
    pub settle_delay: Duration,
    /// How often the background scheduler checks whether a refresh is due.
    #[serde(rename = "schedulerIntervalMs", with = "duration_ms")]
    pub scheduler_interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cadence: CadenceConfig::default(),
            detection: DetectionThresholds::default(),
            settle_delay: SETTLE_DELAY,
            scheduler_interval: SCHEDULER_INTERVAL,
        }
    }
}

impl RefreshConfig {
    /// Read a JSON config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read refresh config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid refresh config in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write refresh config to {}", path.display()))
    }
}
