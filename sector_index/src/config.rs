use crate::{SectorIndexError, SectorIndexResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Expected cadence of backend health reports.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Backends silent for longer than this are not used for new allocations.
pub const SKIPPED_HEARTBEAT_THRESH: Duration = Duration::from_secs(10 * 5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorIndexConfig {
    pub heartbeat_interval_secs: u64,
    pub skipped_heartbeats: u32,
}

impl Default for SectorIndexConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: HEARTBEAT_INTERVAL.as_secs(),
            skipped_heartbeats: 5,
        }
    }
}

impl SectorIndexConfig {
    pub fn from_json(json_str: &str) -> SectorIndexResult<Self> {
        let config: SectorIndexConfig = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SectorIndexResult<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(SectorIndexError::InvalidParam(
                "heartbeat_interval_secs must be positive".to_string(),
            ));
        }
        if self.skipped_heartbeats == 0 {
            return Err(SectorIndexError::InvalidParam(
                "skipped_heartbeats must be positive".to_string(),
            ));
        }
        if self
            .heartbeat_interval()
            .checked_mul(self.skipped_heartbeats)
            .is_none()
        {
            return Err(SectorIndexError::InvalidParam(format!(
                "heartbeat threshold overflows: {}s x {}",
                self.heartbeat_interval_secs, self.skipped_heartbeats
            )));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn skipped_heartbeat_thresh(&self) -> Duration {
        self.heartbeat_interval()
            .checked_mul(self.skipped_heartbeats)
            .unwrap_or(Duration::MAX)
    }
}
