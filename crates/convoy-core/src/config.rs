//! convoy.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::partition::{Segment, SegmentError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvoyConfig {
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub agent: AgentConfig,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the redb database file.
    pub path: PathBuf,
    /// Upper bound on any single store call.
    pub timeout_ms: u64,
    /// Items per scan/query page.
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/convoy/convoy.redb"),
            timeout_ms: 5_000,
            page_size: 100,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    /// Services segment owned by this scheduler process.
    pub segment: u32,
    pub total_segments: u32,
    /// Ignore instances whose last heartbeat is older than this. Unset
    /// means every status row counts toward the population.
    pub status_ttl_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            segment: 0,
            total_segments: 1,
            status_ttl_secs: None,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn segment(&self) -> Result<Segment, SegmentError> {
        Segment::new(self.segment, self.total_segments)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub instance_id: Option<String>,
    pub service: Option<String>,
    pub sync_interval_secs: u64,
    pub status_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            service: None,
            sync_interval_secs: 15,
            status_interval_secs: 10,
        }
    }
}

impl AgentConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub max_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { max_secs: 60 }
    }
}

impl BackoffConfig {
    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }
}

impl ConvoyConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConvoyConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
