//! Probe configuration file handling.
//!
//! The probe reads an optional TOML file combining the client's connection
//! parameters with the workload to generate against the server.

use anyhow::{Context, Result};
use beacon_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration for a probe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Connection parameters handed to the client core.
    pub client: ClientConfig,
    /// Workload shape.
    pub workload: WorkloadSettings,
}

/// Traffic the probe generates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSettings {
    /// Milliseconds between correlated calls.
    pub request_interval_ms: u64,
    /// Caller-side deadline applied to each call, in milliseconds.
    pub request_deadline_ms: u64,
    /// Total run duration in seconds.
    pub duration_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            workload: WorkloadSettings {
                request_interval_ms: 1000,
                request_deadline_ms: 2000,
                duration_secs: 30,
            },
        }
    }
}

impl ProbeConfig {
    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}
