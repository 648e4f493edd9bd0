use crate::common::types::MissionSpec;
use crate::mission::topology;
use crate::utils::duration_ms;
use crate::utils::error::{Result, WakeError};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Timing knobs for the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay before a step without its own `timeout`.
    #[serde(with = "duration_ms")]
    pub default_step_delay: Duration,
    /// Pause between a failed attempt and its retry.
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Sleep for `wait` steps without a `duration` param.
    #[serde(with = "duration_ms")]
    pub default_wait: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            default_step_delay: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(1000),
            default_wait: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub missions: Vec<MissionSpec>,
}

pub struct ConfigManager;

impl ConfigManager {
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PlanConfig> {
        let config_str = fs::read_to_string(path)
            .map_err(|e| WakeError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_config(&config_str)
    }

    pub fn parse_config(config_str: &str) -> Result<PlanConfig> {
        let config: PlanConfig = serde_json::from_str(config_str)
            .map_err(|e| WakeError::Config(format!("Failed to parse config: {}", e)))?;

        Self::validate_config(&config)?;

        Ok(config)
    }

    fn validate_config(config: &PlanConfig) -> Result<()> {
        // Check for unique mission IDs
        let mut mission_ids = HashSet::new();
        for mission in &config.missions {
            if let Some(id) = &mission.id {
                if !mission_ids.insert(id.as_str()) {
                    return Err(WakeError::Config(format!("Duplicate mission ID: {}", id)));
                }
            }
        }

        for mission in &config.missions {
            for issue in topology::analyze(&mission.steps) {
                if issue.is_fatal() {
                    return Err(WakeError::Config(format!(
                        "Mission {}: {}",
                        mission.name, issue
                    )));
                }
                warn!("Mission {}: {}", mission.name, issue);
            }
        }

        Ok(())
    }
}
