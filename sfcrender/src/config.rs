//! # Configuration
//!
//! Renderer settings, loaded from JSON. Every field has a default, so an empty object is a valid
//! configuration.

use crate::pathid::{IdSpace, MAX_PRIMARY_ID};
use crate::scheduler::SchedulerKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enabled scheduler type. Missing or unknown values select the random scheduler.
    pub scheduler: Option<String>,
    /// Maximal wait for the path-id and round-robin locks.
    pub lock_wait_ms: u64,
    pub path_id_min: u32,
    pub path_id_max: u32,
    /// Upper bound of the random cursor step of the path-id allocator.
    pub path_id_step_bound: u32,
    /// Worker threads of the render service. Defaults to the number of CPUs.
    pub workers: Option<usize>,
    /// Utilization (percent) above which every candidate counts as under pressure.
    pub pressure_threshold: f64,
    /// Maximal number of placements enumerated by the two-level scheduler.
    pub max_combinations: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let space = IdSpace::default();
        Self {
            scheduler: None,
            lock_wait_ms: 2000,
            path_id_min: space.min,
            path_id_max: space.max,
            path_id_step_bound: 16,
            workers: None,
            pressure_threshold: 80.0,
            max_combinations: 100_000,
        }
    }
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path_id_min > self.path_id_max {
            return Err(ConfigError::Invalid(format!(
                "path id range [{}, {}] is empty",
                self.path_id_min, self.path_id_max
            )));
        }
        if self.path_id_max > MAX_PRIMARY_ID {
            return Err(ConfigError::Invalid(format!(
                "path id {} leaves no room for symmetric ids, the maximum is {}",
                self.path_id_max, MAX_PRIMARY_ID
            )));
        }
        if self.path_id_step_bound == 0 {
            return Err(ConfigError::Invalid("path id step bound must be positive".to_string()));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("at least one worker is required".to_string()));
        }
        Ok(())
    }

    pub fn with_scheduler(mut self, kind: SchedulerKind) -> Self {
        self.scheduler = Some(kind.to_string());
        self
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        SchedulerKind::from_config(self.scheduler.as_deref())
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn id_space(&self) -> IdSpace {
        IdSpace::new(self.path_id_min, self.path_id_max)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = RendererConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.scheduler_kind(), SchedulerKind::Random);
        assert_eq!(config.lock_wait(), Duration::from_secs(2));
        assert_eq!(config.id_space(), IdSpace::new(1, 4095));
    }

    #[test]
    fn test_scheduler_selection() {
        let config = RendererConfig::from_json_str(r#"{"scheduler": "shortest-path"}"#).unwrap();
        assert_eq!(config.scheduler_kind(), SchedulerKind::ShortestPath);
        let config = RendererConfig::from_json_str(r#"{"scheduler": "telepathy"}"#).unwrap();
        assert_eq!(config.scheduler_kind(), SchedulerKind::Random);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            RendererConfig::from_json_str(r#"{"path_id_min": 10, "path_id_max": 2}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_json_str(r#"{"path_id_step_bound": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(RendererConfig::from_json_str("[1, 2"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_path_id_range_leaves_room_for_symmetric_ids() {
        assert!(matches!(
            RendererConfig::from_json_str(r#"{"path_id_max": 4294967295}"#),
            Err(ConfigError::Invalid(_))
        ));
        let json = format!(r#"{{"path_id_max": {}, "path_id_step_bound": 4294967295}}"#, MAX_PRIMARY_ID);
        let config = RendererConfig::from_json_str(&json).unwrap();
        assert_eq!(config.id_space().reverse_of(MAX_PRIMARY_ID), u32::MAX);
    }
}
