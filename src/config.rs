//! Engine Configuration
//!
//! Every tunable of the engine lives in [`EngineConfig`]. Defaults reproduce the
//! constants the benchmark harness has always run with; a JSON file can override
//! any subset of them (missing fields fall back to the defaults).

use crate::roster::types::Role;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("partition count must be greater than zero")]
    NoPartitions,
    #[error("shard count must be between 1 and the partition count ({partitions}), got {shards}")]
    InvalidShardCount { partitions: u32, shards: u32 },
    #[error("partition count {partitions} is not divisible by shard count {shards}")]
    UnevenShards { partitions: u32, shards: u32 },
    #[error("max_concurrency must be greater than zero")]
    NoConcurrency,
    #[error("circuit_breaker_threshold must be greater than zero")]
    NoBreakerThreshold,
    #[error("role window for {role:?} has min {min} greater than max {max}")]
    InvertedWindow { role: Role, min: usize, max: usize },
    #[error("budget ceiling must be positive, got {0}")]
    NonPositiveBudget(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    pub partitions: u32,
    pub shards: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            partitions: 30,
            shards: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Operations allowed in flight at once.
    pub max_concurrency: usize,
    /// Operations allowed to wait for a free slot.
    pub queue_limit: usize,
    /// Errors since the last reset that trip the breaker.
    pub circuit_breaker_threshold: u64,
    /// Cool-down after the last error before an open breaker admits work again.
    pub reset_timeout_ms: u64,
}

impl ControllerConfig {
    /// Preset for saturation runs: wider pipe, larger error budget, faster reset.
    pub fn high_load() -> Self {
        Self {
            max_concurrency: 25,
            queue_limit: 5000,
            circuit_breaker_threshold: 100,
            reset_timeout_ms: 15_000,
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 15,
            queue_limit: 2000,
            circuit_breaker_threshold: 50,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Closed cardinality window for one role in the main slots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RoleWindow {
    pub role: Role,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RosterRules {
    pub main_size: usize,
    pub reserve_limit: usize,
    pub budget_ceiling: f64,
    /// Price charged for entities missing from the catalog.
    pub default_price: f64,
    pub transfers_allowed: u32,
    pub formation_cache_size: usize,
    pub windows: Vec<RoleWindow>,
}

impl RosterRules {
    pub fn window(&self, role: Role) -> Option<&RoleWindow> {
        self.windows.iter().find(|window| window.role == role)
    }
}

impl Default for RosterRules {
    fn default() -> Self {
        Self {
            main_size: 11,
            reserve_limit: 4,
            budget_ceiling: 100.0,
            default_price: 5.0,
            transfers_allowed: 5,
            formation_cache_size: 1000,
            windows: vec![
                RoleWindow {
                    role: Role::Defender,
                    min: 3,
                    max: 5,
                },
                RoleWindow {
                    role: Role::Midfielder,
                    min: 3,
                    max: 5,
                },
                RoleWindow {
                    role: Role::Forward,
                    min: 1,
                    max: 3,
                },
                RoleWindow {
                    role: Role::Striker,
                    min: 1,
                    max: 3,
                },
                RoleWindow {
                    role: Role::Goalkeeper,
                    min: 1,
                    max: 1,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub router: RouterConfig,
    pub controller: ControllerConfig,
    pub rules: RosterRules,
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::info!("Loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let RouterConfig { partitions, shards } = self.router;
        if partitions == 0 {
            return Err(ConfigError::NoPartitions);
        }
        if shards == 0 || shards > partitions {
            return Err(ConfigError::InvalidShardCount { partitions, shards });
        }
        if partitions % shards != 0 {
            return Err(ConfigError::UnevenShards { partitions, shards });
        }
        if self.controller.max_concurrency == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        if self.controller.circuit_breaker_threshold == 0 {
            return Err(ConfigError::NoBreakerThreshold);
        }
        for window in &self.rules.windows {
            if window.min > window.max {
                return Err(ConfigError::InvertedWindow {
                    role: window.role,
                    min: window.min,
                    max: window.max,
                });
            }
        }
        if self.rules.budget_ceiling <= 0.0 {
            return Err(ConfigError::NonPositiveBudget(self.rules.budget_ceiling));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_uneven_shards_rejected() {
        let mut config = EngineConfig::default();
        config.router.partitions = 31;

        assert_eq!(
            config.validate(),
            Err(ConfigError::UnevenShards {
                partitions: 31,
                shards: 3
            })
        );
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = EngineConfig::default();
        config.rules.windows[0].min = 6;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedWindow {
                role: Role::Defender,
                ..
            })
        ));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{ "controller": { "max_concurrency": 4 }, "router": { "shards": 5 } }"#;

        let config: EngineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.controller.max_concurrency, 4);
        assert_eq!(config.controller.queue_limit, 2000);
        assert_eq!(config.router.partitions, 30);
        assert_eq!(config.router.shards, 5);
        assert_eq!(config.rules, RosterRules::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("roster_engine_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "rules": { "budget_ceiling": 120.0 } }"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.rules.budget_ceiling, 120.0);
        assert_eq!(config.rules.main_size, 11);
    }

    #[test]
    fn test_high_load_preset() {
        let preset = ControllerConfig::high_load();

        assert_eq!(preset.max_concurrency, 25);
        assert_eq!(preset.reset_timeout(), Duration::from_secs(15));
    }
}
