//! Kernel configuration
//!
//! Values are layered: built-in defaults, then an optional file, then
//! `AGORA__SECTION__KEY` environment variables.

use agora_capacity::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::SignalPolicy;

/// Main kernel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Capacity worker pool
    #[serde(default)]
    pub executor: ExecutorSettings,

    /// Defaults applied to new groups
    #[serde(default)]
    pub groups: GroupSettings,

    /// Player signal handling
    #[serde(default)]
    pub signals: SignalSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Capacity worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Maximum concurrently running capacity tasks
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Idle worker reclamation delay in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl ExecutorSettings {
    pub fn to_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_workers: self.max_workers,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}

/// Group defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Forward to the distant context handler when one is installed
    #[serde(default)]
    pub distributed: bool,

    /// Keep empty groups until idle eviction
    #[serde(default)]
    pub persistent: bool,

    /// Persistent empty groups older than this are evicted
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,

    /// Messages become visible to roles only at the start of their cycle
    #[serde(default)]
    pub buffered_mailboxes: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            distributed: false,
            persistent: false,
            idle_eviction_secs: default_idle_eviction(),
            buffered_mailboxes: false,
        }
    }
}

impl GroupSettings {
    pub fn idle_eviction_delay(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }
}

/// Signal configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSettings {
    /// Policy of newly spawned players
    #[serde(default)]
    pub policy: SignalPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_max_workers() -> usize {
    50
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_idle_eviction() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl KernelConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&KernelConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("AGORA")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration for tests: small pool, persistent groups evicted fast
    pub fn testing() -> Self {
        Self {
            executor: ExecutorSettings {
                max_workers: 4,
                idle_timeout_secs: 5,
            },
            groups: GroupSettings {
                idle_eviction_secs: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.executor.max_workers, 50);
        assert_eq!(config.executor.idle_timeout_secs, 60);
        assert!(!config.groups.distributed);
        assert!(!config.groups.persistent);
        assert_eq!(config.signals.policy, SignalPolicy::FireImmediately);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_executor_conversion() {
        let executor = ExecutorSettings::default().to_executor_config();
        assert_eq!(executor, ExecutorConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agora.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[executor]\nmax_workers = 8\n\n\
             [groups]\npersistent = true\n\n\
             [signals]\npolicy = \"store_in_queue\""
        )
        .unwrap();

        let config = KernelConfig::load(path.to_str()).unwrap();
        assert_eq!(config.executor.max_workers, 8);
        assert_eq!(config.executor.idle_timeout_secs, 60);
        assert!(config.groups.persistent);
        assert_eq!(config.signals.policy, SignalPolicy::StoreInQueue);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = KernelConfig::load(Some("/nonexistent/agora")).unwrap();
        assert_eq!(config.groups.idle_eviction_secs, 300);
    }
}
