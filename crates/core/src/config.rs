// SPDX-License-Identifier: MIT

//! `SupervisorConfig`: the single struct consumed at process start.
//! Loaded from TOML via `serde` + `toml`, validated before the loops
//! start.

use crate::AnomalySeverity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Watchdog tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    #[serde(with = "humantime_secs")]
    pub tick_interval: Duration,
    pub min_confidence: f64,
    pub min_severity: AnomalySeverity,
    /// Bound on the intervention-history ring buffer.
    pub max_history_size: usize,
    /// Emit a `watchdog_alert` event for below-threshold anomalies.
    pub log_below_threshold: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(45),
            min_confidence: 0.75,
            min_severity: AnomalySeverity::Medium,
            max_history_size: 256,
            log_below_threshold: true,
        }
    }
}

/// Deduplication tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    pub confidence_threshold: f64,
    pub lookback_days: u32,
    pub max_candidates: usize,
    pub batch_size: usize,
    pub within_batch: bool,
    pub fail_open: bool,
    pub include_closed: bool,
    pub min_title_length: usize,
    pub max_retries: u32,
    #[serde(with = "humantime_secs")]
    pub timeout: Duration,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            lookback_days: 30,
            max_candidates: 50,
            batch_size: 10,
            within_batch: true,
            fail_open: true,
            include_closed: false,
            min_title_length: 8,
            max_retries: 2,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Event-retention janitor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventRetentionConfig {
    pub enabled: bool,
    pub retention_days: u32,
    pub retention_critical_days: u32,
    pub per_issue_limit_events: usize,
    pub global_limit_events: usize,
    pub cleanup_interval_hours: u32,
    pub batch_size: usize,
    pub cleanup_vacuum: bool,
}

impl Default for EventRetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 30,
            retention_critical_days: 90,
            per_issue_limit_events: 500,
            global_limit_events: 200_000,
            cleanup_interval_hours: 24,
            batch_size: 500,
            cleanup_vacuum: true,
        }
    }
}

/// The full configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(with = "humantime_secs")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_secs")]
    pub cleanup_interval: Duration,
    #[serde(with = "humantime_secs")]
    pub stale_threshold: Duration,
    #[serde(with = "humantime_secs")]
    pub instance_cleanup_age: Duration,
    /// Number of most-recent stopped instances to keep regardless of age.
    /// `0` means "delete all stopped instances older than
    /// `instance_cleanup_age`, keeping none back".
    pub instance_cleanup_keep: u32,

    pub enable_ai_supervision: bool,
    pub enable_quality_gates: bool,
    pub enable_sandboxes: bool,
    pub keep_sandbox_on_failure: bool,
    pub keep_branches: bool,
    pub sandbox_retention_count: u32,
    pub enable_health_monitoring: bool,

    pub working_dir: PathBuf,
    pub sandbox_root: PathBuf,
    pub parent_repo: PathBuf,
    pub default_branch: String,

    #[serde(with = "humantime_secs")]
    pub agent_timeout: Duration,
    pub max_consecutive_failures: u32,
    /// Orphaned-branch sweep threshold on start.
    #[serde(with = "humantime_secs")]
    pub orphan_branch_age: Duration,
    /// Shell commands run in the sandbox after the agent exits, in order,
    /// when `enable_quality_gates` is set. All must exit 0 for the mission
    /// to transition to `committing`. Empty means gates trivially pass.
    pub quality_gate_commands: Vec<String>,

    pub watchdog: WatchdogConfig,
    pub deduplication: DeduplicationConfig,
    pub event_retention: EventRetentionConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(300),
            stale_threshold: Duration::from_secs(300),
            instance_cleanup_age: Duration::from_secs(7 * 24 * 3600),
            instance_cleanup_keep: 5,

            enable_ai_supervision: true,
            enable_quality_gates: true,
            enable_sandboxes: true,
            keep_sandbox_on_failure: false,
            keep_branches: false,
            sandbox_retention_count: 10,
            enable_health_monitoring: true,

            working_dir: PathBuf::from("."),
            sandbox_root: PathBuf::from("./sandboxes"),
            parent_repo: PathBuf::from("."),
            default_branch: "main".to_string(),

            agent_timeout: Duration::from_secs(30 * 60),
            max_consecutive_failures: 3,
            orphan_branch_age: Duration::from_secs(7 * 24 * 3600),
            quality_gate_commands: vec!["cargo test".to_string()],

            watchdog: WatchdogConfig::default(),
            deduplication: DeduplicationConfig::default(),
            event_retention: EventRetentionConfig::default(),
        }
    }
}

/// A configuration validation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll_interval must be greater than zero")]
    ZeroPollInterval,
    #[error("agent_timeout must be greater than zero")]
    ZeroAgentTimeout,
    #[error("watchdog.min_confidence must be within [0.0, 1.0], got {0}")]
    InvalidMinConfidence(String),
    #[error("deduplication.confidence_threshold must be within [0.0, 1.0], got {0}")]
    InvalidDedupThreshold(String),
    #[error("deduplication.batch_size must be greater than zero")]
    ZeroDedupBatchSize,
    #[error("event_retention.retention_critical_days must be >= retention_days")]
    CriticalRetentionBelowRetention,
    #[error("max_consecutive_failures must be greater than zero")]
    ZeroMaxConsecutiveFailures,
    #[error("sandbox_root must be set when enable_sandboxes is true")]
    MissingSandboxRoot,
}

impl SupervisorConfig {
    /// Parse and validate a TOML configuration document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigLoadError> {
        let config: SupervisorConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation run once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.agent_timeout.is_zero() {
            return Err(ConfigError::ZeroAgentTimeout);
        }
        if !(0.0..=1.0).contains(&self.watchdog.min_confidence) {
            return Err(ConfigError::InvalidMinConfidence(
                self.watchdog.min_confidence.to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.deduplication.confidence_threshold) {
            return Err(ConfigError::InvalidDedupThreshold(
                self.deduplication.confidence_threshold.to_string(),
            ));
        }
        if self.deduplication.batch_size == 0 {
            return Err(ConfigError::ZeroDedupBatchSize);
        }
        if self.event_retention.retention_critical_days < self.event_retention.retention_days {
            return Err(ConfigError::CriticalRetentionBelowRetention);
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroMaxConsecutiveFailures);
        }
        if self.enable_sandboxes && self.sandbox_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingSandboxRoot);
        }
        Ok(())
    }
}

/// Errors while loading configuration from disk (parse failure wraps
/// [`ConfigError`] validation failures too, so the CLI has one error type
/// to report at startup).
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Serde helper: `Duration` stored in TOML as whole seconds.
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
