//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use gamify_season::ClosureConfig;
use gamify_store::DEFAULT_BATCH_CEILING;
use gamify_utils::RetryPolicy;

use crate::limits::{self, RateLimit};
use crate::EngineError;

/// Configuration of an engine instance.
///
/// Loaded from TOML via [`EngineConfig::from_toml_file`] or built
/// programmatically (tests). Every field has a default, so an empty file
/// is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub closure: ClosureSettings,

    /// Admission limits keyed by operation name.
    #[serde(default = "limits::default_limits")]
    pub rate_limits: BTreeMap<String, RateLimit>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; state is lost on exit.
    Memory,
    Lmdb,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// LMDB environment directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,

    /// Maximum writes per atomic batch.
    #[serde(default = "default_batch_ceiling")]
    pub batch_ceiling: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f32,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Transactions per group; a group is processed sequentially.
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    /// Groups processed at the same time.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureSettings {
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
    #[serde(default = "default_cleanup_reserve_secs")]
    pub cleanup_reserve_secs: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause between scheduled runs.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./gamify_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_batch_ceiling() -> usize {
    DEFAULT_BATCH_CEILING
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_factor() -> f32 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_group_size() -> usize {
    50
}

fn default_max_in_flight() -> usize {
    8
}

fn default_time_budget_secs() -> u64 {
    540
}

fn default_cleanup_reserve_secs() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    100
}

fn default_interval_secs() -> u64 {
    24 * 3600
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Reject settings that would stall or disable the engine.
    pub fn validate(&self) -> Result<(), EngineError> {
        let zero = [
            ("store.batch_ceiling", self.store.batch_ceiling == 0),
            ("retry.max_attempts", self.retry.max_attempts == 0),
            ("dispatcher.group_size", self.dispatcher.group_size == 0),
            ("dispatcher.max_in_flight", self.dispatcher.max_in_flight == 0),
            ("closure.chunk_size", self.closure.chunk_size == 0),
            ("closure.interval_secs", self.closure.interval_secs == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(EngineError::Config(format!("{field} must be positive")));
        }
        if self.closure.cleanup_reserve_secs >= self.closure.time_budget_secs {
            return Err(EngineError::Config(
                "closure.cleanup_reserve_secs must be below closure.time_budget_secs".into(),
            ));
        }
        if self.retry.factor < 1.0 {
            return Err(EngineError::Config("retry.factor must be at least 1".into()));
        }
        for (operation, limit) in &self.rate_limits {
            if limit.window_secs == 0 {
                return Err(EngineError::Config(format!(
                    "rate_limits.{operation}.window_secs must be positive"
                )));
            }
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            factor: self.factor,
            jitter: self.jitter,
        }
    }
}

impl ClosureSettings {
    pub fn job_config(&self) -> ClosureConfig {
        ClosureConfig {
            time_budget: Duration::from_secs(self.time_budget_secs),
            cleanup_reserve: Duration::from_secs(self.cleanup_reserve_secs),
            chunk_size: self.chunk_size,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            retry: RetryConfig::default(),
            dispatcher: DispatcherConfig::default(),
            closure: ClosureSettings::default(),
            rate_limits: limits::default_limits(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            map_size_mb: default_map_size_mb(),
            batch_ceiling: default_batch_ceiling(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
            jitter: default_true(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for ClosureSettings {
    fn default() -> Self {
        Self {
            time_budget_secs: default_time_budget_secs(),
            cleanup_reserve_secs: default_cleanup_reserve_secs(),
            chunk_size: default_chunk_size(),
            interval_secs: default_interval_secs(),
        }
    }
}
