//! Configuration file loading with precedence handling.

use crate::engine::EngineConfig;
use crate::fetch::SchedulerConfig;
use crate::view_state::viewport::ViewportConfig;
use crate::worker::WorkerConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PHOTOSCROLL_CONFIG";
/// Environment override for `row_capacity`.
pub const ROW_CAPACITY_ENV: &str = "PHOTOSCROLL_ROW_CAPACITY";
/// Environment override for `nominal_row_height`.
pub const NOMINAL_ROW_HEIGHT_ENV: &str = "PHOTOSCROLL_NOMINAL_ROW_HEIGHT";

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file path contains invalid UTF-8 or cannot be resolved.
    #[error("Invalid config path: {0}")]
    InvalidPath(String),

    /// Failed to read config file (file may not exist or have permission issues).
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML syntax.
    #[error("Invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// A setting is out of range.
    #[error("Invalid {key}: {reason}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, hardcoded defaults are used.
/// Corresponds to `~/.config/photoscroll/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Pixels provisioned per unmeasured row.
    #[serde(default)]
    pub nominal_row_height: Option<i64>,

    /// Items per row.
    #[serde(default)]
    pub row_capacity: Option<usize>,

    /// Items per metadata batch.
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Per-item padding, each side.
    #[serde(default)]
    pub padding: Option<f64>,

    /// Provisional subrow height cap.
    #[serde(default)]
    pub max_subrow_height: Option<f64>,

    /// Pixels added above and below the viewport.
    #[serde(default)]
    pub viewport_padding: Option<i64>,

    /// Slack subtracted from the maximum scroll position.
    #[serde(default)]
    pub scroll_end_padding: Option<i64>,

    /// Capacity of the stale-batch window.
    #[serde(default)]
    pub inflight_batches: Option<usize>,

    /// Row cadence debounce.
    #[serde(default)]
    pub row_debounce_ms: Option<u64>,

    /// Row cadence max wait.
    #[serde(default)]
    pub row_max_wait_ms: Option<u64>,

    /// Batch cadence debounce.
    #[serde(default)]
    pub batch_debounce_ms: Option<u64>,

    /// Batch cadence max wait.
    #[serde(default)]
    pub batch_max_wait_ms: Option<u64>,

    /// Whether scroll input comes from a touch device.
    #[serde(default)]
    pub touch: Option<bool>,

    /// Momentum suppression after a clamp.
    #[serde(default)]
    pub touch_lock_ms: Option<u64>,

    /// Container width used by the simulator.
    #[serde(default)]
    pub container_width: Option<u32>,

    /// Viewport height used by the simulator.
    #[serde(default)]
    pub viewport_height: Option<i64>,

    /// Durable token cache.
    #[serde(default)]
    pub token_store_path: Option<PathBuf>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Resolved configuration after applying precedence rules.
///
/// Created by merging defaults, config file, env vars, and CLI args.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Pixels provisioned per unmeasured row.
    pub nominal_row_height: i64,
    /// Items per row.
    pub row_capacity: usize,
    /// Items per metadata batch.
    pub batch_size: usize,
    /// Per-item padding, each side.
    pub padding: f64,
    /// Provisional subrow height cap.
    pub max_subrow_height: f64,
    /// Pixels added above and below the viewport.
    pub viewport_padding: i64,
    /// Slack subtracted from the maximum scroll position.
    pub scroll_end_padding: i64,
    /// Capacity of the stale-batch window.
    pub inflight_batches: usize,
    /// Row cadence debounce.
    pub row_debounce_ms: u64,
    /// Row cadence max wait.
    pub row_max_wait_ms: u64,
    /// Batch cadence debounce.
    pub batch_debounce_ms: u64,
    /// Batch cadence max wait.
    pub batch_max_wait_ms: u64,
    /// Whether scroll input comes from a touch device.
    pub touch: bool,
    /// Momentum suppression after a clamp.
    pub touch_lock_ms: u64,
    /// Container width used by the simulator.
    pub container_width: u32,
    /// Viewport height used by the simulator.
    pub viewport_height: i64,
    /// Durable token cache.
    pub token_store_path: PathBuf,
    /// Path to log file for tracing output.
    pub log_file_path: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            nominal_row_height: 2400,
            row_capacity: 40,
            batch_size: 100,
            padding: 4.0,
            max_subrow_height: 250.0,
            viewport_padding: 1000,
            scroll_end_padding: 0,
            inflight_batches: 6,
            row_debounce_ms: 50,
            row_max_wait_ms: 100,
            batch_debounce_ms: 75,
            batch_max_wait_ms: 1000,
            touch: false,
            touch_lock_ms: 100,
            container_width: 1200,
            viewport_height: 800,
            token_store_path: default_token_store_path(),
            log_file_path: default_log_path(),
        }
    }
}

impl ResolvedConfig {
    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: &str) -> Result<(), ConfigError> {
            Err(ConfigError::InvalidValue {
                key,
                reason: reason.to_string(),
            })
        }

        if self.nominal_row_height <= 0 {
            return invalid("nominal_row_height", "must be positive");
        }
        if self.row_capacity == 0 {
            return invalid("row_capacity", "must be at least 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "must be at least 1");
        }
        if self.inflight_batches == 0 {
            return invalid("inflight_batches", "must be at least 1");
        }
        if !(self.padding.is_finite() && self.padding >= 0.0) {
            return invalid("padding", "must be a non-negative number");
        }
        if !(self.max_subrow_height.is_finite() && self.max_subrow_height > 0.0) {
            return invalid("max_subrow_height", "must be positive");
        }
        if self.viewport_padding < 0 || self.scroll_end_padding < 0 {
            return invalid("viewport_padding", "paddings must be non-negative");
        }
        if self.container_width == 0 {
            return invalid("container_width", "must be positive");
        }
        if f64::from(self.container_width) <= 2.0 * self.padding {
            return invalid("container_width", "must be wider than the padding on both sides of an item");
        }
        if self.row_max_wait_ms < self.row_debounce_ms {
            return invalid("row_max_wait_ms", "must not be shorter than row_debounce_ms");
        }
        if self.batch_max_wait_ms < self.batch_debounce_ms {
            return invalid("batch_max_wait_ms", "must not be shorter than batch_debounce_ms");
        }
        Ok(())
    }

    /// Worker layout and fetch parameters.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            row_capacity: self.row_capacity,
            batch_size: self.batch_size,
            nominal_row_height: self.nominal_row_height,
            padding: self.padding,
            max_subrow_height: self.max_subrow_height,
            inflight_batches: self.inflight_batches,
        }
    }

    /// Viewport reconciler parameters.
    pub fn viewport_config(&self) -> ViewportConfig {
        ViewportConfig {
            padding: self.viewport_padding,
            end_padding: self.scroll_end_padding,
            touch: self.touch,
            touch_lock: Duration::from_millis(self.touch_lock_ms),
        }
    }

    /// Fetch cadence parameters.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            row_capacity: self.row_capacity,
            batch_size: self.batch_size,
            inflight_batches: self.inflight_batches,
            row_debounce: Duration::from_millis(self.row_debounce_ms),
            row_max_wait: Duration::from_millis(self.row_max_wait_ms),
            batch_debounce: Duration::from_millis(self.batch_debounce_ms),
            batch_max_wait: Duration::from_millis(self.batch_max_wait_ms),
        }
    }

    /// Everything one engine needs.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            nominal_row_height: self.nominal_row_height,
            viewport: self.viewport_config(),
            scheduler: self.scheduler_config(),
        }
    }
}

fn state_path(file: &str) -> PathBuf {
    match dirs::state_dir() {
        Some(state_dir) => state_dir.join("photoscroll").join(file),
        None => PathBuf::from(file),
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/photoscroll/photoscroll.log` on Unix-like systems,
/// or appropriate platform path on other systems.
///
/// If state directory cannot be determined, falls back to current directory.
pub fn default_log_path() -> PathBuf {
    state_path("photoscroll.log")
}

/// Resolve default token store path, next to the log file.
pub fn default_token_store_path() -> PathBuf {
    state_path("tokens.json")
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
/// Returns `Err` if file exists but cannot be read or parsed.
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();

    // Missing file is not an error - use defaults
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(config))
}

/// Resolve default config file path.
///
/// Returns `~/.config/photoscroll/config.toml` on Unix, appropriate path on other platforms.
/// Returns `None` if home directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("photoscroll").join("config.toml"))
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument (like CLI `--config`)
/// 2. `PHOTOSCROLL_CONFIG` environment variable
/// 3. Default path `~/.config/photoscroll/config.toml`
///
/// Missing config files are NOT errors - defaults are used.
///
/// # Errors
///
/// Returns error only if a config file exists but cannot be read or parsed.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    match std::env::var(CONFIG_ENV) {
        Ok(env_path) if env_path.is_empty() => {
            return Err(ConfigError::InvalidPath(format!("{} is empty", CONFIG_ENV)));
        }
        Ok(env_path) => return load_config_file(PathBuf::from(env_path)),
        Err(std::env::VarError::NotUnicode(raw)) => {
            return Err(ConfigError::InvalidPath(raw.to_string_lossy().into_owned()));
        }
        Err(std::env::VarError::NotPresent) => {}
    }

    if let Some(default_path) = default_config_path() {
        return load_config_file(default_path);
    }

    Ok(None)
}

fn env_number<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to resolved config.
///
/// Checks for:
/// - `PHOTOSCROLL_ROW_CAPACITY`: Override items per row
/// - `PHOTOSCROLL_NOMINAL_ROW_HEIGHT`: Override the nominal row height
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnv` if a set variable is not a number.
pub fn apply_env_overrides(mut config: ResolvedConfig) -> Result<ResolvedConfig, ConfigError> {
    if let Some(row_capacity) = env_number(ROW_CAPACITY_ENV)? {
        config.row_capacity = row_capacity;
    }
    if let Some(height) = env_number(NOMINAL_ROW_HEIGHT_ENV)? {
        config.nominal_row_height = height;
    }
    Ok(config)
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use default.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    let Some(config) = config_file else {
        return defaults;
    };

    ResolvedConfig {
        nominal_row_height: config
            .nominal_row_height
            .unwrap_or(defaults.nominal_row_height),
        row_capacity: config.row_capacity.unwrap_or(defaults.row_capacity),
        batch_size: config.batch_size.unwrap_or(defaults.batch_size),
        padding: config.padding.unwrap_or(defaults.padding),
        max_subrow_height: config
            .max_subrow_height
            .unwrap_or(defaults.max_subrow_height),
        viewport_padding: config.viewport_padding.unwrap_or(defaults.viewport_padding),
        scroll_end_padding: config
            .scroll_end_padding
            .unwrap_or(defaults.scroll_end_padding),
        inflight_batches: config.inflight_batches.unwrap_or(defaults.inflight_batches),
        row_debounce_ms: config.row_debounce_ms.unwrap_or(defaults.row_debounce_ms),
        row_max_wait_ms: config.row_max_wait_ms.unwrap_or(defaults.row_max_wait_ms),
        batch_debounce_ms: config.batch_debounce_ms.unwrap_or(defaults.batch_debounce_ms),
        batch_max_wait_ms: config.batch_max_wait_ms.unwrap_or(defaults.batch_max_wait_ms),
        touch: config.touch.unwrap_or(defaults.touch),
        touch_lock_ms: config.touch_lock_ms.unwrap_or(defaults.touch_lock_ms),
        container_width: config.container_width.unwrap_or(defaults.container_width),
        viewport_height: config.viewport_height.unwrap_or(defaults.viewport_height),
        token_store_path: config.token_store_path.unwrap_or(defaults.token_store_path),
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
    }
}

/// Apply CLI argument overrides to resolved config.
///
/// CLI args have the highest precedence and override all other sources.
/// Only applies overrides for flags that were explicitly set by the user.
///
/// Precedence chain: Defaults → Config File → Env Vars → CLI Args (highest)
pub fn apply_cli_overrides(
    mut config: ResolvedConfig,
    width_override: Option<u32>,
    viewport_height_override: Option<i64>,
) -> ResolvedConfig {
    if let Some(width) = width_override {
        config.container_width = width;
    }
    if let Some(height) = viewport_height_override {
        config.viewport_height = height;
    }
    config
}

/// Run the whole precedence chain and validate the result.
///
/// # Errors
///
/// Returns the first loading, parsing, override, or validation failure.
pub fn resolve(
    config_path: Option<PathBuf>,
    width_override: Option<u32>,
    viewport_height_override: Option<i64>,
) -> Result<ResolvedConfig, ConfigError> {
    let file = load_config_with_precedence(config_path)?;
    let config = apply_env_overrides(merge_config(file))?;
    let config = apply_cli_overrides(config, width_override, viewport_height_override);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
