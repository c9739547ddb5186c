//! Scheduler tuning knobs.
//!
//! Settings can come from defaults, environment variables, a TOML file, or
//! the builder methods. Durations are expressed in milliseconds (microseconds
//! for the frame budget) wherever they cross a text boundary.

use crate::batch::DEFAULT_CHUNK_SIZE;
use crate::frame_budget::FRAME_BUDGET_60FPS;
use crate::gate::{DEFAULT_DEBOUNCE_DELAY, DEFAULT_THROTTLE_LIMIT};
use crate::viewport::DEFAULT_OVERSCAN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

pub const ENV_DEBOUNCE_MS: &str = "PDF_RENDER_DEBOUNCE_MS";
pub const ENV_THROTTLE_MS: &str = "PDF_RENDER_THROTTLE_MS";
pub const ENV_OVERSCAN: &str = "PDF_RENDER_OVERSCAN";
pub const ENV_CHUNK_SIZE: &str = "PDF_RENDER_CHUNK_SIZE";
pub const ENV_FRAME_BUDGET_US: &str = "PDF_RENDER_FRAME_BUDGET_US";

/// Configuration for render gating, windowing and batching.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Quiet period before a debounced recompute fires
    pub debounce_delay: Duration,
    /// Minimum spacing between throttled recomputes
    pub throttle_limit: Duration,
    /// Extra items rendered past each window edge
    pub overscan: usize,
    /// Items per chunk in batch processing
    pub chunk_size: usize,
    /// Time one drain pass may take before it is reported as over budget
    pub frame_budget: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            throttle_limit: DEFAULT_THROTTLE_LIMIT,
            overscan: DEFAULT_OVERSCAN,
            chunk_size: DEFAULT_CHUNK_SIZE,
            frame_budget: FRAME_BUDGET_60FPS,
        }
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    debounce_ms: Option<u64>,
    throttle_ms: Option<u64>,
    overscan: Option<usize>,
    chunk_size: Option<usize>,
    frame_budget_us: Option<u64>,
}

impl SchedulerConfig {
    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    pub fn with_throttle_limit(mut self, limit: Duration) -> Self {
        self.throttle_limit = limit;
        self
    }

    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `PDF_RENDER_DEBOUNCE_MS` (default: 16)
    /// - `PDF_RENDER_THROTTLE_MS` (default: 16)
    /// - `PDF_RENDER_OVERSCAN` (default: 3)
    /// - `PDF_RENDER_CHUNK_SIZE` (default: 10)
    /// - `PDF_RENDER_FRAME_BUDGET_US` (default: 16667)
    ///
    /// # Errors
    /// Returns an error if a variable is set to something other than an
    /// unsigned integer, or if the result fails [`SchedulerConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = env_number::<u64>(ENV_DEBOUNCE_MS)? {
            config.debounce_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>(ENV_THROTTLE_MS)? {
            config.throttle_limit = Duration::from_millis(ms);
        }
        if let Some(overscan) = env_number(ENV_OVERSCAN)? {
            config.overscan = overscan;
        }
        if let Some(chunk_size) = env_number(ENV_CHUNK_SIZE)? {
            config.chunk_size = chunk_size;
        }
        if let Some(us) = env_number::<u64>(ENV_FRAME_BUDGET_US)? {
            config.frame_budget = Duration::from_micros(us);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format (all keys optional):
    /// ```toml
    /// debounce_ms = 16
    /// throttle_ms = 16
    /// overscan = 3
    /// chunk_size = 10
    /// frame_budget_us = 16667
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        let mut config = Self::default();

        if let Some(ms) = file.debounce_ms {
            config.debounce_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.throttle_ms {
            config.throttle_limit = Duration::from_millis(ms);
        }
        if let Some(overscan) = file.overscan {
            config.overscan = overscan;
        }
        if let Some(chunk_size) = file.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(us) = file.frame_budget_us {
            config.frame_budget = Duration::from_micros(us);
        }

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Encodes the settings in the file format; invalid settings are refused.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        let file = ConfigFile {
            debounce_ms: Some(self.debounce_delay.as_millis() as u64),
            throttle_ms: Some(self.throttle_limit.as_millis() as u64),
            overscan: Some(self.overscan),
            chunk_size: Some(self.chunk_size),
            frame_budget_us: Some(self.frame_budget.as_micros() as u64),
        };
        Ok(toml::to_string(&file)?)
    }

    /// Rejects settings the scheduler cannot run with.
    ///
    /// Delays and limits must be whole milliseconds and the frame budget whole
    /// microseconds, the units the file format stores.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("chunk_size must be positive".to_string()));
        }
        if self.debounce_delay.is_zero() {
            return Err(ConfigError::InvalidValue("debounce delay must be positive".to_string()));
        }
        if self.throttle_limit.is_zero() {
            return Err(ConfigError::InvalidValue("throttle limit must be positive".to_string()));
        }
        if self.frame_budget.is_zero() {
            return Err(ConfigError::InvalidValue("frame budget must be positive".to_string()));
        }
        if self.debounce_delay.subsec_nanos() % 1_000_000 != 0 {
            return Err(ConfigError::InvalidValue(format!(
                "debounce delay must be whole milliseconds, got {:?}",
                self.debounce_delay
            )));
        }
        if self.throttle_limit.subsec_nanos() % 1_000_000 != 0 {
            return Err(ConfigError::InvalidValue(format!(
                "throttle limit must be whole milliseconds, got {:?}",
                self.throttle_limit
            )));
        }
        if self.frame_budget.subsec_nanos() % 1_000 != 0 {
            return Err(ConfigError::InvalidValue(format!(
                "frame budget must be whole microseconds, got {:?}",
                self.frame_budget
            )));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={value}"))),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("failed to read configuration file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    const ALL_VARS: [&str; 5] =
        [ENV_DEBOUNCE_MS, ENV_THROTTLE_MS, ENV_OVERSCAN, ENV_CHUNK_SIZE, ENV_FRAME_BUDGET_US];

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.debounce_delay, Duration::from_millis(16));
        assert_eq!(config.throttle_limit, Duration::from_millis(16));
        assert_eq!(config.overscan, 3);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.frame_budget, Duration::from_micros(16_667));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = SchedulerConfig::default()
            .with_debounce_delay(Duration::from_millis(50))
            .with_throttle_limit(Duration::from_millis(33))
            .with_overscan(5)
            .with_chunk_size(4)
            .with_frame_budget(Duration::from_micros(8_333));

        assert_eq!(config.debounce_delay, Duration::from_millis(50));
        assert_eq!(config.throttle_limit, Duration::from_millis(33));
        assert_eq!(config.overscan, 5);
        assert_eq!(config.chunk_size, 4);
        assert_eq!(config.frame_budget, Duration::from_micros(8_333));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_chunk = SchedulerConfig::default().with_chunk_size(0);
        let zero_delay = SchedulerConfig::default().with_debounce_delay(Duration::ZERO);
        let zero_limit = SchedulerConfig::default().with_throttle_limit(Duration::ZERO);

        assert!(matches!(zero_chunk.validate(), Err(ConfigError::InvalidValue(_))));
        assert!(matches!(zero_delay.validate(), Err(ConfigError::InvalidValue(_))));
        assert!(matches!(zero_limit.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_DEBOUNCE_MS, "40");
        env::set_var(ENV_THROTTLE_MS, "25");
        env::set_var(ENV_OVERSCAN, "6");
        env::set_var(ENV_CHUNK_SIZE, "20");
        env::set_var(ENV_FRAME_BUDGET_US, "8333");

        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config.debounce_delay, Duration::from_millis(40));
        assert_eq!(config.throttle_limit, Duration::from_millis(25));
        assert_eq!(config.overscan, 6);
        assert_eq!(config.chunk_size, 20);
        assert_eq!(config.frame_budget, Duration::from_micros(8_333));
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&ALL_VARS);

        for name in ALL_VARS {
            env::remove_var(name);
        }
        env::set_var(ENV_OVERSCAN, "0");

        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config, SchedulerConfig::default().with_overscan(0));
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_CHUNK_SIZE, "not_a_number");
        assert!(matches!(SchedulerConfig::from_env(), Err(ConfigError::InvalidValue(_))));

        env::set_var(ENV_CHUNK_SIZE, "0");
        assert!(matches!(SchedulerConfig::from_env(), Err(ConfigError::InvalidValue(_))));
    }

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(names: &[&str]) -> Self {
            let vars = names.iter().map(|name| (name.to_string(), env::var(name).ok())).collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_from_toml() {
        let config = SchedulerConfig::from_toml(
            r#"
            # tuned for a slow tablet
            debounce_ms = 100
            overscan = 1
            unknown_key = "ignored"
            "#,
        )
        .unwrap();

        assert_eq!(config.debounce_delay, Duration::from_millis(100));
        assert_eq!(config.overscan, 1);
        assert_eq!(config.throttle_limit, DEFAULT_THROTTLE_LIMIT);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        let result = SchedulerConfig::from_toml("chunk_size = \"lots\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_file_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scheduler.toml");

        let config = SchedulerConfig::default().with_overscan(8).with_chunk_size(25);
        config.save_to_file(&path).unwrap();

        assert_eq!(SchedulerConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_sub_unit_durations_rejected_before_saving() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scheduler.toml");

        let half_ms = SchedulerConfig::default().with_debounce_delay(Duration::from_micros(500));
        assert!(matches!(half_ms.validate(), Err(ConfigError::InvalidValue(_))));
        assert!(matches!(half_ms.save_to_file(&path), Err(ConfigError::InvalidValue(_))));
        assert!(!path.exists());

        let jittery = SchedulerConfig::default().with_throttle_limit(Duration::from_micros(16_400));
        assert!(matches!(jittery.validate(), Err(ConfigError::InvalidValue(_))));

        let fine_budget =
            SchedulerConfig::default().with_frame_budget(Duration::from_nanos(8_333_333));
        assert!(matches!(fine_budget.validate(), Err(ConfigError::InvalidValue(_))));

        let whole = SchedulerConfig::default()
            .with_debounce_delay(Duration::from_millis(1))
            .with_frame_budget(Duration::from_micros(8_333));
        whole.save_to_file(&path).unwrap();
        assert_eq!(SchedulerConfig::from_file(&path).unwrap(), whole);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = SchedulerConfig::from_file(temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
