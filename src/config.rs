use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub iteration: IterationConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iteration: IterationConfig::default(),
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iteration.slice_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "iteration.slice_size".to_string(),
                message: "Slice size must be greater than 0".to_string(),
            });
        }
        if self.cache.max_key_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_key_depth".to_string(),
                message: "Key depth must be greater than 0".to_string(),
            });
        }
        if self.scheduler.max_turns == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.max_turns".to_string(),
                message: "Max turns must be greater than 0 when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Bounds the work an iterative operator does per scheduling turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationConfig {
    #[serde(default = "default_slice_size")]
    pub slice_size: usize,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            slice_size: default_slice_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_key_depth")]
    pub max_key_depth: usize,

    // TTL declarations above this are clamped
    #[serde(default = "default_max_ttl", with = "duration_secs")]
    pub max_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_key_depth: default_max_key_depth(),
            max_ttl: default_max_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SchedulerConfig {
    /// Upper bound on the turns a single step may take. `None` leaves long
    /// iterations unbounded.
    #[serde(default)]
    pub max_turns: Option<usize>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> Result<T, ConfigError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, ConfigError> {
    let config = serde_json::from_str(s)?;
    Ok(config)
}

fn default_slice_size() -> usize {
    100
}
fn default_true() -> bool {
    true
}
fn default_max_key_depth() -> usize {
    64
}
fn default_max_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
