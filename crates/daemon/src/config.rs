//! Mount configuration, stored as `config.toml` in the work directory
//!
//! Every field has a default. Numeric settings outside their valid range are
//! clamped with a warning rather than rejected.

use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

use object_store::RemoteConfig;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Age after which the bucket list is fetched again
    pub bucket_cache_ttl_min: u64,
    /// Age after which head/list answers are asked again
    pub object_cache_ttl_min: u64,
    /// Local cache files not accessed for this long are deleted
    pub cache_file_retention_min: u64,
    /// Size of one download part
    pub part_size_mib: u64,
    pub delayed_workers: usize,
    pub scheduled_workers: usize,
    pub tick_period_secs: u64,
    /// Idle maintenance runs on every Nth tick
    pub idle_every_ticks: u64,
    /// Buckets shown at the root; 0 shows all
    pub max_display_buckets: usize,
    /// Entries returned per directory listing; 0 returns all
    pub max_display_objects: usize,
    pub readonly: bool,
    pub delete_after_upload: bool,
    /// Regular expressions matched against namespace paths
    pub ignore_patterns: Vec<String>,
    pub remote: RemoteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_cache_ttl_min: 20,
            object_cache_ttl_min: 5,
            cache_file_retention_min: 60,
            part_size_mib: 10,
            delayed_workers: 6,
            scheduled_workers: 1,
            tick_period_secs: 60,
            idle_every_ticks: 10,
            max_display_buckets: 8,
            max_display_objects: 1000,
            readonly: false,
            delete_after_upload: false,
            ignore_patterns: Vec::new(),
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid ignore pattern: {0}")]
    Pattern(#[from] regex::Error),
}

fn clamp_setting<T: Ord + Copy + Display>(name: &str, value: &mut T, min: T, max: T) {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        tracing::warn!(
            setting = name,
            value = %value,
            clamped = %clamped,
            "config value out of range"
        );
        *value = clamped;
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&raw)?;
        config.clamp();
        config.ignore_set()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn clamp(&mut self) {
        clamp_setting("bucket_cache_ttl_min", &mut self.bucket_cache_ttl_min, 1, 1440);
        clamp_setting("object_cache_ttl_min", &mut self.object_cache_ttl_min, 1, 60);
        clamp_setting(
            "cache_file_retention_min",
            &mut self.cache_file_retention_min,
            1,
            10080,
        );
        clamp_setting("part_size_mib", &mut self.part_size_mib, 5, 100);
        clamp_setting("delayed_workers", &mut self.delayed_workers, 1, 32);
        clamp_setting("scheduled_workers", &mut self.scheduled_workers, 1, 8);
        clamp_setting("tick_period_secs", &mut self.tick_period_secs, 1, 3600);
        clamp_setting("idle_every_ticks", &mut self.idle_every_ticks, 1, 1000);
    }

    /// Compiled ignore patterns, `None` when there are none
    pub fn ignore_set(&self) -> Result<Option<RegexSet>, ConfigError> {
        if self.ignore_patterns.is_empty() {
            return Ok(None);
        }
        Ok(Some(RegexSet::new(&self.ignore_patterns)?))
    }

    pub fn bucket_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.bucket_cache_ttl_min as i64)
    }

    pub fn object_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.object_cache_ttl_min as i64)
    }

    pub fn cache_file_retention(&self) -> Duration {
        Duration::from_secs(self.cache_file_retention_min * 60)
    }

    pub fn part_size(&self) -> u64 {
        self.part_size_mib * 1024 * 1024
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_period_secs)
    }
}
