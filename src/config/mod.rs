//! Configuration management for recrawl
//!
//! This module handles loading and validating configuration from environment variables,
//! files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::history::DEFAULT_HISTORY_LENGTH;
use crate::partition::diversion::TIMESTAMP_DIGITS;
use crate::partition::fingerprint::DEFAULT_CACHE_CAPACITY;
use crate::partition::{KeyReduction, MapperSettings};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fetch history configuration
    pub history: HistoryConfig,

    /// History store configuration
    pub persist: PersistConfig,

    /// Persist journal configuration
    pub journal: JournalConfig,

    /// Crawl mapper configuration
    pub mapper: MapperConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Fetch history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of fetches remembered per URI
    pub history_length: usize,
}

/// History store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Store environment directory
    pub env_dir: PathBuf,

    /// Journal path, URL or prior environment to preload from
    pub preload_source: Option<String>,
}

/// Persist journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Journal file path
    pub path: PathBuf,

    /// Data lines between timestamp markers (0 disables markers)
    pub timestamp_interval: u64,
}

/// Crawl mapping strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapperStrategy {
    /// Numbered nodes chosen by fingerprint modulo node count
    #[default]
    Hash,
    /// Named nodes chosen by lexical range
    Lexical,
}

impl std::str::FromStr for MapperStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "lexical" => Ok(Self::Lexical),
            other => anyhow::bail!("Unknown mapper strategy: {other}"),
        }
    }
}

/// Crawl mapper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Mapping strategy
    pub strategy: MapperStrategy,

    /// Number of crawler nodes (hash strategy)
    pub bucket_count: u64,

    /// Class key reduction pattern (hash strategy); unset uses the
    /// registered-domain reduction, empty disables reduction
    pub reduce_pattern: Option<String>,

    /// Map file path or URL (lexical strategy)
    pub map_source: Option<String>,

    /// Name of this node
    pub local_name: String,

    /// Directory receiving diversion logs
    pub diversion_dir: PathBuf,

    /// Map the URI being processed
    pub check_uri: bool,

    /// Map discovered outlinks
    pub check_outlinks: bool,

    /// Timestamp digits naming a diversion log generation
    pub rotation_digits: usize,

    /// Slots in the recently-diverted cache
    pub cache_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_length: DEFAULT_HISTORY_LENGTH,
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            env_dir: PathBuf::from("state/history"),
            preload_source: None,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/persistlog.txt.gz"),
            timestamp_interval: 10_000,
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        let settings = MapperSettings::default();
        Self {
            strategy: MapperStrategy::Hash,
            bucket_count: 1,
            reduce_pattern: None,
            map_source: None,
            local_name: settings.local_name,
            diversion_dir: settings.diversion_dir,
            check_uri: settings.check_uri,
            check_outlinks: settings.check_outlinks,
            rotation_digits: settings.rotation_digits,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl MapperConfig {
    /// Settings shared by both mapping strategies
    pub fn settings(&self) -> MapperSettings {
        MapperSettings {
            local_name: self.local_name.clone(),
            diversion_dir: self.diversion_dir.clone(),
            check_uri: self.check_uri,
            check_outlinks: self.check_outlinks,
            rotation_digits: self.rotation_digits,
            cache_capacity: self.cache_capacity,
        }
    }

    /// Class key reduction for the hash strategy
    pub fn key_reduction(&self) -> KeyReduction {
        match &self.reduce_pattern {
            None => KeyReduction::PublicSuffix,
            Some(p) => KeyReduction::Pattern(p.clone()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let history_length = env_parse("RECRAWL_HISTORY_LENGTH")
            .unwrap_or(defaults.history.history_length);

        let env_dir = std::env::var("RECRAWL_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.persist.env_dir);

        let preload_source = std::env::var("RECRAWL_PRELOAD_SOURCE").ok();

        let journal_path = std::env::var("RECRAWL_JOURNAL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.journal.path);

        let timestamp_interval = env_parse("RECRAWL_JOURNAL_TIMESTAMP_INTERVAL")
            .unwrap_or(defaults.journal.timestamp_interval);

        let strategy = match std::env::var("RECRAWL_MAPPER_STRATEGY") {
            Ok(v) => v.parse().context("Invalid RECRAWL_MAPPER_STRATEGY")?,
            Err(_) => defaults.mapper.strategy,
        };

        let mapper = MapperConfig {
            strategy,
            bucket_count: env_parse("RECRAWL_BUCKET_COUNT").unwrap_or(defaults.mapper.bucket_count),
            reduce_pattern: std::env::var("RECRAWL_REDUCE_PATTERN").ok(),
            map_source: std::env::var("RECRAWL_MAP_SOURCE").ok(),
            local_name: std::env::var("RECRAWL_LOCAL_NAME")
                .unwrap_or(defaults.mapper.local_name),
            diversion_dir: std::env::var("RECRAWL_DIVERSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.mapper.diversion_dir),
            check_uri: env_parse("RECRAWL_CHECK_URI").unwrap_or(defaults.mapper.check_uri),
            check_outlinks: env_parse("RECRAWL_CHECK_OUTLINKS")
                .unwrap_or(defaults.mapper.check_outlinks),
            rotation_digits: env_parse("RECRAWL_ROTATION_DIGITS")
                .unwrap_or(defaults.mapper.rotation_digits),
            cache_capacity: env_parse("RECRAWL_CACHE_CAPACITY")
                .unwrap_or(defaults.mapper.cache_capacity),
        };

        let log_level =
            std::env::var("RECRAWL_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("RECRAWL_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            history: HistoryConfig { history_length },
            persist: PersistConfig {
                env_dir,
                preload_source,
            },
            journal: JournalConfig {
                path: journal_path,
                timestamp_interval,
            },
            mapper,
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.history.history_length == 0 {
            anyhow::bail!("history_length must be greater than 0");
        }

        if self.mapper.bucket_count == 0 {
            anyhow::bail!("bucket_count must be greater than 0");
        }

        if !(1..=TIMESTAMP_DIGITS).contains(&self.mapper.rotation_digits) {
            anyhow::bail!("rotation_digits must be between 1 and {TIMESTAMP_DIGITS}");
        }

        if self.mapper.cache_capacity == 0 {
            anyhow::bail!("cache_capacity must be greater than 0");
        }

        if self.mapper.local_name.trim().is_empty() {
            anyhow::bail!("local_name must not be empty");
        }

        if self.mapper.strategy == MapperStrategy::Lexical && self.mapper.map_source.is_none() {
            anyhow::bail!("lexical mapper requires a map_source");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging format must be 'text' or 'json'");
        }

        Ok(())
    }
}
