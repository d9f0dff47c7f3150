//! Watcher configuration, loaded from TOML.
//!
//! ```toml
//! monitor_path = "/srv/downloads"
//! recursive = true
//! exclude_dirs = ["incomplete"]
//! confidence_threshold = 0.7
//!
//! [inference]
//! enabled = true
//! endpoint = "https://api.openai.com/v1"
//! api_key = "sk-..."
//! ```
//!
//! `log_file` adds a daily-rotated log file next to the stderr output.

use reelname_infer::{InferConfig, InferError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts", "rmvb",
];

/// Errors raised while loading or validating a [`WatchConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Monitored path {} is not an existing directory", .0.display())]
    MissingRoot(PathBuf),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error(transparent)]
    Inference(#[from] InferError),
}

impl ConfigError {
    fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_quiet_interval_ms() -> u64 {
    2000
}

fn default_max_workers() -> usize {
    4
}

fn default_max_collision_attempts() -> u32 {
    99
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Everything the watcher needs, as an immutable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Root of the watched tree
    pub monitor_path: PathBuf,
    /// Accepted extensions, case-insensitive, with or without a leading dot
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Directory names skipped anywhere below the root
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    /// Parses below this confidence are offered to the inference fallback
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// How long a file must stay unchanged before it is processed
    #[serde(default = "default_quiet_interval_ms")]
    pub quiet_interval_ms: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Number of ` (n)` suffixes tried before giving up on a collision
    #[serde(default = "default_max_collision_attempts")]
    pub max_collision_attempts: u32,
    /// Submit files already present under the root at start-up
    #[serde(default)]
    pub scan_existing: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Also write logs here, rotated daily
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub inference: InferConfig,
}

impl WatchConfig {
    /// A configuration with every optional field at its default
    pub fn new(monitor_path: impl Into<PathBuf>) -> Self {
        Self {
            monitor_path: monitor_path.into(),
            media_extensions: default_media_extensions(),
            recursive: true,
            exclude_dirs: Vec::new(),
            confidence_threshold: default_confidence_threshold(),
            quiet_interval_ms: default_quiet_interval_ms(),
            max_workers: default_max_workers(),
            max_collision_attempts: default_max_collision_attempts(),
            scan_existing: false,
            log_level: default_log_level(),
            log_file: None,
            inference: InferConfig::default(),
        }
    }

    /// Read and parse a TOML file. The result is not validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_media_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.media_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_quiet_interval(mut self, quiet: Duration) -> Self {
        self.quiet_interval_ms = quiet.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_max_collision_attempts(mut self, attempts: u32) -> Self {
        self.max_collision_attempts = attempts;
        self
    }

    pub fn with_scan_existing(mut self, scan: bool) -> Self {
        self.scan_existing = scan;
        self
    }

    pub fn with_inference(mut self, inference: InferConfig) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn quiet_interval(&self) -> Duration {
        Duration::from_millis(self.quiet_interval_ms)
    }

    /// The `tracing` level named by `log_level`
    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::invalid(format!("unknown log level {:?}", self.log_level)))
    }

    /// Check the configuration before the pipeline starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.monitor_path.is_dir() {
            return Err(ConfigError::MissingRoot(self.monitor_path.clone()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::invalid("max_workers must be at least 1"));
        }
        if self
            .media_extensions
            .iter()
            .all(|e| e.trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::invalid("media_extensions is empty"));
        }
        self.level()?;
        if self
            .log_file
            .as_ref()
            .is_some_and(|path| path.file_name().is_none())
        {
            return Err(ConfigError::invalid("log_file must name a file"));
        }
        self.inference.validate()?;
        Ok(())
    }
}
