//! Configuration management for avf-trace.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (AVF_THREADS, AVF_FAN, etc.)
//! 2. Project-local config file (`./avf-trace.toml`)
//! 3. User config file (`~/.config/avf-trace/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # avf-trace.toml
//!
//! thread_capacity = 8
//! remote_threshold = 100
//! decay = 0.8
//! fan_tracking = true
//! granularity = "core"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::FactorWeights;

/// Upper bound on tracked threads; the fan matrices grow quadratically.
pub const MAX_THREADS: usize = 64;

/// How events are mapped onto ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One ledger per core; the ledger index is the core id.
    #[default]
    Core,
    /// One ledger per software thread, assigned in order of first appearance.
    Thread,
}

/// Rejected configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    ZeroCapacity(&'static str),
    #[error("thread_capacity {requested} exceeds the maximum of {max}")]
    CapacityTooLarge { requested: usize, max: usize },
    #[error("decay {0} must lie in (0, 1]")]
    Decay(f64),
    #[error("weights must be non-negative and finite (local {local}, remote {remote})")]
    Weights { local: f64, remote: f64 },
    #[error("{field} {index} is outside the capacity of {capacity}")]
    IndexOutOfRange {
        field: &'static str,
        index: usize,
        capacity: usize,
    },
}

/// avf-trace configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of tracked threads.
    pub thread_capacity: usize,

    /// Number of cores the trace source may report.
    pub core_capacity: usize,

    /// Direct event count an edge must exceed to propagate indirectly.
    pub remote_threshold: u64,

    /// Scale applied to each propagated hop.
    pub decay: f64,

    /// Weight of the local factor in the total factor.
    pub local_weight: f64,

    /// Weight of the remote factor in the total factor.
    pub remote_weight: f64,

    /// Core- or thread-level ledgers.
    pub granularity: Granularity,

    /// Track fan-in / fan-out matrices.
    pub fan_tracking: bool,

    /// Ledger index whose local factors are squared (redundant execution).
    pub redundant_thread: Option<usize>,

    /// Core mirrored into the shadow ledger while a redundant region is open.
    pub region_thread: Option<usize>,

    /// Honour partial-report triggers.
    pub partial_reports: bool,

    /// Cores that start out inactive.
    pub inactive_cores: Vec<usize>,

    /// Full-session report destination.
    pub report_path: Option<String>,

    /// Partial report log (appended to).
    pub partial_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_capacity: 8,
            core_capacity: 32,
            remote_threshold: 100,
            decay: 0.8,
            local_weight: 0.5,
            remote_weight: 0.5,
            granularity: Granularity::Core,
            fan_tracking: false,
            redundant_thread: None,
            region_thread: None,
            partial_reports: true,
            inactive_cores: Vec::new(),
            report_path: None,
            partial_path: None,
        }
    }
}

/// Optional overrides read from one config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    thread_capacity: Option<usize>,
    core_capacity: Option<usize>,
    remote_threshold: Option<u64>,
    decay: Option<f64>,
    local_weight: Option<f64>,
    remote_weight: Option<f64>,
    granularity: Option<Granularity>,
    fan_tracking: Option<bool>,
    redundant_thread: Option<usize>,
    region_thread: Option<usize>,
    partial_reports: Option<bool>,
    inactive_cores: Option<Vec<usize>>,
    report_path: Option<String>,
    partial_path: Option<String>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `avf-trace.toml`
    /// 3. User config `~/.config/avf-trace/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        log::debug!("Loaded configuration: {:?}", config);
        config
    }

    /// Combination weights for total factors.
    pub fn weights(&self) -> FactorWeights {
        FactorWeights {
            local: self.local_weight,
            remote: self.remote_weight,
        }
    }

    /// Full-session report path, with fallback to default.
    pub fn report_path(&self) -> String {
        self.report_path
            .clone()
            .unwrap_or_else(|| "vul_result.txt".to_string())
    }

    /// Partial report path, with fallback to default.
    pub fn partial_path(&self) -> String {
        self.partial_path
            .clone()
            .unwrap_or_else(|| "temp_result.txt".to_string())
    }

    /// Check that the configuration describes a usable engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("thread_capacity"));
        }
        if self.thread_capacity > MAX_THREADS {
            return Err(ConfigError::CapacityTooLarge {
                requested: self.thread_capacity,
                max: MAX_THREADS,
            });
        }
        if self.core_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("core_capacity"));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(ConfigError::Decay(self.decay));
        }
        let weight_ok = |w: f64| w.is_finite() && w >= 0.0;
        if !weight_ok(self.local_weight) || !weight_ok(self.remote_weight) {
            return Err(ConfigError::Weights {
                local: self.local_weight,
                remote: self.remote_weight,
            });
        }
        if let Some(index) = self.redundant_thread {
            if index >= self.thread_capacity {
                return Err(ConfigError::IndexOutOfRange {
                    field: "redundant_thread",
                    index,
                    capacity: self.thread_capacity,
                });
            }
        }
        if let Some(index) = self.region_thread {
            if index >= self.core_capacity {
                return Err(ConfigError::IndexOutOfRange {
                    field: "region_thread",
                    index,
                    capacity: self.core_capacity,
                });
            }
        }
        if let Some(&index) = self.inactive_cores.iter().find(|&&c| c >= self.core_capacity) {
            return Err(ConfigError::IndexOutOfRange {
                field: "inactive_cores",
                index,
                capacity: self.core_capacity,
            });
        }
        Ok(())
    }

    /// Load user configuration from ~/.config/avf-trace/config.toml
    fn load_user_config() -> Option<ConfigLayer> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./avf-trace.toml
    fn load_local_config() -> Option<ConfigLayer> {
        Self::load_from_file(Path::new("avf-trace.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<ConfigLayer> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(layer) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(layer)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge a config file layer into this one.
    /// Only overrides fields present in the layer.
    fn merge(&mut self, other: ConfigLayer) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(v) = other.$field { self.$field = v; })*
            };
        }
        take!(
            thread_capacity,
            core_capacity,
            remote_threshold,
            decay,
            local_weight,
            remote_weight,
            granularity,
            fan_tracking,
            partial_reports,
            inactive_cores
        );
        if other.redundant_thread.is_some() {
            self.redundant_thread = other.redundant_thread;
        }
        if other.region_thread.is_some() {
            self.region_thread = other.region_thread;
        }
        if other.report_path.is_some() {
            self.report_path = other.report_path;
        }
        if other.partial_path.is_some() {
            self.partial_path = other.partial_path;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            let raw = std::env::var(name).ok()?;
            match raw.trim().parse() {
                Ok(v) => {
                    log::info!("Using {} from environment: {}", name, raw);
                    Some(v)
                }
                Err(_) => {
                    log::warn!("Ignoring unparseable {}={}", name, raw);
                    None
                }
            }
        }

        if let Some(v) = parsed("AVF_THREADS") {
            self.thread_capacity = v;
        }
        if let Some(v) = parsed("AVF_REMOTE_THRESHOLD") {
            self.remote_threshold = v;
        }
        if let Some(v) = parsed("AVF_DECAY") {
            self.decay = v;
        }
        if let Some(v) = parsed("AVF_FAN") {
            self.fan_tracking = v;
        }
        if let Ok(path) = std::env::var("AVF_REPORT_PATH") {
            log::info!("Using AVF_REPORT_PATH from environment: {}", path);
            self.report_path = Some(path);
        }
        if let Ok(path) = std::env::var("AVF_PARTIAL_PATH") {
            log::info!("Using AVF_PARTIAL_PATH from environment: {}", path);
            self.partial_path = Some(path);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("avf-trace").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# avf-trace configuration
# Place this file at ~/.config/avf-trace/config.toml or ./avf-trace.toml

# Maximum number of tracked threads (ledger indices 0..thread_capacity)
thread_capacity = 8

# Number of cores the trace may report
core_capacity = 32

# "core": one ledger per core, "thread": one ledger per software thread
granularity = "core"

# Fan-in / fan-out tracking between threads
fan_tracking = true

# Direct events before an edge propagates indirectly, and the per-hop decay
remote_threshold = 100
decay = 0.8

# Total factor = local_weight * LVF + remote_weight * RVF
local_weight = 0.5
remote_weight = 0.5

# Square the local factors of this ledger (redundant execution)
# redundant_thread = 1

# Core mirrored into the shadow ledger inside redundant regions
# region_thread = 0

# Honour partial report triggers in the trace
partial_reports = true

# report_path = "vul_result.txt"
# partial_path = "temp_result.txt"
"#
        .to_string()
    }
}
