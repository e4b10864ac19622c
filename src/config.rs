//! TOML configuration for analysis runs.
//!
//! Every section carries compiled-in defaults so partial files work. The
//! library never reads the environment; only [`AnalysisConfig::resolve`],
//! used by the binary, looks at `PROCMINE_CONFIG`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scope::ScopeFilter;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "PROCMINE_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub scope: ScopeFilter,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub utilization: UtilizationConfig,
    #[serde(default)]
    pub bottleneck: BottleneckConfig,
    #[serde(default)]
    pub failures: FailureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AnalysisConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded analysis configuration");
        Ok(config)
    }

    /// Resolve configuration for the binary, in order:
    /// 1. An explicit path (errors are fatal).
    /// 2. The path in `PROCMINE_CONFIG`.
    /// 3. `./procmine.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PROCMINE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new("procmine.toml");
        if local.exists() {
            return Self::load(local);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Per-activity IQR outlier test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub min_comparison_samples: usize,
    pub iqr_multiplier: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_comparison_samples: 5,
            iqr_multiplier: 1.5,
        }
    }
}

/// Recent-window versus baseline equipment check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilizationConfig {
    pub min_recent_samples: usize,
    pub min_baseline_samples: usize,
    pub deviation_threshold: f64,
    pub recent_window_hours: i64,
}

impl Default for UtilizationConfig {
    fn default() -> Self {
        Self {
            min_recent_samples: 5,
            min_baseline_samples: 20,
            deviation_threshold: 0.2,
            recent_window_hours: 24,
        }
    }
}

/// Wait-time and processing-time severity tiers, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckConfig {
    pub wait_threshold_seconds: f64,
    pub high_severity_threshold_seconds: f64,
    pub medium_severity_threshold_seconds: f64,
    pub processing_high_threshold_seconds: f64,
    pub processing_medium_threshold_seconds: f64,
}

impl Default for BottleneckConfig {
    fn default() -> Self {
        Self {
            wait_threshold_seconds: 60.0,
            high_severity_threshold_seconds: 300.0,
            medium_severity_threshold_seconds: 120.0,
            processing_high_threshold_seconds: 300.0,
            processing_medium_threshold_seconds: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    pub max_examples_per_pattern: usize,
    /// Length of the text prefix naming an unclassified failure bucket.
    pub unclassified_prefix_chars: usize,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            max_examples_per_pattern: 3,
            unclassified_prefix_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON log lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/procmine.db"),
        }
    }
}
