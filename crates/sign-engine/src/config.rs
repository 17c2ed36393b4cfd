//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use sign_core::{Error, Result};
use sign_learning::LearningConfig;
use sign_model::{InferenceConfig, TrainingConfig};

const ENV_PREFIX: &str = "SIGN";

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Artifact persistence
    pub storage: StorageConfig,

    /// Classifier training
    pub training: TrainingConfig,

    /// Live prediction and rejection thresholds
    pub inference: InferenceConfig,

    /// Practice comparison and session analytics
    pub learning: LearningConfig,

    /// Sample validation report
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for trained artifacts
    pub artifact_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Labels with fewer valid samples get a warning
    pub min_samples_per_label: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_samples_per_label: 10,
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
}

fn config_error(e: config::ConfigError) -> Error {
    Error::Config(e.to_string())
}

impl EngineConfig {
    /// Load configuration from file, overridden by `SIGN__`-prefixed
    /// environment variables (`SIGN__TRAINING__SEED=7`).
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(environment())
            .build()
            .map_err(config_error)?;

        settings.try_deserialize().map_err(config_error)
    }

    /// Load from environment variables only.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(environment())
            .build()
            .map_err(config_error)?;

        settings.try_deserialize().map_err(config_error)
    }
}
