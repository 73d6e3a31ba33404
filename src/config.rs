//! Configuration for the activity classifier.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::classifier::{SplitConfig, TrainParams};
use crate::core::scaling::ScalingConfig;
use crate::core::windowing::WindowSpec;
use crate::source::SourceLayout;

/// Main configuration for corpus building, training and inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window geometry in samples
    pub window: WindowConfig,

    /// Train/test partitioning
    pub split: SplitConfig,

    /// Kernel selection and SVM hyperparameters
    pub svm: TrainParams,

    /// Optional min-max scaling stage (off when absent)
    pub scaling: Option<ScalingConfig>,

    /// Column layout of the session CSV files
    pub source: SourceLayout,

    /// Upper bound on a training run, in seconds
    pub training_timeout_secs: Option<u64>,

    /// Default location for corpus, model and report files
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-classifier");

        Self {
            window: WindowConfig::default(),
            split: SplitConfig::default(),
            svm: TrainParams::default(),
            scaling: None,
            source: SourceLayout::default(),
            training_timeout_secs: None,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults if
    /// the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-classifier")
            .join("config.json")
    }

    /// Check every section for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window_spec()?;
        self.split.validate()?;
        self.svm.validate()?;
        if let Some(scaling) = &self.scaling {
            scaling.validate()?;
        }
        self.source.validate()?;
        if self.training_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "training_timeout_secs must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Validated window geometry.
    pub fn window_spec(&self) -> Result<WindowSpec, ConfigError> {
        WindowSpec::new(self.window.window_size, self.window.stride)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Window size and stride, both counted in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub window_size: usize,
    pub stride: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        // 2 s windows advanced by 1 s at 100 Hz
        Self {
            window_size: 200,
            stride: 100,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KernelType;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.window_size, 200);
        assert_eq!(config.window.stride, 100);
        assert_eq!(config.split.test_fraction, 0.2);
        assert_eq!(config.svm.kernel, KernelType::Rbf);
        assert!(config.scaling.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "window": { "stride": 50 }, "svm": { "c": 4.0 } }"#)
                .unwrap();
        assert_eq!(config.window.window_size, 200);
        assert_eq!(config.window.stride, 50);
        assert_eq!(config.svm.c, 4.0);
        assert_eq!(config.svm.gamma, 0.5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.window.stride = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.split.test_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.window.window_size = 128;
        config.scaling = Some(ScalingConfig::default());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.window.window_size, 128);
        assert!(loaded.scaling.is_some());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.window, WindowConfig::default());
    }
}
