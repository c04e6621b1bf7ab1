//! Configuration for the courseflow binary

use courseflow_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseflowConfig {
    /// Orchestration limits
    #[serde(default)]
    pub engine: EngineConfig,

    /// Where approval workflows are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workflow storage backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Lost when the process exits
    Memory,

    /// One JSON file per course
    File {
        #[serde(default = "default_storage_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File {
            path: default_storage_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".courseflow/workflows")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CourseflowConfig {
    /// Defaults, then the optional file, then `COURSEFLOW_*` variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&CourseflowConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // COURSEFLOW_ENGINE__MAX_STEPS=50, COURSEFLOW_STORAGE__TYPE=memory
        builder = builder.add_source(
            config::Environment::with_prefix("COURSEFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CourseflowConfig::default();
        assert_eq!(config.engine.max_steps, 1000);
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from(".courseflow/workflows")
            }
        );
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nmax_attempts = 5\n\n[storage]\ntype = \"memory\"\n\n[logging]\njson = true"
        )
        .unwrap();

        let config = CourseflowConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.engine.max_attempts, 5);
        assert_eq!(config.engine.max_steps, 1000);
        assert_eq!(config.storage, StorageConfig::Memory);
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = CourseflowConfig::load(Some("/nonexistent/courseflow")).unwrap();
        assert_eq!(config.engine.max_attempts, 3);
    }
}
