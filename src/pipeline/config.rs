//! Pipeline configuration.
//!
//! Two layers of configuration feed a run:
//!
//! - [`Settings`]: process-wide settings (warehouse URL, artifact path,
//!   timeouts), read from the environment and overridable from the CLI
//! - Step parameters: one YAML file per pipeline under `<root>/configs/`,
//!   shaped as `parameters: { ... }`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The parameter file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The parameter file is not valid YAML for this pipeline.
    #[error("Failed to parse '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Process-wide settings shared by every pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Warehouse location: a SQLite URL or path, or `memory`.
    pub database_url: String,
    /// Root directory for run records, outputs and the step cache.
    pub artifact_path: PathBuf,
    /// Bound on each category lookup during aggregation.
    pub lookup_timeout: Duration,
    /// Bound on each HTTP fetch during crawling.
    pub crawl_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://warehouse.db".to_string(),
            artifact_path: PathBuf::from("./artifacts"),
            lookup_timeout: Duration::from_secs(30),
            crawl_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: warehouse URL (default: sqlite://warehouse.db)
    /// - `ARTIFACT_PATH`: artifact root (default: ./artifacts)
    /// - `LOOKUP_TIMEOUT_SECS`: per-category lookup timeout (default: 30)
    /// - `CRAWL_TIMEOUT_SECS`: per-link fetch timeout (default: 30)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Ok(val) = std::env::var("DATABASE_URL") {
            settings.database_url = val;
        }

        if let Ok(val) = std::env::var("ARTIFACT_PATH") {
            settings.artifact_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("LOOKUP_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "LOOKUP_TIMEOUT_SECS")?;
            settings.lookup_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CRAWL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "CRAWL_TIMEOUT_SECS")?;
            settings.crawl_timeout = Duration::from_secs(secs);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.artifact_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "artifact_path cannot be empty".to_string(),
            ));
        }

        if self.lookup_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "lookup_timeout must be greater than 0".to_string(),
            ));
        }

        if self.crawl_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "crawl_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the warehouse URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the artifact root.
    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    /// Builder method to set the lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Builder method to set the crawl timeout.
    pub fn with_crawl_timeout(mut self, timeout: Duration) -> Self {
        self.crawl_timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ParameterFile<P> {
    parameters: P,
}

/// Reads the `parameters` section of a pipeline YAML file.
pub fn load_parameters<P: DeserializeOwned>(path: &Path) -> Result<P, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(path)?;
    parse_parameters(&raw, path)
}

fn parse_parameters<P: DeserializeOwned>(raw: &str, path: &Path) -> Result<P, ConfigError> {
    let file: ParameterFile<P> = serde_yaml::from_str(raw).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.parameters)
}

/// Parameters of the `digital_data_etl` pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlParameters {
    pub user_full_name: String,
    #[serde(default)]
    pub links: Vec<String>,
}

/// Parameters of the `feature_engineering` pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEngineeringParameters {
    pub author_full_names: Vec<String>,
}

impl FeatureEngineeringParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.author_full_names.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "author_full_names cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the `generate_instruct_datasets` pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructDatasetParameters {
    pub author_full_names: Vec<String>,
    /// Fraction of samples held out for the test split.
    #[serde(default = "default_test_split_size")]
    pub test_split_size: f64,
    /// Words per instruction sample.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Seed for the train/test shuffle; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_test_split_size() -> f64 {
    0.1
}

fn default_chunk_size() -> usize {
    200
}

impl InstructDatasetParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.author_full_names.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "author_full_names cannot be empty".to_string(),
            ));
        }

        if !(self.test_split_size > 0.0 && self.test_split_size < 1.0) {
            return Err(ConfigError::ValidationFailed(
                "test_split_size must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.database_url, "sqlite://warehouse.db");
        assert_eq!(settings.artifact_path, PathBuf::from("./artifacts"));
        assert_eq!(settings.lookup_timeout, Duration::from_secs(30));
        assert_eq!(settings.crawl_timeout, Duration::from_secs(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_builder() {
        let settings = Settings::new()
            .with_database_url("memory")
            .with_artifact_path("/tmp/artifacts")
            .with_lookup_timeout(Duration::from_secs(5))
            .with_crawl_timeout(Duration::from_secs(10));

        assert_eq!(settings.database_url, "memory");
        assert_eq!(settings.artifact_path, PathBuf::from("/tmp/artifacts"));
        assert_eq!(settings.lookup_timeout, Duration::from_secs(5));
        assert_eq!(settings.crawl_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validation_empty_database_url() {
        let result = Settings::default().with_database_url("  ").validate();
        assert!(result.unwrap_err().to_string().contains("database_url"));
    }

    #[test]
    fn test_validation_zero_timeouts() {
        let result = Settings::default()
            .with_lookup_timeout(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("lookup_timeout"));

        let result = Settings::default()
            .with_crawl_timeout(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("crawl_timeout"));
    }

    #[test]
    fn test_parse_env_value() {
        let value: u64 = parse_env_value("42", "X").unwrap();
        assert_eq!(value, 42);

        let err = parse_env_value::<u64>("abc", "LOOKUP_TIMEOUT_SECS").unwrap_err();
        assert!(err.to_string().contains("LOOKUP_TIMEOUT_SECS"));
    }

    #[test]
    fn test_parse_etl_parameters() {
        let raw = r#"
parameters:
  user_full_name: Paul Iusztin
  links:
    - https://medium.com/@pauliusztin/post-1
    - https://github.com/iusztinpaul/project
"#;
        let params: EtlParameters = parse_parameters(raw, Path::new("etl.yaml")).unwrap();
        assert_eq!(params.user_full_name, "Paul Iusztin");
        assert_eq!(params.links.len(), 2);
    }

    #[test]
    fn test_parse_instruct_defaults() {
        let raw = "parameters:\n  author_full_names: [Jane Doe]\n";
        let params: InstructDatasetParameters =
            parse_parameters(raw, Path::new("dataset.yaml")).unwrap();

        assert_eq!(params.author_full_names, vec!["Jane Doe".to_string()]);
        assert!((params.test_split_size - 0.1).abs() < f64::EPSILON);
        assert_eq!(params.chunk_size, 200);
        assert!(params.seed.is_none());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_instruct_validation() {
        let params = InstructDatasetParameters {
            author_full_names: vec!["Jane Doe".to_string()],
            test_split_size: 1.0,
            chunk_size: 10,
            seed: None,
        };
        assert!(params
            .validate()
            .unwrap_err()
            .to_string()
            .contains("test_split_size"));

        let params = InstructDatasetParameters {
            chunk_size: 0,
            test_split_size: 0.2,
            ..params
        };
        assert!(params.validate().unwrap_err().to_string().contains("chunk_size"));
    }

    #[test]
    fn test_feature_engineering_requires_authors() {
        let params = FeatureEngineeringParameters {
            author_full_names: Vec::new(),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_missing_parameters_section() {
        let result: Result<EtlParameters, _> =
            parse_parameters("user_full_name: x\n", Path::new("bad.yaml"));
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_load_parameters_missing_file() {
        let result: Result<EtlParameters, _> =
            load_parameters(Path::new("/nonexistent/configs/etl.yaml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
