use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::PartitionNaming;
use crate::error::TripError;

pub const DEFAULT_CONFIG_FILE: &str = "long-trips.json";
pub const DEFAULT_SOURCE_LIST: &str = "./selected_data_urls.txt";
pub const DEFAULT_DATA_DIR: &str = "./Data";
pub const DEFAULT_RESULTS_DIR: &str = "./Results";
pub const DEFAULT_COLUMN: &str = "Trip_Distance";
pub const DEFAULT_QUANTILE: f64 = 0.9;
pub const DEFAULT_WAIT_SECS: f64 = 1.0;
pub const DEFAULT_EXTENSION: &str = "parquet";
pub const DEFAULT_OUTPUT_PREFIX: &str = "LongTrips";
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// On-disk configuration. Every field is optional and falls back to the defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub source_list: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub results_dir: Option<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub quantile: Option<f64>,
    #[serde(default)]
    pub wait_secs: Option<f64>,
    #[serde(default)]
    pub retries: Option<usize>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub output_prefix: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_list: Option<String>,
    pub data_dir: Option<String>,
    pub results_dir: Option<String>,
    pub column: Option<String>,
    pub quantile: Option<f64>,
    pub wait_secs: Option<f64>,
    pub retries: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_list: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub results_dir: Utf8PathBuf,
    pub column: String,
    pub quantile: f64,
    pub wait: Duration,
    pub retries: usize,
    pub extension: String,
    pub output_prefix: String,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_list: Utf8PathBuf::from(DEFAULT_SOURCE_LIST),
            data_dir: Utf8PathBuf::from(DEFAULT_DATA_DIR),
            results_dir: Utf8PathBuf::from(DEFAULT_RESULTS_DIR),
            column: DEFAULT_COLUMN.to_string(),
            quantile: DEFAULT_QUANTILE,
            wait: Duration::from_secs_f64(DEFAULT_WAIT_SECS),
            retries: 0,
            extension: DEFAULT_EXTENSION.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn naming(&self) -> Result<PartitionNaming, TripError> {
        PartitionNaming::new(&self.output_prefix, &self.extension)
    }

    pub fn validate(&self) -> Result<(), TripError> {
        if !(0.0..=1.0).contains(&self.quantile) {
            return Err(TripError::InvalidQuantile(self.quantile));
        }
        if self.column.trim().is_empty() {
            return Err(TripError::InvalidConfig("column must not be empty".to_string()));
        }
        if self.extension.trim().is_empty() {
            return Err(TripError::InvalidConfig(
                "extension must not be empty".to_string(),
            ));
        }
        if self.output_prefix.trim().is_empty() {
            return Err(TripError::InvalidConfig(
                "output_prefix must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TripError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path` (or `long-trips.json` when present) and layers `overrides` on top.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<PipelineConfig, TripError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default(), overrides);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| TripError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TripError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<PipelineConfig, TripError> {
        let defaults = PipelineConfig::default();

        let wait_secs = overrides
            .wait_secs
            .or(config.wait_secs)
            .unwrap_or(DEFAULT_WAIT_SECS);
        let wait = Duration::try_from_secs_f64(wait_secs).map_err(|_| {
            TripError::InvalidConfig(format!("wait_secs must be non-negative, got {wait_secs}"))
        })?;

        let resolved = PipelineConfig {
            source_list: overrides
                .source_list
                .or(config.source_list)
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.source_list),
            data_dir: overrides
                .data_dir
                .or(config.data_dir)
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.data_dir),
            results_dir: overrides
                .results_dir
                .or(config.results_dir)
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.results_dir),
            column: overrides
                .column
                .or(config.column)
                .unwrap_or(defaults.column),
            quantile: overrides
                .quantile
                .or(config.quantile)
                .unwrap_or(defaults.quantile),
            wait,
            retries: overrides
                .retries
                .or(config.retries)
                .unwrap_or(defaults.retries),
            extension: config.extension.unwrap_or(defaults.extension),
            output_prefix: config.output_prefix.unwrap_or(defaults.output_prefix),
            batch_size: config.batch_size.unwrap_or(defaults.batch_size),
        };

        resolved.validate()?;
        Ok(resolved)
    }
}
