use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const DEFAULT_CONFIG_FILE: &str = "criteo-ingest.json";
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;
pub const DEFAULT_PART_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    #[default]
    Gzip,
    Snappy,
    Zstd,
    Uncompressed,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub max_rows_per_file: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub compression: Option<ParquetCompression>,
    #[serde(default)]
    pub delete_raw_after_convert: Option<bool>,
    #[serde(default)]
    pub delete_partitions_after_upload: Option<bool>,
    #[serde(default)]
    pub s3: Option<S3Config>,
    #[serde(default)]
    pub local_store_root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct S3Config {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub part_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub work_dir: Utf8PathBuf,
    pub max_rows_per_file: Option<usize>,
    pub batch_size: usize,
    pub compression: ParquetCompression,
    pub delete_raw_after_convert: bool,
    pub delete_partitions_after_upload: bool,
    pub s3: S3Config,
    pub local_store_root: Option<Utf8PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<PipelineConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<PipelineConfig, IngestError> {
        let work_dir = match config.work_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_work_dir()?,
        };

        if config.max_rows_per_file == Some(0) {
            return Err(IngestError::ConfigParse(
                "max_rows_per_file must be positive".to_string(),
            ));
        }
        let batch_size = config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(IngestError::ConfigParse(
                "batch_size must be positive".to_string(),
            ));
        }

        Ok(PipelineConfig {
            work_dir,
            max_rows_per_file: config.max_rows_per_file,
            batch_size,
            compression: config.compression.unwrap_or_default(),
            delete_raw_after_convert: config.delete_raw_after_convert.unwrap_or(false),
            delete_partitions_after_upload: config
                .delete_partitions_after_upload
                .unwrap_or(false),
            s3: config.s3.unwrap_or_default(),
            local_store_root: config.local_store_root.map(Utf8PathBuf::from),
        })
    }
}

pub fn default_work_dir() -> Result<Utf8PathBuf, IngestError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.cache_dir().join("criteo-ingest")).ok()
        })
        .ok_or_else(|| IngestError::Filesystem("unable to resolve cache directory".to_string()))
}
