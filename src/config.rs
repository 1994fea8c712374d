use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::normalize_extension;
use crate::error::CatalogError;
use crate::params::SourceOptions;
use crate::store::default_metadata_root;
use crate::walker::DEFAULT_SEED_EXTENSION;

pub const DEFAULT_CONFIG_FILE: &str = "mrcat.json";
pub const DEFAULT_DATASET_NAME: &str = "mind";

/// Raw contents of `mrcat.json`. Every field may be overridden from the command line.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub metadata_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub include_phantom: Option<bool>,
    #[serde(default)]
    pub include_header: Option<bool>,
    #[serde(default)]
    pub seed_extension: Option<String>,
}

impl Config {
    /// Fields set in `overrides` replace the ones read from disk.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            schema_version: overrides.schema_version.or(self.schema_version),
            name: overrides.name.or(self.name),
            data_root: overrides.data_root.or(self.data_root),
            metadata_root: overrides.metadata_root.or(self.metadata_root),
            include_phantom: overrides.include_phantom.or(self.include_phantom),
            include_header: overrides.include_header.or(self.include_header),
            seed_extension: overrides.seed_extension.or(self.seed_extension),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub name: String,
    pub data_root: Utf8PathBuf,
    pub metadata_root: Utf8PathBuf,
    pub include_phantom: bool,
    pub include_header: bool,
    pub seed_extension: String,
}

impl DatasetConfig {
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            include_phantom: self.include_phantom,
            include_header: self.include_header,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path` (or `mrcat.json` in the working directory when present),
    /// applies `overrides` and validates the result.
    pub fn resolve(path: Option<&Utf8Path>, overrides: Config) -> Result<DatasetConfig, CatalogError> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(Utf8PathBuf::from(DEFAULT_CONFIG_FILE))
                .filter(|candidate| candidate.as_std_path().is_file()),
        };

        let config = match config_path {
            Some(config_path) => {
                let content = fs::read_to_string(config_path.as_std_path())
                    .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
                serde_json::from_str::<Config>(&content)
                    .map_err(|err| CatalogError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };

        Self::resolve_config(config.merge(overrides))
    }

    pub fn resolve_config(config: Config) -> Result<DatasetConfig, CatalogError> {
        if let Some(version) = config.schema_version.filter(|version| *version != 1) {
            return Err(CatalogError::InvalidConfig(format!(
                "unsupported schema_version {version}"
            )));
        }

        let name = config
            .name
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| DEFAULT_DATASET_NAME.to_string());
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(CatalogError::InvalidConfig(format!(
                "dataset name must be a non-empty file name, got {name:?}"
            )));
        }

        let data_root = config
            .data_root
            .ok_or_else(|| CatalogError::InvalidConfig("data_root is required".to_string()))?;
        if !data_root.as_std_path().is_dir() {
            return Err(CatalogError::DataRootMissing(data_root));
        }

        let metadata_root = match config.metadata_root {
            Some(root) => root,
            None => default_metadata_root()?,
        };

        let seed_extension = normalize_extension(
            config
                .seed_extension
                .as_deref()
                .unwrap_or(DEFAULT_SEED_EXTENSION),
        );
        if seed_extension.is_empty() {
            return Err(CatalogError::InvalidConfig(
                "seed_extension must not be empty".to_string(),
            ));
        }

        Ok(DatasetConfig {
            name,
            data_root,
            metadata_root,
            include_phantom: config.include_phantom.unwrap_or(false),
            include_header: config.include_header.unwrap_or(false),
            seed_extension,
        })
    }
}
