use std::fmt;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::error::CatalogError;
use crate::hierarchy::{Named, Project};

pub const CACHE_SCHEMA_VERSION: u32 = 1;

const CACHE_SUFFIX: &str = "catalog.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No catalog has been persisted for the dataset.
    Cold,
    /// A persisted catalog exists.
    Warm,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Cold => write!(f, "cold"),
            CacheState::Warm => write!(f, "warm"),
        }
    }
}

/// On-disk form of a catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCatalog {
    pub schema_version: u32,
    pub dataset: String,
    pub data_root: Utf8PathBuf,
    pub indexed_at: String,
    pub project: Project,
}

impl CachedCatalog {
    pub fn new(data_root: &Utf8Path, project: Project) -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            dataset: project.name().to_string(),
            data_root: data_root.to_path_buf(),
            indexed_at: chrono::Utc::now().to_rfc3339(),
            project,
        }
    }
}

/// Metadata directory holding one persisted catalog per dataset name.
#[derive(Debug, Clone)]
pub struct Store {
    metadata_root: Utf8PathBuf,
}

impl Store {
    pub fn new_with_root(metadata_root: Utf8PathBuf) -> Self {
        Self { metadata_root }
    }

    pub fn metadata_root(&self) -> &Utf8Path {
        &self.metadata_root
    }

    pub fn cache_path(&self, dataset: &str) -> Utf8PathBuf {
        self.metadata_root.join(format!("{dataset}.{CACHE_SUFFIX}"))
    }

    /// Presence of the cache file is the only thing that makes a dataset warm.
    pub fn state(&self, dataset: &str) -> CacheState {
        if self.cache_path(dataset).as_std_path().exists() {
            CacheState::Warm
        } else {
            CacheState::Cold
        }
    }

    pub fn ensure_metadata_root(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.metadata_root.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))
    }

    /// Writes the catalog through a temp file in the same directory, replacing any previous one.
    pub fn persist(&self, path: &Utf8Path, catalog: &CachedCatalog) -> Result<(), CatalogError> {
        let parent = path
            .parent()
            .ok_or_else(|| CatalogError::Filesystem("invalid cache path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(catalog)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("mri-catalog")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn load(path: &Utf8Path) -> Result<CachedCatalog, CatalogError> {
        let cache_error = |reason: String| CatalogError::CacheLoad {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| cache_error(err.to_string()))?;
        let catalog: CachedCatalog =
            serde_json::from_str(&content).map_err(|err| cache_error(err.to_string()))?;
        if catalog.schema_version != CACHE_SCHEMA_VERSION {
            return Err(cache_error(format!(
                "schema version {} is not supported (expected {CACHE_SCHEMA_VERSION})",
                catalog.schema_version
            )));
        }
        Ok(catalog)
    }
}

/// `~/.cache/mri-catalog`, used when no metadata root is configured.
pub fn default_metadata_root() -> Result<Utf8PathBuf, CatalogError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("mri-catalog")).ok()
        })
        .ok_or_else(|| CatalogError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::hierarchy::{Modality, Run, Session, Subject};

    fn sample_project() -> Project {
        let mut run = Run::new("sub-01_T1w.json");
        run.merge([("EchoTime".to_string(), serde_json::json!(0.0029))].into());
        let mut session = Session::new("ses-01");
        session.attach(run).unwrap();
        let mut subject = Subject::new("sub-01");
        subject.attach(session).unwrap();
        let mut modality = Modality::new("anat");
        modality.attach(subject).unwrap();
        let mut project = Project::new("demo");
        project.attach(modality).unwrap();
        project
    }

    #[test]
    fn cache_path_is_derived_from_dataset_name() {
        let store = Store::new_with_root(Utf8PathBuf::from("/tmp/meta"));
        assert_eq!(
            store.cache_path("demo"),
            Utf8PathBuf::from("/tmp/meta/demo.catalog.json")
        );
    }

    #[test]
    fn persisted_catalog_loads_back() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("meta")).unwrap();
        let store = Store::new_with_root(root);
        assert_eq!(store.state("demo"), CacheState::Cold);

        let path = store.cache_path("demo");
        let catalog = CachedCatalog::new(Utf8Path::new("/data"), sample_project());
        store.persist(&path, &catalog).unwrap();
        assert_eq!(store.state("demo"), CacheState::Warm);

        let loaded = Store::load(&path).unwrap();
        assert_eq!(loaded.project, catalog.project);
        assert_eq!(loaded.data_root, Utf8PathBuf::from("/data"));
    }

    #[test]
    fn corrupt_cache_is_a_load_error() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_root(root);
        let path = store.cache_path("demo");
        fs::write(&path, b"{ not json").unwrap();

        let err = Store::load(&path).unwrap_err();
        assert_matches!(err, CatalogError::CacheLoad { .. });
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_root(root);
        let path = store.cache_path("demo");
        let mut catalog = CachedCatalog::new(Utf8Path::new("/data"), sample_project());
        catalog.schema_version = CACHE_SCHEMA_VERSION + 1;
        store.persist(&path, &catalog).unwrap();

        let err = Store::load(&path).unwrap_err();
        assert_matches!(err, CatalogError::CacheLoad { reason, .. } => {
            assert!(reason.contains("schema version"));
        });
    }
}
