use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::DatasetConfig;
use crate::error::CatalogError;
use crate::hierarchy::{Named, Project, TreeCounts};
use crate::params::{ParameterSource, SidecarSource};
use crate::store::{CacheState, CachedCatalog, Store};
use crate::walker::Walker;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Ignore an existing cache and rebuild from the data root.
    pub reindex: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAction {
    /// Walked the data root and persisted the result.
    Built,
    /// Reused the persisted catalog without touching the data root.
    Loaded,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub project: Project,
    pub action: IndexAction,
    pub cache_path: Utf8PathBuf,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexResult {
    pub dataset: String,
    pub action: IndexAction,
    pub cache_path: String,
    pub indexed_at: String,
    pub counts: TreeCounts,
}

impl From<&Catalog> for IndexResult {
    fn from(catalog: &Catalog) -> Self {
        Self {
            dataset: catalog.project.name().to_string(),
            action: catalog.action,
            cache_path: catalog.cache_path.to_string(),
            indexed_at: catalog.indexed_at.clone(),
            counts: catalog.project.counts(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunsResult {
    pub runs: Vec<RunEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub modality: String,
    pub subject: String,
    pub session: String,
    pub run: String,
    pub echo_time: f64,
    pub parameters: usize,
}

impl From<&Catalog> for RunsResult {
    fn from(catalog: &Catalog) -> Self {
        let runs = catalog
            .project
            .runs()
            .map(|(coordinate, run)| RunEntry {
                modality: coordinate.modality,
                subject: coordinate.subject,
                session: coordinate.session,
                run: coordinate.run,
                echo_time: run.echo_time(),
                parameters: run.params().len(),
            })
            .collect();
        Self { runs }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

/// Receives progress messages from indexing; the caller decides where they go.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Decides between reusing a persisted catalog and rebuilding it.
pub struct Indexer<S: ParameterSource> {
    store: Store,
    source: S,
}

impl<S: ParameterSource> Indexer<S> {
    pub fn new(store: Store, source: S) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the catalog for `config`, walking the data root only when the
    /// cache is cold or a reindex was requested.
    pub fn open(
        &self,
        config: &DatasetConfig,
        options: &IndexOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Catalog, CatalogError> {
        let cache_path = self.store.cache_path(&config.name);
        let state = self.store.state(&config.name);
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; cache {cache_path} is {state}"),
            elapsed: None,
        });

        match (state, options.reindex) {
            (CacheState::Warm, false) => self.load(config, cache_path, sink),
            (CacheState::Cold, _) | (CacheState::Warm, true) => {
                self.rebuild(config, cache_path, sink)
            }
        }
    }

    fn load(
        &self,
        config: &DatasetConfig,
        cache_path: Utf8PathBuf,
        sink: &dyn ProgressSink,
    ) -> Result<Catalog, CatalogError> {
        let start = Instant::now();
        let cached = Store::load(&cache_path)?;
        if cached.dataset != config.name {
            return Err(CatalogError::CacheLoad {
                path: cache_path,
                reason: format!(
                    "cache belongs to dataset {}, expected {}",
                    cached.dataset, config.name
                ),
            });
        }
        sink.event(ProgressEvent {
            message: "phase=Store; using cached catalog".to_string(),
            elapsed: Some(start.elapsed()),
        });
        Ok(Catalog {
            project: cached.project,
            action: IndexAction::Loaded,
            cache_path,
            indexed_at: cached.indexed_at,
        })
    }

    fn rebuild(
        &self,
        config: &DatasetConfig,
        cache_path: Utf8PathBuf,
        sink: &dyn ProgressSink,
    ) -> Result<Catalog, CatalogError> {
        let walker = Walker::new(config.data_root.clone(), &self.source, sink)
            .with_seed_extension(&config.seed_extension);
        let project = walker.build(&config.name)?;

        let cached = CachedCatalog::new(&config.data_root, project);
        sink.event(ProgressEvent {
            message: "phase=Store; writing catalog".to_string(),
            elapsed: None,
        });
        self.store.persist(&cache_path, &cached)?;
        tracing::debug!(%cache_path, "catalog persisted");

        Ok(Catalog {
            project: cached.project,
            action: IndexAction::Built,
            cache_path,
            indexed_at: cached.indexed_at,
        })
    }
}

/// Opens a dataset with the bundled [`SidecarSource`] configured from `config`.
pub fn open_dataset(
    config: &DatasetConfig,
    options: &IndexOptions,
    sink: &dyn ProgressSink,
) -> Result<Catalog, CatalogError> {
    let store = Store::new_with_root(config.metadata_root.clone());
    let indexer = Indexer::new(store, SidecarSource::new(config.source_options()));
    indexer.open(config, options, sink)
}
