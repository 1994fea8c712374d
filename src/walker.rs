use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{Coordinate, FileKind, extension_of, normalize_extension};
use crate::error::CatalogError;
use crate::hierarchy::{Modality, Project, Run, Session, Subject};
use crate::params::ParameterSource;

pub const DEFAULT_SEED_EXTENSION: &str = "json";

/// Builds a [`Project`] from the seed files found under a data root.
pub struct Walker<'a> {
    root: Utf8PathBuf,
    seed_extension: String,
    source: &'a dyn ParameterSource,
    sink: &'a dyn ProgressSink,
}

impl<'a> Walker<'a> {
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        source: &'a dyn ParameterSource,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            root: root.into(),
            seed_extension: DEFAULT_SEED_EXTENSION.to_string(),
            source,
            sink,
        }
    }

    /// Changes the extension that marks a file as a unit of work.
    pub fn with_seed_extension(mut self, extension: &str) -> Self {
        self.seed_extension = normalize_extension(extension);
        self
    }

    /// Lazily yields every regular file under the root carrying the seed extension.
    ///
    /// Order follows the filesystem and is not stable across runs.
    pub fn seed_files(&self) -> impl Iterator<Item = Result<Utf8PathBuf, CatalogError>> + '_ {
        WalkDir::new(self.root.as_std_path())
            .follow_links(false)
            .into_iter()
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => return Some(Err(CatalogError::Filesystem(err.to_string()))),
                };
                // Annexed datasets store files as symlinks; directory links stay unfollowed.
                let is_file = if entry.path_is_symlink() {
                    entry.path().is_file()
                } else {
                    entry.file_type().is_file()
                };
                if !is_file {
                    return None;
                }
                let name = entry.file_name().to_string_lossy();
                if extension_of(&name).as_deref() != Some(self.seed_extension.as_str()) {
                    return None;
                }
                Some(
                    Utf8PathBuf::from_path_buf(entry.into_path())
                        .map_err(|path| CatalogError::NonUtf8Path(path.display().to_string())),
                )
            })
    }

    /// Walks the root to completion and returns the pruned catalog.
    pub fn build(&self, name: &str) -> Result<Project, CatalogError> {
        let start = Instant::now();
        self.sink.event(ProgressEvent {
            message: format!("phase=Walk; scanning {}", self.root),
            elapsed: None,
        });

        let mut project = Project::new(name);
        let mut seeds = 0usize;
        for file in self.seed_files() {
            let file = file?;
            seeds += 1;
            let coordinate = Coordinate::from_path(&self.root, &file)?;
            tracing::debug!(%file, %coordinate, "visiting seed file");
            self.visit(&mut project, &coordinate, &file)?;
        }

        if project.is_empty() {
            return Err(CatalogError::EmptyDataset(self.root.clone()));
        }

        let counts = project.counts();
        self.sink.event(ProgressEvent {
            message: format!(
                "phase=Walk; {seeds} seed files -> {} modalities, {} subjects, {} sessions, {} runs",
                counts.modalities, counts.subjects, counts.sessions, counts.runs
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(project)
    }

    fn visit(
        &self,
        project: &mut Project,
        coordinate: &Coordinate,
        file: &Utf8Path,
    ) -> Result<(), CatalogError> {
        let mut modality = project
            .detach(&coordinate.modality)
            .unwrap_or_else(|| Modality::new(&coordinate.modality));
        let mut subject = modality
            .detach(&coordinate.subject)
            .unwrap_or_else(|| Subject::new(&coordinate.subject));

        // A session is parsed from the first seed file seen at its coordinate only.
        if subject.get(&coordinate.session).is_none() {
            let mut session = Session::new(&coordinate.session);
            self.parse(&mut session, file)?;
            if !session.is_empty() {
                subject.attach(session)?;
            }
        } else {
            tracing::debug!(%file, "session already indexed, skipping");
        }

        if !subject.is_empty() {
            modality.attach(subject)?;
        }
        if !modality.is_empty() {
            project.attach(modality)?;
        }
        Ok(())
    }

    fn parse(&self, session: &mut Session, file: &Utf8Path) -> Result<(), CatalogError> {
        let kind = FileKind::from_path(file)?;
        let params = self.source.parameters(file, kind)?;
        if params.is_empty() {
            tracing::debug!(%file, "no acquisition parameters");
            return Ok(());
        }

        let run_name = file
            .file_name()
            .ok_or_else(|| CatalogError::InvalidLayout(file.to_path_buf()))?;
        let mut run = session
            .detach(run_name)
            .unwrap_or_else(|| Run::new(run_name));
        run.merge(params);
        session.attach(run)?;
        Ok(())
    }
}
