use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("expected sidecar files under {0}, found none that yield acquisition parameters")]
    #[diagnostic(help("check --data-root and that sidecars sit at subject/session/modality/file"))]
    EmptyDataset(Utf8PathBuf),

    #[error("unsupported file type: {0} (expected .json, .nii or .nii.gz)")]
    UnsupportedFileType(Utf8PathBuf),

    #[error("failed to load cached catalog at {path}: {reason}")]
    #[diagnostic(help("rerun with --reindex to rebuild the catalog"))]
    CacheLoad { path: Utf8PathBuf, reason: String },

    #[error("file is not nested as subject/session/modality/file under the data root: {0}")]
    InvalidLayout(Utf8PathBuf),

    #[error("{parent} already contains a child named {child}")]
    DuplicateNode { parent: String, child: String },

    #[error("invalid sidecar {path}: {reason}")]
    Sidecar { path: Utf8PathBuf, reason: String },

    #[error("invalid NIfTI header {path}: {reason}")]
    NiftiHeader { path: Utf8PathBuf, reason: String },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("data root does not exist or is not a directory: {0}")]
    DataRootMissing(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
