use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// File kinds the parameter extraction understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    /// JSON sidecar carrying acquisition parameters.
    Sidecar,
    /// NIfTI-1 image, plain or gzip-compressed.
    RawImage,
}

impl FileKind {
    pub const SIDECAR_EXTENSIONS: &'static [&'static str] = &["json"];
    pub const RAW_IMAGE_EXTENSIONS: &'static [&'static str] = &["nii.gz", "nii"];

    /// Classifies a file by its (possibly multi-part) extension.
    pub fn from_path(path: &Utf8Path) -> Result<Self, CatalogError> {
        let name = path.file_name().unwrap_or_default();
        extension_of(name)
            .and_then(|ext| ext.parse().ok())
            .ok_or_else(|| CatalogError::UnsupportedFileType(path.to_path_buf()))
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Sidecar => write!(f, "sidecar"),
            FileKind::RawImage => write!(f, "raw-image"),
        }
    }
}

impl FromStr for FileKind {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_extension(value);
        if FileKind::SIDECAR_EXTENSIONS.contains(&normalized.as_str()) {
            return Ok(FileKind::Sidecar);
        }
        if FileKind::RAW_IMAGE_EXTENSIONS.contains(&normalized.as_str()) {
            return Ok(FileKind::RawImage);
        }
        Err(CatalogError::UnsupportedFileType(normalized.into()))
    }
}

/// Lowercases an extension and strips a leading dot: `.NII.gz` becomes `nii.gz`.
pub fn normalize_extension(value: &str) -> String {
    value.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Returns the extension of a file name, treating `.nii.gz` as a single extension.
pub fn extension_of(file_name: &str) -> Option<String> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".nii.gz") && lower.len() > ".nii.gz".len() {
        return Some("nii.gz".to_string());
    }
    let (stem, ext) = lower.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_string())
}

/// Strips the extension reported by [`extension_of`] from a file name.
pub fn stem_of(file_name: &str) -> &str {
    match extension_of(file_name) {
        Some(ext) => &file_name[..file_name.len() - ext.len() - 1],
        None => file_name,
    }
}

/// Position of a run in the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub modality: String,
    pub subject: String,
    pub session: String,
    pub run: String,
}

impl Coordinate {
    /// Derives the coordinate of `file` relative to `root`.
    ///
    /// The three directories directly above the file are read as
    /// `subject/session/modality`; the file name is the run. Anything above
    /// those three levels is ignored, anything shallower is an
    /// [`CatalogError::InvalidLayout`].
    pub fn from_path(root: &Utf8Path, file: &Utf8Path) -> Result<Self, CatalogError> {
        let relative = file
            .strip_prefix(root)
            .map_err(|_| CatalogError::InvalidLayout(file.to_path_buf()))?;
        let segments = relative
            .components()
            .map(|component| component.as_str())
            .collect::<Vec<_>>();
        let [.., subject, session, modality, run] = segments.as_slice() else {
            return Err(CatalogError::InvalidLayout(file.to_path_buf()));
        };
        if [subject, session, modality]
            .iter()
            .any(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(CatalogError::InvalidLayout(file.to_path_buf()));
        }
        Ok(Self {
            modality: modality.to_string(),
            subject: subject.to_string(),
            session: session.to_string(),
            run: run.to_string(),
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.modality, self.subject, self.session, self.run
        )
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(
            FileKind::from_path(Utf8Path::new("a/sub-01_T1w.json")).unwrap(),
            FileKind::Sidecar
        );
        assert_eq!(
            FileKind::from_path(Utf8Path::new("a/sub-01_T1w.nii")).unwrap(),
            FileKind::RawImage
        );
        assert_eq!(
            FileKind::from_path(Utf8Path::new("a/sub-01_T1w.NII.GZ")).unwrap(),
            FileKind::RawImage
        );
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = FileKind::from_path(Utf8Path::new("a/notes.txt")).unwrap_err();
        assert_matches!(err, CatalogError::UnsupportedFileType(_));
        let err = FileKind::from_path(Utf8Path::new("a/README")).unwrap_err();
        assert_matches!(err, CatalogError::UnsupportedFileType(_));
    }

    #[test]
    fn stems_drop_compound_extension() {
        assert_eq!(stem_of("sub-01_bold.nii.gz"), "sub-01_bold");
        assert_eq!(stem_of("sub-01_bold.json"), "sub-01_bold");
        assert_eq!(stem_of("README"), "README");
    }

    #[test]
    fn parses_extension_with_leading_dot() {
        assert_eq!(".JSON".parse::<FileKind>().unwrap(), FileKind::Sidecar);
        assert_eq!("nii.gz".parse::<FileKind>().unwrap(), FileKind::RawImage);
    }
}
