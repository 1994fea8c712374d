use std::fs::{self, File};
use std::io::Read;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{FileKind, stem_of};
use crate::error::CatalogError;
use crate::hierarchy::Parameters;

/// Produces the acquisition parameters carried by a single file.
///
/// An empty mapping means the file contributes nothing and no run is created for it.
pub trait ParameterSource {
    fn parameters(&self, path: &Utf8Path, kind: FileKind) -> Result<Parameters, CatalogError>;
}

/// Flags forwarded untouched by the walker to the parameter source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOptions {
    /// Keep localizer, scout, phantom and ACR acquisitions.
    pub include_phantom: bool,
    /// Merge NIfTI header fields of the matching image into sidecar parameters.
    pub include_header: bool,
}

static PHANTOM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(locali[sz]er|scout|phantom|aahead|\bacr\b)").expect("valid phantom pattern")
});

const PHANTOM_FIELDS: &[&str] = &["SeriesDescription", "ProtocolName"];

const NIFTI1_HEADER_LEN: usize = 348;

/// Reads JSON sidecars and NIfTI-1 headers from disk.
#[derive(Debug, Clone, Default)]
pub struct SidecarSource {
    options: SourceOptions,
}

impl SidecarSource {
    pub fn new(options: SourceOptions) -> Self {
        Self { options }
    }

    fn read_sidecar(&self, path: &Utf8Path) -> Result<Parameters, CatalogError> {
        let content = fs::read(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        let value: Value = serde_json::from_slice(&content).map_err(|err| CatalogError::Sidecar {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(CatalogError::Sidecar {
                path: path.to_path_buf(),
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }

    fn is_phantom(path: &Utf8Path, params: &Parameters) -> bool {
        let file_name = path.file_name().unwrap_or_default();
        PHANTOM_PATTERN.is_match(file_name)
            || PHANTOM_FIELDS
                .iter()
                .filter_map(|field| params.get(*field).and_then(Value::as_str))
                .any(|text| PHANTOM_PATTERN.is_match(text))
    }
}

impl ParameterSource for SidecarSource {
    fn parameters(&self, path: &Utf8Path, kind: FileKind) -> Result<Parameters, CatalogError> {
        let mut params = match kind {
            FileKind::Sidecar => self.read_sidecar(path)?,
            FileKind::RawImage => read_nifti_header(path)?,
        };

        if !self.options.include_phantom && Self::is_phantom(path, &params) {
            tracing::debug!(%path, "skipping phantom/localizer acquisition");
            return Ok(Parameters::new());
        }

        if kind == FileKind::Sidecar
            && self.options.include_header
            && !params.is_empty()
            && let Some(image) = matching_image(path)
        {
            for (key, value) in read_nifti_header(&image)? {
                params.entry(key).or_insert(value);
            }
        }

        Ok(params)
    }
}

/// Finds the image sharing the sidecar's stem, preferring uncompressed files.
pub fn matching_image(sidecar: &Utf8Path) -> Option<Utf8PathBuf> {
    let file_name = sidecar.file_name()?;
    let stem = stem_of(file_name);
    let dir = sidecar.parent()?;
    FileKind::RAW_IMAGE_EXTENSIONS
        .iter()
        .rev()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.as_std_path().is_file())
}

/// Reads the dimension and voxel fields of a NIfTI-1 header.
pub fn read_nifti_header(path: &Utf8Path) -> Result<Parameters, CatalogError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("open {path}: {err}")))?;
    let gzipped = path.as_str().to_ascii_lowercase().ends_with(".gz");
    let mut reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut header = [0u8; NIFTI1_HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(|err| CatalogError::NiftiHeader {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    parse_nifti_header(&header).map_err(|reason| CatalogError::NiftiHeader {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_nifti_header(header: &[u8; NIFTI1_HEADER_LEN]) -> Result<Parameters, String> {
    let sizeof_hdr = [header[0], header[1], header[2], header[3]];
    let little_endian = if i32::from_le_bytes(sizeof_hdr) == NIFTI1_HEADER_LEN as i32 {
        true
    } else if i32::from_be_bytes(sizeof_hdr) == NIFTI1_HEADER_LEN as i32 {
        false
    } else {
        return Err("sizeof_hdr is not 348".to_string());
    };
    let magic = &header[344..348];
    if magic != b"n+1\0" && magic != b"ni1\0" {
        return Err("missing NIfTI-1 magic".to_string());
    }

    let read_i16 = |offset: usize| {
        let bytes = [header[offset], header[offset + 1]];
        if little_endian {
            i16::from_le_bytes(bytes)
        } else {
            i16::from_be_bytes(bytes)
        }
    };
    let read_f32 = |offset: usize| {
        let bytes = [
            header[offset],
            header[offset + 1],
            header[offset + 2],
            header[offset + 3],
        ];
        if little_endian {
            f32::from_le_bytes(bytes)
        } else {
            f32::from_be_bytes(bytes)
        }
    };

    let ndim = read_i16(40);
    if !(1..=7).contains(&ndim) {
        return Err(format!("dim[0] out of range: {ndim}"));
    }
    let ndim = ndim as usize;
    let dims = (1..=ndim).map(|i| read_i16(40 + 2 * i)).collect::<Vec<_>>();
    let pixdims = (1..=ndim)
        .map(|i| f64::from(read_f32(76 + 4 * i)))
        .collect::<Vec<_>>();

    let mut params = Parameters::new();
    params.insert("NiftiDim".to_string(), json!(dims));
    params.insert("NiftiPixDim".to_string(), json!(pixdims));
    params.insert("NiftiDataType".to_string(), json!(read_i16(70)));
    params.insert("NiftiBitPix".to_string(), json!(read_i16(72)));
    Ok(params)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
