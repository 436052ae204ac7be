//! Offline asset builders: human-authored JSON descriptions in, compact
//! binary runtime files out.
//!
//! Each builder reads one source file, validates it, and writes one
//! target file. Paths referenced by a description (shaders, textures,
//! effects) are copied into the output verbatim; resolving them is the
//! loader's job at runtime.

use std::path::{Path, PathBuf};

mod effect;
mod material;
mod mesh;

pub use effect::build_effect;
pub use material::build_material;
pub use mesh::build_mesh;

/// Errors produced while building an asset.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}: invalid description: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("{path}: encode failed: {source}")]
    Encode {
        path: PathBuf,
        source: prism_formats::FormatError,
    },
}

pub(crate) fn read_source(path: &Path) -> Result<String, BuildError> {
    std::fs::read_to_string(path).map_err(|source| BuildError::Read {
        path: path.to_owned(),
        source,
    })
}

pub(crate) fn parse_source<T: serde::de::DeserializeOwned>(
    path: &Path,
    text: &str,
) -> Result<T, BuildError> {
    serde_json::from_str(text).map_err(|source| BuildError::Parse {
        path: path.to_owned(),
        source,
    })
}

pub(crate) fn invalid(path: &Path, message: impl Into<String>) -> BuildError {
    BuildError::Invalid {
        path: path.to_owned(),
        message: message.into(),
    }
}

/// Write the encoded asset, creating the target directory if needed.
pub(crate) fn write_target(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| BuildError::Write {
                path: path.to_owned(),
                source,
            })?;
        }
    }
    std::fs::write(path, bytes).map_err(|source| BuildError::Write {
        path: path.to_owned(),
        source,
    })
}
