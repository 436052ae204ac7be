use prism_common::ShaderStage;
use prism_formats::FormatError;
use std::path::PathBuf;

/// Errors from resource loading and the per-frame draw protocol.
///
/// Loaders surface these to the caller; a failed load is fatal to that
/// asset and the caller must not register a renderable built from it.
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad asset data in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("failed to allocate {bytes} bytes of host memory")]
    Allocation { bytes: u64 },
    #[error("GPU device rejected {operation}")]
    Device { operation: String },
    #[error("{stage:?} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
    #[error("mandatory uniform {name:?} could not be resolved")]
    MissingUniform { name: String },
    #[error("{count} GPU objects still alive after shutdown")]
    ResourceLeak { count: usize },
}

impl GfxError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, source: FormatError) -> Self {
        Self::Format {
            path: path.into(),
            source,
        }
    }

    pub fn device(operation: impl Into<String>) -> Self {
        Self::Device {
            operation: operation.into(),
        }
    }
}
