//! Compiled binary asset formats shared by the offline builders and the
//! runtime loaders.
//!
//! All multi-byte integers are little-endian with no alignment padding.
//! Strings are NUL-terminated and laid out back-to-back, so decoders track a
//! running byte offset instead of fixed field sizes. Every file starts with a
//! 4-byte magic and a one-byte format version; there is no further
//! forward/backward compatibility — a layout change bumps the version and all
//! assets are rebuilt.
//!
//! # Invariants
//! - `decode(encode(x)) == x` for every file type.
//! - Builders and loaders agree byte-for-byte; the codecs here are the single
//!   source of truth for both sides.

mod codec;
mod dds;
mod effect;
mod material;
mod mesh;

pub use dds::{CompressedFormat, DdsMip, DdsTexture, DDS_FOURCC, MAX_TEXTURE_DIMENSION};
pub use effect::{EffectFile, RenderStates, EFFECT_MAGIC};
pub use material::{MaterialFile, MaterialUniform, MATERIAL_MAGIC, UNIFORM_RECORD_SIZE};
pub use mesh::{MeshFile, Vertex, MESH_MAGIC, VERTEX_STRIDE};

/// Current version written into every compiled asset file.
pub const FORMAT_VERSION: u8 = 1;

/// Errors produced while encoding or decoding a compiled asset.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported format version {found} (loader supports v{expected})")]
    UnsupportedVersion { found: u8, expected: u8 },
    #[error("file truncated while reading {0}")]
    Truncated(&'static str),
    #[error("string field {0} is not valid UTF-8")]
    InvalidString(&'static str),
    #[error("index count {0} is not a multiple of 3")]
    InvalidIndexCount(u32),
    #[error("uniform value count {0} is out of range (must be 1..=4)")]
    InvalidValueCount(u8),
    #[error("unknown shader stage tag {0}")]
    InvalidStage(u8),
    #[error("material has {0} uniforms, the format supports at most 255")]
    TooManyUniforms(usize),
    #[error("not a DDS file: fourCC is {0:?}")]
    NotADds([u8; 4]),
    #[error("unsupported texture compression fourCC {0:?}")]
    UnsupportedFourCc([u8; 4]),
    #[error("unsupported texture dimensions {0}x{1}")]
    BadDimensions(u32, u32),
    #[error("{0} trailing bytes after the last mip level")]
    TrailingData(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_magic_is_rejected_everywhere() {
        let mut bytes = MeshFile::default().encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            MeshFile::decode(&bytes),
            Err(FormatError::BadMagic { .. })
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut bytes = MeshFile::default().encode().unwrap();
        bytes[4] = FORMAT_VERSION + 1;
        assert!(matches!(
            MeshFile::decode(&bytes),
            Err(FormatError::UnsupportedVersion { .. })
        ));
    }
}
