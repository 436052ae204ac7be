//! Compiled effect format.
//!
//! Layout: `[magic][version][render_states: u8][vertex_shader_path: cstr]
//! [fragment_shader_path: cstr]`.

use crate::codec::{write_cstr, write_header, Reader};
use crate::FormatError;
use bitflags::bitflags;

pub const EFFECT_MAGIC: [u8; 4] = *b"PEFX";

bitflags! {
    /// Fixed-function render states authored per effect.
    ///
    /// The ALPHA bit is also the sole determinant of which render list a
    /// renderable joins: set means transparent, clear means opaque.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RenderStates: u8 {
        const ALPHA = 1;
        const DEPTH_TEST = 1 << 1;
        const DEPTH_WRITE = 1 << 2;
        const FACE_CULLING = 1 << 3;
    }
}

/// Decoded contents of a compiled effect file.
///
/// The shader paths reference the stage sources to compile at load time;
/// they are stored relative to the runtime working directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectFile {
    pub render_states: RenderStates,
    pub vertex_shader_path: String,
    pub fragment_shader_path: String,
}

impl EffectFile {
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::new();
        write_header(&mut out, EFFECT_MAGIC);
        out.push(self.render_states.bits());
        write_cstr(&mut out, &self.vertex_shader_path);
        write_cstr(&mut out, &self.fragment_shader_path);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = Reader::new(bytes);
        reader.header(EFFECT_MAGIC)?;
        // Unknown bits are preserved rather than rejected; only the low four
        // are ever written by the builder.
        let render_states = RenderStates::from_bits_retain(reader.u8("render states")?);
        let vertex_shader_path = reader.cstr("vertex shader path")?;
        let fragment_shader_path = reader.cstr("fragment shader path")?;
        Ok(Self {
            render_states,
            vertex_shader_path,
            fragment_shader_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_state_bits_match_the_authored_contract() {
        let mask = RenderStates::ALPHA | RenderStates::DEPTH_TEST | RenderStates::FACE_CULLING;
        assert_eq!(mask.bits(), 0b1011);
        assert!(!mask.contains(RenderStates::DEPTH_WRITE));
    }

    #[test]
    fn effect_round_trips() {
        let effect = EffectFile {
            render_states: RenderStates::DEPTH_TEST | RenderStates::DEPTH_WRITE,
            vertex_shader_path: "shaders/standard.vs.wgsl".into(),
            fragment_shader_path: "shaders/standard.fs.wgsl".into(),
        };
        let decoded = EffectFile::decode(&effect.encode().unwrap()).unwrap();
        assert_eq!(decoded, effect);
    }

    #[test]
    fn mask_byte_sits_right_after_the_header() {
        let effect = EffectFile {
            render_states: RenderStates::ALPHA,
            vertex_shader_path: "v".into(),
            fragment_shader_path: "f".into(),
        };
        let bytes = effect.encode().unwrap();
        assert_eq!(bytes[5], 1);
        // Paths are back-to-back NUL-terminated strings.
        assert_eq!(&bytes[6..], b"v\0f\0");
    }
}
