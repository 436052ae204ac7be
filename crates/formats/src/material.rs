//! Compiled material format.
//!
//! Layout: `[magic][version][effect_path: cstr][sampler_name: cstr]
//! [texture_path: cstr][uniform_count: u8][records][names]`.
//!
//! Each uniform record is a fixed 26 bytes: a reserved 8-byte handle slot
//! (zero on disk, populated at load time by resolving the name against the
//! material's effect), four f32 values, the value count (1..=4) and the
//! shader stage tag. The names follow the record array as a NUL-terminated
//! sequence in the same order, and are only needed once, at load.

use crate::codec::{write_cstr, write_header, Reader};
use crate::FormatError;
use prism_common::ShaderStage;

pub const MATERIAL_MAGIC: [u8; 4] = *b"PMAT";

/// On-disk size of one uniform record.
pub const UNIFORM_RECORD_SIZE: usize = 8 + 16 + 1 + 1;

/// One named scalar/vector uniform binding.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialUniform {
    pub name: String,
    pub values: [f32; 4],
    pub value_count: u8,
    pub stage: ShaderStage,
}

/// Decoded contents of a compiled material file.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialFile {
    pub effect_path: String,
    pub sampler_name: String,
    pub texture_path: String,
    pub uniforms: Vec<MaterialUniform>,
}

impl MaterialFile {
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        if self.uniforms.len() > u8::MAX as usize {
            return Err(FormatError::TooManyUniforms(self.uniforms.len()));
        }
        let mut out = Vec::new();
        write_header(&mut out, MATERIAL_MAGIC);
        write_cstr(&mut out, &self.effect_path);
        write_cstr(&mut out, &self.sampler_name);
        write_cstr(&mut out, &self.texture_path);
        out.push(self.uniforms.len() as u8);
        for uniform in &self.uniforms {
            if uniform.value_count == 0 || uniform.value_count > 4 {
                return Err(FormatError::InvalidValueCount(uniform.value_count));
            }
            out.extend_from_slice(&0u64.to_le_bytes());
            for value in uniform.values {
                out.extend_from_slice(&value.to_le_bytes());
            }
            out.push(uniform.value_count);
            out.push(uniform.stage as u8);
        }
        for uniform in &self.uniforms {
            write_cstr(&mut out, &uniform.name);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = Reader::new(bytes);
        reader.header(MATERIAL_MAGIC)?;
        let effect_path = reader.cstr("effect path")?;
        let sampler_name = reader.cstr("sampler name")?;
        let texture_path = reader.cstr("texture path")?;

        let uniform_count = reader.u8("uniform count")? as usize;
        let mut uniforms = Vec::with_capacity(uniform_count);
        for _ in 0..uniform_count {
            // Reserved handle slot; the loader re-resolves it by name.
            let _ = reader.u64("uniform handle")?;
            let mut values = [0.0f32; 4];
            for value in &mut values {
                *value = reader.f32("uniform values")?;
            }
            let value_count = reader.u8("uniform value count")?;
            if value_count == 0 || value_count > 4 {
                return Err(FormatError::InvalidValueCount(value_count));
            }
            let stage_tag = reader.u8("uniform stage")?;
            let stage =
                ShaderStage::from_u8(stage_tag).ok_or(FormatError::InvalidStage(stage_tag))?;
            uniforms.push(MaterialUniform {
                name: String::new(),
                values,
                value_count,
                stage,
            });
        }
        // Names trail the fixed-size record array, same order.
        for uniform in &mut uniforms {
            uniform.name = reader.cstr("uniform name")?;
        }

        Ok(Self {
            effect_path,
            sampler_name,
            texture_path,
            uniforms,
        })
    }
}
