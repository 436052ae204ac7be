//! Material builder: effect reference, texture binding, named uniforms.

use crate::{invalid, parse_source, read_source, write_target, BuildError};
use prism_common::ShaderStage;
use prism_formats::{MaterialFile, MaterialUniform};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct MaterialDescription {
    effect: String,
    sampler: String,
    texture: String,
    #[serde(default)]
    uniforms: Vec<UniformDescription>,
}

#[derive(Debug, Deserialize)]
struct UniformDescription {
    name: String,
    values: Vec<f32>,
    #[serde(default = "fragment")]
    stage: ShaderStage,
}

fn fragment() -> ShaderStage {
    ShaderStage::Fragment
}

/// Build a binary material file from a JSON description.
pub fn build_material(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
) -> Result<(), BuildError> {
    let source = source.as_ref();
    let target = target.as_ref();

    let text = read_source(source)?;
    let description: MaterialDescription = parse_source(source, &text)?;
    if description.effect.is_empty() {
        return Err(invalid(source, "an effect path is required"));
    }
    if description.sampler.is_empty() || description.texture.is_empty() {
        return Err(invalid(source, "a sampler name and texture path are required"));
    }

    let mut uniforms = Vec::with_capacity(description.uniforms.len());
    for uniform in &description.uniforms {
        if uniform.name.is_empty() {
            return Err(invalid(source, "uniform with an empty name"));
        }
        if uniform.values.is_empty() || uniform.values.len() > 4 {
            return Err(invalid(
                source,
                format!(
                    "uniform {} has {} values, expected 1 to 4",
                    uniform.name,
                    uniform.values.len()
                ),
            ));
        }
        let mut values = [0.0f32; 4];
        values[..uniform.values.len()].copy_from_slice(&uniform.values);
        uniforms.push(MaterialUniform {
            name: uniform.name.clone(),
            values,
            value_count: uniform.values.len() as u8,
            stage: uniform.stage,
        });
    }

    let file = MaterialFile {
        effect_path: description.effect,
        sampler_name: description.sampler,
        texture_path: description.texture,
        uniforms,
    };
    let bytes = file.encode().map_err(|source_error| BuildError::Encode {
        path: source.to_owned(),
        source: source_error,
    })?;
    write_target(target, &bytes)?;
    info!(
        source = %source.display(),
        target = %target.display(),
        uniforms = file.uniforms.len(),
        "material built"
    );
    Ok(())
}
