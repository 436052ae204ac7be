//! Effect builder: shader paths plus four boolean render states.

use crate::{invalid, parse_source, read_source, write_target, BuildError};
use prism_formats::{EffectFile, RenderStates};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct EffectDescription {
    vertex_shader: String,
    fragment_shader: String,
    #[serde(default)]
    render_states: RenderStateDescription,
}

/// Defaults match typical opaque geometry: no blending, full depth
/// buffering, back faces culled.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RenderStateDescription {
    alpha_transparency: bool,
    depth_testing: bool,
    depth_writing: bool,
    face_culling: bool,
}

impl Default for RenderStateDescription {
    fn default() -> Self {
        Self {
            alpha_transparency: false,
            depth_testing: true,
            depth_writing: true,
            face_culling: true,
        }
    }
}

impl RenderStateDescription {
    fn to_mask(&self) -> RenderStates {
        let mut states = RenderStates::empty();
        states.set(RenderStates::ALPHA, self.alpha_transparency);
        states.set(RenderStates::DEPTH_TEST, self.depth_testing);
        states.set(RenderStates::DEPTH_WRITE, self.depth_writing);
        states.set(RenderStates::FACE_CULLING, self.face_culling);
        states
    }
}

/// Build a binary effect file from a JSON description.
pub fn build_effect(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<(), BuildError> {
    let source = source.as_ref();
    let target = target.as_ref();

    let text = read_source(source)?;
    let description: EffectDescription = parse_source(source, &text)?;
    if description.vertex_shader.is_empty() || description.fragment_shader.is_empty() {
        return Err(invalid(source, "both shader paths are required"));
    }

    let file = EffectFile {
        render_states: description.render_states.to_mask(),
        vertex_shader_path: description.vertex_shader,
        fragment_shader_path: description.fragment_shader,
    };
    let bytes = file.encode().map_err(|source_error| BuildError::Encode {
        path: source.to_owned(),
        source: source_error,
    })?;
    write_target(target, &bytes)?;
    info!(
        source = %source.display(),
        target = %target.display(),
        states = ?file.render_states,
        "effect built"
    );
    Ok(())
}
