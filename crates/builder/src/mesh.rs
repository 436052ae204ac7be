//! Mesh builder: JSON vertex/index description to the binary mesh format.
//!
//! Authoring conventions differ from the runtime's: colors are authored
//! as floats in [0, 1] and stored as bytes, and the v texture coordinate
//! is authored bottom-up and flipped here so the runtime samples with a
//! top-left origin.

use crate::{invalid, parse_source, read_source, write_target, BuildError};
use prism_formats::{MeshFile, Vertex};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct MeshDescription {
    vertices: Vec<VertexDescription>,
    indices: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct VertexDescription {
    position: [f32; 3],
    #[serde(default)]
    uv: [f32; 2],
    #[serde(default = "white")]
    color: [f32; 4],
}

fn white() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn quantize(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Build a binary mesh file from a JSON description.
pub fn build_mesh(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<(), BuildError> {
    let source = source.as_ref();
    let target = target.as_ref();

    let text = read_source(source)?;
    let description: MeshDescription = parse_source(source, &text)?;

    if description.vertices.is_empty() {
        return Err(invalid(source, "mesh has no vertices"));
    }
    if description.indices.is_empty() {
        return Err(invalid(source, "mesh has no indices"));
    }
    if description.indices.len() % 3 != 0 {
        return Err(invalid(
            source,
            format!(
                "index count {} is not a multiple of 3",
                description.indices.len()
            ),
        ));
    }
    let vertex_count = description.vertices.len() as u32;
    if let Some(out_of_range) = description.indices.iter().find(|&&i| i >= vertex_count) {
        return Err(invalid(
            source,
            format!("index {out_of_range} out of range for {vertex_count} vertices"),
        ));
    }

    let vertices = description
        .vertices
        .iter()
        .map(|v| Vertex {
            position: v.position,
            // Flip v so (0, 0) is the texture's top-left at runtime.
            uv: [v.uv[0], 1.0 - v.uv[1]],
            color: [
                quantize(v.color[0]),
                quantize(v.color[1]),
                quantize(v.color[2]),
                quantize(v.color[3]),
            ],
        })
        .collect();

    let file = MeshFile {
        vertices,
        indices: description.indices,
    };
    let bytes = file.encode().map_err(|source_error| BuildError::Encode {
        path: source.to_owned(),
        source: source_error,
    })?;
    write_target(target, &bytes)?;
    info!(
        source = %source.display(),
        target = %target.display(),
        triangles = file.triangle_count(),
        "mesh built"
    );
    Ok(())
}
