//! End-to-end: author JSON descriptions, build them, then load and draw
//! the results through the graphics layer.

use glam::{Quat, Vec3};
use prism_builder::{build_effect, build_material, build_mesh};
use prism_common::Camera;
use prism_gfx::{Graphics, TraceBackend, TraceEvent};
use std::path::Path;

/// Minimal DXT1 DDS file, enough for the loader to accept.
fn fake_dds(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0u8; 128];
    bytes[0..4].copy_from_slice(b"DDS ");
    bytes[4..8].copy_from_slice(&124u32.to_le_bytes());
    bytes[12..16].copy_from_slice(&height.to_le_bytes());
    bytes[16..20].copy_from_slice(&width.to_le_bytes());
    bytes[28..32].copy_from_slice(&1u32.to_le_bytes());
    bytes[84..88].copy_from_slice(b"DXT1");
    let blocks = width.div_ceil(4) as usize * height.div_ceil(4) as usize;
    bytes.extend(std::iter::repeat_n(0xab, blocks * 8));
    bytes
}

fn author_and_build(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let vs_path = dir.join("standard.vs.wgsl");
    let fs_path = dir.join("standard.fs.wgsl");
    std::fs::write(
        &vs_path,
        "local_to_world world_to_view view_to_screen",
    )
    .unwrap();
    std::fs::write(&fs_path, "g_diffuse g_color_modifier").unwrap();

    let mesh_source = dir.join("quad.json");
    std::fs::write(
        &mesh_source,
        r#"{
            "vertices": [
                { "position": [-1.0, -1.0, 0.0], "uv": [0.0, 0.0] },
                { "position": [ 1.0, -1.0, 0.0], "uv": [1.0, 0.0] },
                { "position": [ 1.0,  1.0, 0.0], "uv": [1.0, 1.0] },
                { "position": [-1.0,  1.0, 0.0], "uv": [0.0, 1.0] }
            ],
            "indices": [0, 1, 2, 2, 3, 0]
        }"#,
    )
    .unwrap();
    let mesh_target = dir.join("built/quad.mesh");
    build_mesh(&mesh_source, &mesh_target).unwrap();

    let effect_source = dir.join("standard.json");
    std::fs::write(
        &effect_source,
        format!(
            r#"{{ "vertex_shader": {vs:?}, "fragment_shader": {fs:?} }}"#,
            vs = vs_path.to_string_lossy(),
            fs = fs_path.to_string_lossy(),
        ),
    )
    .unwrap();
    let effect_target = dir.join("built/standard.effect");
    build_effect(&effect_source, &effect_target).unwrap();

    let texture_path = dir.join("stone.dds");
    std::fs::write(&texture_path, fake_dds(16, 16)).unwrap();

    let material_source = dir.join("stone.json");
    std::fs::write(
        &material_source,
        format!(
            r#"{{
                "effect": {effect:?},
                "sampler": "g_diffuse",
                "texture": {texture:?},
                "uniforms": [ {{ "name": "g_color_modifier", "values": [1.0, 1.0, 1.0] }} ]
            }}"#,
            effect = effect_target.to_string_lossy(),
            texture = texture_path.to_string_lossy(),
        ),
    )
    .unwrap();
    let material_target = dir.join("built/stone.material");
    build_material(&material_source, &material_target).unwrap();

    (mesh_target, material_target)
}

#[test]
fn built_assets_load_and_draw() {
    let dir = tempfile::tempdir().unwrap();
    let (mesh_path, material_path) = author_and_build(dir.path());

    let mut graphics = Graphics::initialize(TraceBackend::new());
    graphics
        .add_renderable(&mesh_path, &material_path, Vec3::ZERO, Quat::IDENTITY)
        .unwrap();
    graphics.render(&Camera::default(), 16.0 / 9.0).unwrap();
    assert_eq!(graphics.backend().draw_sequence().len(), 1);
    // The authored quad (4 vertices, 6 indices) draws as two triangles.
    let triangles = graphics
        .backend()
        .events()
        .iter()
        .find_map(|event| match event {
            TraceEvent::DrawMesh { triangle_count, .. } => Some(*triangle_count),
            _ => None,
        })
        .unwrap();
    assert_eq!(triangles, 2);
    graphics.shutdown().unwrap();
}
