//! WGSL reflection: uniform member offsets and binding names via naga.

use prism_common::ShaderStage;
use prism_gfx::GfxError;
use std::collections::HashMap;

/// Bind group holding the per-draw uniform structs.
pub(crate) const UNIFORM_GROUP: u32 = 0;
/// Binding of the transform struct within [`UNIFORM_GROUP`].
pub(crate) const TRANSFORMS_BINDING: u32 = 0;
/// Binding of the material parameter struct within [`UNIFORM_GROUP`].
pub(crate) const PARAMS_BINDING: u32 = 1;
/// Bind group holding the texture and sampler.
pub(crate) const TEXTURE_GROUP: u32 = 1;

/// Byte location of one member of the material parameter struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UniformSlot {
    pub offset: u32,
    pub size: u32,
}

/// Everything the backend needs to know about one compiled stage.
#[derive(Debug)]
pub(crate) struct StageReflection {
    pub entry_point: String,
    /// Members of the parameter struct, by name.
    pub uniforms: HashMap<String, UniformSlot>,
    /// Total byte size of the parameter struct, 0 when absent.
    pub params_size: u32,
    /// Members of the transform struct, by name.
    pub transforms: HashMap<String, u32>,
    /// Names of texture and sampler globals in [`TEXTURE_GROUP`].
    pub samplers: Vec<String>,
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parse and validate one WGSL stage, then reflect its bindings.
pub(crate) fn compile(stage: ShaderStage, source: &str) -> Result<StageReflection, GfxError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|error| GfxError::Compile {
        stage,
        log: error.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).map_err(|error| GfxError::Link {
        log: error.emit_to_string(source),
    })?;

    let entry_point = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == naga_stage(stage))
        .map(|entry| entry.name.clone())
        .ok_or_else(|| GfxError::Compile {
            stage,
            log: format!("no {stage:?} entry point in module"),
        })?;

    let mut uniforms = HashMap::new();
    let mut transforms = HashMap::new();
    let mut samplers = Vec::new();
    let mut params_size = 0;

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        match &module.types[var.ty].inner {
            naga::TypeInner::Struct { members, .. } if binding.group == UNIFORM_GROUP => {
                for member in members {
                    let Some(name) = &member.name else {
                        continue;
                    };
                    let size = module.types[member.ty].inner.size(module.to_ctx());
                    if binding.binding == TRANSFORMS_BINDING {
                        transforms.insert(name.clone(), member.offset);
                    } else if binding.binding == PARAMS_BINDING {
                        uniforms.insert(name.clone(), UniformSlot {
                            offset: member.offset,
                            size,
                        });
                        params_size = params_size.max(member.offset + size);
                    }
                }
            }
            naga::TypeInner::Image { .. } | naga::TypeInner::Sampler { .. }
                if binding.group == TEXTURE_GROUP =>
            {
                if let Some(name) = &var.name {
                    samplers.push(name.clone());
                }
            }
            _ => {}
        }
    }

    Ok(StageReflection {
        entry_point,
        uniforms,
        params_size,
        transforms,
        samplers,
    })
}

/// Both stages read the parameter struct through one shared buffer slot,
/// so when both declare one they must declare the same layout. A stage
/// that declares no parameter struct at all is fine.
pub(crate) fn check_params_agree(
    vertex: &StageReflection,
    fragment: &StageReflection,
) -> Result<(), GfxError> {
    if vertex.params_size == 0 || fragment.params_size == 0 {
        return Ok(());
    }
    for (name, slot) in &vertex.uniforms {
        match fragment.uniforms.get(name) {
            Some(other) if other == slot => {}
            Some(other) => {
                return Err(GfxError::Link {
                    log: format!(
                        "parameter `{name}` disagrees between stages: \
                         vertex at offset {} size {}, fragment at offset {} size {}",
                        slot.offset, slot.size, other.offset, other.size
                    ),
                });
            }
            None => {
                return Err(GfxError::Link {
                    log: format!("parameter `{name}` is missing from the fragment stage"),
                });
            }
        }
    }
    if vertex.uniforms.len() != fragment.uniforms.len() {
        return Err(GfxError::Link {
            log: "parameter structs declare different members per stage".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"
struct Transforms {
    local_to_world: mat4x4<f32>,
    world_to_view: mat4x4<f32>,
    view_to_screen: mat4x4<f32>,
}
@group(0) @binding(0) var<uniform> transforms: Transforms;

struct Params {
    g_scale: f32,
    g_tint: vec4<f32>,
}
@group(0) @binding(1) var<uniform> params: Params;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    let world = transforms.local_to_world * vec4<f32>(position * params.g_scale, 1.0);
    return transforms.view_to_screen * (transforms.world_to_view * world) * params.g_tint.a;
}
"#;

    const FS: &str = r#"
@group(1) @binding(0) var g_diffuse: texture_2d<f32>;
@group(1) @binding(1) var g_diffuse_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(g_diffuse, g_diffuse_sampler, uv);
}
"#;

    #[test]
    fn vertex_stage_reflects_transform_and_param_offsets() {
        let reflection = compile(ShaderStage::Vertex, VS).unwrap();
        assert_eq!(reflection.entry_point, "vs_main");
        assert_eq!(reflection.transforms["local_to_world"], 0);
        assert_eq!(reflection.transforms["world_to_view"], 64);
        assert_eq!(reflection.transforms["view_to_screen"], 128);
        // g_scale at 0; the vec4 after it aligns to 16.
        assert_eq!(reflection.uniforms["g_scale"], UniformSlot { offset: 0, size: 4 });
        assert_eq!(
            reflection.uniforms["g_tint"],
            UniformSlot { offset: 16, size: 16 }
        );
        assert_eq!(reflection.params_size, 32);
    }

    #[test]
    fn fragment_stage_reflects_texture_bindings() {
        let reflection = compile(ShaderStage::Fragment, FS).unwrap();
        assert_eq!(reflection.entry_point, "fs_main");
        assert!(reflection.samplers.contains(&"g_diffuse".to_string()));
        assert!(reflection.samplers.contains(&"g_diffuse_sampler".to_string()));
    }

    #[test]
    fn syntax_errors_surface_as_compile_errors() {
        let err = compile(ShaderStage::Fragment, "fn broken(").unwrap_err();
        match err {
            GfxError::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("expected Compile, got {other:?}"),
        }
    }

    #[test]
    fn wrong_stage_entry_point_is_rejected() {
        let err = compile(ShaderStage::Vertex, FS).unwrap_err();
        assert!(matches!(err, GfxError::Compile { stage: ShaderStage::Vertex, .. }));
    }

    const FS_WITH_PARAMS: &str = r#"
struct Params {
    g_scale: f32,
    g_tint: vec4<f32>,
}
@group(0) @binding(1) var<uniform> params: Params;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return params.g_tint * params.g_scale;
}
"#;

    const FS_REORDERED_PARAMS: &str = r#"
struct Params {
    g_tint: vec4<f32>,
    g_scale: f32,
}
@group(0) @binding(1) var<uniform> params: Params;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return params.g_tint * params.g_scale;
}
"#;

    #[test]
    fn matching_param_structs_agree() {
        let vertex = compile(ShaderStage::Vertex, VS).unwrap();
        let fragment = compile(ShaderStage::Fragment, FS_WITH_PARAMS).unwrap();
        check_params_agree(&vertex, &fragment).unwrap();
    }

    #[test]
    fn paramless_fragment_stage_agrees_trivially() {
        let vertex = compile(ShaderStage::Vertex, VS).unwrap();
        let fragment = compile(ShaderStage::Fragment, FS).unwrap();
        check_params_agree(&vertex, &fragment).unwrap();
    }

    #[test]
    fn reordered_param_members_are_rejected() {
        // Same names at different offsets would silently corrupt the
        // shared parameter block, so the mismatch must fail linking.
        let vertex = compile(ShaderStage::Vertex, VS).unwrap();
        let fragment = compile(ShaderStage::Fragment, FS_REORDERED_PARAMS).unwrap();
        let err = check_params_agree(&vertex, &fragment).unwrap_err();
        match err {
            GfxError::Link { log } => assert!(log.contains("disagrees between stages")),
            other => panic!("expected Link, got {other:?}"),
        }
    }
}
