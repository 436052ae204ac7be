//! Headless backend that records the draw protocol instead of touching a
//! GPU.
//!
//! Shader "compilation" treats the source text as a manifest: a uniform or
//! sampler resolves iff its name occurs in the stage's source. That is
//! enough to exercise every loader and frame-protocol code path without a
//! device.

use crate::backend::{
    DrawTransforms, EffectHandle, GpuBackend, MeshHandle, SamplerHandle, TextureHandle,
    UniformHandle, TRANSFORM_UNIFORM_NAMES,
};
use crate::GfxError;
use prism_common::ShaderStage;
use prism_formats::{DdsTexture, MeshFile, RenderStates};
use std::collections::HashMap;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    BeginFrame,
    EndFrame,
    CreateMesh {
        mesh: MeshHandle,
        vertex_count: u32,
        index_count: u32,
    },
    CreateEffect {
        effect: EffectHandle,
        render_states: RenderStates,
    },
    CreateTexture {
        texture: TextureHandle,
        mip_count: u32,
    },
    DestroyMesh(MeshHandle),
    DestroyEffect(EffectHandle),
    DestroyTexture(TextureHandle),
    BindEffect {
        effect: EffectHandle,
        render_states: RenderStates,
    },
    SetUniform {
        effect: EffectHandle,
        uniform: UniformHandle,
        stage: ShaderStage,
        values: Vec<f32>,
    },
    BindTexture {
        texture: TextureHandle,
        sampler: SamplerHandle,
        unit: u32,
    },
    SetTransforms {
        effect: EffectHandle,
        transforms: DrawTransforms,
    },
    DrawMesh {
        mesh: MeshHandle,
        triangle_count: u32,
    },
}

struct EffectData {
    render_states: RenderStates,
    vertex_source: String,
    fragment_source: String,
    resolved: HashMap<String, UniformHandle>,
    next_location: u32,
}

/// Recording [`GpuBackend`] used throughout the test suites.
#[derive(Default)]
pub struct TraceBackend {
    events: Vec<TraceEvent>,
    next_handle: u32,
    meshes: HashMap<MeshHandle, (u32, u32)>,
    effects: HashMap<EffectHandle, EffectData>,
    textures: HashMap<TextureHandle, u32>,
    bound_effect: Option<EffectHandle>,
    current_states: Option<RenderStates>,
}

impl TraceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in call order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// The fixed-function state left by the most recent effect bind.
    pub fn current_states(&self) -> Option<RenderStates> {
        self.current_states
    }

    /// Meshes drawn since the last `clear_events`, in draw order.
    pub fn draw_sequence(&self) -> Vec<MeshHandle> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::DrawMesh { mesh, .. } => Some(*mesh),
                _ => None,
            })
            .collect()
    }

    /// Texture units assigned since the last `clear_events`, in call order.
    pub fn texture_units(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::BindTexture { unit, .. } => Some(*unit),
                _ => None,
            })
            .collect()
    }

    fn next(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn source_for(data: &EffectData, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &data.vertex_source,
            ShaderStage::Fragment => &data.fragment_source,
        }
    }
}

impl GpuBackend for TraceBackend {
    fn create_mesh(&mut self, mesh: &MeshFile) -> Result<MeshHandle, GfxError> {
        let handle = MeshHandle(self.next());
        self.meshes
            .insert(handle, (mesh.vertex_count(), mesh.index_count()));
        self.events.push(TraceEvent::CreateMesh {
            mesh: handle,
            vertex_count: mesh.vertex_count(),
            index_count: mesh.index_count(),
        });
        Ok(handle)
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
        self.events.push(TraceEvent::DestroyMesh(mesh));
    }

    fn create_effect(
        &mut self,
        render_states: RenderStates,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<EffectHandle, GfxError> {
        for (stage, source) in [
            (ShaderStage::Vertex, vertex_source),
            (ShaderStage::Fragment, fragment_source),
        ] {
            if source.trim().is_empty() {
                return Err(GfxError::Compile {
                    stage,
                    log: "shader source is empty".into(),
                });
            }
        }
        for name in TRANSFORM_UNIFORM_NAMES {
            if !vertex_source.contains(name) {
                return Err(GfxError::MissingUniform { name: name.into() });
            }
        }
        let handle = EffectHandle(self.next());
        self.effects.insert(
            handle,
            EffectData {
                render_states,
                vertex_source: vertex_source.to_owned(),
                fragment_source: fragment_source.to_owned(),
                resolved: HashMap::new(),
                next_location: 0,
            },
        );
        self.events.push(TraceEvent::CreateEffect {
            effect: handle,
            render_states,
        });
        Ok(handle)
    }

    fn destroy_effect(&mut self, effect: EffectHandle) {
        self.effects.remove(&effect);
        self.events.push(TraceEvent::DestroyEffect(effect));
    }

    fn create_texture(&mut self, texture: &DdsTexture) -> Result<TextureHandle, GfxError> {
        let handle = TextureHandle(self.next());
        self.textures.insert(handle, texture.mips.len() as u32);
        self.events.push(TraceEvent::CreateTexture {
            texture: handle,
            mip_count: texture.mips.len() as u32,
        });
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.events.push(TraceEvent::DestroyTexture(texture));
    }

    fn resolve_uniform(
        &mut self,
        effect: EffectHandle,
        name: &str,
        stage: ShaderStage,
    ) -> Result<UniformHandle, GfxError> {
        let data = self
            .effects
            .get_mut(&effect)
            .ok_or_else(|| GfxError::device(format!("resolve uniform on unknown {effect:?}")))?;
        if !Self::source_for(data, stage).contains(name) {
            return Err(GfxError::MissingUniform { name: name.into() });
        }
        if let Some(&handle) = data.resolved.get(name) {
            return Ok(handle);
        }
        let handle = UniformHandle(data.next_location);
        data.next_location += 1;
        data.resolved.insert(name.to_owned(), handle);
        Ok(handle)
    }

    fn resolve_sampler(
        &mut self,
        effect: EffectHandle,
        name: &str,
    ) -> Result<SamplerHandle, GfxError> {
        let data = self
            .effects
            .get(&effect)
            .ok_or_else(|| GfxError::device(format!("resolve sampler on unknown {effect:?}")))?;
        if !data.fragment_source.contains(name) {
            return Err(GfxError::MissingUniform { name: name.into() });
        }
        Ok(SamplerHandle(0))
    }

    fn begin_frame(&mut self) -> Result<(), GfxError> {
        self.bound_effect = None;
        self.events.push(TraceEvent::BeginFrame);
        Ok(())
    }

    fn bind_effect(&mut self, effect: EffectHandle) {
        let render_states = self
            .effects
            .get(&effect)
            .map(|data| data.render_states)
            .unwrap_or_default();
        self.bound_effect = Some(effect);
        // Full state update every bind, never a partial one.
        self.current_states = Some(render_states);
        self.events.push(TraceEvent::BindEffect {
            effect,
            render_states,
        });
    }

    fn set_uniform(
        &mut self,
        effect: EffectHandle,
        uniform: UniformHandle,
        stage: ShaderStage,
        values: &[f32],
    ) {
        self.events.push(TraceEvent::SetUniform {
            effect,
            uniform,
            stage,
            values: values.to_vec(),
        });
    }

    fn bind_texture(&mut self, texture: TextureHandle, sampler: SamplerHandle, unit: u32) {
        self.events.push(TraceEvent::BindTexture {
            texture,
            sampler,
            unit,
        });
    }

    fn set_draw_transforms(&mut self, effect: EffectHandle, transforms: &DrawTransforms) {
        self.events.push(TraceEvent::SetTransforms {
            effect,
            transforms: *transforms,
        });
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> Result<(), GfxError> {
        if self.bound_effect.is_none() {
            return Err(GfxError::device("draw with no effect bound"));
        }
        let (_, index_count) = self
            .meshes
            .get(&mesh)
            .copied()
            .ok_or_else(|| GfxError::device(format!("draw of unknown {mesh:?}")))?;
        self.events.push(TraceEvent::DrawMesh {
            mesh,
            triangle_count: index_count / 3,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), GfxError> {
        self.events.push(TraceEvent::EndFrame);
        Ok(())
    }

    fn live_object_count(&self) -> usize {
        self.meshes.len() + self.effects.len() + self.textures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "local_to_world world_to_view view_to_screen g_tint";
    const FS: &str = "g_diffuse g_tint";

    #[test]
    fn effect_missing_a_transform_uniform_fails_to_create() {
        let mut backend = TraceBackend::new();
        let err = backend
            .create_effect(RenderStates::empty(), "local_to_world only", FS)
            .unwrap_err();
        assert!(matches!(err, GfxError::MissingUniform { name } if name == "world_to_view"));
    }

    #[test]
    fn empty_stage_source_is_a_compile_error() {
        let mut backend = TraceBackend::new();
        let err = backend
            .create_effect(RenderStates::empty(), VS, "  ")
            .unwrap_err();
        assert!(matches!(
            err,
            GfxError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn uniform_resolution_is_stable_per_name() {
        let mut backend = TraceBackend::new();
        let effect = backend
            .create_effect(RenderStates::empty(), VS, FS)
            .unwrap();
        let first = backend
            .resolve_uniform(effect, "g_tint", ShaderStage::Fragment)
            .unwrap();
        let again = backend
            .resolve_uniform(effect, "g_tint", ShaderStage::Fragment)
            .unwrap();
        assert_eq!(first, again);
        assert!(backend
            .resolve_uniform(effect, "g_absent", ShaderStage::Fragment)
            .is_err());
    }

    #[test]
    fn bind_effect_sets_the_full_state_each_call() {
        let mut backend = TraceBackend::new();
        let opaque = backend
            .create_effect(RenderStates::DEPTH_TEST | RenderStates::DEPTH_WRITE, VS, FS)
            .unwrap();
        let blended = backend
            .create_effect(RenderStates::ALPHA | RenderStates::DEPTH_TEST, VS, FS)
            .unwrap();

        backend.bind_effect(blended);
        backend.bind_effect(opaque);
        assert_eq!(
            backend.current_states(),
            Some(RenderStates::DEPTH_TEST | RenderStates::DEPTH_WRITE)
        );
        // Idempotent: binding again leaves identical state.
        backend.bind_effect(opaque);
        assert_eq!(
            backend.current_states(),
            Some(RenderStates::DEPTH_TEST | RenderStates::DEPTH_WRITE)
        );
    }

    #[test]
    fn draw_without_bound_effect_is_rejected() {
        let mut backend = TraceBackend::new();
        let mesh = backend.create_mesh(&MeshFile::default()).unwrap();
        backend.begin_frame().unwrap();
        assert!(backend.draw_mesh(mesh).is_err());
    }

    #[test]
    fn live_object_count_tracks_create_and_destroy() {
        let mut backend = TraceBackend::new();
        let mesh = backend.create_mesh(&MeshFile::default()).unwrap();
        let effect = backend
            .create_effect(RenderStates::empty(), VS, FS)
            .unwrap();
        assert_eq!(backend.live_object_count(), 2);
        backend.destroy_mesh(mesh);
        backend.destroy_effect(effect);
        assert_eq!(backend.live_object_count(), 0);
    }
}
