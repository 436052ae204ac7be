//! GPU-backed resources loaded from compiled asset files.

use crate::backend::{
    EffectHandle, GpuBackend, MeshHandle, SamplerHandle, TextureHandle, UniformHandle,
};
use crate::GfxError;
use prism_common::ShaderStage;
use prism_formats::{DdsTexture, EffectFile, MaterialFile, MeshFile, RenderStates};
use std::path::Path;
use tracing::debug;

fn read_bytes(path: &Path) -> Result<Vec<u8>, GfxError> {
    std::fs::read(path).map_err(|source| GfxError::io(path, source))
}

fn read_text(path: &Path) -> Result<String, GfxError> {
    std::fs::read_to_string(path).map_err(|source| GfxError::io(path, source))
}

/// A vertex/index buffer pair on the GPU.
#[derive(Debug)]
pub struct MeshResource {
    handle: MeshHandle,
    vertex_count: u32,
    index_count: u32,
}

impl MeshResource {
    /// Read a compiled mesh file and upload its buffers.
    pub fn load<B: GpuBackend>(backend: &mut B, path: impl AsRef<Path>) -> Result<Self, GfxError> {
        let path = path.as_ref();
        let bytes = read_bytes(path)?;
        let file = MeshFile::decode(&bytes).map_err(|source| GfxError::format(path, source))?;
        let handle = backend.create_mesh(&file)?;
        debug!(
            path = %path.display(),
            vertices = file.vertex_count(),
            triangles = file.triangle_count(),
            "mesh loaded"
        );
        Ok(Self {
            handle,
            vertex_count: file.vertex_count(),
            index_count: file.index_count(),
        })
    }

    pub fn handle(&self) -> MeshHandle {
        self.handle
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn destroy<B: GpuBackend>(self, backend: &mut B) {
        backend.destroy_mesh(self.handle);
    }
}

/// A compiled program plus its authored render states.
#[derive(Debug)]
pub struct EffectResource {
    handle: EffectHandle,
    render_states: RenderStates,
}

impl EffectResource {
    /// Read a compiled effect descriptor, compile and link its two shader
    /// stages, and bake the render-state mask. The backend resolves the
    /// three mandatory transform uniforms as part of program creation.
    pub fn load<B: GpuBackend>(backend: &mut B, path: impl AsRef<Path>) -> Result<Self, GfxError> {
        let path = path.as_ref();
        let bytes = read_bytes(path)?;
        let file = EffectFile::decode(&bytes).map_err(|source| GfxError::format(path, source))?;

        let vertex_source = read_text(Path::new(&file.vertex_shader_path))?;
        let fragment_source = read_text(Path::new(&file.fragment_shader_path))?;
        let handle = backend.create_effect(file.render_states, &vertex_source, &fragment_source)?;
        debug!(
            path = %path.display(),
            states = ?file.render_states,
            "effect loaded"
        );
        Ok(Self {
            handle,
            render_states: file.render_states,
        })
    }

    pub fn handle(&self) -> EffectHandle {
        self.handle
    }

    pub fn render_states(&self) -> RenderStates {
        self.render_states
    }

    /// Whether renderables using this effect join the transparent list.
    pub fn is_transparent(&self) -> bool {
        self.render_states.contains(RenderStates::ALPHA)
    }

    /// Activate the program and set all four fixed-function states.
    pub fn bind<B: GpuBackend>(&self, backend: &mut B) {
        backend.bind_effect(self.handle);
    }

    pub fn destroy<B: GpuBackend>(self, backend: &mut B) {
        backend.destroy_effect(self.handle);
    }
}

/// A material uniform with its name already resolved to a handle.
#[derive(Debug, Clone, Copy)]
pub struct UniformBinding {
    pub handle: UniformHandle,
    pub values: [f32; 4],
    pub value_count: u8,
    pub stage: ShaderStage,
}

/// An effect reference plus one texture binding and the named uniforms.
#[derive(Debug)]
pub struct MaterialResource {
    effect: EffectResource,
    texture: TextureHandle,
    sampler: SamplerHandle,
    uniforms: Vec<UniformBinding>,
}

impl MaterialResource {
    /// Read a compiled material file: load its effect, upload its DDS
    /// texture, resolve the sampler binding and every named uniform.
    /// Uniform names are discarded once resolved.
    pub fn load<B: GpuBackend>(backend: &mut B, path: impl AsRef<Path>) -> Result<Self, GfxError> {
        let path = path.as_ref();
        let bytes = read_bytes(path)?;
        let file = MaterialFile::decode(&bytes).map_err(|source| GfxError::format(path, source))?;

        let effect = EffectResource::load(backend, &file.effect_path)?;

        // From here on any failure must release what was already created.
        let result = Self::load_onto_effect(backend, &file, &effect);
        match result {
            Ok((texture, sampler, uniforms)) => {
                debug!(
                    path = %path.display(),
                    uniforms = uniforms.len(),
                    "material loaded"
                );
                Ok(Self {
                    effect,
                    texture,
                    sampler,
                    uniforms,
                })
            }
            Err(error) => {
                effect.destroy(backend);
                Err(error)
            }
        }
    }

    fn load_onto_effect<B: GpuBackend>(
        backend: &mut B,
        file: &MaterialFile,
        effect: &EffectResource,
    ) -> Result<(TextureHandle, SamplerHandle, Vec<UniformBinding>), GfxError> {
        let texture_path = Path::new(&file.texture_path);
        let texture_bytes = read_bytes(texture_path)?;
        let dds = DdsTexture::parse(&texture_bytes)
            .map_err(|source| GfxError::format(texture_path, source))?;
        let texture = backend.create_texture(&dds)?;

        let resolved = || -> Result<(SamplerHandle, Vec<UniformBinding>), GfxError> {
            let sampler = backend.resolve_sampler(effect.handle(), &file.sampler_name)?;
            let mut uniforms = Vec::with_capacity(file.uniforms.len());
            for uniform in &file.uniforms {
                let handle =
                    backend.resolve_uniform(effect.handle(), &uniform.name, uniform.stage)?;
                uniforms.push(UniformBinding {
                    handle,
                    values: uniform.values,
                    value_count: uniform.value_count,
                    stage: uniform.stage,
                });
            }
            Ok((sampler, uniforms))
        }();
        match resolved {
            Ok((sampler, uniforms)) => Ok((texture, sampler, uniforms)),
            Err(error) => {
                backend.destroy_texture(texture);
                Err(error)
            }
        }
    }

    pub fn effect(&self) -> &EffectResource {
        &self.effect
    }

    pub fn uniforms(&self) -> &[UniformBinding] {
        &self.uniforms
    }

    /// Push every material uniform to its resolved handle and stage.
    pub fn set_uniforms<B: GpuBackend>(&self, backend: &mut B) {
        for binding in &self.uniforms {
            backend.set_uniform(
                self.effect.handle(),
                binding.handle,
                binding.stage,
                &binding.values[..binding.value_count as usize],
            );
        }
    }

    /// Bind the texture to `unit` and point the sampler uniform at it.
    pub fn bind_texture<B: GpuBackend>(&self, backend: &mut B, unit: u32) {
        backend.bind_texture(self.texture, self.sampler, unit);
    }

    pub fn destroy<B: GpuBackend>(self, backend: &mut B) {
        backend.destroy_texture(self.texture);
        self.effect.destroy(backend);
    }
}
