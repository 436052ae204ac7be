//! The GPU backend contract.
//!
//! The original engine shipped two native backends selected at compile
//! time; here the same contract is a trait with implementations selected at
//! configuration time. [`crate::TraceBackend`] is the headless
//! implementation used by tests, `prism-gfx-wgpu` is the on-screen one.

use crate::GfxError;
use glam::{Mat4, Quat, Vec3};
use prism_common::{Camera, ShaderStage};
use prism_formats::{DdsTexture, MeshFile, RenderStates};

/// Names of the three transform uniforms every effect must expose.
pub const UNIFORM_LOCAL_TO_WORLD: &str = "local_to_world";
pub const UNIFORM_WORLD_TO_VIEW: &str = "world_to_view";
pub const UNIFORM_VIEW_TO_SCREEN: &str = "view_to_screen";
pub const TRANSFORM_UNIFORM_NAMES: [&str; 3] = [
    UNIFORM_LOCAL_TO_WORLD,
    UNIFORM_WORLD_TO_VIEW,
    UNIFORM_VIEW_TO_SCREEN,
];

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

handle_type!(
    /// A vertex/index buffer pair living on the GPU.
    MeshHandle
);
handle_type!(
    /// A compiled, linked shader program plus its baked render states.
    EffectHandle
);
handle_type!(
    /// An uploaded texture with its mip chain.
    TextureHandle
);
handle_type!(
    /// A resolved material uniform location inside an effect's program.
    UniformHandle
);
handle_type!(
    /// A resolved texture sampler binding inside an effect's program.
    SamplerHandle
);

/// The three per-draw transform matrices.
///
/// Computed by the frame renderer and pushed transposed: the shader
/// convention multiplies row vectors on the left, opposite to the engine's
/// column-vector math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawTransforms {
    pub local_to_world: Mat4,
    pub world_to_view: Mat4,
    pub view_to_screen: Mat4,
}

impl DrawTransforms {
    /// Assemble the matrices for one draw from the renderable's transform
    /// and the camera state.
    pub fn compute(
        position: Vec3,
        orientation: Quat,
        camera: &Camera,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            local_to_world: Mat4::from_rotation_translation(orientation, position),
            world_to_view: Mat4::from_rotation_translation(camera.orientation, camera.offset)
                .inverse(),
            view_to_screen: Mat4::perspective_rh(camera.field_of_view, aspect, near, far),
        }
    }

    /// The form actually pushed to the GPU.
    pub fn transposed(&self) -> Self {
        Self {
            local_to_world: self.local_to_world.transpose(),
            world_to_view: self.world_to_view.transpose(),
            view_to_screen: self.view_to_screen.transpose(),
        }
    }
}

/// One GPU backend: resource creation, name resolution and the strictly
/// ordered per-frame protocol.
///
/// Every method must be called from the thread owning the GPU context.
/// The frame protocol is `begin_frame`, then per draw `bind_effect` /
/// `set_uniform`* / `bind_texture` / `set_draw_transforms` / `draw_mesh`,
/// then `end_frame` which presents.
pub trait GpuBackend {
    /// Upload vertex and index buffers sized exactly to the file's counts.
    fn create_mesh(&mut self, mesh: &MeshFile) -> Result<MeshHandle, GfxError>;
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    /// Compile and link the two stage sources into a program, bake the
    /// render states, and resolve the three mandatory transform uniforms
    /// (failing with [`GfxError::MissingUniform`] if any is absent).
    fn create_effect(
        &mut self,
        render_states: RenderStates,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<EffectHandle, GfxError>;
    fn destroy_effect(&mut self, effect: EffectHandle);

    /// Upload a block-compressed texture with its full mip chain.
    fn create_texture(&mut self, texture: &DdsTexture) -> Result<TextureHandle, GfxError>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Resolve a named material uniform against an effect's program.
    /// Only called at material load time; the name is not needed again.
    fn resolve_uniform(
        &mut self,
        effect: EffectHandle,
        name: &str,
        stage: ShaderStage,
    ) -> Result<UniformHandle, GfxError>;

    /// Resolve a named texture sampler against an effect's program.
    fn resolve_sampler(
        &mut self,
        effect: EffectHandle,
        name: &str,
    ) -> Result<SamplerHandle, GfxError>;

    /// Start a frame: clear color to black and depth to the far plane.
    fn begin_frame(&mut self) -> Result<(), GfxError>;

    /// Activate an effect's program and set all four fixed-function states
    /// from its render-state mask. Full update every call, no partials;
    /// binding the same effect twice must leave identical state.
    fn bind_effect(&mut self, effect: EffectHandle);

    /// Push `values` (1 to 4 floats) to a resolved uniform on one stage.
    fn set_uniform(
        &mut self,
        effect: EffectHandle,
        uniform: UniformHandle,
        stage: ShaderStage,
        values: &[f32],
    );

    /// Bind a texture to the given unit and point the sampler at it.
    fn bind_texture(&mut self, texture: TextureHandle, sampler: SamplerHandle, unit: u32);

    /// Push the three transform matrices (already transposed) to the
    /// currently relevant effect.
    fn set_draw_transforms(&mut self, effect: EffectHandle, transforms: &DrawTransforms);

    /// Issue an indexed triangle-list draw of the whole mesh. An effect
    /// with a matching vertex layout must already be bound.
    fn draw_mesh(&mut self, mesh: MeshHandle) -> Result<(), GfxError>;

    /// Finish the frame and present the back buffer.
    fn end_frame(&mut self) -> Result<(), GfxError>;

    /// Number of GPU objects currently alive; used for shutdown leak
    /// detection.
    fn live_object_count(&self) -> usize;
}
