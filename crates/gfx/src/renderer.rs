//! Frame orchestration over a [`GpuBackend`].
//!
//! # Invariants
//!
//! - Every frame draws the opaque list in full before the transparent
//!   list, each in submission order.
//! - A renderable's texture unit is its index in the combined
//!   opaque-then-transparent draw sequence for that frame.
//! - Transform matrices are transposed here, once, before they reach the
//!   backend.
//! - `shutdown` releases every GPU object and fails if the backend still
//!   reports live objects afterwards.

use crate::backend::{DrawTransforms, GpuBackend};
use crate::registry::{Registry, Renderable, RenderableId};
use crate::resources::{MaterialResource, MeshResource};
use crate::GfxError;
use glam::{Quat, Vec3};
use prism_common::Camera;
use std::path::Path;
use tracing::{debug, info};

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;

/// Owns the backend and the renderable registry, and runs the per-frame
/// draw protocol.
pub struct Graphics<B: GpuBackend> {
    backend: B,
    registry: Registry,
}

impl<B: GpuBackend> Graphics<B> {
    pub fn initialize(backend: B) -> Self {
        info!("graphics initialized");
        Self {
            backend,
            registry: Registry::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load a mesh/material pair from compiled asset files and submit the
    /// result. On a material failure the already-created mesh is released
    /// before the error propagates.
    pub fn add_renderable(
        &mut self,
        mesh_path: impl AsRef<Path>,
        material_path: impl AsRef<Path>,
        position: Vec3,
        orientation: Quat,
    ) -> Result<RenderableId, GfxError> {
        let mesh = MeshResource::load(&mut self.backend, mesh_path)?;
        let material = match MaterialResource::load(&mut self.backend, material_path) {
            Ok(material) => material,
            Err(error) => {
                mesh.destroy(&mut self.backend);
                return Err(error);
            }
        };
        let renderable = Renderable {
            id: RenderableId::new(),
            mesh,
            material,
            position,
            orientation,
        };
        let id = renderable.id();
        debug!(%id, transparent = renderable.is_transparent(), "renderable added");
        Ok(self.registry.insert(renderable))
    }

    /// Detach a renderable and release its GPU objects. Unknown ids are a
    /// no-op.
    pub fn remove_renderable(&mut self, id: RenderableId) {
        if let Some(renderable) = self.registry.remove(id) {
            renderable.mesh.destroy(&mut self.backend);
            renderable.material.destroy(&mut self.backend);
            debug!(%id, "renderable removed");
        }
    }

    /// Re-submit a detached renderable. It joins the end of whichever
    /// list its blend state selects.
    pub fn insert_renderable(&mut self, renderable: Renderable) -> RenderableId {
        self.registry.insert(renderable)
    }

    pub fn renderable_mut(&mut self, id: RenderableId) -> Option<&mut Renderable> {
        self.registry.get_mut(id)
    }

    /// Draw one frame: opaque renderables first, then transparent ones,
    /// texture units numbered across the combined sequence.
    pub fn render(&mut self, camera: &Camera, aspect: f32) -> Result<(), GfxError> {
        let backend = &mut self.backend;
        let registry = &self.registry;

        backend.begin_frame()?;
        let mut unit = 0u32;
        for renderable in registry.opaque().iter().chain(registry.transparent()) {
            let effect = renderable.material.effect();
            effect.bind(backend);
            renderable.material.set_uniforms(backend);
            renderable.material.bind_texture(backend, unit);

            let transforms = DrawTransforms::compute(
                renderable.position,
                renderable.orientation,
                camera,
                aspect,
                NEAR_PLANE,
                FAR_PLANE,
            )
            .transposed();
            backend.set_draw_transforms(effect.handle(), &transforms);
            backend.draw_mesh(renderable.mesh.handle())?;
            unit += 1;
        }
        backend.end_frame()
    }

    /// Release every renderable and verify nothing outlives teardown.
    pub fn shutdown(mut self) -> Result<(), GfxError> {
        let backend = &mut self.backend;
        for renderable in self.registry.drain() {
            renderable.mesh.destroy(backend);
            renderable.material.destroy(backend);
        }
        let live = self.backend.live_object_count();
        if live > 0 {
            return Err(GfxError::ResourceLeak { count: live });
        }
        info!("graphics shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::tests::write_assets;
    use crate::{TraceBackend, TraceEvent};
    use prism_formats::RenderStates;

    fn graphics_with(
        specs: &[RenderStates],
    ) -> (Graphics<TraceBackend>, Vec<RenderableId>, Vec<tempfile::TempDir>) {
        let mut graphics = Graphics::initialize(TraceBackend::new());
        let mut ids = Vec::new();
        let mut dirs = Vec::new();
        for states in specs {
            let dir = tempfile::tempdir().unwrap();
            let (mesh_path, material_path) = write_assets(dir.path(), *states);
            let id = graphics
                .add_renderable(mesh_path, material_path, Vec3::ZERO, Quat::IDENTITY)
                .unwrap();
            ids.push(id);
            dirs.push(dir);
        }
        (graphics, ids, dirs)
    }

    #[test]
    fn frame_draws_opaque_before_transparent() {
        // Submit alternating transparent/opaque so submission order alone
        // would interleave them.
        let (mut graphics, ids, _dirs) = graphics_with(&[
            RenderStates::ALPHA,
            RenderStates::DEPTH_TEST,
            RenderStates::ALPHA | RenderStates::DEPTH_TEST,
            RenderStates::empty(),
        ]);

        graphics.backend.clear_events();
        graphics.render(&Camera::default(), 1.0).unwrap();

        let opaque_meshes: Vec<_> = graphics
            .registry()
            .opaque()
            .iter()
            .map(|r| r.mesh().handle())
            .collect();
        let transparent_meshes: Vec<_> = graphics
            .registry()
            .transparent()
            .iter()
            .map(|r| r.mesh().handle())
            .collect();
        let mut expected = opaque_meshes;
        expected.extend(transparent_meshes);
        assert_eq!(graphics.backend.draw_sequence(), expected);
        assert_eq!(graphics.registry().opaque()[0].id(), ids[1]);
    }

    #[test]
    fn texture_units_number_the_combined_sequence() {
        let (mut graphics, _ids, _dirs) = graphics_with(&[
            RenderStates::empty(),
            RenderStates::ALPHA,
            RenderStates::empty(),
        ]);

        graphics.backend.clear_events();
        graphics.render(&Camera::default(), 1.0).unwrap();
        // Two opaque draws take units 0 and 1, the transparent draw
        // continues at 2.
        assert_eq!(graphics.backend.texture_units(), vec![0, 1, 2]);
    }

    #[test]
    fn every_draw_rebinds_the_full_effect_state() {
        let (mut graphics, _ids, _dirs) =
            graphics_with(&[RenderStates::DEPTH_TEST, RenderStates::DEPTH_TEST]);

        graphics.backend.clear_events();
        graphics.render(&Camera::default(), 1.0).unwrap();
        let binds = graphics
            .backend
            .events()
            .iter()
            .filter(|e| matches!(e, TraceEvent::BindEffect { .. }))
            .count();
        assert_eq!(binds, 2);
    }

    #[test]
    fn transforms_arrive_transposed() {
        let (mut graphics, ids, _dirs) = graphics_with(&[RenderStates::empty()]);
        let position = Vec3::new(1.0, 2.0, 3.0);
        graphics.renderable_mut(ids[0]).unwrap().position = position;

        let camera = Camera::default();
        graphics.backend.clear_events();
        graphics.render(&camera, 1.5).unwrap();

        let expected = DrawTransforms::compute(
            position,
            Quat::IDENTITY,
            &camera,
            1.5,
            NEAR_PLANE,
            FAR_PLANE,
        )
        .transposed();
        let sent = graphics
            .backend
            .events()
            .iter()
            .find_map(|e| match e {
                TraceEvent::SetTransforms { transforms, .. } => Some(*transforms),
                _ => None,
            })
            .unwrap();
        assert_eq!(sent, expected);
    }

    #[test]
    fn remove_releases_gpu_objects() {
        let (mut graphics, ids, _dirs) = graphics_with(&[RenderStates::empty()]);
        assert_eq!(graphics.backend().live_object_count(), 3);
        graphics.remove_renderable(ids[0]);
        assert_eq!(graphics.backend().live_object_count(), 0);
        // Removing again is a no-op.
        graphics.remove_renderable(ids[0]);
        graphics.shutdown().unwrap();
    }

    #[test]
    fn reinserted_renderable_draws_last_in_its_list() {
        let (mut graphics, ids, _dirs) = graphics_with(&[
            RenderStates::empty(),
            RenderStates::empty(),
        ]);
        let first_mesh = graphics.registry().opaque()[0].mesh().handle();

        // Detach the first renderable without destroying it, then put it
        // back; it must now draw after the other one.
        let detached = {
            let mut registry = std::mem::take(&mut graphics.registry);
            let renderable = registry.remove(ids[0]).unwrap();
            graphics.registry = registry;
            renderable
        };
        graphics.insert_renderable(detached);

        graphics.backend.clear_events();
        graphics.render(&Camera::default(), 1.0).unwrap();
        let draws = graphics.backend.draw_sequence();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1], first_mesh);
    }

    #[test]
    fn shutdown_reports_leaks() {
        let (mut graphics, _ids, _dirs) = graphics_with(&[RenderStates::empty()]);
        // Create an object the registry does not track.
        let dir = tempfile::tempdir().unwrap();
        let (mesh_path, _) = write_assets(dir.path(), RenderStates::empty());
        let _orphan = MeshResource::load(&mut graphics.backend, &mesh_path).unwrap();

        let err = graphics.shutdown().unwrap_err();
        assert!(matches!(err, GfxError::ResourceLeak { count: 1 }));
    }

    #[test]
    fn clean_shutdown_succeeds() {
        let (graphics, _ids, _dirs) =
            graphics_with(&[RenderStates::empty(), RenderStates::ALPHA]);
        graphics.shutdown().unwrap();
    }

    #[test]
    fn failed_material_load_releases_the_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let (mesh_path, _) = write_assets(dir.path(), RenderStates::empty());
        let mut graphics = Graphics::initialize(TraceBackend::new());
        let err = graphics
            .add_renderable(mesh_path, "missing.material", Vec3::ZERO, Quat::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, GfxError::Io { .. }));
        assert_eq!(graphics.backend().live_object_count(), 0);
    }
}
