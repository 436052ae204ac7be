//! Renderable bookkeeping, partitioned by blending behavior.

use crate::resources::{MaterialResource, MeshResource};
use glam::{Quat, Vec3};
use uuid::Uuid;

/// Stable identity for a submitted renderable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderableId(Uuid);

impl RenderableId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RenderableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One mesh/material pairing placed in the world.
#[derive(Debug)]
pub struct Renderable {
    pub(crate) id: RenderableId,
    pub(crate) mesh: MeshResource,
    pub(crate) material: MaterialResource,
    pub position: Vec3,
    pub orientation: Quat,
}

impl Renderable {
    pub fn id(&self) -> RenderableId {
        self.id
    }

    pub fn mesh(&self) -> &MeshResource {
        &self.mesh
    }

    pub fn material(&self) -> &MaterialResource {
        &self.material
    }

    /// List membership follows the effect's alpha state.
    pub fn is_transparent(&self) -> bool {
        self.material.effect().is_transparent()
    }
}

/// Holds every submitted renderable in two draw-ordered lists: fully
/// opaque geometry first, alpha-blended geometry after it. Within a
/// list, submission order is draw order.
#[derive(Debug, Default)]
pub struct Registry {
    opaque: Vec<Renderable>,
    transparent: Vec<Renderable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the list matching the renderable's blend state.
    pub fn insert(&mut self, renderable: Renderable) -> RenderableId {
        let id = renderable.id;
        if renderable.is_transparent() {
            self.transparent.push(renderable);
        } else {
            self.opaque.push(renderable);
        }
        id
    }

    /// Detach by id, returning the renderable so the caller can release
    /// its GPU objects. Unknown ids are a no-op.
    pub fn remove(&mut self, id: RenderableId) -> Option<Renderable> {
        if let Some(index) = self.opaque.iter().position(|r| r.id == id) {
            return Some(self.opaque.remove(index));
        }
        if let Some(index) = self.transparent.iter().position(|r| r.id == id) {
            return Some(self.transparent.remove(index));
        }
        None
    }

    pub fn get(&self, id: RenderableId) -> Option<&Renderable> {
        self.opaque
            .iter()
            .chain(self.transparent.iter())
            .find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: RenderableId) -> Option<&mut Renderable> {
        self.opaque
            .iter_mut()
            .chain(self.transparent.iter_mut())
            .find(|r| r.id == id)
    }

    pub fn opaque(&self) -> &[Renderable] {
        &self.opaque
    }

    pub fn transparent(&self) -> &[Renderable] {
        &self.transparent
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }

    /// Empty both lists, yielding every renderable for teardown.
    pub fn drain(&mut self) -> impl Iterator<Item = Renderable> + '_ {
        self.opaque.drain(..).chain(self.transparent.drain(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::tests::write_assets;
    use crate::resources::{MaterialResource, MeshResource};
    use crate::TraceBackend;
    use prism_formats::RenderStates;

    fn make_renderable(
        backend: &mut TraceBackend,
        dir: &std::path::Path,
        states: RenderStates,
    ) -> Renderable {
        let (mesh_path, material_path) = write_assets(dir, states);
        let mesh = MeshResource::load(backend, mesh_path).unwrap();
        let material = MaterialResource::load(backend, material_path).unwrap();
        Renderable {
            id: RenderableId::new(),
            mesh,
            material,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }

    #[test]
    fn insert_partitions_by_alpha_state() {
        let mut backend = TraceBackend::new();
        let opaque_dir = tempfile::tempdir().unwrap();
        let alpha_dir = tempfile::tempdir().unwrap();

        let mut registry = Registry::new();
        let opaque_id = registry.insert(make_renderable(
            &mut backend,
            opaque_dir.path(),
            RenderStates::DEPTH_TEST,
        ));
        let alpha_id = registry.insert(make_renderable(
            &mut backend,
            alpha_dir.path(),
            RenderStates::ALPHA,
        ));

        assert_eq!(registry.opaque().len(), 1);
        assert_eq!(registry.transparent().len(), 1);
        assert_eq!(registry.opaque()[0].id(), opaque_id);
        assert_eq!(registry.transparent()[0].id(), alpha_id);
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let mut backend = TraceBackend::new();
        let dir = tempfile::tempdir().unwrap();

        let mut registry = Registry::new();
        registry.insert(make_renderable(
            &mut backend,
            dir.path(),
            RenderStates::empty(),
        ));

        let bogus = RenderableId::new();
        assert!(registry.remove(bogus).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reinsert_appends_at_the_end_of_its_list() {
        let mut backend = TraceBackend::new();
        let dirs: Vec<_> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();

        let mut registry = Registry::new();
        let ids: Vec<_> = dirs
            .iter()
            .map(|d| {
                registry.insert(make_renderable(&mut backend, d.path(), RenderStates::empty()))
            })
            .collect();

        let first = registry.remove(ids[0]).unwrap();
        registry.insert(first);

        let order: Vec<_> = registry.opaque().iter().map(|r| r.id()).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
    }
}
