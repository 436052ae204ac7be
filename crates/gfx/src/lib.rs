//! Graphics core: GPU backend abstraction, resource loading, the
//! opaque/transparent renderable registry and the per-frame draw protocol.
//!
//! # Invariants
//! - A renderable is in at most one of the two render lists at a time,
//!   keyed by the ALPHA bit of its material's effect.
//! - Draw order is opaque list then transparent list, each in insertion
//!   order; there is no depth sort.
//! - Every GPU object created on a load path is destroyed exactly once,
//!   on the teardown path or on the load path's own error exit.
//! - All GPU state is owned by one thread; nothing here suspends or blocks.

mod backend;
mod error;
mod registry;
mod renderer;
mod resources;
mod trace;

pub use backend::{
    DrawTransforms, EffectHandle, GpuBackend, MeshHandle, SamplerHandle, TextureHandle,
    UniformHandle, TRANSFORM_UNIFORM_NAMES, UNIFORM_LOCAL_TO_WORLD, UNIFORM_VIEW_TO_SCREEN,
    UNIFORM_WORLD_TO_VIEW,
};
pub use error::GfxError;
pub use registry::{Registry, Renderable, RenderableId};
pub use renderer::{Graphics, FAR_PLANE, NEAR_PLANE};
pub use resources::{EffectResource, MaterialResource, MeshResource, UniformBinding};
pub use trace::{TraceBackend, TraceEvent};
