//! wgpu implementation of the [`prism_gfx::GpuBackend`] trait.
//!
//! Shaders are WGSL. Effects bake their render-state mask into a
//! [`wgpu::RenderPipeline`] at creation; uniforms resolve to byte offsets
//! inside two well-known uniform structs via `naga` reflection.
//!
//! # Invariants
//! - `@group(0) @binding(0)` is the per-draw transform struct, group(0)
//!   binding(1) the material parameter struct, group(1) the texture and
//!   its sampler.
//! - All per-draw uniform data for a frame is staged CPU-side and
//!   uploaded in one `write_buffer` before the frame's single render
//!   pass is submitted.

mod backend;
mod reflect;

pub use backend::WgpuBackend;
