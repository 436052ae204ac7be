//! Shared types consumed by both the runtime and the offline builders.

mod types;

pub use types::{Camera, ShaderStage};
