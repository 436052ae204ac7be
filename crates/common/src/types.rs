use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Camera state consumed read-only by the render path.
///
/// The camera is owned by the scene layer outside this workspace; the
/// renderer only ever reads it. Field of view is stored in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub orientation: Quat,
    pub offset: Vec3,
    pub field_of_view: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            offset: Vec3::new(0.0, 0.0, 10.0),
            field_of_view: 60.0_f32.to_radians(),
        }
    }
}

/// Which shader stage a material uniform targets.
///
/// The discriminants are part of the material file format and must not
/// change: 0 = fragment, 1 = vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Fragment = 0,
    Vertex = 1,
}

impl ShaderStage {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Fragment),
            1 => Some(Self::Vertex),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_default_looks_down_negative_z() {
        let cam = Camera::default();
        assert_eq!(cam.orientation, Quat::IDENTITY);
        assert!(cam.offset.z > 0.0);
        assert!((cam.field_of_view - 60.0_f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn shader_stage_discriminants_are_stable() {
        assert_eq!(ShaderStage::Fragment as u8, 0);
        assert_eq!(ShaderStage::Vertex as u8, 1);
        assert_eq!(ShaderStage::from_u8(1), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_u8(7), None);
    }
}
