use serde::{Deserialize, Serialize};

pub type Vec3 = [f32; 3];

/// Bit set of render layers a camera draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NOTHING: LayerMask = LayerMask(0);
    pub const EVERYTHING: LayerMask = LayerMask(u32::MAX);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::EVERYTHING
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub local_position: Vec3,
}

impl Transform {
    pub fn at(local_position: Vec3) -> Self {
        Self { local_position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub culling_mask: LayerMask,
    pub active: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            field_of_view: 60.0,
            culling_mask: LayerMask::EVERYTHING,
            active: true,
        }
    }
}

/// Per-eye barrel distortion corrector. The shader consuming these values
/// lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BarrelDistortion {
    pub distortion_radius: f32,
    pub offset: f32,
}

/// Live camera feed compositor attached to the center camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughVideo {
    pub enabled: bool,
}

impl Default for PassthroughVideo {
    fn default() -> Self {
        Self { enabled: true }
    }
}
