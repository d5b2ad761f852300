use glam::{DMat4, DVec3};

use crate::units::INCHES_TO_CM;

/// Camera placement as stored by a source scene (inches).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub eye: DVec3,
    pub target: DVec3,
    pub up: DVec3,
}

impl CameraPose {
    /// Create a new camera pose
    pub fn new(eye: DVec3, target: DVec3, up: DVec3) -> Self {
        Self { eye, target, up }
    }

    /// Get the view matrix (world → camera space) in exported units.
    ///
    /// The camera looks down its local -Z axis with +Y up.
    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.eye * INCHES_TO_CM, self.target * INCHES_TO_CM, self.up)
    }

    /// Camera-to-world transform used to place the exported camera prim.
    pub fn to_transform(&self) -> DMat4 {
        self.view_matrix().inverse()
    }
}
