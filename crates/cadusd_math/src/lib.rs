// Re-export glam for convenience
pub use glam::*;

// CadUsd math types
mod camera;
mod extent;
mod units;

pub use camera::CameraPose;
pub use extent::Extent;
pub use units::{matrix_from_source, point_from_source, INCHES_TO_CM};
