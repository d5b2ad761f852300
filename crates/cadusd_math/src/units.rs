//! Unit conversion between source documents and the exported scene.
//!
//! Source documents measure in inches; the exported scene uses centimetres.
//! Only positions and the translation part of transforms are scaled, the
//! rotation/scale block of a matrix is unit-free.

use glam::{DMat4, DVec3, Vec3};

/// Inches to centimetres.
pub const INCHES_TO_CM: f64 = 2.54;

/// Convert a source-space point (inches) to an exported point (cm).
pub fn point_from_source(p: DVec3) -> Vec3 {
    (p * INCHES_TO_CM).as_vec3()
}

/// Build an exported transform from a source column-major 4x4.
///
/// Elements 12, 13 and 14 hold the translation and are scaled to cm.
pub fn matrix_from_source(values: &[f64; 16]) -> DMat4 {
    let mut scaled = *values;
    scaled[12] *= INCHES_TO_CM;
    scaled[13] *= INCHES_TO_CM;
    scaled[14] *= INCHES_TO_CM;
    DMat4::from_cols_array(&scaled)
}
