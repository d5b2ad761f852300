use glam::Vec3;

/// Axis-aligned extent of a point set, written as the `extent` attribute
/// of exported point-based prims (meshes and curves).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Extent {
    pub min: Vec3,
    pub max: Vec3,
}

impl Extent {
    /// An empty extent (min > max, contains nothing).
    pub const EMPTY: Extent = Extent {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Compute the extent of a set of points.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut extent = Self::EMPTY;
        for p in points {
            extent.include(*p);
        }
        extent
    }

    /// Compute the extent of curve points widened by half the curve width.
    pub fn from_curve_points(points: &[Vec3], width: f32) -> Self {
        let mut extent = Self::from_points(points);
        if !extent.is_empty() {
            let pad = Vec3::splat(width * 0.5);
            extent.min -= pad;
            extent.max += pad;
        }
        extent
    }

    /// Grow the extent to include a point.
    pub fn include(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// True if no point was ever included.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// The `[min, max]` pair as written to a scene description.
    ///
    /// An empty extent is written as two zero vectors.
    pub fn to_pair(&self) -> [Vec3; 2] {
        if self.is_empty() {
            [Vec3::ZERO, Vec3::ZERO]
        } else {
            [self.min, self.max]
        }
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::EMPTY
    }
}
