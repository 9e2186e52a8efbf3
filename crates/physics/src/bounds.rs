use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box, used as the playable arena area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner (x, y, z).
    pub min: Vec3,
    /// Maximum corner (x, y, z).
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB ensuring min <= max per axis.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        debug_assert!(min.cmple(max).all());
        Self { min, max }
    }

    /// Box centered on the origin spanning `half_extent` on the ground plane.
    pub fn square_arena(half_extent: f32) -> Self {
        let half = half_extent.abs();
        Self::new(Vec3::new(-half, 0.0, -half), Vec3::new(half, 0.0, half))
    }

    /// Tests intersection with another AABB.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Whether `point` lies inside the box (inclusive).
    pub fn contains(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Closest point inside the box.
    pub fn clamp_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }
}
