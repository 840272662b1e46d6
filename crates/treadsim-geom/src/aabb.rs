use treadsim_core::types::Vec3;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Aabb { pub min: Vec3, pub max: Vec3 }

impl Aabb {
    /// Inverted box; the identity for `union`.
    pub fn empty() -> Aabb {
        Aabb { min: Vec3::splat(f32::INFINITY), max: Vec3::splat(f32::NEG_INFINITY) }
    }

    #[inline] pub fn new(min: Vec3, max: Vec3) -> Self { Self { min, max } }
    #[inline] pub fn from_center_half_extents(c: Vec3, he: Vec3) -> Self {
        Self { min: c - he, max: c + he }
    }
    #[inline] pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }
    #[inline] pub fn overlaps(&self, other: &Aabb) -> bool {
        !(self.max.x < other.min.x || self.min.x > other.max.x ||
            self.max.y < other.min.y || self.min.y > other.max.y ||
            self.max.z < other.min.z || self.min.z > other.max.z)
    }
    #[inline] pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }
    #[inline] pub fn center(&self) -> Vec3 { (self.min + self.max) * 0.5 }
    #[inline] pub fn extents(&self) -> Vec3 { (self.max - self.min).max(Vec3::ZERO) }
    #[inline] pub fn volume(&self) -> f32 {
        if self.is_empty() { return 0.0; }
        let e = self.extents();
        e.x * e.y * e.z
    }
    /// Volume of the overlap region; 0 when disjoint.
    pub fn intersection_volume(&self, other: &Aabb) -> f32 {
        let lo = self.min.max(other.min);
        let hi = self.max.min(other.max);
        let e = (hi - lo).max(Vec3::ZERO);
        e.x * e.y * e.z
    }
    #[inline] pub fn translate(&self, d: Vec3) -> Aabb { Aabb { min: self.min + d, max: self.max + d } }
}
