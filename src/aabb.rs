//! Axis-aligned box primitives shared by the tree core and the query engines.

use nalgebra::{Point3, RealField, Scalar};
use num_traits::Float;

/// Axis-aligned bounding box over a generic scalar.
///
/// Plain immutable value; the `mins <= maxs` invariant on every axis is the
/// caller's responsibility and is not enforced here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb<S: Scalar> {
    pub mins: Point3<S>,
    pub maxs: Point3<S>,
}

impl<S: Scalar + RealField + Float> Aabb<S> {
    #[inline]
    pub fn new(mins: Point3<S>, maxs: Point3<S>) -> Self {
        Aabb { mins, maxs }
    }

    #[inline]
    pub fn center(&self) -> Point3<S> {
        let two = S::one() + S::one();
        Point3::new(
            (self.mins.x + self.maxs.x) / two,
            (self.mins.y + self.maxs.y) / two,
            (self.mins.z + self.maxs.z) / two,
        )
    }

    /// Closed-interval containment on all three axes.
    #[inline]
    pub fn contains_point(&self, p: &Point3<S>) -> bool {
        self.mins.x <= p.x
            && p.x <= self.maxs.x
            && self.mins.y <= p.y
            && p.y <= self.maxs.y
            && self.mins.z <= p.z
            && p.z <= self.maxs.z
    }

    #[inline]
    pub fn contains_aabb(&self, other: &Aabb<S>) -> bool {
        self.contains_point(&other.mins) && self.contains_point(&other.maxs)
    }

    #[inline]
    pub fn intersects(&self, other: &Aabb<S>) -> bool {
        self.mins.x <= other.maxs.x
            && other.mins.x <= self.maxs.x
            && self.mins.y <= other.maxs.y
            && other.mins.y <= self.maxs.y
            && self.mins.z <= other.maxs.z
            && other.mins.z <= self.maxs.z
    }

    /// Per-axis min/max union of two boxes.
    pub fn merged(&self, other: &Aabb<S>) -> Aabb<S> {
        Aabb::new(
            Point3::new(
                Float::min(self.mins.x, other.mins.x),
                Float::min(self.mins.y, other.mins.y),
                Float::min(self.mins.z, other.mins.z),
            ),
            Point3::new(
                Float::max(self.maxs.x, other.maxs.x),
                Float::max(self.maxs.y, other.maxs.y),
                Float::max(self.maxs.z, other.maxs.z),
            ),
        )
    }

    /// The 8 octant boxes obtained by bisecting every axis at the center.
    ///
    /// Octant `i` takes the upper half of an axis when the corresponding bit
    /// is set: bit 4 for x, bit 2 for y, bit 1 for z. [`Aabb::octant_index`]
    /// uses the same encoding, so splitting and descent always agree.
    pub fn split(&self) -> [Aabb<S>; 8] {
        let c = self.center();
        core::array::from_fn(|i| {
            let (x0, x1) = if i & 4 == 0 {
                (self.mins.x, c.x)
            } else {
                (c.x, self.maxs.x)
            };
            let (y0, y1) = if i & 2 == 0 {
                (self.mins.y, c.y)
            } else {
                (c.y, self.maxs.y)
            };
            let (z0, z1) = if i & 1 == 0 {
                (self.mins.z, c.z)
            } else {
                (c.z, self.maxs.z)
            };
            Aabb::new(Point3::new(x0, y0, z0), Point3::new(x1, y1, z1))
        })
    }

    /// The 8 corner points, indexed with the same bit encoding as
    /// [`Aabb::split`].
    pub fn vertices(&self) -> [Point3<S>; 8] {
        core::array::from_fn(|i| {
            Point3::new(
                if i & 4 == 0 { self.mins.x } else { self.maxs.x },
                if i & 2 == 0 { self.mins.y } else { self.maxs.y },
                if i & 1 == 0 { self.mins.z } else { self.maxs.z },
            )
        })
    }

    /// Octant index of `p` relative to the center (upper half on `>=`).
    #[inline]
    pub fn octant_index(&self, p: &Point3<S>) -> usize {
        let c = self.center();
        let mut i = 0;
        if p.x >= c.x {
            i |= 4;
        }
        if p.y >= c.y {
            i |= 2;
        }
        if p.z >= c.z {
            i |= 1;
        }
        i
    }

    /// Octant index of `p` together with the corresponding sub-box.
    pub fn octant(&self, p: &Point3<S>) -> (usize, Aabb<S>) {
        let c = self.center();
        let mut i = 0;
        let mut mins = self.mins;
        let mut maxs = c;
        if p.x >= c.x {
            i |= 4;
            mins.x = c.x;
            maxs.x = self.maxs.x;
        }
        if p.y >= c.y {
            i |= 2;
            mins.y = c.y;
            maxs.y = self.maxs.y;
        }
        if p.z >= c.z {
            i |= 1;
            mins.z = c.z;
            maxs.z = self.maxs.z;
        }
        (i, Aabb::new(mins, maxs))
    }

    /// Euclidean distance from `p` to the nearest point of the box; zero when
    /// `p` lies inside.
    pub fn distance_to_point(&self, p: &Point3<S>) -> S {
        let zero = S::zero();
        let dx = Float::max(Float::max(self.mins.x - p.x, p.x - self.maxs.x), zero);
        let dy = Float::max(Float::max(self.mins.y - p.y, p.y - self.maxs.y), zero);
        let dz = Float::max(Float::max(self.mins.z - p.z, p.z - self.maxs.z), zero);
        Float::sqrt(dx * dx + dy * dy + dz * dz)
    }

    /// Euclidean distance from `p` to the farthest corner of the box.
    pub fn max_distance_to_point(&self, p: &Point3<S>) -> S {
        let dx = Float::max(Float::abs(p.x - self.mins.x), Float::abs(self.maxs.x - p.x));
        let dy = Float::max(Float::abs(p.y - self.mins.y), Float::abs(self.maxs.y - p.y));
        let dz = Float::max(Float::abs(p.z - self.mins.z), Float::abs(self.maxs.z - p.z));
        Float::sqrt(dx * dx + dy * dy + dz * dz)
    }

    /// Minimum Euclidean distance between two boxes; zero when they overlap.
    pub fn distance_to_aabb(&self, other: &Aabb<S>) -> S {
        let zero = S::zero();
        let dx = Float::max(
            Float::max(other.mins.x - self.maxs.x, self.mins.x - other.maxs.x),
            zero,
        );
        let dy = Float::max(
            Float::max(other.mins.y - self.maxs.y, self.mins.y - other.maxs.y),
            zero,
        );
        let dz = Float::max(
            Float::max(other.mins.z - self.maxs.z, self.mins.z - other.maxs.z),
            zero,
        );
        Float::sqrt(dx * dx + dy * dy + dz * dz)
    }

    /// Distance between the farthest pair of corners of the two boxes.
    pub fn max_distance_to_aabb(&self, other: &Aabb<S>) -> S {
        let dx = Float::max(self.maxs.x - other.mins.x, other.maxs.x - self.mins.x);
        let dy = Float::max(self.maxs.y - other.mins.y, other.maxs.y - self.mins.y);
        let dz = Float::max(self.maxs.z - other.mins.z, other.maxs.z - self.mins.z);
        Float::sqrt(dx * dx + dy * dy + dz * dz)
    }

    /// Largest distance from a corner of `other` to the nearest point of
    /// `self`.
    ///
    /// For any `q` inside `self`, the farthest-corner distance from `q` to
    /// `other` is at least this value, which makes it an admissible lower
    /// bound for the farthest-first searches.
    pub fn minmax_distance_to_aabb(&self, other: &Aabb<S>) -> S {
        let mut best = S::zero();
        for v in other.vertices() {
            best = Float::max(best, self.distance_to_point(&v));
        }
        best
    }
}

/// Euclidean distance between two points.
#[inline]
pub fn point_distance<S: Scalar + RealField + Float>(a: &Point3<S>, b: &Point3<S>) -> S {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    Float::sqrt(dx * dx + dy * dy + dz * dz)
}

/// Reduces a sequence of booleans to all-true / all-false / mixed.
///
/// `Some(true)` when every value is true (vacuously for an empty sequence),
/// `Some(false)` when every value is false, `None` otherwise. Stops consuming
/// the iterator as soon as both a true and a false have been seen.
pub fn agreement<I: IntoIterator<Item = bool>>(values: I) -> Option<bool> {
    let mut any_true = false;
    let mut any_false = false;
    for v in values {
        if v {
            any_true = true;
        } else {
            any_false = true;
        }
        if any_true && any_false {
            return None;
        }
    }
    if any_false {
        Some(false)
    } else {
        Some(true)
    }
}

/// Caps a score at an epsilon threshold.
///
/// With an epsilon, values above it become `None` ("not of interest"), which
/// lets the box-scoring side of a search prune whole subtrees once their
/// best-case score exceeds the threshold. Without one, the value passes
/// through unchanged.
#[inline]
pub fn bounding<V: PartialOrd>(value: V, epsilon: Option<V>) -> Option<V> {
    match epsilon {
        Some(e) if value > e => None,
        _ => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Aabb<f64> {
        Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0))
    }

    #[test]
    fn split_agrees_with_octant_index() {
        let b = cube();
        let subs = b.split();
        for p in [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(9.0, 1.0, 1.0),
            Point3::new(1.0, 9.0, 9.0),
            Point3::new(5.0, 5.0, 5.0),
            Point3::new(9.9, 9.9, 0.1),
        ] {
            let (i, sub) = b.octant(&p);
            assert_eq!(i, b.octant_index(&p));
            assert_eq!(sub, subs[i]);
            assert!(subs[i].contains_point(&p));
        }
    }

    #[test]
    fn octant_bits_encode_axes() {
        let b = cube();
        assert_eq!(b.octant_index(&Point3::new(1.0, 1.0, 1.0)), 0);
        assert_eq!(b.octant_index(&Point3::new(9.0, 1.0, 1.0)), 4);
        assert_eq!(b.octant_index(&Point3::new(1.0, 9.0, 1.0)), 2);
        assert_eq!(b.octant_index(&Point3::new(1.0, 1.0, 9.0)), 1);
        assert_eq!(b.octant_index(&Point3::new(9.0, 9.0, 9.0)), 7);
    }

    #[test]
    fn distances() {
        let b = cube();
        assert_eq!(b.distance_to_point(&Point3::new(5.0, 5.0, 5.0)), 0.0);
        assert_eq!(b.distance_to_point(&Point3::new(13.0, 14.0, 5.0)), 5.0);
        let far = b.max_distance_to_point(&Point3::new(0.0, 0.0, 0.0));
        assert!((far - 300.0_f64.sqrt()).abs() < 1e-12);

        let other = Aabb::new(Point3::new(13.0, 0.0, 0.0), Point3::new(20.0, 10.0, 10.0));
        assert_eq!(b.distance_to_aabb(&other), 3.0);
        assert_eq!(b.distance_to_aabb(&cube()), 0.0);
        assert!(b.max_distance_to_aabb(&other) >= 20.0);
        assert!(b.minmax_distance_to_aabb(&other) >= 3.0);
        assert!(b.minmax_distance_to_aabb(&other) <= b.max_distance_to_aabb(&other));
    }

    #[test]
    fn merged_covers_both() {
        let b = cube();
        let other = Aabb::new(Point3::new(-5.0, 2.0, 3.0), Point3::new(4.0, 20.0, 6.0));
        let m = b.merged(&other);
        assert!(m.contains_aabb(&b));
        assert!(m.contains_aabb(&other));
    }

    #[test]
    fn agreement_reduces() {
        assert_eq!(agreement([true, true]), Some(true));
        assert_eq!(agreement([false, false]), Some(false));
        assert_eq!(agreement([true, false]), None);
        assert_eq!(agreement(std::iter::empty()), Some(true));
    }

    #[test]
    fn agreement_short_circuits() {
        let mut pulled = 0;
        let it = [true, false, true, true].into_iter().inspect(|_| pulled += 1);
        assert_eq!(agreement(it), None);
        assert_eq!(pulled, 2);
    }

    #[test]
    fn bounding_caps_at_epsilon() {
        assert_eq!(bounding(1.0, Some(2.0)), Some(1.0));
        assert_eq!(bounding(3.0, Some(2.0)), None);
        assert_eq!(bounding(3.0, None), Some(3.0));
        assert_eq!(bounding(2.0, Some(2.0)), Some(2.0));
    }
}
