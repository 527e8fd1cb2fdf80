//! Octree facade: pairs a bounding box with a shared tree root and exposes
//! the bounds-checked public API.

use std::rc::Rc;

use nalgebra::{Matrix4, Point3, RealField, Scalar};
use num_traits::Float;

use crate::aabb::{agreement, Aabb};
use crate::error::{OctreeError, Result};
use crate::tree::{self, Iter, Node};

/// Spatial index over points with attached payloads.
///
/// The tree behind an `Octree` is persistent: nodes are never mutated in
/// place, so cloning is O(1) and every mutation rebinds the root to a new
/// value that shares unmodified subtrees with the previous one. Sharing the
/// same nodes from many `Octree` values is always safe; only pulling from a
/// single lazy query iterator concurrently is undefined.
#[derive(Debug)]
pub struct Octree<S: Scalar, T> {
    bounds: Aabb<S>,
    root: Rc<Node<S, T>>,
}

impl<S: Scalar, T> Clone for Octree<S, T> {
    fn clone(&self) -> Self {
        Octree {
            bounds: self.bounds.clone(),
            root: self.root.clone(),
        }
    }
}

impl<S: Scalar, T: PartialEq> PartialEq for Octree<S, T> {
    fn eq(&self, other: &Self) -> bool {
        self.bounds == other.bounds && self.root == other.root
    }
}

impl<S: Scalar + RealField + Float, T> Octree<S, T> {
    /// Creates an empty octree covering `bounds`.
    pub fn new(bounds: Aabb<S>) -> Self {
        Octree {
            bounds,
            root: tree::empty(),
        }
    }

    pub fn bounds(&self) -> &Aabb<S> {
        &self.bounds
    }

    pub(crate) fn root(&self) -> &Rc<Node<S, T>> {
        &self.root
    }

    /// Number of points. Walks the tree; not O(1).
    pub fn len(&self) -> usize {
        tree::len(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        matches!(&*self.root, Node::Empty)
    }

    /// All `(point, data)` pairs, in a deterministic per-structure order.
    pub fn iter(&self) -> Iter<'_, S, T> {
        tree::iter(&self.root)
    }

    /// Fails with [`OctreeError::OutOfBounds`] when `point` lies outside the
    /// octree bounds. Called by every mutating operation; lookups degrade
    /// gracefully instead.
    pub fn check_bounds(&self, point: &Point3<S>) -> Result<()> {
        if self.bounds.contains_point(point) {
            Ok(())
        } else {
            Err(OctreeError::OutOfBounds)
        }
    }

    /// Data stored at exact coordinates; `None` when absent or out of bounds.
    pub fn get(&self, point: &Point3<S>) -> Option<&T> {
        if !self.bounds.contains_point(point) {
            return None;
        }
        tree::get(&self.root, &self.bounds, point)
    }

    /// Inserts a new point, failing on out-of-bounds or exact duplicate.
    pub fn insert(&mut self, point: Point3<S>, data: T) -> Result<()> {
        self.check_bounds(&point)?;
        self.root = tree::insert(&self.root, &self.bounds, point, data)?;
        Ok(())
    }

    /// Inserts or overwrites; only fails on out-of-bounds.
    pub fn update(&mut self, point: Point3<S>, data: T) -> Result<()> {
        self.check_bounds(&point)?;
        self.root = tree::update(&self.root, &self.bounds, point, data);
        Ok(())
    }

    /// Removes the point at exact coordinates, failing when absent.
    pub fn remove(&mut self, point: &Point3<S>) -> Result<()> {
        self.check_bounds(point)?;
        self.root = tree::remove(&self.root, &self.bounds, point)?;
        Ok(())
    }

    /// Repeated [`Octree::insert`]; stops at the first failure.
    pub fn extend(&mut self, pairs: impl IntoIterator<Item = (Point3<S>, T)>) -> Result<()> {
        for (point, data) in pairs {
            self.insert(point, data)?;
        }
        Ok(())
    }

    /// Merges two octrees with identical bounds.
    ///
    /// When both sides hold a value at the same coordinates, either value may
    /// survive; callers must not rely on which.
    pub fn simple_union(&self, other: &Octree<S, T>) -> Result<Octree<S, T>> {
        if self.bounds != other.bounds {
            return Err(OctreeError::BoundsMismatch);
        }
        Ok(Octree {
            bounds: self.bounds.clone(),
            root: tree::union(&self.root, &other.root, &self.bounds),
        })
    }

    /// Merges two octrees of any bounds under the union of their boxes.
    pub fn general_union(&self, other: &Octree<S, T>) -> Octree<S, T> {
        let bounds = self.bounds.merged(&other.bounds);
        let a = if self.bounds == bounds {
            self.root.clone()
        } else {
            tree::rebound(&self.root, &self.bounds, &bounds)
        };
        let b = if other.bounds == bounds {
            other.root.clone()
        } else {
            tree::rebound(&other.root, &other.bounds, &bounds)
        };
        log::trace!("general_union over merged bounds {:?}", bounds);
        Octree {
            root: tree::union(&a, &b, &bounds),
            bounds,
        }
    }

    /// Rebuilds the octree under `bounds`, dropping points that fall outside.
    pub fn rebound(&self, bounds: Aabb<S>) -> Octree<S, T> {
        let root = tree::rebound(&self.root, &self.bounds, &bounds);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "rebound kept {} of {} points",
                tree::len(&root),
                self.len()
            );
        }
        Octree { bounds, root }
    }

    /// Keeps only points satisfying `point_fn`.
    ///
    /// The box-level accelerator is derived by corner sampling: a subtree is
    /// kept or dropped wholesale when the predicate agrees on all 8 vertices
    /// of its box. That deduction is only sound for predicates whose regions
    /// make corner checking conclusive (e.g. half-spaces); use
    /// [`Octree::subset_with`] otherwise.
    pub fn subset<PF>(&self, point_fn: PF) -> Octree<S, T>
    where
        PF: Fn(&Point3<S>) -> bool,
    {
        let box_fn = |b: &Aabb<S>| agreement(b.vertices().iter().map(|v| point_fn(v)));
        Octree {
            bounds: self.bounds.clone(),
            root: tree::subset(&self.root, &self.bounds, &point_fn, &box_fn),
        }
    }

    /// [`Octree::subset`] with an explicit box-level predicate:
    /// `Some(true)` keeps a whole subtree unfiltered, `Some(false)` discards
    /// it, `None` recurses into it.
    pub fn subset_with<PF, BF>(&self, point_fn: PF, box_fn: BF) -> Octree<S, T>
    where
        PF: Fn(&Point3<S>) -> bool,
        BF: Fn(&Aabb<S>) -> Option<bool>,
    {
        Octree {
            bounds: self.bounds.clone(),
            root: tree::subset(&self.root, &self.bounds, &point_fn, &box_fn),
        }
    }

    /// Transforms every point's coordinates through `point_fn`, rebuilding
    /// the structure under `box_fn(bounds)`.
    ///
    /// `point_fn` is assumed continuous and `box_fn` must map a box onto a
    /// bounding box of its image. Points may migrate arbitrarily far, so this
    /// rebuilds substructure rather than relabeling in place; the resulting
    /// tree's shape need not mirror the input's.
    pub fn deform<PF, BF>(&self, point_fn: PF, box_fn: BF) -> Octree<S, T>
    where
        T: Clone,
        PF: Fn(&Point3<S>) -> Point3<S>,
        BF: FnOnce(&Aabb<S>) -> Aabb<S>,
    {
        let bounds = box_fn(&self.bounds);
        let mut root = tree::empty();
        for (p, d) in self.iter() {
            root = tree::update(&root, &bounds, point_fn(&p), d.clone());
        }
        Octree { bounds, root }
    }

    /// [`Octree::deform`] through a homogeneous transform, with the image box
    /// taken as the bounding box of the transformed corners (sound for affine
    /// and other convexity-preserving maps).
    pub fn apply_matrix(&self, m: &Matrix4<S>) -> Octree<S, T>
    where
        T: Clone,
    {
        self.deform(
            |p| m.transform_point(p),
            |b| {
                let vs = b.vertices();
                let q = m.transform_point(&vs[0]);
                let mut out = Aabb::new(q, q);
                for v in &vs[1..] {
                    let q = m.transform_point(v);
                    out = out.merged(&Aabb::new(q, q));
                }
                out
            },
        )
    }
}
