//! Persistent octree node core.
//!
//! Nodes are immutable and shared with `Rc`; every mutating operation returns
//! a new node graph that reuses unmodified subtrees of the original. A node
//! never stores its own bounding box. Every operation takes the current box
//! as an explicit parameter and derives child boxes by bisection, so the same
//! node value can sit anywhere structural sharing puts it.

use std::rc::Rc;

use nalgebra::{Point3, RealField, Scalar};
use num_traits::Float;

use crate::aabb::Aabb;
use crate::error::{OctreeError, Result};

/// Tagged node variant: no points, exactly one point, or 8 octant children.
///
/// The children array follows the octant bit encoding of [`Aabb::split`].
#[derive(Debug, PartialEq)]
pub(crate) enum Node<S: Scalar, T> {
    Empty,
    Leaf {
        point: Point3<S>,
        data: T,
    },
    Branch {
        children: [Rc<Node<S, T>>; 8],
    },
}

pub(crate) fn empty<S: Scalar, T>() -> Rc<Node<S, T>> {
    Rc::new(Node::Empty)
}

fn empty_children<S: Scalar, T>() -> [Rc<Node<S, T>>; 8] {
    let e = empty();
    core::array::from_fn(|_| e.clone())
}

fn with_child<S: Scalar, T>(
    children: &[Rc<Node<S, T>>; 8],
    i: usize,
    child: Rc<Node<S, T>>,
) -> Rc<Node<S, T>> {
    let mut children = children.clone();
    children[i] = child;
    Rc::new(Node::Branch { children })
}

/// Wraps an existing leaf in a fresh branch, placed in its octant of `bounds`.
fn branch_around<S: Scalar + RealField + Float, T>(
    leaf: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    at: &Point3<S>,
) -> Rc<Node<S, T>> {
    let mut children = empty_children();
    children[bounds.octant_index(at)] = leaf.clone();
    Rc::new(Node::Branch { children })
}

/// Collapses a rebuilt children array: fully empty becomes `Empty`, a single
/// surviving leaf becomes that leaf. Branch children keep the wrapper since
/// collapsing through them would change which boxes the nodes sit in.
fn simplify<S: Scalar, T>(children: [Rc<Node<S, T>>; 8]) -> Rc<Node<S, T>> {
    let mut occupied = children.iter().filter(|c| !matches!(&***c, Node::Empty));
    match (occupied.next(), occupied.next()) {
        (None, _) => empty(),
        (Some(only), None) if matches!(&**only, Node::Leaf { .. }) => only.clone(),
        _ => Rc::new(Node::Branch { children }),
    }
}

/// Number of points in the subtree. Recomputed on every call, not cached.
pub(crate) fn len<S: Scalar, T>(node: &Node<S, T>) -> usize {
    match node {
        Node::Empty => 0,
        Node::Leaf { .. } => 1,
        Node::Branch { children } => children.iter().map(|c| len(c)).sum(),
    }
}

pub(crate) fn get<'a, S: Scalar + RealField + Float, T>(
    node: &'a Node<S, T>,
    bounds: &Aabb<S>,
    point: &Point3<S>,
) -> Option<&'a T> {
    match node {
        Node::Empty => None,
        Node::Leaf { point: p, data } => (p == point).then_some(data),
        Node::Branch { children } => {
            let (i, sub) = bounds.octant(point);
            get(&children[i], &sub, point)
        }
    }
}

/// Inserts a new point, failing on exact coordinate collision.
///
/// When the target octant already holds a leaf with different coordinates,
/// that leaf is pushed one level down and the descent retries; the recursion
/// keeps splitting until the two points land in different octants, which is
/// guaranteed unless they are bit-for-bit identical (the duplicate case).
pub(crate) fn insert<S: Scalar + RealField + Float, T>(
    node: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    point: Point3<S>,
    data: T,
) -> Result<Rc<Node<S, T>>> {
    match &**node {
        Node::Empty => Ok(Rc::new(Node::Leaf { point, data })),
        Node::Leaf { point: p, .. } => {
            if *p == point {
                return Err(OctreeError::DuplicateKey);
            }
            let branch = branch_around(node, bounds, p);
            insert(&branch, bounds, point, data)
        }
        Node::Branch { children } => {
            let (i, sub) = bounds.octant(&point);
            let child = insert(&children[i], &sub, point, data)?;
            Ok(with_child(children, i, child))
        }
    }
}

/// Like [`insert`], but overwrites the data at existing coordinates.
pub(crate) fn update<S: Scalar + RealField + Float, T>(
    node: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    point: Point3<S>,
    data: T,
) -> Rc<Node<S, T>> {
    match &**node {
        Node::Empty => Rc::new(Node::Leaf { point, data }),
        Node::Leaf { point: p, .. } => {
            if *p == point {
                Rc::new(Node::Leaf { point, data })
            } else {
                let branch = branch_around(node, bounds, p);
                update(&branch, bounds, point, data)
            }
        }
        Node::Branch { children } => {
            let (i, sub) = bounds.octant(&point);
            let child = update(&children[i], &sub, point, data);
            with_child(children, i, child)
        }
    }
}

/// Removes the point at exact coordinates, failing when absent.
///
/// A branch left holding a single leaf is collapsed back down to that leaf;
/// read operations treat collapsed and uncollapsed shapes as equivalent, the
/// collapse only keeps the structure compact.
pub(crate) fn remove<S: Scalar + RealField + Float, T>(
    node: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    point: &Point3<S>,
) -> Result<Rc<Node<S, T>>> {
    match &**node {
        Node::Empty => Err(OctreeError::KeyNotFound),
        Node::Leaf { point: p, .. } => {
            if p == point {
                Ok(empty())
            } else {
                Err(OctreeError::KeyNotFound)
            }
        }
        Node::Branch { children } => {
            let (i, sub) = bounds.octant(point);
            let child = remove(&children[i], &sub, point)?;
            let mut children = children.clone();
            children[i] = child;
            Ok(simplify(children))
        }
    }
}

/// Re-homes an existing leaf node, replacing any entry at the exact same
/// coordinates. Reuses the leaf `Rc` instead of cloning its data, which is
/// what lets union and rebound share payloads with their sources.
pub(crate) fn graft<S: Scalar + RealField + Float, T>(
    node: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    leaf: &Rc<Node<S, T>>,
) -> Rc<Node<S, T>> {
    let at = match &**leaf {
        Node::Leaf { point, .. } => *point,
        _ => return node.clone(),
    };
    match &**node {
        Node::Empty => leaf.clone(),
        Node::Leaf { point: q, .. } => {
            if *q == at {
                // Collision: the grafted side survives here. Which side wins
                // a union collision is explicitly unspecified.
                leaf.clone()
            } else {
                let branch = branch_around(node, bounds, q);
                graft(&branch, bounds, leaf)
            }
        }
        Node::Branch { children } => {
            let (i, sub) = bounds.octant(&at);
            with_child(children, i, graft(&children[i], &sub, leaf))
        }
    }
}

/// Merges two trees occupying the same box. When both sides hold a value at
/// the same coordinates, either value may survive.
pub(crate) fn union<S: Scalar + RealField + Float, T>(
    a: &Rc<Node<S, T>>,
    b: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
) -> Rc<Node<S, T>> {
    match (&**a, &**b) {
        (Node::Empty, _) => b.clone(),
        (_, Node::Empty) => a.clone(),
        (_, Node::Leaf { .. }) => graft(a, bounds, b),
        (Node::Leaf { .. }, _) => graft(b, bounds, a),
        (Node::Branch { children: ca }, Node::Branch { children: cb }) => {
            let boxes = bounds.split();
            let children = core::array::from_fn(|i| union(&ca[i], &cb[i], &boxes[i]));
            Rc::new(Node::Branch { children })
        }
    }
}

/// Calls `f` for every leaf node of the subtree, in octant order.
pub(crate) fn for_each_leaf<'a, S: Scalar, T>(
    node: &'a Rc<Node<S, T>>,
    f: &mut impl FnMut(&'a Rc<Node<S, T>>),
) {
    match &**node {
        Node::Empty => {}
        Node::Leaf { .. } => f(node),
        Node::Branch { children } => {
            for c in children {
                for_each_leaf(c, f);
            }
        }
    }
}

/// Rebuilds the tree under `new_bounds`, dropping points that fall outside.
///
/// Subtrees disjoint from `new_bounds` are skipped wholesale; subtrees fully
/// inside it re-home their leaves without per-point containment tests.
pub(crate) fn rebound<S: Scalar + RealField + Float, T>(
    node: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    new_bounds: &Aabb<S>,
) -> Rc<Node<S, T>> {
    let mut out = empty();
    rebound_into(node, bounds, new_bounds, &mut out);
    out
}

fn rebound_into<S: Scalar + RealField + Float, T>(
    node: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    new_bounds: &Aabb<S>,
    out: &mut Rc<Node<S, T>>,
) {
    match &**node {
        Node::Empty => {}
        Node::Leaf { point, .. } => {
            if new_bounds.contains_point(point) {
                *out = graft(out, new_bounds, node);
            }
        }
        Node::Branch { children } => {
            if !bounds.intersects(new_bounds) {
                return;
            }
            if new_bounds.contains_aabb(bounds) {
                for_each_leaf(node, &mut |leaf| *out = graft(out, new_bounds, leaf));
            } else {
                let boxes = bounds.split();
                for (child, sub) in children.iter().zip(boxes.iter()) {
                    rebound_into(child, sub, new_bounds, out);
                }
            }
        }
    }
}

/// Keeps only points satisfying `point_fn`.
///
/// `box_fn` accelerates the walk: `Some(true)` shares the whole subtree
/// unfiltered, `Some(false)` discards it, `None` recurses. At a leaf only
/// `point_fn` is authoritative.
pub(crate) fn subset<S, T, PF, BF>(
    node: &Rc<Node<S, T>>,
    bounds: &Aabb<S>,
    point_fn: &PF,
    box_fn: &BF,
) -> Rc<Node<S, T>>
where
    S: Scalar + RealField + Float,
    PF: Fn(&Point3<S>) -> bool,
    BF: Fn(&Aabb<S>) -> Option<bool>,
{
    match &**node {
        Node::Empty => node.clone(),
        Node::Leaf { point, .. } => {
            if point_fn(point) {
                node.clone()
            } else {
                empty()
            }
        }
        Node::Branch { children } => {
            let boxes = bounds.split();
            let children = core::array::from_fn(|i| match box_fn(&boxes[i]) {
                Some(true) => children[i].clone(),
                Some(false) => empty(),
                None => subset(&children[i], &boxes[i], point_fn, box_fn),
            });
            simplify(children)
        }
    }
}

/// Depth-first iterator over `(point, data)` pairs in octant order.
///
/// The order is unspecified as far as callers are concerned, but it is
/// deterministic for a given structure.
pub struct Iter<'a, S: Scalar, T> {
    stack: Vec<&'a Node<S, T>>,
}

pub(crate) fn iter<S: Scalar, T>(node: &Node<S, T>) -> Iter<'_, S, T> {
    Iter { stack: vec![node] }
}

impl<'a, S: Scalar + Copy, T> Iterator for Iter<'a, S, T> {
    type Item = (Point3<S>, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                Node::Empty => {}
                Node::Leaf { point, data } => return Some((*point, data)),
                Node::Branch { children } => {
                    self.stack.extend(children.iter().rev().map(|c| &**c));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Aabb<f64> {
        Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(16.0, 16.0, 16.0))
    }

    #[test]
    fn insert_get_len() {
        let b = cube();
        let mut root = empty();
        root = insert(&root, &b, Point3::new(1.0, 1.0, 1.0), "a").unwrap();
        root = insert(&root, &b, Point3::new(9.0, 9.0, 9.0), "b").unwrap();
        assert_eq!(len(&root), 2);
        assert_eq!(get(&root, &b, &Point3::new(1.0, 1.0, 1.0)), Some(&"a"));
        assert_eq!(get(&root, &b, &Point3::new(9.0, 9.0, 9.0)), Some(&"b"));
        assert_eq!(get(&root, &b, &Point3::new(2.0, 1.0, 1.0)), None);
    }

    #[test]
    fn insert_duplicate_fails() {
        let b = cube();
        let mut root = empty();
        root = insert(&root, &b, Point3::new(3.0, 3.0, 3.0), 1).unwrap();
        assert_eq!(
            insert(&root, &b, Point3::new(3.0, 3.0, 3.0), 2).unwrap_err(),
            OctreeError::DuplicateKey
        );
    }

    #[test]
    fn close_points_split_until_separated() {
        // Forces several levels of leaf splitting before the points part ways.
        let b = cube();
        let p = Point3::new(1.0, 1.0, 1.0);
        let q = Point3::new(1.0 + 1e-9, 1.0, 1.0);
        let mut root = empty();
        root = insert(&root, &b, p, "p").unwrap();
        root = insert(&root, &b, q, "q").unwrap();
        assert_eq!(len(&root), 2);
        assert_eq!(get(&root, &b, &p), Some(&"p"));
        assert_eq!(get(&root, &b, &q), Some(&"q"));
    }

    #[test]
    fn update_overwrites() {
        let b = cube();
        let mut root = empty();
        root = update(&root, &b, Point3::new(3.0, 4.0, 5.0), 1);
        root = update(&root, &b, Point3::new(3.0, 4.0, 5.0), 2);
        assert_eq!(len(&root), 1);
        assert_eq!(get(&root, &b, &Point3::new(3.0, 4.0, 5.0)), Some(&2));
    }

    #[test]
    fn remove_collapses_lone_leaf() {
        let b = cube();
        let p = Point3::new(1.0, 1.0, 1.0);
        let q = Point3::new(1.5, 1.0, 1.0);
        let mut root = empty();
        root = insert(&root, &b, p, "p").unwrap();
        root = insert(&root, &b, q, "q").unwrap();
        root = remove(&root, &b, &q).unwrap();
        assert!(matches!(&*root, Node::Leaf { .. }));
        assert_eq!(get(&root, &b, &p), Some(&"p"));
        assert_eq!(remove(&root, &b, &q).unwrap_err(), OctreeError::KeyNotFound);
    }

    #[test]
    fn structural_sharing_on_insert() {
        let b = cube();
        let mut root = empty();
        root = insert(&root, &b, Point3::new(1.0, 1.0, 1.0), "a").unwrap();
        root = insert(&root, &b, Point3::new(15.0, 15.0, 15.0), "b").unwrap();
        let before = root.clone();
        let after = insert(&root, &b, Point3::new(15.0, 1.0, 1.0), "c").unwrap();
        // The untouched octant subtree is shared, not copied.
        if let (Node::Branch { children: old }, Node::Branch { children: new }) =
            (&*before, &*after)
        {
            assert!(Rc::ptr_eq(&old[7], &new[7]));
        } else {
            panic!("expected branches");
        }
        assert_eq!(len(&before), 2);
        assert_eq!(len(&after), 3);
    }

    #[test]
    fn union_merges_and_keeps_one_collision_side() {
        let b = cube();
        let mut a = empty();
        a = insert(&a, &b, Point3::new(1.0, 1.0, 1.0), 1).unwrap();
        a = insert(&a, &b, Point3::new(5.0, 5.0, 5.0), 2).unwrap();
        let mut c = empty();
        c = insert(&c, &b, Point3::new(5.0, 5.0, 5.0), 20).unwrap();
        c = insert(&c, &b, Point3::new(9.0, 9.0, 9.0), 3).unwrap();
        let u = union(&a, &c, &b);
        assert_eq!(len(&u), 3);
        assert_eq!(get(&u, &b, &Point3::new(1.0, 1.0, 1.0)), Some(&1));
        assert_eq!(get(&u, &b, &Point3::new(9.0, 9.0, 9.0)), Some(&3));
        let collided = get(&u, &b, &Point3::new(5.0, 5.0, 5.0)).unwrap();
        assert!(*collided == 2 || *collided == 20);
    }
}
