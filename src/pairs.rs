//! Cross-tree pair queries.
//!
//! Both engines walk two octrees at once over pairs of work items, where an
//! item is either a subtree with its box or a single point. Branches expand
//! one level on both sides simultaneously, so a pair of subtrees fans out
//! into at most 64 child pairs. [`PairsByScore`] orders pairs through a
//! binary heap like the single-tree engine; [`PairsGenerate`] is unordered
//! and driven by tri-state predicates instead of scores.

use std::collections::{BinaryHeap, VecDeque};

use nalgebra::{Point3, RealField, Scalar};
use num_traits::Float;

use crate::aabb::{agreement, bounding, point_distance, Aabb};
use crate::octree::Octree;
use crate::query::Scored;
use crate::tree::{self, Node};

enum PairItem<'a, S: Scalar, T> {
    Subtree(Aabb<S>, &'a Node<S, T>),
    Point(Point3<S>, &'a T),
}

impl<'a, S: Scalar, T> Clone for PairItem<'a, S, T> {
    fn clone(&self) -> Self {
        match self {
            PairItem::Subtree(b, n) => PairItem::Subtree(b.clone(), n),
            PairItem::Point(p, d) => PairItem::Point(p.clone(), d),
        }
    }
}

/// One level of expansion. Leaf children come back as points immediately, so
/// a subtree item always wraps a branch with at least one point below it.
fn octants<'a, S: Scalar + RealField + Float, T>(
    bounds: &Aabb<S>,
    node: &'a Node<S, T>,
) -> Vec<PairItem<'a, S, T>> {
    match node {
        Node::Empty => Vec::new(),
        Node::Leaf { point, data } => vec![PairItem::Point(*point, data)],
        Node::Branch { children } => {
            let boxes = bounds.split();
            let mut out = Vec::with_capacity(8);
            for (child, sub) in children.iter().zip(boxes) {
                match &**child {
                    Node::Empty => {}
                    Node::Leaf { point, data } => out.push(PairItem::Point(*point, data)),
                    Node::Branch { .. } => out.push(PairItem::Subtree(sub, &**child)),
                }
            }
            out
        }
    }
}

/// Lazy ascending-score iterator over point pairs drawn from two octrees.
///
/// Four scoring functions cover the four item-pair shapes. The box-involving
/// ones must not exceed the point-point score of any pair inside them, and
/// any of the four may return `None` to prune.
pub struct PairsByScore<'a, S: Scalar, T, R, PP, PB, BP, BB> {
    heap: BinaryHeap<Scored<R, (PairItem<'a, S, T>, PairItem<'a, S, T>)>>,
    point_point: PP,
    point_box: PB,
    box_point: BP,
    box_box: BB,
}

impl<'a, S, T, R, PP, PB, BP, BB> PairsByScore<'a, S, T, R, PP, PB, BP, BB>
where
    S: Scalar + RealField + Float,
    R: PartialOrd,
    PP: FnMut(&Point3<S>, &Point3<S>) -> Option<R>,
    PB: FnMut(&Point3<S>, &Aabb<S>) -> Option<R>,
    BP: FnMut(&Aabb<S>, &Point3<S>) -> Option<R>,
    BB: FnMut(&Aabb<S>, &Aabb<S>) -> Option<R>,
{
    fn push(&mut self, a: PairItem<'a, S, T>, b: PairItem<'a, S, T>) {
        let score = match (&a, &b) {
            (PairItem::Point(p, _), PairItem::Point(q, _)) => (self.point_point)(p, q),
            (PairItem::Point(p, _), PairItem::Subtree(bb, _)) => (self.point_box)(p, bb),
            (PairItem::Subtree(ab, _), PairItem::Point(q, _)) => (self.box_point)(ab, q),
            (PairItem::Subtree(ab, _), PairItem::Subtree(bb, _)) => (self.box_box)(ab, bb),
        };
        if let Some(s) = score {
            self.heap.push(Scored {
                score: s,
                item: (a, b),
            });
        }
    }
}

impl<'a, S, T, R, PP, PB, BP, BB> Iterator for PairsByScore<'a, S, T, R, PP, PB, BP, BB>
where
    S: Scalar + RealField + Float,
    R: PartialOrd,
    PP: FnMut(&Point3<S>, &Point3<S>) -> Option<R>,
    PB: FnMut(&Point3<S>, &Aabb<S>) -> Option<R>,
    BP: FnMut(&Aabb<S>, &Point3<S>) -> Option<R>,
    BB: FnMut(&Aabb<S>, &Aabb<S>) -> Option<R>,
{
    type Item = (R, Point3<S>, Point3<S>, &'a T, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(Scored { score, item }) = self.heap.pop() {
            match item {
                (PairItem::Point(p, u), PairItem::Point(q, v)) => {
                    return Some((score, p, q, u, v))
                }
                (PairItem::Subtree(ab, an), b @ PairItem::Point(..)) => {
                    for a in octants(&ab, an) {
                        self.push(a, b.clone());
                    }
                }
                (a @ PairItem::Point(..), PairItem::Subtree(bb, bn)) => {
                    for b in octants(&bb, bn) {
                        self.push(a.clone(), b);
                    }
                }
                (PairItem::Subtree(ab, an), PairItem::Subtree(bb, bn)) => {
                    let bs = octants(&bb, bn);
                    for a in octants(&ab, an) {
                        for b in &bs {
                            self.push(a.clone(), b.clone());
                        }
                    }
                }
            }
        }
        None
    }
}

/// Unordered predicate-driven pair generator.
///
/// Box-involving predicates are tri-state: `Some(true)` emits the whole
/// cross product below without further tests, `Some(false)` prunes it,
/// `None` expands one level. Only the point-point predicate is
/// authoritative for an individual pair.
pub struct PairsGenerate<'a, S: Scalar, T, PP, PB, BP, BB> {
    stack: Vec<(PairItem<'a, S, T>, PairItem<'a, S, T>)>,
    ready: VecDeque<(Point3<S>, Point3<S>, &'a T, &'a T)>,
    point_point: PP,
    point_box: PB,
    box_point: BP,
    box_box: BB,
}

impl<'a, S, T, PP, PB, BP, BB> Iterator for PairsGenerate<'a, S, T, PP, PB, BP, BB>
where
    S: Scalar + RealField + Float,
    PP: FnMut(&Point3<S>, &Point3<S>) -> bool,
    PB: FnMut(&Point3<S>, &Aabb<S>) -> Option<bool>,
    BP: FnMut(&Aabb<S>, &Point3<S>) -> Option<bool>,
    BB: FnMut(&Aabb<S>, &Aabb<S>) -> Option<bool>,
{
    type Item = (Point3<S>, Point3<S>, &'a T, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.ready.pop_front() {
                return Some(pair);
            }
            let (a, b) = self.stack.pop()?;
            match (a, b) {
                (PairItem::Point(p, u), PairItem::Point(q, v)) => {
                    if (self.point_point)(&p, &q) {
                        return Some((p, q, u, v));
                    }
                }
                (PairItem::Point(p, u), PairItem::Subtree(bb, bn)) => {
                    match (self.point_box)(&p, &bb) {
                        Some(false) => {}
                        Some(true) => {
                            for (q, v) in tree::iter(bn) {
                                self.ready.push_back((p, q, u, v));
                            }
                        }
                        None => {
                            for b in octants(&bb, bn) {
                                self.stack.push((PairItem::Point(p, u), b));
                            }
                        }
                    }
                }
                (PairItem::Subtree(ab, an), PairItem::Point(q, v)) => {
                    match (self.box_point)(&ab, &q) {
                        Some(false) => {}
                        Some(true) => {
                            for (p, u) in tree::iter(an) {
                                self.ready.push_back((p, q, u, v));
                            }
                        }
                        None => {
                            for a in octants(&ab, an) {
                                self.stack.push((a, PairItem::Point(q, v)));
                            }
                        }
                    }
                }
                (PairItem::Subtree(ab, an), PairItem::Subtree(bb, bn)) => {
                    match (self.box_box)(&ab, &bb) {
                        Some(false) => {}
                        Some(true) => {
                            for (p, u) in tree::iter(an) {
                                for (q, v) in tree::iter(bn) {
                                    self.ready.push_back((p, q, u, v));
                                }
                            }
                        }
                        None => {
                            let bs = octants(&bb, bn);
                            for a in octants(&ab, an) {
                                for b in &bs {
                                    self.stack.push((a.clone(), b.clone()));
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

impl<S: Scalar + RealField + Float, T> Octree<S, T> {
    /// Point pairs `(p from self, q from other)` in ascending score order
    /// under caller-chosen scoring, analogous to [`Octree::by_score`] but
    /// with one scoring function per item-pair shape.
    pub fn pairs_by_score<'a, R, PP, PB, BP, BB>(
        &'a self,
        other: &'a Octree<S, T>,
        point_point: PP,
        point_box: PB,
        box_point: BP,
        box_box: BB,
    ) -> PairsByScore<'a, S, T, R, PP, PB, BP, BB>
    where
        R: PartialOrd,
        PP: FnMut(&Point3<S>, &Point3<S>) -> Option<R>,
        PB: FnMut(&Point3<S>, &Aabb<S>) -> Option<R>,
        BP: FnMut(&Aabb<S>, &Point3<S>) -> Option<R>,
        BB: FnMut(&Aabb<S>, &Aabb<S>) -> Option<R>,
    {
        let mut it = PairsByScore {
            heap: BinaryHeap::new(),
            point_point,
            point_box,
            box_point,
            box_box,
        };
        it.push(
            PairItem::Subtree(*self.bounds(), &**self.root()),
            PairItem::Subtree(*other.bounds(), &**other.root()),
        );
        it
    }

    /// Point pairs in ascending distance. With an epsilon, pairs farther
    /// apart than it are omitted and disjoint regions beyond it are never
    /// expanded.
    pub fn pairs_by_distance<'a>(
        &'a self,
        other: &'a Octree<S, T>,
        epsilon: Option<S>,
    ) -> impl Iterator<Item = (S, Point3<S>, Point3<S>, &'a T, &'a T)> + 'a {
        self.pairs_by_score(
            other,
            move |p, q| bounding(point_distance(p, q), epsilon),
            move |p, b| bounding(b.distance_to_point(p), epsilon),
            move |a, q| bounding(a.distance_to_point(q), epsilon),
            move |a, b| bounding(a.distance_to_aabb(b), epsilon),
        )
    }

    /// All point pairs satisfying the predicates, in unspecified order.
    pub fn pairs_generate<'a, PP, PB, BP, BB>(
        &'a self,
        other: &'a Octree<S, T>,
        point_point: PP,
        point_box: PB,
        box_point: BP,
        box_box: BB,
    ) -> PairsGenerate<'a, S, T, PP, PB, BP, BB>
    where
        PP: FnMut(&Point3<S>, &Point3<S>) -> bool,
        PB: FnMut(&Point3<S>, &Aabb<S>) -> Option<bool>,
        BP: FnMut(&Aabb<S>, &Point3<S>) -> Option<bool>,
        BB: FnMut(&Aabb<S>, &Aabb<S>) -> Option<bool>,
    {
        PairsGenerate {
            stack: vec![(
                PairItem::Subtree(*self.bounds(), &**self.root()),
                PairItem::Subtree(*other.bounds(), &**other.root()),
            )],
            ready: VecDeque::new(),
            point_point,
            point_box,
            box_point,
            box_box,
        }
    }

    /// [`Octree::pairs_generate`] with box predicates derived by corner
    /// sampling, as in [`Octree::subset`]: a box-level answer is committed
    /// when the point predicate agrees on every corner pair, which is only
    /// sound for predicates whose regions make corner checking conclusive.
    pub fn pairs_matching<'a, PP>(
        &'a self,
        other: &'a Octree<S, T>,
        point_point: PP,
    ) -> impl Iterator<Item = (Point3<S>, Point3<S>, &'a T, &'a T)> + 'a
    where
        PP: Fn(&Point3<S>, &Point3<S>) -> bool + Clone + 'a,
    {
        let point_box = {
            let f = point_point.clone();
            move |p: &Point3<S>, b: &Aabb<S>| agreement(b.vertices().iter().map(|v| f(p, v)))
        };
        let box_point = {
            let f = point_point.clone();
            move |a: &Aabb<S>, q: &Point3<S>| agreement(a.vertices().iter().map(|v| f(v, q)))
        };
        let box_box = {
            let f = point_point.clone();
            move |a: &Aabb<S>, b: &Aabb<S>| {
                let av = a.vertices();
                let bv = b.vertices();
                let mut vals = Vec::with_capacity(64);
                for p in &av {
                    for q in &bv {
                        vals.push(f(p, q));
                    }
                }
                agreement(vals)
            }
        };
        self.pairs_generate(other, point_point, point_box, box_point, box_box)
    }

    /// All point pairs at most `epsilon` apart, in unspecified order.
    ///
    /// Regions provably within `epsilon` of each other emit their whole
    /// cross product without per-pair distance tests.
    pub fn pairs_nearby<'a>(
        &'a self,
        other: &'a Octree<S, T>,
        epsilon: S,
    ) -> impl Iterator<Item = (Point3<S>, Point3<S>, &'a T, &'a T)> + 'a {
        self.pairs_generate(
            other,
            move |p, q| point_distance(p, q) <= epsilon,
            move |p, b| {
                if b.distance_to_point(p) > epsilon {
                    Some(false)
                } else if b.max_distance_to_point(p) <= epsilon {
                    Some(true)
                } else {
                    None
                }
            },
            move |a, q| {
                if a.distance_to_point(q) > epsilon {
                    Some(false)
                } else if a.max_distance_to_point(q) <= epsilon {
                    Some(true)
                } else {
                    None
                }
            },
            move |a, b| {
                if a.distance_to_aabb(b) > epsilon {
                    Some(false)
                } else if a.max_distance_to_aabb(b) <= epsilon {
                    Some(true)
                } else {
                    None
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcg_rand::Pcg32;
    use rand::{Rng, SeedableRng};

    fn cube(side: f64) -> Aabb<f64> {
        Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(side, side, side))
    }

    fn random_tree(seed: u64, n: usize, side: f64) -> (Octree<f64, usize>, Vec<Point3<f64>>) {
        let mut tree = Octree::new(cube(side));
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut points = Vec::new();
        for i in 0..n {
            let p = Point3::new(
                rng.gen_range(0.0..side),
                rng.gen_range(0.0..side),
                rng.gen_range(0.0..side),
            );
            tree.insert(p, i).unwrap();
            points.push(p);
        }
        (tree, points)
    }

    #[test]
    fn single_close_pair_with_epsilon() {
        let mut left = Octree::new(cube(200.0));
        left.insert(Point3::new(0.0, 0.0, 0.0), "o").unwrap();
        let mut right = Octree::new(cube(200.0));
        right.insert(Point3::new(1.0, 0.0, 0.0), "near").unwrap();
        right.insert(Point3::new(100.0, 100.0, 100.0), "far").unwrap();
        let got: Vec<_> = left.pairs_by_distance(&right, Some(5.0)).collect();
        assert_eq!(got.len(), 1);
        let (d, p, q, u, v) = got[0];
        assert_eq!(d, 1.0);
        assert_eq!(p, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(q, Point3::new(1.0, 0.0, 0.0));
        assert_eq!((*u, *v), ("o", "near"));
    }

    #[test]
    fn pairs_by_distance_matches_brute_force_order() {
        let (left, lp) = random_tree(21, 40, 100.0);
        let (right, rp) = random_tree(22, 40, 100.0);
        let got: Vec<_> = left
            .pairs_by_distance(&right, None)
            .map(|(d, p, q, _, _)| (d, p, q))
            .collect();
        assert_eq!(got.len(), 40 * 40);
        for w in got.windows(2) {
            assert!(w[0].0 <= w[1].0);
        }
        let mut brute: Vec<f64> = lp
            .iter()
            .flat_map(|p| rp.iter().map(move |q| point_distance(p, q)))
            .collect();
        brute.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for (want, (d, _, _)) in brute.iter().zip(&got) {
            assert!((want - d).abs() < 1e-12);
        }
    }

    #[test]
    fn pairs_nearby_matches_brute_force_set() {
        let (left, lp) = random_tree(31, 60, 50.0);
        let (right, rp) = random_tree(32, 60, 50.0);
        let eps = 10.0;
        let mut got: Vec<_> = left
            .pairs_nearby(&right, eps)
            .map(|(_, _, u, v)| (*u, *v))
            .collect();
        got.sort_unstable();
        let mut brute = Vec::new();
        for (i, p) in lp.iter().enumerate() {
            for (j, q) in rp.iter().enumerate() {
                if point_distance(p, q) <= eps {
                    brute.push((i, j));
                }
            }
        }
        brute.sort_unstable();
        assert_eq!(got, brute);
    }

    #[test]
    fn pairs_matching_half_space_predicate() {
        let (left, lp) = random_tree(41, 30, 50.0);
        let (right, rp) = random_tree(42, 30, 50.0);
        let mut got: Vec<_> = left
            .pairs_matching(&right, |p, q| p.x <= q.x)
            .map(|(_, _, u, v)| (*u, *v))
            .collect();
        got.sort_unstable();
        let mut brute = Vec::new();
        for (i, p) in lp.iter().enumerate() {
            for (j, q) in rp.iter().enumerate() {
                if p.x <= q.x {
                    brute.push((i, j));
                }
            }
        }
        brute.sort_unstable();
        assert_eq!(got, brute);
    }

    #[test]
    fn empty_sides_yield_no_pairs() {
        let (left, _) = random_tree(51, 10, 50.0);
        let right: Octree<f64, usize> = Octree::new(cube(50.0));
        assert!(left.pairs_by_distance(&right, None).next().is_none());
        assert!(right.pairs_by_distance(&left, None).next().is_none());
        assert!(left.pairs_nearby(&right, 100.0).next().is_none());
    }

    #[test]
    fn pairs_of_tree_with_itself() {
        let (tree, points) = random_tree(61, 20, 50.0);
        let got: Vec<_> = tree.pairs_by_distance(&tree, None).collect();
        assert_eq!(got.len(), 20 * 20);
        // The 20 self pairs come first, all at distance zero.
        for (d, p, q, _, _) in &got[..points.len()] {
            assert_eq!(*d, 0.0);
            assert_eq!(p, q);
        }
    }
}
