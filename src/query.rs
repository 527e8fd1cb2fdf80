//! Best-first query engine.
//!
//! Every query is a lazy iterator around one binary heap of scored work
//! items. Subtrees enter the heap with a score from the caller's box-scoring
//! function and points with one from the point-scoring function; popping the
//! lowest score first yields points in ascending score order, provided the
//! box score never exceeds the score of any point inside the box. Returning
//! `None` from either function prunes that item entirely.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{Point3, RealField, Scalar};
use num_traits::Float;

use crate::aabb::{bounding, point_distance, Aabb};
use crate::octree::Octree;
use crate::tree::Node;

/// Heap element ordered by score alone, reversed so that `BinaryHeap` pops
/// the minimum. Incomparable scores (NaN) compare as equal, so ties and NaN
/// pop in arbitrary order.
pub(crate) struct Scored<R, E> {
    pub(crate) score: R,
    pub(crate) item: E,
}

impl<R: PartialOrd, E> PartialEq for Scored<R, E> {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl<R: PartialOrd, E> Eq for Scored<R, E> {}

impl<R: PartialOrd, E> PartialOrd for Scored<R, E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: PartialOrd, E> Ord for Scored<R, E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
    }
}

enum Entry<'a, S: Scalar, T> {
    Subtree(Aabb<S>, &'a Node<S, T>),
    Point(Point3<S>, &'a T),
}

/// Lazy ascending-score iterator over the points of one octree.
///
/// Created by [`Octree::by_score`]; holds borrowed subtrees, so the source
/// octree must outlive it.
pub struct ByScore<'a, S: Scalar, T, R, PF, BF> {
    heap: BinaryHeap<Scored<R, Entry<'a, S, T>>>,
    pointscore: PF,
    boxscore: BF,
}

impl<'a, S, T, R, PF, BF> Iterator for ByScore<'a, S, T, R, PF, BF>
where
    S: Scalar + RealField + Float,
    R: PartialOrd,
    PF: FnMut(&Point3<S>) -> Option<R>,
    BF: FnMut(&Aabb<S>) -> Option<R>,
{
    type Item = (R, Point3<S>, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(Scored { score, item }) = self.heap.pop() {
            match item {
                Entry::Point(point, data) => return Some((score, point, data)),
                Entry::Subtree(bounds, node) => match node {
                    Node::Empty => {}
                    Node::Leaf { point, data } => {
                        // The box score only bounded this point; rescore it
                        // exactly before it can be yielded.
                        if let Some(s) = (self.pointscore)(point) {
                            self.heap.push(Scored {
                                score: s,
                                item: Entry::Point(*point, data),
                            });
                        }
                    }
                    Node::Branch { children } => {
                        let boxes = bounds.split();
                        for (child, sub) in children.iter().zip(boxes) {
                            if matches!(&**child, Node::Empty) {
                                continue;
                            }
                            if let Some(s) = (self.boxscore)(&sub) {
                                self.heap.push(Scored {
                                    score: s,
                                    item: Entry::Subtree(sub, &**child),
                                });
                            }
                        }
                    }
                },
            }
        }
        None
    }
}

impl<S: Scalar + RealField + Float, T> Octree<S, T> {
    /// Points in ascending score order under a caller-chosen scoring scheme.
    ///
    /// `pointscore` gives a point its final score, or `None` to drop it.
    /// `boxscore` gives a box a score that must not exceed the score of any
    /// point inside it, or `None` to prune the whole subtree. Violating that
    /// bound silently breaks the output order.
    pub fn by_score<R, PF, BF>(
        &self,
        pointscore: PF,
        mut boxscore: BF,
    ) -> ByScore<'_, S, T, R, PF, BF>
    where
        R: PartialOrd,
        PF: FnMut(&Point3<S>) -> Option<R>,
        BF: FnMut(&Aabb<S>) -> Option<R>,
    {
        let mut heap = BinaryHeap::new();
        let root = self.root();
        if !matches!(&**root, Node::Empty) {
            if let Some(s) = boxscore(self.bounds()) {
                heap.push(Scored {
                    score: s,
                    item: Entry::Subtree(*self.bounds(), &**root),
                });
            }
        }
        ByScore {
            heap,
            pointscore,
            boxscore,
        }
    }

    /// Points in ascending distance from `point`. With an epsilon, points
    /// farther than it are omitted and the search never descends into
    /// subtrees entirely beyond it.
    pub fn by_distance_from_point(
        &self,
        point: Point3<S>,
        epsilon: Option<S>,
    ) -> impl Iterator<Item = (S, Point3<S>, &T)> {
        self.by_score(
            move |q| bounding(point_distance(&point, q), epsilon),
            move |b| bounding(b.distance_to_point(&point), epsilon),
        )
    }

    /// Points in descending distance from `point`. Scores are negated
    /// distances; callers usually want [`Octree::by_distance_from_point`]
    /// instead.
    pub fn by_distance_from_point_rev(
        &self,
        point: Point3<S>,
    ) -> impl Iterator<Item = (S, Point3<S>, &T)> {
        self.by_score(
            move |q| Some(-point_distance(&point, q)),
            move |b| Some(-b.max_distance_to_point(&point)),
        )
    }

    /// Closest point to `point`, with its distance.
    pub fn nearest_to_point(&self, point: &Point3<S>) -> Option<(S, Point3<S>, &T)> {
        self.by_distance_from_point(*point, None).next()
    }

    /// `k`-th closest point to `point`, zero-indexed.
    pub fn kth_nearest_to_point(&self, point: &Point3<S>, k: usize) -> Option<(S, Point3<S>, &T)> {
        self.by_distance_from_point(*point, None).nth(k)
    }

    /// Point minimizing the distance from `target` to it; zero when the
    /// point lies inside `target`.
    pub fn nearest_to_box(&self, target: &Aabb<S>) -> Option<(S, Point3<S>, &T)> {
        let target = *target;
        self.by_score(
            move |q| Some(target.distance_to_point(q)),
            move |b| Some(b.distance_to_aabb(&target)),
        )
        .next()
    }

    /// Point minimizing the farthest-corner distance from `target` to it.
    ///
    /// This is the witness for the isolation bound: the result caps how
    /// isolated any point inside `target` can be.
    pub fn nearest_to_box_far_corner(&self, target: &Aabb<S>) -> Option<(S, Point3<S>, &T)> {
        let target = *target;
        self.by_score(
            move |q| Some(target.max_distance_to_point(q)),
            move |b| Some(b.minmax_distance_to_aabb(&target)),
        )
        .next()
    }

    /// Points of `self` in ascending distance to their nearest partner in
    /// `other`, yielded with that partner. With an epsilon, points whose
    /// partner is farther than it are omitted.
    ///
    /// Each yielded tuple is `(distance, point, partner, data, partner
    /// data)`. An empty `other` yields nothing.
    pub fn by_proximity<'a>(
        &'a self,
        other: &'a Octree<S, T>,
        epsilon: Option<S>,
    ) -> impl Iterator<Item = (S, Point3<S>, Point3<S>, &'a T, &'a T)> + 'a {
        self.by_score(
            move |p| {
                other
                    .nearest_to_point(p)
                    .and_then(|(d, _, _)| bounding(d, epsilon))
            },
            move |b| {
                other
                    .nearest_to_box(b)
                    .and_then(|(d, _, _)| bounding(d, epsilon))
            },
        )
        .filter_map(move |(d, p, v)| {
            other.nearest_to_point(&p).map(|(_, q, w)| (d, p, q, v, w))
        })
    }

    /// Points of `self` in descending distance to their nearest partner in
    /// `other`, most isolated first. With an epsilon, points whose partner
    /// is closer than it are omitted.
    ///
    /// Scores are negated distances, so the tuples come back with
    /// non-positive first elements. An empty `other` yields nothing.
    pub fn by_isolation<'a>(
        &'a self,
        other: &'a Octree<S, T>,
        epsilon: Option<S>,
    ) -> impl Iterator<Item = (S, Point3<S>, Point3<S>, &'a T, &'a T)> + 'a {
        let neg_eps = epsilon.map(|e| -e);
        self.by_score(
            move |p| {
                other
                    .nearest_to_point(p)
                    .and_then(|(d, _, _)| bounding(-d, neg_eps))
            },
            move |b| {
                other
                    .nearest_to_box_far_corner(b)
                    .and_then(|(d, _, _)| bounding(-d, neg_eps))
            },
        )
        .filter_map(move |(d, p, v)| {
            other.nearest_to_point(&p).map(|(_, q, w)| (d, p, q, v, w))
        })
    }
}
