//! Persistent octree point index with best-first proximity queries.
//!
//! An [`Octree`] maps exact 3D coordinates to payloads inside a fixed
//! bounding box. The structure is persistent: mutation builds a new tree
//! sharing untouched subtrees with the old one, so clones are O(1) and old
//! snapshots stay valid and cheap.
//!
//! Queries are lazy iterators driven by a best-first search:
//! [`Octree::by_score`] is the generic engine, with distance, proximity and
//! isolation orderings derived from it, and [`Octree::pairs_by_score`] runs
//! the same search over pairs of points drawn from two trees.
//!
//! ```
//! use nalgebra::Point3;
//! use oct_spatial::{Aabb, Octree};
//!
//! let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
//! let mut tree = Octree::new(bounds);
//! tree.insert(Point3::new(1.0, 2.0, 3.0), "a")?;
//!
//! let snapshot = tree.clone();
//! tree.insert(Point3::new(7.0, 8.0, 9.0), "b")?;
//! assert_eq!(snapshot.len(), 1);
//! assert_eq!(tree.len(), 2);
//!
//! let (_, p, v) = tree.nearest_to_point(&Point3::new(0.0, 0.0, 0.0)).unwrap();
//! assert_eq!(p, Point3::new(1.0, 2.0, 3.0));
//! assert_eq!(*v, "a");
//! # Ok::<(), oct_spatial::OctreeError>(())
//! ```

mod aabb;
mod error;
mod octree;
mod pairs;
mod query;
mod tree;

pub use aabb::{agreement, bounding, point_distance, Aabb};
pub use error::{OctreeError, Result};
pub use octree::Octree;
pub use pairs::{PairsByScore, PairsGenerate};
pub use query::ByScore;
pub use tree::Iter;
