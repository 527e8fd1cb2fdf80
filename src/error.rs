use thiserror::Error;

/// Failures raised by the bounds-checked mutation API.
///
/// All of these signal caller mistakes and propagate immediately; nothing is
/// silently corrected. Queries never produce them; a query with no results
/// yields an empty sequence or `None` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OctreeError {
    /// The point lies outside the octree bounds.
    #[error("point lies outside the octree bounds")]
    OutOfBounds,
    /// `insert` was called for coordinates already present.
    #[error("a point already exists at these exact coordinates")]
    DuplicateKey,
    /// `remove` was called for coordinates not present.
    #[error("no point exists at these coordinates")]
    KeyNotFound,
    /// `simple_union` was called on octrees whose bounds differ.
    #[error("octree bounds do not match")]
    BoundsMismatch,
}

pub type Result<T> = core::result::Result<T, OctreeError>;
