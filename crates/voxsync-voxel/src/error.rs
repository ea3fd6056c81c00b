//! Voxel storage error types.

/// Errors raised by [`ChunkSet`](crate::ChunkSet) and [`ChunkPayload`](crate::ChunkPayload).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoxelError {
    /// A voxel or chunk coordinate lies outside the supported world bounds.
    #[error("coordinate out of range: ({x}, {y}, {z})")]
    InvalidCoordinate {
        /// X.
        x: i32,
        /// Y.
        y: i32,
        /// Z.
        z: i32,
    },

    /// A chunk payload does not hold exactly one value per voxel.
    #[error("chunk payload has {actual} values, expected {expected}")]
    PayloadSize {
        /// Required number of values.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}
