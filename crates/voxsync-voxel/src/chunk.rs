//! Dense 32×32×32 chunk payloads.
//!
//! Payloads are what the server pushes for bulk chunk updates and what the
//! worker meshes. Values are stored flat with x varying fastest:
//! `x + y * SIZE + z * SIZE * SIZE`.

use serde::{Deserialize, Serialize};

use crate::error::VoxelError;

/// Side length of a chunk in voxels.
pub const CHUNK_SIZE: usize = 32;

/// Total number of voxels in a chunk (32³).
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

/// The value held by a single voxel.
///
/// `0` is empty space; every other value is an opaque material id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelValue(pub u16);

impl VoxelValue {
    /// Empty voxel.
    pub const AIR: Self = Self(0);

    /// Returns `true` if this voxel is empty.
    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

impl From<u16> for VoxelValue {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Voxel data for one chunk.
///
/// Always holds exactly [`CHUNK_VOLUME`] values; deserialization goes through
/// [`ChunkPayload::from_values`] and rejects any other length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<VoxelValue>", into = "Vec<VoxelValue>")]
pub struct ChunkPayload {
    voxels: Box<[VoxelValue]>,
}

impl ChunkPayload {
    /// Creates an all-air payload.
    pub fn new_empty() -> Self {
        Self::filled(VoxelValue::AIR)
    }

    /// Creates a payload with every voxel set to `value`.
    pub fn filled(value: VoxelValue) -> Self {
        Self {
            voxels: vec![value; CHUNK_VOLUME].into_boxed_slice(),
        }
    }

    /// Wraps a flat value array.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::PayloadSize`] unless `values` holds exactly
    /// [`CHUNK_VOLUME`] entries.
    pub fn from_values(values: Vec<VoxelValue>) -> Result<Self, VoxelError> {
        if values.len() != CHUNK_VOLUME {
            return Err(VoxelError::PayloadSize {
                expected: CHUNK_VOLUME,
                actual: values.len(),
            });
        }
        Ok(Self {
            voxels: values.into_boxed_slice(),
        })
    }

    #[inline]
    fn linear_index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < CHUNK_SIZE && y < CHUNK_SIZE && z < CHUNK_SIZE);
        x + y * CHUNK_SIZE + z * CHUNK_SIZE * CHUNK_SIZE
    }

    /// Returns the value at a local position (each axis in `0..CHUNK_SIZE`).
    pub fn get(&self, x: usize, y: usize, z: usize) -> VoxelValue {
        self.voxels[Self::linear_index(x, y, z)]
    }

    /// Writes a value at a local position and returns the previous value.
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: VoxelValue) -> VoxelValue {
        std::mem::replace(&mut self.voxels[Self::linear_index(x, y, z)], value)
    }

    /// Returns `true` if every voxel is air.
    pub fn is_empty(&self) -> bool {
        self.voxels.iter().all(|v| v.is_air())
    }

    /// Number of non-air voxels.
    pub fn solid_count(&self) -> usize {
        self.voxels.iter().filter(|v| !v.is_air()).count()
    }

    /// Flat view of all values.
    pub fn values(&self) -> &[VoxelValue] {
        &self.voxels
    }
}

impl TryFrom<Vec<VoxelValue>> for ChunkPayload {
    type Error = VoxelError;

    fn try_from(values: Vec<VoxelValue>) -> Result<Self, Self::Error> {
        Self::from_values(values)
    }
}

impl From<ChunkPayload> for Vec<VoxelValue> {
    fn from(payload: ChunkPayload) -> Self {
        payload.voxels.into_vec()
    }
}

impl Default for ChunkPayload {
    fn default() -> Self {
        Self::new_empty()
    }
}
