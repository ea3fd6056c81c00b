//! Sparse local cache of world voxels, keyed by [`ChunkKey`].
//!
//! The [`ChunkSet`] is the client's single source of truth for the
//! "current known value" of every voxel. Chunks that were never written
//! read as air and are only allocated once a non-air value lands in them.

use rustc_hash::FxHashMap;

use crate::address::{ChunkKey, chunk_in_bounds, hash_chunk, in_world_bounds, split_coord};
use crate::chunk::{ChunkPayload, VoxelValue};
use crate::error::VoxelError;

/// Owns every chunk payload currently known to the client.
#[derive(Debug, Default)]
pub struct ChunkSet {
    chunks: FxHashMap<ChunkKey, ChunkPayload>,
}

impl ChunkSet {
    /// Creates an empty set (every voxel reads as air).
    pub fn new() -> Self {
        Self::default()
    }

    fn check_voxel(x: i32, y: i32, z: i32) -> Result<(), VoxelError> {
        if in_world_bounds(x, y, z) {
            Ok(())
        } else {
            Err(VoxelError::InvalidCoordinate { x, y, z })
        }
    }

    fn check_chunk(cx: i32, cy: i32, cz: i32) -> Result<ChunkKey, VoxelError> {
        if chunk_in_bounds(cx, cy, cz) {
            Ok(hash_chunk(cx, cy, cz))
        } else {
            Err(VoxelError::InvalidCoordinate {
                x: cx,
                y: cy,
                z: cz,
            })
        }
    }

    /// Returns the value at a voxel coordinate.
    ///
    /// # Errors
    ///
    /// [`VoxelError::InvalidCoordinate`] if the coordinate is outside the world.
    pub fn get(&self, x: i32, y: i32, z: i32) -> Result<VoxelValue, VoxelError> {
        Self::check_voxel(x, y, z)?;
        let ([cx, cy, cz], [lx, ly, lz]) = split_coord(x, y, z);
        Ok(self
            .chunks
            .get(&hash_chunk(cx, cy, cz))
            .map_or(VoxelValue::AIR, |chunk| chunk.get(lx, ly, lz)))
    }

    /// Writes `value` at a voxel coordinate and returns the value that was
    /// there before the write.
    ///
    /// # Errors
    ///
    /// [`VoxelError::InvalidCoordinate`] if the coordinate is outside the world.
    pub fn set(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        value: VoxelValue,
    ) -> Result<VoxelValue, VoxelError> {
        Self::check_voxel(x, y, z)?;
        let ([cx, cy, cz], [lx, ly, lz]) = split_coord(x, y, z);
        let key = hash_chunk(cx, cy, cz);

        if let Some(chunk) = self.chunks.get_mut(&key) {
            return Ok(chunk.set(lx, ly, lz, value));
        }
        // Writing air into an absent chunk changes nothing.
        if value.is_air() {
            return Ok(VoxelValue::AIR);
        }
        let mut chunk = ChunkPayload::new_empty();
        chunk.set(lx, ly, lz, value);
        self.chunks.insert(key, chunk);
        Ok(VoxelValue::AIR)
    }

    /// Replaces an entire chunk's data.
    ///
    /// # Errors
    ///
    /// [`VoxelError::InvalidCoordinate`] if the chunk lies outside the world.
    pub fn set_chunk(
        &mut self,
        cx: i32,
        cy: i32,
        cz: i32,
        payload: ChunkPayload,
    ) -> Result<(), VoxelError> {
        let key = Self::check_chunk(cx, cy, cz)?;
        self.chunks.insert(key, payload);
        Ok(())
    }

    /// Evicts a chunk, returning its payload if it was loaded.
    ///
    /// # Errors
    ///
    /// [`VoxelError::InvalidCoordinate`] if the chunk lies outside the world.
    pub fn remove_chunk(
        &mut self,
        cx: i32,
        cy: i32,
        cz: i32,
    ) -> Result<Option<ChunkPayload>, VoxelError> {
        let key = Self::check_chunk(cx, cy, cz)?;
        let removed = self.chunks.remove(&key);
        if removed.is_some() {
            tracing::trace!("evicted chunk ({}, {}, {})", cx, cy, cz);
        }
        Ok(removed)
    }

    /// Immutable access to a loaded chunk.
    pub fn chunk(&self, cx: i32, cy: i32, cz: i32) -> Option<&ChunkPayload> {
        if !chunk_in_bounds(cx, cy, cz) {
            return None;
        }
        self.chunks.get(&hash_chunk(cx, cy, cz))
    }

    /// Number of allocated chunks.
    pub fn loaded_count(&self) -> usize {
        self.chunks.len()
    }

    /// Iterates over all allocated `(key, payload)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ChunkKey, &ChunkPayload)> {
        self.chunks.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
