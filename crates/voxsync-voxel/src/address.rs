//! Invertible voxel and chunk addressing.
//!
//! A coordinate is bias-encoded into 21 unsigned bits per axis and the three
//! axes are bit-interleaved (Morton order) into a single `u64`. Voxel keys use
//! bits 0..63; chunk keys additionally set bit 63, so the two key spaces can
//! never collide even when a chunk and a voxel share the same coordinate.

use serde::{Deserialize, Serialize};

use crate::chunk::CHUNK_SIZE;
use crate::error::VoxelError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Bits per axis in an encoded key.
const AXIS_BITS: u32 = 21;

/// Offset added to a signed coordinate before encoding.
const AXIS_BIAS: i32 = 1 << (AXIS_BITS - 1);

/// Mask of the low [`AXIS_BITS`] bits.
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;

/// Tag bit distinguishing chunk keys from voxel keys.
const CHUNK_TAG: u64 = 1 << 63;

/// Smallest supported voxel coordinate on any axis.
pub const WORLD_MIN: i32 = -AXIS_BIAS;

/// Largest supported voxel coordinate on any axis.
pub const WORLD_MAX: i32 = AXIS_BIAS - 1;

const CHUNK_MIN: i32 = WORLD_MIN.div_euclid(CHUNK_SIZE as i32);
const CHUNK_MAX: i32 = WORLD_MAX.div_euclid(CHUNK_SIZE as i32);

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Compact identifier of a single voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelKey(pub u64);

/// Compact identifier of a chunk. Never equal to any [`VoxelKey`] value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey(pub u64);

// ---------------------------------------------------------------------------
// Bit interleaving
// ---------------------------------------------------------------------------

/// Spreads the low 21 bits of `v` so that bit `i` lands on bit `3 * i`.
fn spread(v: u64) -> u64 {
    let mut x = v & AXIS_MASK;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// Inverse of [`spread`]: gathers every third bit back into the low 21 bits.
fn compact(v: u64) -> u64 {
    let mut x = v & 0x1249_2492_4924_9249;
    x = (x ^ (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x ^ (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x ^ (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x ^ (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x ^ (x >> 32)) & AXIS_MASK;
    x
}

fn encode_axis(c: i32) -> u64 {
    (c.wrapping_add(AXIS_BIAS) as u32 as u64) & AXIS_MASK
}

fn decode_axis(bits: u64) -> i32 {
    (bits as i32).wrapping_sub(AXIS_BIAS)
}

fn interleave(x: i32, y: i32, z: i32) -> u64 {
    spread(encode_axis(x)) | (spread(encode_axis(y)) << 1) | (spread(encode_axis(z)) << 2)
}

fn deinterleave(k: u64) -> (i32, i32, i32) {
    (
        decode_axis(compact(k)),
        decode_axis(compact(k >> 1)),
        decode_axis(compact(k >> 2)),
    )
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Returns `true` if every axis lies within `WORLD_MIN..=WORLD_MAX`.
pub fn in_world_bounds(x: i32, y: i32, z: i32) -> bool {
    let r = WORLD_MIN..=WORLD_MAX;
    r.contains(&x) && r.contains(&y) && r.contains(&z)
}

/// Returns `true` if the chunk coordinate addresses a chunk inside the world.
pub fn chunk_in_bounds(cx: i32, cy: i32, cz: i32) -> bool {
    let r = CHUNK_MIN..=CHUNK_MAX;
    r.contains(&cx) && r.contains(&cy) && r.contains(&cz)
}

/// Maps a voxel coordinate to its key.
///
/// The coordinate must satisfy [`in_world_bounds`]; out-of-range axes wrap.
pub fn hash(x: i32, y: i32, z: i32) -> VoxelKey {
    debug_assert!(in_world_bounds(x, y, z));
    VoxelKey(interleave(x, y, z))
}

/// Range-checked [`hash`].
///
/// # Errors
///
/// [`VoxelError::InvalidCoordinate`] if the coordinate is outside the world.
pub fn try_hash(x: i32, y: i32, z: i32) -> Result<VoxelKey, VoxelError> {
    if in_world_bounds(x, y, z) {
        Ok(VoxelKey(interleave(x, y, z)))
    } else {
        Err(VoxelError::InvalidCoordinate { x, y, z })
    }
}

/// Recovers the voxel coordinate from a key produced by [`hash`].
pub fn unhash(key: VoxelKey) -> (i32, i32, i32) {
    deinterleave(key.0)
}

/// Maps a chunk coordinate to its key.
pub fn hash_chunk(cx: i32, cy: i32, cz: i32) -> ChunkKey {
    debug_assert!(chunk_in_bounds(cx, cy, cz));
    ChunkKey(CHUNK_TAG | interleave(cx, cy, cz))
}

/// Recovers the chunk coordinate from a key produced by [`hash_chunk`].
pub fn unhash_chunk(key: ChunkKey) -> (i32, i32, i32) {
    deinterleave(key.0 & !CHUNK_TAG)
}

/// Splits a voxel coordinate into its chunk coordinate and the local
/// position inside that chunk (each local axis in `0..CHUNK_SIZE`).
pub fn split_coord(x: i32, y: i32, z: i32) -> ([i32; 3], [usize; 3]) {
    let s = CHUNK_SIZE as i32;
    (
        [x.div_euclid(s), y.div_euclid(s), z.div_euclid(s)],
        [
            x.rem_euclid(s) as usize,
            y.rem_euclid(s) as usize,
            z.rem_euclid(s) as usize,
        ],
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
