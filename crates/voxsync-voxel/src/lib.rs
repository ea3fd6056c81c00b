//! Voxel addressing, dense chunk payloads, and the sparse [`ChunkSet`] cache
//! that mirrors authoritative world state on the client.

pub mod address;
pub mod chunk;
pub mod chunk_set;
pub mod error;

pub use address::{
    ChunkKey, VoxelKey, WORLD_MAX, WORLD_MIN, chunk_in_bounds, hash, hash_chunk, in_world_bounds,
    split_coord, try_hash, unhash, unhash_chunk,
};
pub use chunk::{CHUNK_SIZE, CHUNK_VOLUME, ChunkPayload, VoxelValue};
pub use chunk_set::ChunkSet;
pub use error::VoxelError;
