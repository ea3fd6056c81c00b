//! Visible-face meshing of a single chunk.
//!
//! Each solid voxel contributes one quad (four vertices) for every face whose
//! neighbor inside the chunk is air. Faces on the chunk boundary are always
//! emitted; cross-chunk culling is left to the renderer.

use voxsync_voxel::{CHUNK_SIZE, ChunkPayload};

use crate::protocol::CellVertex;

/// One of the six axis-aligned face directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaceDirection {
    /// +X direction.
    PosX = 0,
    /// −X direction.
    NegX = 1,
    /// +Y direction.
    PosY = 2,
    /// −Y direction.
    NegY = 3,
    /// +Z direction.
    PosZ = 4,
    /// −Z direction.
    NegZ = 5,
}

impl FaceDirection {
    /// All six directions in order.
    pub const ALL: [FaceDirection; 6] = [
        Self::PosX,
        Self::NegX,
        Self::PosY,
        Self::NegY,
        Self::PosZ,
        Self::NegZ,
    ];

    /// Unit normal of this face.
    pub fn normal(self) -> [f32; 3] {
        match self {
            Self::PosX => [1.0, 0.0, 0.0],
            Self::NegX => [-1.0, 0.0, 0.0],
            Self::PosY => [0.0, 1.0, 0.0],
            Self::NegY => [0.0, -1.0, 0.0],
            Self::PosZ => [0.0, 0.0, 1.0],
            Self::NegZ => [0.0, 0.0, -1.0],
        }
    }

    /// Neighbor coordinate in this direction.
    pub fn offset(self, x: i32, y: i32, z: i32) -> (i32, i32, i32) {
        match self {
            Self::PosX => (x + 1, y, z),
            Self::NegX => (x - 1, y, z),
            Self::PosY => (x, y + 1, z),
            Self::NegY => (x, y - 1, z),
            Self::PosZ => (x, y, z + 1),
            Self::NegZ => (x, y, z - 1),
        }
    }

    /// Unit-cube corners of this face, counter-clockwise seen from outside.
    fn corners(self) -> [[f32; 3]; 4] {
        match self {
            Self::PosX => [[1., 0., 0.], [1., 1., 0.], [1., 1., 1.], [1., 0., 1.]],
            Self::NegX => [[0., 0., 1.], [0., 1., 1.], [0., 1., 0.], [0., 0., 0.]],
            Self::PosY => [[0., 1., 0.], [0., 1., 1.], [1., 1., 1.], [1., 1., 0.]],
            Self::NegY => [[0., 0., 0.], [1., 0., 0.], [1., 0., 1.], [0., 0., 1.]],
            Self::PosZ => [[1., 0., 1.], [1., 1., 1.], [0., 1., 1.], [0., 0., 1.]],
            Self::NegZ => [[0., 0., 0.], [0., 1., 0.], [1., 1., 0.], [1., 0., 0.]],
        }
    }
}

fn neighbor_is_air(chunk: &ChunkPayload, x: i32, y: i32, z: i32) -> bool {
    let s = CHUNK_SIZE as i32;
    if !(0..s).contains(&x) || !(0..s).contains(&y) || !(0..s).contains(&z) {
        return true;
    }
    chunk.get(x as usize, y as usize, z as usize).is_air()
}

/// Builds the vertex list for every visible face in `chunk`.
pub fn mesh_chunk(chunk: &ChunkPayload) -> Vec<CellVertex> {
    let mut vertices = Vec::new();
    for z in 0..CHUNK_SIZE {
        for y in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let value = chunk.get(x, y, z);
                if value.is_air() {
                    continue;
                }
                let (ix, iy, iz) = (x as i32, y as i32, z as i32);
                for face in FaceDirection::ALL {
                    let (nx, ny, nz) = face.offset(ix, iy, iz);
                    if !neighbor_is_air(chunk, nx, ny, nz) {
                        continue;
                    }
                    let normal = face.normal();
                    for [cx, cy, cz] in face.corners() {
                        vertices.push(CellVertex {
                            position: [x as f32 + cx, y as f32 + cy, z as f32 + cz],
                            normal,
                            value,
                        });
                    }
                }
            }
        }
    }
    vertices
}
