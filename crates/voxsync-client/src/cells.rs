//! Renderable cells, one per chunk with geometry.
//!
//! The registry is driven by worker `updateCell`/`removeCell` events and
//! owns every cell it creates. Cells are created through a [`Renderer`] so
//! the client stays independent of the graphics backend.

use rustc_hash::FxHashMap;
use voxsync_voxel::{ChunkKey, hash_chunk, unhash_chunk};

use crate::protocol::CellVertex;

/// A renderable object for one chunk.
pub trait RenderCell {
    /// Replaces the cell's geometry.
    fn update(&mut self, vertices: &[CellVertex]);

    /// Releases the cell's resources.
    fn release(self);

    /// Issues the draw for this cell.
    fn draw(&self);
}

/// Factory for [`RenderCell`]s.
pub trait Renderer {
    /// Cell type this renderer produces.
    type Cell: RenderCell;

    /// Creates a cell for `coord` with initial geometry.
    fn create_cell(&mut self, coord: [i32; 3], vertices: &[CellVertex]) -> Self::Cell;
}

/// Chunk coordinate → live cell.
pub struct CellRegistry<R: Renderer> {
    renderer: R,
    cells: FxHashMap<ChunkKey, R::Cell>,
}

impl<R: Renderer> CellRegistry<R> {
    /// Creates an empty registry backed by `renderer`.
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            cells: FxHashMap::default(),
        }
    }

    /// Creates the cell for `coord`, or replaces the geometry of the
    /// existing one.
    pub fn update_cell(&mut self, coord: [i32; 3], vertices: &[CellVertex]) {
        let [cx, cy, cz] = coord;
        let key = hash_chunk(cx, cy, cz);
        match self.cells.get_mut(&key) {
            Some(cell) => cell.update(vertices),
            None => {
                let cell = self.renderer.create_cell(coord, vertices);
                self.cells.insert(key, cell);
            }
        }
    }

    /// Releases and forgets the cell for `coord`. Returns `false` if there
    /// was none.
    pub fn remove_cell(&mut self, coord: [i32; 3]) -> bool {
        let [cx, cy, cz] = coord;
        match self.cells.remove(&hash_chunk(cx, cy, cz)) {
            Some(cell) => {
                cell.release();
                true
            }
            None => false,
        }
    }

    /// Draws every live cell.
    pub fn draw_all(&self) {
        for cell in self.cells.values() {
            cell.draw();
        }
    }

    /// Releases every cell.
    pub fn reset(&mut self) {
        let released = self.cells.len();
        for (_, cell) in self.cells.drain() {
            cell.release();
        }
        if released > 0 {
            tracing::debug!("released {released} render cells");
        }
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if no cells are live.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns `true` if a cell exists for `coord`.
    pub fn contains(&self, coord: [i32; 3]) -> bool {
        let [cx, cy, cz] = coord;
        self.cells.contains_key(&hash_chunk(cx, cy, cz))
    }

    /// Coordinates of every live cell, in no particular order.
    pub fn coords(&self) -> impl Iterator<Item = [i32; 3]> + '_ {
        self.cells.keys().map(|key| {
            let (cx, cy, cz) = unhash_chunk(*key);
            [cx, cy, cz]
        })
    }

    /// The backing renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

impl<R: Renderer> Drop for CellRegistry<R> {
    fn drop(&mut self) {
        self.reset();
    }
}
