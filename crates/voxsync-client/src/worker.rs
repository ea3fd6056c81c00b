//! The default worker body: keeps a mirror of the voxel world and turns
//! changes into renderable cells.
//!
//! Commands are handled in arrival order. Chunks touched by a burst of
//! commands are remeshed once, when the queue runs dry or before the next
//! lifecycle reply, so `updateCell`/`removeCell` always precede the
//! `started`/`stopped` that follows them on the wire.

use rustc_hash::FxHashSet;
use voxsync_voxel::{ChunkSet, split_coord};

use crate::channel::WorkerEndpoint;
use crate::error::WorkerFault;
use crate::mesh::mesh_chunk;
use crate::protocol::{WorkerCommand, WorkerEvent};

struct MeshWorker {
    endpoint: WorkerEndpoint,
    mirror: ChunkSet,
    dirty: FxHashSet<[i32; 3]>,
}

impl MeshWorker {
    /// Applies one command. Returns `false` once the worker should exit.
    fn handle(&mut self, command: WorkerCommand) -> Result<bool, WorkerFault> {
        match command {
            WorkerCommand::Start => {
                self.flush()?;
                self.endpoint.log(["started"])?;
                self.endpoint.emit(WorkerEvent::Started)?;
            }
            WorkerCommand::Stop => {
                self.flush()?;
                self.endpoint.log(["stopping"])?;
                self.endpoint.emit(WorkerEvent::Stopped)?;
                return Ok(false);
            }
            WorkerCommand::SetVoxel { x, y, z, value } => {
                self.mirror.set(x, y, z, value)?;
                let (chunk, _) = split_coord(x, y, z);
                self.dirty.insert(chunk);
            }
            WorkerCommand::UpdateChunk { cx, cy, cz, payload } => {
                self.mirror.set_chunk(cx, cy, cz, payload)?;
                self.dirty.insert([cx, cy, cz]);
            }
            WorkerCommand::RemoveChunk { cx, cy, cz } => {
                self.mirror.remove_chunk(cx, cy, cz)?;
                self.dirty.insert([cx, cy, cz]);
            }
        }
        Ok(true)
    }

    /// Emits the current geometry of every dirty chunk.
    fn flush(&mut self) -> Result<(), WorkerFault> {
        let mut dirty: Vec<_> = self.dirty.drain().collect();
        dirty.sort_unstable();
        for coord in dirty {
            let [cx, cy, cz] = coord;
            let vertices = self
                .mirror
                .chunk(cx, cy, cz)
                .map(mesh_chunk)
                .unwrap_or_default();
            let event = if vertices.is_empty() {
                WorkerEvent::RemoveCell { coord }
            } else {
                WorkerEvent::UpdateCell { coord, vertices }
            };
            self.endpoint.emit(event)?;
        }
        Ok(())
    }
}

/// Runs the mesh worker until it is told to stop or its controller goes
/// away.
pub fn run_mesh_worker(endpoint: WorkerEndpoint) -> Result<(), WorkerFault> {
    let mut worker = MeshWorker {
        endpoint,
        mirror: ChunkSet::new(),
        dirty: FxHashSet::default(),
    };
    while let Some(command) = worker.endpoint.recv()? {
        if !worker.handle(command)? {
            return Ok(());
        }
        while let Some(command) = worker.endpoint.try_recv()? {
            if !worker.handle(command)? {
                return Ok(());
            }
        }
        worker.flush()?;
    }
    Ok(())
}
