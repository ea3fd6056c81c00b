//! Typed messages exchanged between the controller and its worker.
//!
//! Every message crosses the channel as a [`postcard`]-encoded byte buffer,
//! so the two sides never share memory: each owns the bytes it decodes.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use voxsync_voxel::{ChunkPayload, VoxelValue};

use crate::error::WorkerFault;

// ---------------------------------------------------------------------------
// Commands (controller → worker)
// ---------------------------------------------------------------------------

/// Fire-and-forget instruction sent to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerCommand {
    /// Begin processing; answered by [`WorkerEvent::Started`].
    Start,
    /// Finish processing; answered by [`WorkerEvent::Stopped`].
    Stop,
    /// Mirror a single voxel value.
    SetVoxel {
        /// X.
        x: i32,
        /// Y.
        y: i32,
        /// Z.
        z: i32,
        /// New value.
        value: VoxelValue,
    },
    /// Replace a whole chunk in the mirror.
    UpdateChunk {
        /// Chunk X.
        cx: i32,
        /// Chunk Y.
        cy: i32,
        /// Chunk Z.
        cz: i32,
        /// Authoritative chunk data.
        payload: ChunkPayload,
    },
    /// Evict a chunk from the mirror.
    RemoveChunk {
        /// Chunk X.
        cx: i32,
        /// Chunk Y.
        cy: i32,
        /// Chunk Z.
        cz: i32,
    },
}

// ---------------------------------------------------------------------------
// Events (worker → controller)
// ---------------------------------------------------------------------------

/// A single mesh vertex produced by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellVertex {
    /// Position in chunk-local voxel units.
    pub position: [f32; 3],
    /// Face normal.
    pub normal: [f32; 3],
    /// Voxel value the face belongs to, for material lookup.
    pub value: VoxelValue,
}

/// Named event emitted by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerEvent {
    /// Free-form diagnostic output.
    Log {
        /// Message fragments.
        args: Vec<String>,
    },
    /// The worker accepted [`WorkerCommand::Start`].
    Started,
    /// The worker accepted [`WorkerCommand::Stop`] and is exiting.
    Stopped,
    /// A chunk's renderable geometry changed.
    UpdateCell {
        /// Chunk coordinate.
        coord: [i32; 3],
        /// Full replacement vertex list.
        vertices: Vec<CellVertex>,
    },
    /// A chunk no longer has renderable geometry.
    RemoveCell {
        /// Chunk coordinate.
        coord: [i32; 3],
    },
}

/// Subscription key for [`WorkerEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// [`WorkerEvent::Log`].
    Log,
    /// [`WorkerEvent::Started`].
    Started,
    /// [`WorkerEvent::Stopped`].
    Stopped,
    /// [`WorkerEvent::UpdateCell`].
    UpdateCell,
    /// [`WorkerEvent::RemoveCell`].
    RemoveCell,
}

impl EventName {
    /// Wire-style name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::UpdateCell => "updateCell",
            Self::RemoveCell => "removeCell",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkerEvent {
    /// Returns the subscription key of this event.
    pub fn name(&self) -> EventName {
        match self {
            Self::Log { .. } => EventName::Log,
            Self::Started => EventName::Started,
            Self::Stopped => EventName::Stopped,
            Self::UpdateCell { .. } => EventName::UpdateCell,
            Self::RemoveCell { .. } => EventName::RemoveCell,
        }
    }
}

/// Envelope for everything travelling worker → controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// A named event.
    Event(WorkerEvent),
    /// A fatal fault; nothing follows it.
    Fault(WorkerFault),
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Serializes a message into an owned byte buffer.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_allocvec(message)
}

/// Deserializes a message from a byte buffer.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, postcard::Error> {
    postcard::from_bytes(bytes)
}
