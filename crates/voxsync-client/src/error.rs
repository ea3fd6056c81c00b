//! Client error types.

use std::fmt;
use std::panic::Location;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voxsync_voxel::VoxelError;

use crate::controller::LifecycleState;
use crate::protocol::EventName;

/// A fatal fault raised inside the background worker.
///
/// Carries a description and, when known, the source location it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFault {
    /// Human-readable description.
    pub message: String,
    /// Source file of the fault, if known.
    pub file: Option<String>,
    /// Source line of the fault, if known.
    pub line: Option<u32>,
}

impl WorkerFault {
    /// Creates a fault located at the caller.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            message: message.into(),
            file: Some(location.file().to_string()),
            line: Some(location.line()),
        }
    }

    /// Creates a fault with no source location.
    pub fn unlocated(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
        }
    }

    /// Builds a fault from a caught panic payload and, when known, the
    /// `(file, line)` the panic was raised at.
    pub fn from_panic(
        payload: &(dyn std::any::Any + Send),
        location: Option<(String, u32)>,
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "worker panicked".to_string()
        };
        let (file, line) = location.unzip();
        Self {
            message,
            file,
            line,
        }
    }
}

impl fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "({file}:{line}) -- {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for WorkerFault {}

impl From<VoxelError> for WorkerFault {
    #[track_caller]
    fn from(err: VoxelError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<postcard::Error> for WorkerFault {
    #[track_caller]
    fn from(err: postcard::Error) -> Self {
        Self::new(format!("codec: {err}"))
    }
}

/// Errors surfaced by the reconciliation client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The platform cannot host a background worker.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(&'static str),

    /// A voxel or chunk coordinate was out of range.
    #[error(transparent)]
    InvalidCoordinate(#[from] VoxelError),

    /// The worker faulted; the client is now crashed.
    #[error("VoxelWorker crashed: {0}")]
    WorkerFault(WorkerFault),

    /// The operation is not valid in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the controller was in.
        state: LifecycleState,
    },

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// The command side of the channel is closed.
    #[error("worker channel closed")]
    ChannelClosed,

    /// A lifecycle event did not arrive in time.
    #[error("timed out after {waited:?} waiting for `{event}`")]
    LifecycleTimeout {
        /// Event that was awaited.
        event: EventName,
        /// Time spent waiting.
        waited: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display_includes_location() {
        let fault = WorkerFault {
            message: "bad chunk".to_string(),
            file: Some("worker.rs".to_string()),
            line: Some(42),
        };
        assert_eq!(fault.to_string(), "(worker.rs:42) -- bad chunk");
        assert_eq!(
            ClientError::WorkerFault(fault).to_string(),
            "VoxelWorker crashed: (worker.rs:42) -- bad chunk"
        );
    }

    #[test]
    fn test_new_fault_records_caller() {
        let fault = WorkerFault::new("boom");
        assert!(fault.file.as_deref().is_some_and(|f| f.ends_with("error.rs")));
        assert!(fault.line.is_some());
    }

    #[test]
    fn test_panic_payload_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("exploded");
        assert_eq!(WorkerFault::from_panic(payload.as_ref(), None).message, "exploded");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(WorkerFault::from_panic(payload.as_ref(), None).to_string(), "owned");
    }

    #[test]
    fn test_panic_location_in_display() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("bad face");
        let fault = WorkerFault::from_panic(payload.as_ref(), Some(("mesh.rs".into(), 88)));
        assert_eq!(fault.to_string(), "(mesh.rs:88) -- bad face");
    }
}
