//! Client-side optimistic voxel replication.
//!
//! Local edits apply instantly and are mirrored to a background worker that
//! produces renderable cells. Each edit stays pending until the server
//! confirms or overrides it; unconfirmed edits are rolled back after a grace
//! period of sweeps. See [`ReconciliationController`] for the entry point.

pub mod cells;
pub mod channel;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod facility;
pub mod ledger;
pub mod mesh;
pub mod protocol;
pub mod sinks;
pub mod timer;
pub mod worker;

pub use cells::{CellRegistry, RenderCell, Renderer};
pub use channel::{Inbound, WorkerChannel, WorkerEndpoint, WorkerLink, worker_link};
pub use controller::{LifecycleState, ReconciliationController, WORKER_LOG_TAG};
pub use dispatch::{Completion, EventDispatcher, SubscriptionId};
pub use error::{ClientError, WorkerFault};
pub use facility::{DisabledFacility, ThreadFacility, WorkerEntry, WorkerFacility};
pub use ledger::{DEFAULT_GRACE_TICKS, LedgerOutcome, PendingWrite, WriteLedger};
pub use protocol::{CellVertex, EventName, WorkerCommand, WorkerEvent};
pub use sinks::{CrashHandler, DiagnosticSink, LogCrashHandler, TracingSink};
pub use timer::SweepTimer;
pub use worker::run_mesh_worker;
