//! The reconciliation controller: owns the local voxel world, the ledger of
//! unacknowledged writes and the worker session.
//!
//! Local edits are applied immediately and mirrored to the worker. Each one
//! that changes a voxel is tracked in the [`WriteLedger`] until the server
//! confirms or overrides it; writes left unconfirmed for the grace period are
//! rolled back by the periodic sweep. Server writes always win.
//!
//! The controller is single-threaded. The host drives it by calling
//! [`ReconciliationController::update`] once per frame, which drains worker
//! events and runs the sweep when due.

use std::fmt;
use std::time::{Duration, Instant};

use voxsync_config::{Config, ReconcileConfig, WorkerConfig};
use voxsync_voxel::{ChunkPayload, ChunkSet, VoxelValue, hash, try_hash, unhash};

use crate::cells::{CellRegistry, Renderer};
use crate::channel::{Inbound, WorkerChannel};
use crate::dispatch::{Completion, EventDispatcher, SubscriptionId};
use crate::error::{ClientError, WorkerFault};
use crate::facility::{ThreadFacility, WorkerEntry, WorkerFacility};
use crate::ledger::{PendingWrite, WriteLedger};
use crate::protocol::{EventName, WorkerCommand, WorkerEvent};
use crate::sinks::{CrashHandler, DiagnosticSink, LogCrashHandler, TracingSink};
use crate::timer::SweepTimer;
use crate::worker::run_mesh_worker;

/// Tag attached to diagnostics forwarded from the worker.
pub const WORKER_LOG_TAG: &str = "VoxelWorker:";

/// Sleep between pump rounds while waiting on a lifecycle event.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Never initialised.
    Uninitialized,
    /// Worker spawned, waiting for `started`.
    Starting,
    /// Accepting writes and sweeping.
    Running,
    /// `stop` sent, waiting for `stopped`.
    Stopping,
    /// Worker finished; may be initialised again.
    Stopped,
    /// The worker faulted. Terminal.
    Crashed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
        })
    }
}

/// State that exists only between `init` and `deinit`.
struct Session {
    chunks: ChunkSet,
    ledger: WriteLedger,
    timer: SweepTimer,
}

impl Session {
    fn new(config: &ReconcileConfig, now: Instant) -> Self {
        Self {
            chunks: ChunkSet::new(),
            ledger: WriteLedger::new(config.grace_ticks),
            timer: SweepTimer::start(config.sweep_interval(), now),
        }
    }
}

// ---------------------------------------------------------------------------
// ReconciliationController
// ---------------------------------------------------------------------------

/// Client-side owner of the optimistic voxel world.
pub struct ReconciliationController<R: Renderer> {
    reconcile: ReconcileConfig,
    worker: WorkerConfig,
    facility: Box<dyn WorkerFacility>,
    entry: WorkerEntry,
    sink: Box<dyn DiagnosticSink>,
    crash_handler: Box<dyn CrashHandler>,
    cells: CellRegistry<R>,
    dispatcher: EventDispatcher,
    state: LifecycleState,
    session: Option<Session>,
    channel: Option<WorkerChannel>,
}

impl<R: Renderer> ReconciliationController<R> {
    /// Creates an uninitialised controller that renders through `renderer`.
    ///
    /// Defaults to the mesh worker on a dedicated thread, worker logs via
    /// `tracing`, and crashes logged at error level.
    pub fn new(config: &Config, renderer: R) -> Self {
        Self {
            reconcile: config.reconcile.clone(),
            worker: config.worker.clone(),
            facility: Box::new(ThreadFacility),
            entry: run_mesh_worker,
            sink: Box::new(TracingSink),
            crash_handler: Box::new(LogCrashHandler),
            cells: CellRegistry::new(renderer),
            dispatcher: EventDispatcher::new(),
            state: LifecycleState::Uninitialized,
            session: None,
            channel: None,
        }
    }

    /// Replaces the worker facility.
    pub fn with_facility(mut self, facility: impl WorkerFacility + 'static) -> Self {
        self.facility = Box::new(facility);
        self
    }

    /// Replaces the worker body.
    pub fn with_worker_entry(mut self, entry: WorkerEntry) -> Self {
        self.entry = entry;
        self
    }

    /// Replaces the sink receiving worker `log` events.
    pub fn with_diagnostic_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Replaces the crash handler.
    pub fn with_crash_handler(mut self, handler: impl CrashHandler + 'static) -> Self {
        self.crash_handler = Box::new(handler);
        self
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Spawns the worker and starts a fresh session.
    ///
    /// The returned [`Completion`] resolves when the worker reports
    /// `started`, at which point the controller is [`LifecycleState::Running`].
    ///
    /// # Errors
    ///
    /// [`ClientError::UnsupportedEnvironment`] if no worker can be hosted,
    /// [`ClientError::InvalidState`] unless uninitialised or stopped.
    pub fn init(&mut self) -> Result<Completion, ClientError> {
        match self.state {
            LifecycleState::Uninitialized | LifecycleState::Stopped => {}
            state => {
                return Err(ClientError::InvalidState {
                    operation: "init",
                    state,
                });
            }
        }
        if !self.facility.is_available() {
            return Err(ClientError::UnsupportedEnvironment(
                "no background worker facility",
            ));
        }

        self.cells.reset();
        let link = self.facility.spawn(&self.worker.thread_name, self.entry)?;
        self.channel = Some(WorkerChannel::new(link));
        self.session = Some(Session::new(&self.reconcile, Instant::now()));
        self.state = LifecycleState::Starting;

        let completion = self.dispatcher.completion(EventName::Started);
        self.post(WorkerCommand::Start);
        tracing::info!(
            "voxel client starting (grace {} ticks, sweep every {:?})",
            self.reconcile.grace_ticks,
            self.reconcile.sweep_interval()
        );
        Ok(completion)
    }

    /// Ends the session and asks the worker to stop.
    ///
    /// Pending writes are discarded without rollback. The returned
    /// [`Completion`] resolves when the worker reports `stopped`.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] unless running.
    pub fn deinit(&mut self) -> Result<Completion, ClientError> {
        if self.state != LifecycleState::Running {
            return Err(ClientError::InvalidState {
                operation: "deinit",
                state: self.state,
            });
        }
        if let Some(session) = self.session.take()
            && !session.ledger.is_empty()
        {
            tracing::debug!("discarding {} pending writes", session.ledger.len());
        }
        let completion = self.dispatcher.completion(EventName::Stopped);
        self.post(WorkerCommand::Stop);
        self.state = LifecycleState::Stopping;
        tracing::info!("voxel client stopping");
        Ok(completion)
    }

    /// Pumps worker events until `completion` resolves.
    ///
    /// # Errors
    ///
    /// [`ClientError::WorkerFault`] if the worker faults while waiting,
    /// [`ClientError::LifecycleTimeout`] if `timeout` elapses first.
    pub fn wait_for(
        &mut self,
        completion: &mut Completion,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let started = Instant::now();
        loop {
            if self.state == LifecycleState::Crashed {
                return Err(ClientError::InvalidState {
                    operation: "wait for a lifecycle event",
                    state: self.state,
                });
            }
            self.pump()?;
            if completion.poll() {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ClientError::LifecycleTimeout {
                    event: completion.event(),
                    waited,
                });
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// [`init`](Self::init) and wait for the worker, bounded by the
    /// configured lifecycle timeout.
    pub fn init_blocking(&mut self) -> Result<(), ClientError> {
        let mut started = self.init()?;
        self.wait_for(&mut started, self.worker.lifecycle_timeout())
    }

    /// [`deinit`](Self::deinit) and wait for the worker, bounded by the
    /// configured lifecycle timeout.
    pub fn deinit_blocking(&mut self) -> Result<(), ClientError> {
        let mut stopped = self.deinit()?;
        self.wait_for(&mut stopped, self.worker.lifecycle_timeout())
    }

    // -- Frame pump ---------------------------------------------------------

    /// Drains worker events, then runs the sweep if one is due at `now`.
    ///
    /// # Errors
    ///
    /// [`ClientError::WorkerFault`] if the worker faulted.
    pub fn update(&mut self, now: Instant) -> Result<(), ClientError> {
        self.pump()?;
        let due = self
            .session
            .as_mut()
            .is_some_and(|session| session.timer.poll(now));
        if due && self.state == LifecycleState::Running {
            self.sweep()?;
        }
        Ok(())
    }

    /// Handles every queued worker event and returns how many were handled.
    ///
    /// # Errors
    ///
    /// [`ClientError::WorkerFault`] if the worker reported a fault or hung
    /// up unexpectedly. The controller is crashed afterwards.
    pub fn pump(&mut self) -> Result<usize, ClientError> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(0);
        };
        let inbound = channel.drain();
        let mut handled = 0;
        for item in inbound {
            match item {
                Inbound::Fault(fault) => return Err(self.crash(fault)),
                Inbound::Disconnected => {
                    return Err(self.crash(WorkerFault::unlocated("worker disconnected")));
                }
                Inbound::Event(event) => {
                    handled += 1;
                    self.handle_event(&event);
                    self.dispatcher.dispatch(&event);
                    if self.state == LifecycleState::Stopped {
                        if let Some(channel) = self.channel.take() {
                            channel.shutdown();
                        }
                        break;
                    }
                }
            }
        }
        Ok(handled)
    }

    fn handle_event(&mut self, event: &WorkerEvent) {
        let live = matches!(
            self.state,
            LifecycleState::Starting | LifecycleState::Running
        );
        match event {
            WorkerEvent::Log { args } => self.sink.log(WORKER_LOG_TAG, args),
            WorkerEvent::Started => {
                if self.state == LifecycleState::Starting {
                    self.state = LifecycleState::Running;
                    tracing::info!("voxel client running");
                }
            }
            WorkerEvent::Stopped => {
                if self.state == LifecycleState::Stopping {
                    self.state = LifecycleState::Stopped;
                    tracing::info!("voxel client stopped");
                }
            }
            WorkerEvent::UpdateCell { coord, vertices } if live => {
                self.cells.update_cell(*coord, vertices);
            }
            WorkerEvent::RemoveCell { coord } if live => {
                self.cells.remove_cell(*coord);
            }
            WorkerEvent::UpdateCell { .. } | WorkerEvent::RemoveCell { .. } => {}
        }
    }

    /// Moves to [`LifecycleState::Crashed`] and notifies the crash handler.
    fn crash(&mut self, fault: WorkerFault) -> ClientError {
        if let Some(channel) = self.channel.take() {
            channel.terminate();
        }
        self.session = None;
        self.state = LifecycleState::Crashed;
        let err = ClientError::WorkerFault(fault);
        let description = err.to_string();
        tracing::error!("{description}");
        self.crash_handler.crash(&description);
        err
    }

    fn post(&self, command: WorkerCommand) {
        let Some(channel) = self.channel.as_ref() else {
            return;
        };
        if let Err(err) = channel.post(&command) {
            tracing::warn!("dropped worker command {command:?}: {err}");
        }
    }

    fn session_in(
        &mut self,
        operation: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<&mut Session, ClientError> {
        let state = self.state;
        match self.session.as_mut() {
            Some(session) if allowed.contains(&state) => Ok(session),
            _ => Err(ClientError::InvalidState { operation, state }),
        }
    }

    // -- Writes -------------------------------------------------------------

    /// Applies a local, unconfirmed edit and returns the value it replaced.
    ///
    /// A no-op edit changes nothing and sends nothing. Any other edit is
    /// tracked until the server confirms it and is always mirrored to the
    /// worker.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] unless running,
    /// [`ClientError::InvalidCoordinate`] for an out-of-range address.
    pub fn apply_local_write(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        value: VoxelValue,
    ) -> Result<VoxelValue, ClientError> {
        let session = self.session_in("apply a local write", &[LifecycleState::Running])?;
        let prior = session.chunks.set(x, y, z, value)?;
        if prior == value {
            return Ok(prior);
        }
        let outcome = session.ledger.record_or_clear(hash(x, y, z), prior, value);
        tracing::trace!("local write ({x}, {y}, {z}) {prior:?} -> {value:?}: {outcome:?}");
        self.post(WorkerCommand::SetVoxel { x, y, z, value });
        Ok(prior)
    }

    /// Applies a server-confirmed value and returns the value it replaced.
    ///
    /// Clears any pending entry for the voxel. If the local value differed,
    /// the correction is forwarded to the worker.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] outside a session,
    /// [`ClientError::InvalidCoordinate`] for an out-of-range address.
    pub fn apply_authoritative_write(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        value: VoxelValue,
    ) -> Result<VoxelValue, ClientError> {
        let session = self.session_in(
            "apply an authoritative write",
            &[LifecycleState::Starting, LifecycleState::Running],
        )?;
        let key = try_hash(x, y, z)?;
        if session.ledger.clear(key).is_some() {
            tracing::trace!("write ({x}, {y}, {z}) acknowledged as {value:?}");
        }
        let prior = session.chunks.set(x, y, z, value)?;
        if prior != value {
            self.post(WorkerCommand::SetVoxel { x, y, z, value });
        }
        Ok(prior)
    }

    /// Replaces a whole chunk with server data. Pending writes inside it are
    /// left alone.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] outside a session,
    /// [`ClientError::InvalidCoordinate`] for an out-of-range chunk.
    pub fn apply_authoritative_chunk(
        &mut self,
        cx: i32,
        cy: i32,
        cz: i32,
        payload: ChunkPayload,
    ) -> Result<(), ClientError> {
        let session = self.session_in(
            "apply an authoritative chunk",
            &[LifecycleState::Starting, LifecycleState::Running],
        )?;
        session.chunks.set_chunk(cx, cy, cz, payload.clone())?;
        self.post(WorkerCommand::UpdateChunk { cx, cy, cz, payload });
        Ok(())
    }

    /// Evicts a chunk on server instruction. Returns `false` if it was not
    /// loaded; the worker is told either way.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] outside a session,
    /// [`ClientError::InvalidCoordinate`] for an out-of-range chunk.
    pub fn remove_authoritative_chunk(
        &mut self,
        cx: i32,
        cy: i32,
        cz: i32,
    ) -> Result<bool, ClientError> {
        let session = self.session_in(
            "remove an authoritative chunk",
            &[LifecycleState::Starting, LifecycleState::Running],
        )?;
        let removed = session.chunks.remove_chunk(cx, cy, cz)?.is_some();
        self.post(WorkerCommand::RemoveChunk { cx, cy, cz });
        Ok(removed)
    }

    /// Ages every pending write by one tick and rolls back those that
    /// expired. Returns the number rolled back.
    ///
    /// [`update`](Self::update) calls this on the configured interval.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] unless running.
    pub fn sweep(&mut self) -> Result<usize, ClientError> {
        let session = self.session_in("sweep", &[LifecycleState::Running])?;
        let mut restored = Vec::new();
        for (key, prior) in session.ledger.sweep() {
            let (x, y, z) = unhash(key);
            session.chunks.set(x, y, z, prior)?;
            restored.push(WorkerCommand::SetVoxel {
                x,
                y,
                z,
                value: prior,
            });
        }
        let count = restored.len();
        for command in restored {
            self.post(command);
        }
        if count > 0 {
            tracing::debug!("rolled back {count} unacknowledged writes");
        }
        Ok(count)
    }

    // -- Rendering & subscriptions -------------------------------------------

    /// Draws every live cell.
    pub fn draw_all(&self) {
        self.cells.draw_all();
    }

    /// Subscribes to every future `name` event from the worker.
    pub fn subscribe(
        &mut self,
        name: EventName,
        handler: impl FnMut(&WorkerEvent) + 'static,
    ) -> SubscriptionId {
        self.dispatcher.on(name, handler)
    }

    /// Subscribes to the next `name` event only.
    pub fn subscribe_once(
        &mut self,
        name: EventName,
        handler: impl FnMut(&WorkerEvent) + 'static,
    ) -> SubscriptionId {
        self.dispatcher.once(name, handler)
    }

    /// Cancels a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dispatcher.off(id)
    }

    // -- Introspection ------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Number of writes awaiting confirmation.
    pub fn pending_writes(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.ledger.len())
    }

    /// Pending entry for a voxel, if any.
    pub fn pending(&self, x: i32, y: i32, z: i32) -> Option<PendingWrite> {
        let session = self.session.as_ref()?;
        let key = try_hash(x, y, z).ok()?;
        session.ledger.get(key).copied()
    }

    /// Current local value of a voxel. `None` outside a session or for an
    /// out-of-range address.
    pub fn voxel(&self, x: i32, y: i32, z: i32) -> Option<VoxelValue> {
        self.session.as_ref()?.chunks.get(x, y, z).ok()
    }

    /// Number of live render cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Live render cells.
    pub fn cells(&self) -> &CellRegistry<R> {
        &self.cells
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
