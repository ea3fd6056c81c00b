//! Scenario tests for the reconciliation controller.

use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::cells::RenderCell;
use crate::channel::{WorkerEndpoint, WorkerLink, worker_link};
use crate::facility::DisabledFacility;
use crate::protocol::CellVertex;

const WAIT: Duration = Duration::from_secs(5);

fn v(n: u16) -> VoxelValue {
    VoxelValue(n)
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RenderLog {
    created: Vec<[i32; 3]>,
    updated: Vec<[i32; 3]>,
    released: Vec<[i32; 3]>,
}

struct RecordingCell {
    coord: [i32; 3],
    log: Rc<RefCell<RenderLog>>,
}

impl RenderCell for RecordingCell {
    fn update(&mut self, _vertices: &[CellVertex]) {
        self.log.borrow_mut().updated.push(self.coord);
    }

    fn release(self) {
        self.log.borrow_mut().released.push(self.coord);
    }

    fn draw(&self) {}
}

struct RecordingRenderer(Rc<RefCell<RenderLog>>);

impl Renderer for RecordingRenderer {
    type Cell = RecordingCell;

    fn create_cell(&mut self, coord: [i32; 3], _vertices: &[CellVertex]) -> RecordingCell {
        self.0.borrow_mut().created.push(coord);
        RecordingCell {
            coord,
            log: Rc::clone(&self.0),
        }
    }
}

/// Keeps the worker's endpoint on the test thread so the test can play the
/// worker by hand.
struct LoopbackFacility(Rc<RefCell<Option<WorkerEndpoint>>>);

impl WorkerFacility for LoopbackFacility {
    fn is_available(&self) -> bool {
        true
    }

    fn spawn(&self, _name: &str, _entry: WorkerEntry) -> Result<WorkerLink, ClientError> {
        let (link, endpoint) = worker_link();
        *self.0.borrow_mut() = Some(endpoint);
        Ok(link)
    }
}

struct Harness {
    controller: ReconciliationController<RecordingRenderer>,
    endpoint: Rc<RefCell<Option<WorkerEndpoint>>>,
    render: Rc<RefCell<RenderLog>>,
    crashes: Rc<RefCell<Vec<String>>>,
}

impl Harness {
    fn new(config: &Config) -> Self {
        Self::with_sink(config, TracingSink)
    }

    fn with_sink(config: &Config, sink: impl DiagnosticSink + 'static) -> Self {
        let endpoint = Rc::new(RefCell::new(None));
        let render = Rc::new(RefCell::new(RenderLog::default()));
        let crashes = Rc::new(RefCell::new(Vec::new()));
        let crash_log = Rc::clone(&crashes);
        let controller =
            ReconciliationController::new(config, RecordingRenderer(Rc::clone(&render)))
                .with_facility(LoopbackFacility(Rc::clone(&endpoint)))
                .with_diagnostic_sink(sink)
                .with_crash_handler(move |d: &str| crash_log.borrow_mut().push(d.to_string()));
        Self {
            controller,
            endpoint,
            render,
            crashes,
        }
    }

    /// A controller that has completed `init`, with the `start` command
    /// already consumed.
    fn running() -> Self {
        Self::new(&Config::default()).start()
    }

    fn start(mut self) -> Self {
        let mut started = self.controller.init().unwrap();
        assert_eq!(self.commands(), vec![WorkerCommand::Start]);
        self.emit(WorkerEvent::Started);
        self.controller.wait_for(&mut started, WAIT).unwrap();
        assert_eq!(self.controller.state(), LifecycleState::Running);
        self
    }

    fn emit(&self, event: WorkerEvent) {
        let endpoint = self.endpoint.borrow();
        endpoint.as_ref().unwrap().emit(event).unwrap();
    }

    fn commands(&self) -> Vec<WorkerCommand> {
        let endpoint = self.endpoint.borrow();
        let endpoint = endpoint.as_ref().unwrap();
        let mut out = Vec::new();
        while let Some(command) = endpoint.try_recv().unwrap() {
            out.push(command);
        }
        out
    }

    fn sweep_n(&mut self, n: usize) {
        for _ in 0..n {
            self.controller.sweep().unwrap();
        }
    }
}

fn set(x: i32, y: i32, z: i32, value: u16) -> WorkerCommand {
    WorkerCommand::SetVoxel {
        x,
        y,
        z,
        value: v(value),
    }
}

// ---------------------------------------------------------------------------
// Write reconciliation
// ---------------------------------------------------------------------------

#[test]
fn test_repeated_identical_write_is_noop() {
    let mut h = Harness::running();
    assert_eq!(h.controller.apply_local_write(1, 2, 3, v(5)).unwrap(), v(0));
    assert_eq!(h.controller.apply_local_write(1, 2, 3, v(5)).unwrap(), v(5));
    assert_eq!(h.controller.pending_writes(), 1);
    assert_eq!(h.commands(), vec![set(1, 2, 3, 5)]);
}

#[test]
fn test_unacknowledged_write_rolls_back_after_grace() {
    let mut h = Harness::running();
    h.controller.apply_local_write(0, 0, 0, v(5)).unwrap();
    h.sweep_n(4);
    assert_eq!(h.controller.voxel(0, 0, 0), Some(v(5)));
    assert_eq!(h.controller.pending(0, 0, 0).map(|p| p.decay), Some(1));

    assert_eq!(h.controller.sweep().unwrap(), 1);
    assert_eq!(h.controller.voxel(0, 0, 0), Some(v(0)));
    assert!(h.controller.pending(0, 0, 0).is_none());
    assert_eq!(h.commands(), vec![set(0, 0, 0, 5), set(0, 0, 0, 0)]);
}

#[test]
fn test_ack_before_expiry_keeps_value() {
    let mut h = Harness::running();
    h.controller.apply_local_write(4, 0, -4, v(5)).unwrap();
    h.sweep_n(3);
    assert_eq!(h.controller.apply_authoritative_write(4, 0, -4, v(5)).unwrap(), v(5));
    assert!(h.controller.pending(4, 0, -4).is_none());
    h.sweep_n(10);
    assert_eq!(h.controller.voxel(4, 0, -4), Some(v(5)));
    assert_eq!(h.commands(), vec![set(4, 0, -4, 5)]);
}

#[test]
fn test_authoritative_correction_wins() {
    let mut h = Harness::running();
    h.controller.apply_local_write(2, 2, 2, v(7)).unwrap();
    assert_eq!(h.controller.apply_authoritative_write(2, 2, 2, v(3)).unwrap(), v(7));
    assert_eq!(h.controller.voxel(2, 2, 2), Some(v(3)));
    assert_eq!(h.controller.pending_writes(), 0);
    assert_eq!(h.commands(), vec![set(2, 2, 2, 7), set(2, 2, 2, 3)]);
}

#[test]
fn test_undo_to_prior_drops_entry() {
    let mut h = Harness::running();
    h.controller.apply_authoritative_write(0, 5, 0, v(2)).unwrap();
    h.controller.apply_local_write(0, 5, 0, v(9)).unwrap();
    assert_eq!(
        h.controller.pending(0, 5, 0),
        Some(PendingWrite {
            decay: 5,
            prior: v(2)
        })
    );
    h.controller.apply_local_write(0, 5, 0, v(2)).unwrap();
    assert!(h.controller.pending(0, 5, 0).is_none());
    h.sweep_n(5);
    assert_eq!(h.controller.voxel(0, 5, 0), Some(v(2)));
}

#[test]
fn test_second_edit_keeps_first_prior_and_countdown() {
    let mut h = Harness::running();
    h.controller.apply_local_write(1, 1, 1, v(5)).unwrap();
    h.sweep_n(2);
    h.controller.apply_local_write(1, 1, 1, v(6)).unwrap();
    assert_eq!(
        h.controller.pending(1, 1, 1),
        Some(PendingWrite {
            decay: 3,
            prior: v(0)
        })
    );
    h.sweep_n(3);
    assert_eq!(h.controller.voxel(1, 1, 1), Some(v(0)));
}

#[test]
fn test_short_chunk_payload_rejected_at_decode() {
    use crate::protocol::{decode, encode};

    let mut h = Harness::running();
    let short = encode(&vec![v(1); 8]).unwrap();
    assert!(decode::<ChunkPayload>(&short).is_err());

    let full = encode(&ChunkPayload::filled(v(1))).unwrap();
    let payload: ChunkPayload = decode(&full).unwrap();
    h.controller.apply_authoritative_chunk(0, 0, 0, payload).unwrap();
    assert_eq!(h.controller.apply_local_write(5, 5, 5, v(2)).unwrap(), v(1));
    assert_eq!(h.controller.voxel(5, 5, 5), Some(v(2)));
}

#[test]
fn test_chunk_updates_bypass_ledger() {
    let mut h = Harness::running();
    h.controller.apply_local_write(1, 1, 1, v(4)).unwrap();
    h.controller
        .apply_authoritative_chunk(0, 0, 0, ChunkPayload::filled(v(9)))
        .unwrap();
    assert_eq!(h.controller.pending_writes(), 1);
    assert_eq!(h.controller.voxel(1, 1, 1), Some(v(9)));
    assert_eq!(h.controller.voxel(31, 31, 31), Some(v(9)));

    assert!(h.controller.remove_authoritative_chunk(0, 0, 0).unwrap());
    assert!(!h.controller.remove_authoritative_chunk(0, 0, 0).unwrap());
    assert_eq!(h.controller.pending_writes(), 1);
    assert_eq!(h.controller.voxel(1, 1, 1), Some(v(0)));

    let commands = h.commands();
    assert!(matches!(
        commands[1],
        WorkerCommand::UpdateChunk { cx: 0, cy: 0, cz: 0, .. }
    ));
    assert_eq!(commands[2], WorkerCommand::RemoveChunk { cx: 0, cy: 0, cz: 0 });
}

#[test]
fn test_out_of_range_write_rejected() {
    let mut h = Harness::running();
    let err = h.controller.apply_local_write(i32::MAX, 0, 0, v(1)).unwrap_err();
    assert!(matches!(err, ClientError::InvalidCoordinate(_)));
    let err = h
        .controller
        .apply_authoritative_write(0, i32::MIN, 0, v(1))
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidCoordinate(_)));
    assert_eq!(h.controller.pending_writes(), 0);
    assert!(h.commands().is_empty());
}

#[test]
fn test_update_sweeps_when_due() {
    let mut config = Config::default();
    config.reconcile.grace_ticks = 1;
    config.reconcile.sweep_interval_ms = 60_000;
    let mut h = Harness::new(&config).start();
    h.controller.apply_local_write(0, 0, 0, v(8)).unwrap();

    h.controller.update(Instant::now()).unwrap();
    assert_eq!(h.controller.pending_writes(), 1);

    let later = Instant::now() + Duration::from_secs(3_600);
    h.controller.update(later).unwrap();
    assert_eq!(h.controller.pending_writes(), 0);
    assert_eq!(h.controller.voxel(0, 0, 0), Some(v(0)));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_init_unsupported_environment() {
    let mut controller = ReconciliationController::new(
        &Config::default(),
        RecordingRenderer(Rc::default()),
    )
    .with_facility(DisabledFacility);
    assert!(matches!(
        controller.init(),
        Err(ClientError::UnsupportedEnvironment(_))
    ));
    assert_eq!(controller.state(), LifecycleState::Uninitialized);
}

#[test]
fn test_operations_gated_by_state() {
    let mut h = Harness::new(&Config::default());
    assert!(matches!(
        h.controller.apply_local_write(0, 0, 0, v(1)),
        Err(ClientError::InvalidState { .. })
    ));
    assert!(h.controller.deinit().is_err());

    let _started = h.controller.init().unwrap();
    assert_eq!(h.controller.state(), LifecycleState::Starting);
    assert!(matches!(
        h.controller.deinit(),
        Err(ClientError::InvalidState {
            state: LifecycleState::Starting,
            ..
        })
    ));
    assert!(h.controller.apply_local_write(0, 0, 0, v(1)).is_err());
    assert!(h.controller.sweep().is_err());
    assert!(h.controller.init().is_err());
    assert_eq!(h.controller.apply_authoritative_write(0, 0, 0, v(1)).unwrap(), v(0));
}

#[test]
fn test_deinit_then_reinit() {
    let mut h = Harness::running();
    h.emit(WorkerEvent::UpdateCell {
        coord: [0, 0, 0],
        vertices: vec![],
    });
    h.controller.apply_local_write(0, 0, 0, v(1)).unwrap();
    h.controller.pump().unwrap();
    assert_eq!(h.controller.cell_count(), 1);

    let mut stopped = h.controller.deinit().unwrap();
    assert_eq!(h.controller.state(), LifecycleState::Stopping);
    assert_eq!(h.controller.pending_writes(), 0);
    assert_eq!(h.commands(), vec![set(0, 0, 0, 1), WorkerCommand::Stop]);

    h.emit(WorkerEvent::Stopped);
    h.controller.wait_for(&mut stopped, WAIT).unwrap();
    assert_eq!(h.controller.state(), LifecycleState::Stopped);
    assert!(h.controller.voxel(0, 0, 0).is_none());

    let _started = h.controller.init().unwrap();
    assert_eq!(h.controller.state(), LifecycleState::Starting);
    assert_eq!(h.controller.cell_count(), 0);
    assert_eq!(h.render.borrow().released, vec![[0, 0, 0]]);
    assert_eq!(h.controller.voxel(0, 0, 0), Some(v(0)));
}

#[test]
fn test_wait_times_out() {
    let mut h = Harness::new(&Config::default());
    let mut started = h.controller.init().unwrap();
    let err = h
        .controller
        .wait_for(&mut started, Duration::from_millis(5))
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::LifecycleTimeout {
            event: EventName::Started,
            ..
        }
    ));
}

#[test]
fn test_worker_fault_crashes_client() {
    let mut h = Harness::running();
    h.controller.apply_local_write(0, 0, 0, v(1)).unwrap();
    {
        let endpoint = h.endpoint.borrow();
        endpoint
            .as_ref()
            .unwrap()
            .fault_reporter()
            .report(WorkerFault {
                message: "mesh overflow".into(),
                file: Some("worker.rs".into()),
                line: Some(7),
            });
    }
    let err = h.controller.update(Instant::now()).unwrap_err();
    assert!(matches!(err, ClientError::WorkerFault(_)));
    assert_eq!(h.controller.state(), LifecycleState::Crashed);
    assert_eq!(h.controller.pending_writes(), 0);
    assert_eq!(
        *h.crashes.borrow(),
        vec!["VoxelWorker crashed: (worker.rs:7) -- mesh overflow".to_string()]
    );
    assert!(h.controller.init().is_err());
    assert!(h.controller.apply_local_write(0, 0, 0, v(2)).is_err());
}

#[test]
fn test_worker_hang_up_is_a_fault() {
    let mut h = Harness::running();
    h.endpoint.borrow_mut().take();
    assert!(matches!(
        h.controller.pump(),
        Err(ClientError::WorkerFault(_))
    ));
    assert_eq!(h.controller.state(), LifecycleState::Crashed);
    assert_eq!(h.crashes.borrow().len(), 1);
}

// ---------------------------------------------------------------------------
// Worker events
// ---------------------------------------------------------------------------

#[test]
fn test_cell_events_drive_registry() {
    let mut h = Harness::running();
    let cell = |coord| WorkerEvent::UpdateCell {
        coord,
        vertices: vec![],
    };
    h.emit(cell([1, 0, 0]));
    h.emit(cell([1, 0, 0]));
    h.emit(cell([2, 0, 0]));
    h.emit(WorkerEvent::RemoveCell { coord: [2, 0, 0] });
    h.emit(WorkerEvent::RemoveCell { coord: [9, 9, 9] });
    assert_eq!(h.controller.pump().unwrap(), 5);

    assert_eq!(h.controller.cell_count(), 1);
    assert!(h.controller.cells().contains([1, 0, 0]));
    let render = h.render.borrow();
    assert_eq!(render.created, vec![[1, 0, 0], [2, 0, 0]]);
    assert_eq!(render.updated, vec![[1, 0, 0]]);
    assert_eq!(render.released, vec![[2, 0, 0]]);
}

#[test]
fn test_log_events_reach_sink() {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&lines);
    let h = Harness::with_sink(&Config::default(), move |tag: &str, args: &[String]| {
        seen.borrow_mut().push(format!("{tag} {}", args.join(" ")))
    });
    let mut h = h.start();
    h.emit(WorkerEvent::Log {
        args: vec!["mesh".into(), "ready".into()],
    });
    h.controller.pump().unwrap();
    assert_eq!(*lines.borrow(), vec![format!("{WORKER_LOG_TAG} mesh ready")]);
}

#[test]
fn test_external_subscriptions() {
    let mut h = Harness::running();
    let all = Rc::new(RefCell::new(0));
    let first = Rc::new(RefCell::new(0));
    let (a, f) = (Rc::clone(&all), Rc::clone(&first));
    h.controller
        .subscribe(EventName::RemoveCell, move |_| *a.borrow_mut() += 1);
    h.controller
        .subscribe_once(EventName::RemoveCell, move |_| *f.borrow_mut() += 1);
    for _ in 0..3 {
        h.emit(WorkerEvent::RemoveCell { coord: [0, 0, 0] });
    }
    h.controller.pump().unwrap();
    assert_eq!((*all.borrow(), *first.borrow()), (3, 1));
}

// ---------------------------------------------------------------------------
// Threaded worker
// ---------------------------------------------------------------------------

#[test]
fn test_thread_worker_end_to_end() {
    let mut config = Config::default();
    config.reconcile.grace_ticks = 10_000;
    let render = Rc::new(RefCell::new(RenderLog::default()));
    let mut controller =
        ReconciliationController::new(&config, RecordingRenderer(Rc::clone(&render)));
    controller.init_blocking().unwrap();
    assert_eq!(controller.state(), LifecycleState::Running);

    controller.apply_local_write(0, 0, 0, v(1)).unwrap();
    controller.apply_local_write(40, 0, 0, v(1)).unwrap();
    let deadline = Instant::now() + WAIT;
    while controller.cell_count() < 2 && Instant::now() < deadline {
        controller.update(Instant::now()).unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(controller.cell_count(), 2);

    controller.apply_local_write(40, 0, 0, v(0)).unwrap();
    let deadline = Instant::now() + WAIT;
    while controller.cell_count() > 1 && Instant::now() < deadline {
        controller.update(Instant::now()).unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(controller.cell_count(), 1);
    assert_eq!(render.borrow().released, vec![[1, 0, 0]]);

    controller.deinit_blocking().unwrap();
    assert_eq!(controller.state(), LifecycleState::Stopped);
}
