//! Headless demo of optimistic voxel replication against a simulated server.
//!
//! Each frame the client paints a voxel locally. The simulated server
//! confirms most edits a few frames later, overrides some, and silently
//! drops every Nth one so the sweep has something to roll back.
//!
//! Run with `cargo run -p voxsync-demo -- --frames 300 --drop-every 4`.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, info};
use voxsync_client::{
    CellVertex, ClientError, EventName, ReconciliationController, RenderCell, Renderer,
};
use voxsync_config::{CliArgs, Config};
use voxsync_voxel::{CHUNK_SIZE, ChunkPayload, VoxelValue};

/// Simulated frame length.
const FRAME: Duration = Duration::from_millis(16);

/// Frames between a local edit and the server's reply.
const SERVER_LATENCY_FRAMES: u32 = 4;

/// Every this many edits the server answers with its own value instead.
const OVERRIDE_EVERY: u32 = 7;

// ---------------------------------------------------------------------------
// Headless renderer
// ---------------------------------------------------------------------------

struct HeadlessCell {
    coord: [i32; 3],
    vertex_count: usize,
    draws: Rc<Cell<u64>>,
}

impl RenderCell for HeadlessCell {
    fn update(&mut self, vertices: &[CellVertex]) {
        self.vertex_count = vertices.len();
    }

    fn release(self) {
        debug!("released cell {:?} ({} vertices)", self.coord, self.vertex_count);
    }

    fn draw(&self) {
        self.draws.set(self.draws.get() + 1);
    }
}

struct HeadlessRenderer {
    draws: Rc<Cell<u64>>,
}

impl Renderer for HeadlessRenderer {
    type Cell = HeadlessCell;

    fn create_cell(&mut self, coord: [i32; 3], vertices: &[CellVertex]) -> HeadlessCell {
        HeadlessCell {
            coord,
            vertex_count: vertices.len(),
            draws: Rc::clone(&self.draws),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated server
// ---------------------------------------------------------------------------

struct Reply {
    due_frame: u32,
    coord: [i32; 3],
    value: VoxelValue,
}

#[derive(Default)]
struct ServerStats {
    acked: u32,
    overridden: u32,
    dropped: u32,
}

struct SimulatedServer {
    drop_every: u32,
    received: u32,
    outbox: VecDeque<Reply>,
    stats: ServerStats,
}

impl SimulatedServer {
    fn new(drop_every: u32) -> Self {
        Self {
            drop_every,
            received: 0,
            outbox: VecDeque::new(),
            stats: ServerStats::default(),
        }
    }

    fn receive(&mut self, frame: u32, coord: [i32; 3], value: VoxelValue) {
        self.received += 1;
        if self.drop_every > 0 && self.received % self.drop_every == 0 {
            self.stats.dropped += 1;
            return;
        }
        let value = if self.received % OVERRIDE_EVERY == 0 {
            self.stats.overridden += 1;
            VoxelValue(1)
        } else {
            self.stats.acked += 1;
            value
        };
        self.outbox.push_back(Reply {
            due_frame: frame + SERVER_LATENCY_FRAMES,
            coord,
            value,
        });
    }

    fn deliver<R: Renderer>(
        &mut self,
        frame: u32,
        client: &mut ReconciliationController<R>,
    ) -> Result<(), ClientError> {
        while self.outbox.front().is_some_and(|r| r.due_frame <= frame) {
            if let Some(Reply {
                coord: [x, y, z],
                value,
                ..
            }) = self.outbox.pop_front()
            {
                client.apply_authoritative_write(x, y, z, value)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn run(config: &Config, args: &CliArgs) -> Result<(), ClientError> {
    let draws = Rc::new(Cell::new(0));
    let mut client = ReconciliationController::new(
        config,
        HeadlessRenderer {
            draws: Rc::clone(&draws),
        },
    )
    .with_crash_handler(|description: &str| {
        tracing::error!("{description}");
        std::process::exit(1);
    });

    let cell_updates = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&cell_updates);
    client.subscribe(EventName::UpdateCell, move |_| counter.set(counter.get() + 1));

    client.init_blocking()?;

    // Bedrock slab from the server.
    let mut floor = ChunkPayload::new_empty();
    for z in 0..CHUNK_SIZE {
        for x in 0..CHUNK_SIZE {
            floor.set(x, 0, z, VoxelValue(1));
        }
    }
    client.apply_authoritative_chunk(0, 0, 0, floor)?;

    let mut server = SimulatedServer::new(args.drop_every);
    let mut rolled_back = 0usize;
    let start = Instant::now();
    let side = CHUNK_SIZE as u32 * 2;

    for frame in 0..args.frames {
        let now = start + FRAME * frame;
        let x = (frame % side) as i32;
        let z = ((frame / side) % side) as i32;
        let value = VoxelValue(2 + (frame % 4) as u16);

        if client.apply_local_write(x, 1, z, value)? != value {
            server.receive(frame, [x, 1, z], value);
        }
        server.deliver(frame, &mut client)?;

        let before = client.pending_writes();
        client.update(now)?;
        rolled_back += before.saturating_sub(client.pending_writes());

        client.draw_all();
        std::thread::sleep(Duration::from_millis(1));
    }

    info!(
        "{} frames: {} acked, {} overridden, {} dropped by server; {} rolled back, {} still pending",
        args.frames,
        server.stats.acked,
        server.stats.overridden,
        server.stats.dropped,
        rolled_back,
        client.pending_writes()
    );
    info!(
        "{} live cells, {} cell updates, {} cell draws",
        client.cell_count(),
        cell_updates.get(),
        draws.get()
    );

    client.deinit_blocking()
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("voxsync")));
    let Some(config_dir) = config_dir else {
        eprintln!("Failed to resolve config directory");
        std::process::exit(1);
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config
        .debug
        .log_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("logs"));
    voxsync_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&config, &args) {
        tracing::error!("voxsync demo failed: {e}");
        std::process::exit(1);
    }
}
