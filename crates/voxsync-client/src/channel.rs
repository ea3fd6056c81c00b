//! Byte-level transport between the controller and its worker.
//!
//! [`worker_link`] creates a directed channel pair: commands flow
//! controller → worker, events and faults flow worker → controller. Both
//! directions carry encoded byte buffers only. Delivery is FIFO per
//! direction and fire-and-forget: no send is ever acknowledged.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use crate::error::{ClientError, WorkerFault};
use crate::protocol::{WorkerCommand, WorkerEvent, WorkerMessage, decode, encode};

/// Creates a connected controller/worker pair.
pub fn worker_link() -> (WorkerLink, WorkerEndpoint) {
    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    (
        WorkerLink {
            commands: Some(command_tx),
            inbound: event_rx,
            thread: None,
        },
        WorkerEndpoint {
            commands: command_rx,
            outbound: event_tx,
        },
    )
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

/// The worker's end of a [`worker_link`].
pub struct WorkerEndpoint {
    commands: Receiver<Vec<u8>>,
    outbound: Sender<Vec<u8>>,
}

impl WorkerEndpoint {
    /// Blocks for the next command. Returns `Ok(None)` once the controller
    /// has closed its side.
    pub fn recv(&self) -> Result<Option<WorkerCommand>, WorkerFault> {
        match self.commands.recv() {
            Ok(bytes) => Ok(Some(decode(&bytes)?)),
            Err(_) => Ok(None),
        }
    }

    /// Returns the next queued command without blocking.
    pub fn try_recv(&self) -> Result<Option<WorkerCommand>, WorkerFault> {
        match self.commands.try_recv() {
            Ok(bytes) => Ok(Some(decode(&bytes)?)),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    /// Sends an event. A controller that has gone away is not an error.
    pub fn emit(&self, event: WorkerEvent) -> Result<(), WorkerFault> {
        let bytes = encode(&WorkerMessage::Event(event))?;
        let _ = self.outbound.send(bytes);
        Ok(())
    }

    /// Emits a [`WorkerEvent::Log`] built from `args`.
    pub fn log<I, S>(&self, args: I) -> Result<(), WorkerFault>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emit(WorkerEvent::Log {
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// Returns a handle the hosting facility can use to report a fault after
    /// the endpoint itself has been consumed.
    pub fn fault_reporter(&self) -> FaultReporter {
        FaultReporter {
            outbound: self.outbound.clone(),
        }
    }
}

/// Sends a terminal [`WorkerFault`] to the controller.
pub struct FaultReporter {
    outbound: Sender<Vec<u8>>,
}

impl FaultReporter {
    /// Reports `fault`. Silently dropped if the controller is gone.
    pub fn report(&self, fault: WorkerFault) {
        match encode(&WorkerMessage::Fault(fault)) {
            Ok(bytes) => {
                let _ = self.outbound.send(bytes);
            }
            Err(err) => tracing::error!("failed to encode worker fault: {err}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller side
// ---------------------------------------------------------------------------

/// The controller's end of a [`worker_link`], plus the worker's thread if
/// the facility runs it on one.
pub struct WorkerLink {
    commands: Option<Sender<Vec<u8>>>,
    inbound: Receiver<Vec<u8>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerLink {
    /// Attaches the thread running the worker.
    pub fn with_thread(mut self, handle: JoinHandle<()>) -> Self {
        self.thread = Some(handle);
        self
    }
}

/// One decoded inbound item.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A named event.
    Event(WorkerEvent),
    /// The worker reported a fault.
    Fault(WorkerFault),
    /// The worker side hung up.
    Disconnected,
}

/// Controller-side channel: encodes commands, decodes inbound traffic.
pub struct WorkerChannel {
    link: WorkerLink,
    hung_up: bool,
}

impl WorkerChannel {
    /// Wraps a freshly spawned link.
    pub fn new(link: WorkerLink) -> Self {
        Self {
            link,
            hung_up: false,
        }
    }

    /// Sends a command. Fails only if the command side is closed or the
    /// command cannot be encoded.
    pub fn post(&self, command: &WorkerCommand) -> Result<(), ClientError> {
        let sender = self.link.commands.as_ref().ok_or(ClientError::ChannelClosed)?;
        let bytes = encode(command)?;
        sender.send(bytes).map_err(|_| ClientError::ChannelClosed)
    }

    /// Drains everything currently queued, in arrival order.
    ///
    /// Undecodable frames become faults. A hang-up is reported once, after
    /// all frames that preceded it.
    pub fn drain(&mut self) -> Vec<Inbound> {
        let mut out = Vec::new();
        loop {
            match self.link.inbound.try_recv() {
                Ok(bytes) => out.push(match decode::<WorkerMessage>(&bytes) {
                    Ok(WorkerMessage::Event(event)) => Inbound::Event(event),
                    Ok(WorkerMessage::Fault(fault)) => Inbound::Fault(fault),
                    Err(err) => Inbound::Fault(WorkerFault::new(format!(
                        "undecodable worker message: {err}"
                    ))),
                }),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.hung_up {
                        self.hung_up = true;
                        out.push(Inbound::Disconnected);
                    }
                    break;
                }
            }
        }
        out
    }

    /// Closes the command side and abandons the worker thread without
    /// waiting for it.
    pub fn terminate(mut self) {
        self.link.commands.take();
        self.link.thread.take();
    }

    /// Closes the command side and joins the worker thread.
    pub fn shutdown(mut self) {
        self.link.commands.take();
        if let Some(handle) = self.link.thread.take()
            && handle.join().is_err()
        {
            tracing::warn!("voxel worker thread panicked during shutdown");
        }
    }
}
