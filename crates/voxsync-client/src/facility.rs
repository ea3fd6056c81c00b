//! Hosting of the background worker.
//!
//! A [`WorkerFacility`] decides where the worker runs. The production
//! [`ThreadFacility`] gives it a dedicated named OS thread; tests swap in
//! facilities that keep the endpoint on the calling thread.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Once;

use crate::channel::{WorkerEndpoint, WorkerLink, worker_link};
use crate::error::{ClientError, WorkerFault};

/// Worker body. Runs until it returns; an `Err` is reported to the
/// controller as a fault.
pub type WorkerEntry = fn(WorkerEndpoint) -> Result<(), WorkerFault>;

/// Something that can host a worker.
pub trait WorkerFacility {
    /// Returns `false` if this environment cannot run a background worker.
    fn is_available(&self) -> bool;

    /// Starts `entry` under `name` and returns the controller's end of its
    /// channel.
    fn spawn(&self, name: &str, entry: WorkerEntry) -> Result<WorkerLink, ClientError>;
}

// ---------------------------------------------------------------------------
// Panic locations
// ---------------------------------------------------------------------------

thread_local! {
    /// Source location of the most recent panic on this thread.
    static PANIC_LOCATION: RefCell<Option<(String, u32)>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a process-wide panic hook that records each panic's location in
/// [`PANIC_LOCATION`] before running the previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info.location().map(|loc| (loc.file().to_string(), loc.line()));
            PANIC_LOCATION.with(|slot| *slot.borrow_mut() = location);
            previous(info);
        }));
    });
}

fn take_panic_location() -> Option<(String, u32)> {
    PANIC_LOCATION.with(|slot| slot.borrow_mut().take())
}

// ---------------------------------------------------------------------------
// ThreadFacility
// ---------------------------------------------------------------------------

/// Runs each worker on its own named thread.
///
/// Panics and errors escaping the worker body are converted to a
/// [`WorkerFault`] carrying their source location and sent to the controller
/// before the thread exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadFacility;

impl WorkerFacility for ThreadFacility {
    fn is_available(&self) -> bool {
        cfg!(not(target_family = "wasm"))
    }

    fn spawn(&self, name: &str, entry: WorkerEntry) -> Result<WorkerLink, ClientError> {
        install_panic_hook();
        let (link, endpoint) = worker_link();
        let reporter = endpoint.fault_reporter();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let fault = match catch_unwind(AssertUnwindSafe(|| entry(endpoint))) {
                    Ok(Ok(())) => return,
                    Ok(Err(fault)) => fault,
                    Err(payload) => {
                        WorkerFault::from_panic(payload.as_ref(), take_panic_location())
                    }
                };
                tracing::error!("voxel worker exited with fault: {fault}");
                reporter.report(fault);
            })
            .map_err(ClientError::SpawnFailed)?;
        tracing::debug!("spawned worker thread '{name}'");
        Ok(link.with_thread(handle))
    }
}

/// Facility for environments without background threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledFacility;

impl WorkerFacility for DisabledFacility {
    fn is_available(&self) -> bool {
        false
    }

    fn spawn(&self, _name: &str, _entry: WorkerEntry) -> Result<WorkerLink, ClientError> {
        Err(ClientError::UnsupportedEnvironment("background workers are disabled"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::channel::{Inbound, WorkerChannel};
    use crate::protocol::WorkerEvent;

    fn drain_until_hang_up(channel: &mut WorkerChannel) -> Vec<Inbound> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            let batch = channel.drain();
            let done = batch.contains(&Inbound::Disconnected);
            seen.extend(batch);
            if done {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        seen
    }

    fn panicking(_endpoint: WorkerEndpoint) -> Result<(), WorkerFault> {
        panic!("mesh table corrupt");
    }

    fn failing(_endpoint: WorkerEndpoint) -> Result<(), WorkerFault> {
        Err(WorkerFault::new("bad input"))
    }

    fn greeting(endpoint: WorkerEndpoint) -> Result<(), WorkerFault> {
        endpoint.emit(WorkerEvent::Started)
    }

    #[test]
    fn test_panic_becomes_located_fault() {
        let link = ThreadFacility.spawn("test-panic", panicking).unwrap();
        let seen = drain_until_hang_up(&mut WorkerChannel::new(link));
        assert_eq!(seen.len(), 2);
        match &seen[0] {
            Inbound::Fault(fault) => {
                assert_eq!(fault.message, "mesh table corrupt");
                assert!(fault.file.as_deref().is_some_and(|f| f.ends_with("facility.rs")));
                assert!(fault.line.is_some());
                assert!(fault.to_string().contains("facility.rs:"));
            }
            other => panic!("expected fault, got {other:?}"),
        }
        assert_eq!(seen[1], Inbound::Disconnected);
    }

    #[test]
    fn test_error_return_becomes_located_fault() {
        let link = ThreadFacility.spawn("test-error", failing).unwrap();
        let seen = drain_until_hang_up(&mut WorkerChannel::new(link));
        match &seen[0] {
            Inbound::Fault(fault) => {
                assert_eq!(fault.message, "bad input");
                assert!(fault.line.is_some());
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_exit_only_hangs_up() {
        let link = ThreadFacility.spawn("test-clean", greeting).unwrap();
        let seen = drain_until_hang_up(&mut WorkerChannel::new(link));
        assert_eq!(
            seen,
            vec![Inbound::Event(WorkerEvent::Started), Inbound::Disconnected]
        );
    }

    #[test]
    fn test_disabled_facility() {
        assert!(!DisabledFacility.is_available());
        assert!(matches!(
            DisabledFacility.spawn("x", greeting),
            Err(ClientError::UnsupportedEnvironment(_))
        ));
    }
}
