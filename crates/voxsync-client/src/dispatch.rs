//! Named-event demultiplexing for inbound worker events.
//!
//! Any number of handlers may subscribe to the same [`EventName`]. A
//! handler registered with [`EventDispatcher::once`] is removed after its
//! first delivery; [`Completion`] builds on that to give lifecycle callers a
//! value that resolves exactly once.

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use rustc_hash::FxHashMap;

use crate::protocol::{EventName, WorkerEvent};

/// Boxed event callback.
pub type EventHandler = Box<dyn FnMut(&WorkerEvent)>;

/// Handle identifying a subscription, for [`EventDispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Persistent,
    Once,
}

struct Subscription {
    id: SubscriptionId,
    delivery: Delivery,
    handler: EventHandler,
}

/// Routes each event to the handlers subscribed to its name, in
/// registration order.
#[derive(Default)]
pub struct EventDispatcher {
    next_id: u64,
    subscribers: FxHashMap<EventName, Vec<Subscription>>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn add(
        &mut self,
        name: EventName,
        delivery: Delivery,
        handler: EventHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.entry(name).or_default().push(Subscription {
            id,
            delivery,
            handler,
        });
        id
    }

    /// Subscribes `handler` to every future `name` event.
    pub fn on(
        &mut self,
        name: EventName,
        handler: impl FnMut(&WorkerEvent) + 'static,
    ) -> SubscriptionId {
        self.add(name, Delivery::Persistent, Box::new(handler))
    }

    /// Subscribes `handler` to the next `name` event only.
    pub fn once(
        &mut self,
        name: EventName,
        handler: impl FnMut(&WorkerEvent) + 'static,
    ) -> SubscriptionId {
        self.add(name, Delivery::Once, Box::new(handler))
    }

    /// Registers a one-shot subscription and returns a [`Completion`] that
    /// resolves when the next `name` event is dispatched.
    pub fn completion(&mut self, name: EventName) -> Completion {
        let (tx, rx) = bounded(1);
        self.once(name, move |_| {
            let _ = tx.try_send(());
        });
        Completion {
            event: name,
            rx,
            resolved: false,
        }
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        for subs in self.subscribers.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    /// Delivers `event` to its subscribers and returns how many ran.
    pub fn dispatch(&mut self, event: &WorkerEvent) -> usize {
        let Some(subs) = self.subscribers.get_mut(&event.name()) else {
            return 0;
        };
        let delivered = subs.len();
        subs.retain_mut(|sub| {
            (sub.handler)(event);
            sub.delivery == Delivery::Persistent
        });
        delivered
    }

    /// Number of live subscriptions for `name`.
    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.subscribers.get(&name).map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Resolves once the awaited lifecycle event has been dispatched.
#[derive(Debug)]
pub struct Completion {
    event: EventName,
    rx: Receiver<()>,
    resolved: bool,
}

impl Completion {
    /// The event this completion waits for.
    pub fn event(&self) -> EventName {
        self.event
    }

    /// Returns `true` once the event has been dispatched. Never reverts.
    pub fn poll(&mut self) -> bool {
        if !self.resolved {
            match self.rx.try_recv() {
                Ok(()) => self.resolved = true,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }
        }
        self.resolved
    }
}
