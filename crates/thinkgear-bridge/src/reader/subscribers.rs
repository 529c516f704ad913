//! Subscriber registry and per-subscriber delivery.
//!
//! Every subscriber owns an unbounded queue, so fan-out from the read loop
//! is a non-blocking push per subscriber. Callback subscribers drain their
//! queue on a dedicated worker task; stream subscribers drain it through
//! [`PacketStream`]. A slow subscriber only grows its own queue.
//!
//! Workers are spawned on the runtime the registry is attached to, so
//! `subscribe` works from threads outside Tokio. A worker registered before
//! any runtime is known is parked until [`Registry::attach_runtime`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::protocol::Packet;

tokio::task_local! {
    /// Id of the subscription whose handler is currently running on this task.
    static DELIVERING: u64;
}

/// Opaque handle returned by `subscribe`, used only to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Guards handler invocation so `unsubscribe` can wait out an in-flight call.
#[derive(Debug)]
struct DeliveryGate {
    active: AtomicBool,
    in_flight: Mutex<()>,
}

type Worker = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct Spawner {
    handle: Option<Handle>,
    parked: Vec<Worker>,
}

#[derive(Default)]
struct Sinks {
    /// Queues fed by `fan_out`. Cleared on close.
    by_id: HashMap<u64, mpsc::UnboundedSender<Packet>>,
    /// Gates of callback workers still alive. Survives close so a worker
    /// draining its queue can still be unsubscribed.
    gates: HashMap<u64, Arc<DeliveryGate>>,
    /// Set once the read loop has stopped; later subscriptions are inert.
    closed: bool,
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    sinks: RwLock<Sinks>,
    spawner: Mutex<Spawner>,
}

impl Registry {
    /// Remember `handle` for spawning workers and release any parked ones.
    /// The first handle attached wins.
    pub(crate) fn attach_runtime(&self, handle: Handle) {
        let mut spawner = self.spawner.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = spawner.handle.get_or_insert(handle).clone();
        for worker in spawner.parked.drain(..) {
            handle.spawn(worker);
        }
    }

    fn spawn_worker(&self, worker: Worker) {
        let mut spawner = self.spawner.lock().unwrap_or_else(PoisonError::into_inner);
        match Handle::try_current().ok().or_else(|| spawner.handle.clone()) {
            Some(handle) => {
                handle.spawn(worker);
            }
            None => spawner.parked.push(worker),
        }
    }

    fn next_token(&self) -> SubscriptionToken {
        SubscriptionToken(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a callback, run on its own worker task in stream order.
    pub(crate) fn subscribe_callback<F>(self: &Arc<Self>, mut handler: F) -> SubscriptionToken
    where
        F: FnMut(Packet) + Send + 'static,
    {
        let token = self.next_token();
        let id = token.0;
        let (tx, mut rx) = mpsc::unbounded_channel::<Packet>();
        let gate = Arc::new(DeliveryGate {
            active: AtomicBool::new(true),
            in_flight: Mutex::new(()),
        });
        {
            let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
            if sinks.closed {
                return token;
            }
            sinks.by_id.insert(id, tx);
            sinks.gates.insert(id, Arc::clone(&gate));
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        self.spawn_worker(Box::pin(async move {
            while let Some(packet) = rx.recv().await {
                if !deliver(&gate, id, &mut handler, packet) {
                    break;
                }
            }
            if let Some(registry) = registry.upgrade() {
                registry
                    .sinks
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .gates
                    .remove(&id);
            }
            tracing::trace!(subscription = id, "Subscriber task finished");
        }));

        token
    }

    pub(crate) fn subscribe_stream(self: &Arc<Self>) -> PacketStream {
        let token = self.next_token();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
            if !sinks.closed {
                sinks.by_id.insert(token.0, tx);
            }
        }
        PacketStream {
            token,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Remove a subscription. Returns `false` if the token was unknown or
    /// its handler can no longer run.
    ///
    /// When this returns, no further handler call starts. Outside any
    /// handler it also waits for an in-flight call to finish. From inside
    /// any handler it does not wait, and the unsubscribed handler's current
    /// call may still be finishing.
    pub(crate) fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let (queued, gate) = {
            let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
            (
                sinks.by_id.remove(&token.0).is_some(),
                sinks.gates.remove(&token.0),
            )
        };
        let Some(gate) = gate else {
            return queued;
        };

        gate.active.store(false, Ordering::SeqCst);
        if DELIVERING.try_with(|_| ()).is_err() {
            drop(gate.in_flight.lock().unwrap_or_else(PoisonError::into_inner));
        }
        true
    }

    /// Push `packet` to every current subscriber without blocking.
    pub(crate) fn fan_out(&self, packet: &Packet) {
        let mut dead = Vec::new();
        {
            let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
            for (id, tx) in &sinks.by_id {
                if tx.send(packet.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
            for id in dead {
                sinks.by_id.remove(&id);
            }
        }
    }

    /// Drop every queue and refuse new subscribers. Callback workers still
    /// drain what was already queued.
    pub(crate) fn close(&self) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        sinks.closed = true;
        sinks.by_id.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }
}

/// Run one handler invocation. Returns `false` once the subscription is gone.
fn deliver<F>(gate: &DeliveryGate, id: u64, handler: &mut F, packet: Packet) -> bool
where
    F: FnMut(Packet),
{
    let _in_flight = gate.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
    if !gate.active.load(Ordering::SeqCst) {
        return false;
    }
    DELIVERING.sync_scope(id, || handler(packet));
    true
}

/// Packets delivered to one subscriber, in stream order.
///
/// Ends when the reader stops. Dropping it unsubscribes.
pub struct PacketStream {
    token: SubscriptionToken,
    rx: mpsc::UnboundedReceiver<Packet>,
    registry: Arc<Registry>,
}

impl PacketStream {
    #[must_use]
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    /// Wait for the next packet; `None` once the reader has stopped.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }
}

impl Stream for PacketStream {
    type Item = Packet;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PacketStream {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.token);
    }
}

impl std::fmt::Debug for PacketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
