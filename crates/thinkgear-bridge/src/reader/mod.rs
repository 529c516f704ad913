//! # Packet Stream Reader
//!
//! Runs a [`BridgeSession`] read loop on a background task and fans every
//! decoded packet out to independent consumers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  PacketStreamReader                       │
//! │                                                           │
//! │  read loop (spawned by start()):                          │
//! │    BridgeSession::read_one ─┬─► LatestPacketTable (seq)   │
//! │                             ├─► callback queue → task     │
//! │                             ├─► callback queue → task     │
//! │                             └─► PacketStream queue        │
//! │                                                           │
//! │  state: Idle → Starting → Running → Stopped(StopReason)   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Construction has no side effects; [`start`](PacketStreamReader::start)
//! connects, handshakes and spawns the loop. Decode errors are counted,
//! logged and skipped. The loop ends on connection loss or
//! [`close`](PacketStreamReader::close), and the [`StopReason`] is
//! published once to every waiter.
//!
//! ```no_run
//! use thinkgear_bridge::{BridgeConfig, PacketKind, PacketStreamReader};
//!
//! # async fn demo() -> thinkgear_bridge::BridgeResult<()> {
//! let reader = PacketStreamReader::new(BridgeConfig::default());
//! let token = reader.subscribe(|packet| println!("{packet:?}"));
//! reader.start().await?;
//!
//! if let Some(latest) = reader.get_latest(PacketKind::Processed) {
//!     println!("#{}: {:?}", latest.sequence, latest.packet);
//! }
//!
//! reader.unsubscribe(token);
//! reader.close();
//! reader.wait_stopped().await;
//! # Ok(())
//! # }
//! ```

mod latest;
mod subscribers;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Packet, PacketKind};
use crate::session::BridgeSession;

pub use latest::{LatestPacketTable, SequencedPacket};
pub use subscribers::{PacketStream, SubscriptionToken};

use subscribers::Registry;

/// Lifecycle of a [`PacketStreamReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// Constructed, `start` not called yet.
    Idle,
    /// Connecting and handshaking.
    Starting,
    /// Read loop active.
    Running,
    /// Terminal.
    Stopped(StopReason),
}

impl ReaderState {
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, ReaderState::Stopped(_))
    }

    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            ReaderState::Stopped(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Why the reader reached [`ReaderState::Stopped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// [`close`](PacketStreamReader::close) was called.
    Requested,
    /// The stream ended or the socket failed.
    ConnectionClosed { reason: String },
    /// Connect or handshake failed.
    StartFailed { reason: String },
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub packets_decoded: u64,
    pub decode_errors: u64,
    pub subscribers: usize,
}

struct Shared {
    registry: Arc<Registry>,
    latest: LatestPacketTable,
    sequence: AtomicU64,
    decode_errors: AtomicU64,
    state_tx: watch::Sender<ReaderState>,
    stop: CancellationToken,
}

impl Shared {
    fn publish(&self, packet: Packet) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.registry.fan_out(&packet);
        self.latest.update(packet, sequence);
    }

    fn finish(&self, reason: StopReason) {
        self.registry.close();
        tracing::info!(?reason, "Packet reader stopped");
        self.state_tx.send_replace(ReaderState::Stopped(reason));
    }
}

/// Background reader over one ThinkGear Connector session.
///
/// All methods take `&self`; share the reader with `Arc` to use it from
/// several tasks.
pub struct PacketStreamReader {
    config: BridgeConfig,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PacketStreamReader {
    /// Create an idle reader. Nothing is connected or spawned until
    /// [`start`](Self::start).
    ///
    /// When called inside a Tokio runtime, subscriber workers run on that
    /// runtime. Otherwise they wait for the runtime `start` runs on.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let (state_tx, _) = watch::channel(ReaderState::Idle);
        let registry = Arc::new(Registry::default());
        if let Ok(handle) = Handle::try_current() {
            registry.attach_runtime(handle);
        }
        Self {
            config,
            shared: Arc::new(Shared {
                registry,
                latest: LatestPacketTable::new(),
                sequence: AtomicU64::new(0),
                decode_errors: AtomicU64::new(0),
                state_tx,
                stop: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Connect, handshake, and spawn the read loop.
    ///
    /// On failure the reader goes straight to
    /// [`StopReason::StartFailed`] and the error is returned.
    ///
    /// # Errors
    /// - [`BridgeError::AlreadyStarted`] if the reader is not `Idle`.
    /// - Any connect or handshake error from [`BridgeSession::connect`].
    /// - [`BridgeError::ConnectionClosed`] if [`close`](Self::close) is
    ///   called while starting.
    pub async fn start(&self) -> BridgeResult<()> {
        let claimed = self.shared.state_tx.send_if_modified(|state| {
            if *state == ReaderState::Idle {
                *state = ReaderState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(BridgeError::AlreadyStarted);
        }

        if let Ok(handle) = Handle::try_current() {
            self.shared.registry.attach_runtime(handle);
        }
        tracing::debug!(addr = %self.config.addr(), "Starting packet reader");
        let connected = tokio::select! {
            () = self.shared.stop.cancelled() => None,
            result = BridgeSession::connect(&self.config) => Some(result),
        };

        let session = match connected {
            None => {
                self.shared.finish(StopReason::Requested);
                return Err(BridgeError::closed("reader closed while starting"));
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Packet reader failed to start");
                self.shared.finish(StopReason::StartFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
            Some(Ok(session)) => session,
        };

        self.shared.state_tx.send_replace(ReaderState::Running);
        let handle = tokio::spawn(read_loop(session, Arc::clone(&self.shared)));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Deliver every packet arriving from now on to `handler`.
    ///
    /// Each handler runs on its own task and sees packets in stream order,
    /// without drops. A slow handler delays only itself. Callable from any
    /// thread, inside a Tokio runtime or not.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: FnMut(Packet) + Send + 'static,
    {
        self.shared.registry.subscribe_callback(handler)
    }

    /// Like [`subscribe`](Self::subscribe), but as an async stream.
    #[must_use]
    pub fn packets(&self) -> PacketStream {
        self.shared.registry.subscribe_stream()
    }

    /// Stop delivering to a subscriber.
    ///
    /// Once this returns, the handler will not be called again, even if the
    /// reader has already stopped and the handler is still draining its
    /// queue. Outside a handler it also waits for an in-flight call to
    /// finish. Called from inside any handler it does not wait, so the
    /// current call of the unsubscribed handler may still be running.
    /// Returns `false` for an unknown or already removed token.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.registry.unsubscribe(token)
    }

    /// The latest packet of `kind` with its sequence id, if one arrived.
    #[must_use]
    pub fn get_latest(&self, kind: PacketKind) -> Option<SequencedPacket> {
        self.shared.latest.get(kind)
    }

    /// Stop the reader and close its session. Idempotent, non-blocking.
    pub fn close(&self) {
        self.shared.stop.cancel();
        let was_idle = self.shared.state_tx.send_if_modified(|state| {
            if *state == ReaderState::Idle {
                *state = ReaderState::Stopped(StopReason::Requested);
                true
            } else {
                false
            }
        });
        if was_idle {
            self.shared.registry.close();
        }
    }

    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ReaderState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the reader is stopped and return why.
    pub async fn wait_stopped(&self) -> StopReason {
        let mut rx = self.shared.state_tx.subscribe();
        rx.wait_for(ReaderState::is_stopped)
            .await
            .ok()
            .and_then(|state| state.stop_reason())
            .unwrap_or(StopReason::Requested)
    }

    /// Close the reader, then wait for the read loop to exit.
    pub async fn shutdown(&self) -> StopReason {
        self.close();
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Packet reader task failed");
            }
        }
        self.wait_stopped().await
    }

    #[must_use]
    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            packets_decoded: self.shared.sequence.load(Ordering::SeqCst),
            decode_errors: self.shared.decode_errors.load(Ordering::SeqCst),
            subscribers: self.shared.registry.len(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Drop for PacketStreamReader {
    fn drop(&mut self) {
        self.shared.stop.cancel();
    }
}

async fn read_loop(mut session: BridgeSession, shared: Arc<Shared>) {
    tracing::info!(peer = %session.peer_addr(), "Packet reader running");

    let reason = loop {
        let result = tokio::select! {
            biased;
            () = shared.stop.cancelled() => break StopReason::Requested,
            result = session.read_one() => result,
        };

        match result {
            Ok(packet) => shared.publish(packet),
            Err(e) if e.is_decode_error() => {
                shared.decode_errors.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(error = %e, "Skipping undecodable line");
            }
            Err(e) => {
                if shared.stop.is_cancelled() {
                    break StopReason::Requested;
                }
                break StopReason::ConnectionClosed {
                    reason: e.to_string(),
                };
            }
        }
    };

    session.shutdown().await;
    shared.finish(reason);
}
