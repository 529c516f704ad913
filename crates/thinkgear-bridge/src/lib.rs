//! # thinkgear-bridge
//!
//! A Rust client for the NeuroSky ThinkGear Connector, the local bridge
//! that relays MindWave headset data as a line-oriented JSON stream on
//! `localhost:13854`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use thinkgear_bridge::{BridgeConfig, Packet, PacketStreamReader};
//!
//! #[tokio::main]
//! async fn main() -> thinkgear_bridge::BridgeResult<()> {
//!     // Load config from THINKGEAR_* env vars or thinkgear.toml
//!     let config = BridgeConfig::discover(None)?;
//!
//!     let reader = PacketStreamReader::new(config);
//!     reader.subscribe(|packet| {
//!         if let Packet::Processed(data) = packet {
//!             println!("attention {}", data.attention());
//!         }
//!     });
//!     reader.start().await?;
//!
//!     let reason = reader.wait_stopped().await;
//!     println!("stopped: {reason:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! | Layer | Type | Use |
//! |-------|------|-----|
//! | Codec | [`codec::decode`] | One line to one [`Packet`] |
//! | Session | [`BridgeSession`] | Connect, handshake, pull packets one at a time |
//! | Reader | [`PacketStreamReader`] | Background loop, fan-out, latest values |
//! | Recording | [`RecordingOrchestrator`] | Labelled raw-sample capture to CSV |
//!
//! ## Configuration
//!
//! See [`BridgeConfig`]. Environment overrides:
//!
//! ```bash
//! export THINKGEAR_HOST="127.0.0.1"
//! export THINKGEAR_PORT="13854"
//! ```
//!
//! Or a `thinkgear.toml` file:
//!
//! ```toml
//! host = "localhost"
//! port = 13854
//! enable_raw_output = true
//!
//! [handshake]
//! strategy = "discard_until_valid"
//! timeout_secs = 10
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod recording;
pub mod session;

// ─── Public re-exports ──────────────────────────────────────────────────

pub use config::{BridgeConfig, HandshakeConfig, HandshakeStrategy};
pub use error::{BridgeError, BridgeResult};
pub use protocol::{Packet, PacketKind};
pub use reader::{
    PacketStream, PacketStreamReader, ReaderState, ReaderStats, SequencedPacket, StopReason,
    SubscriptionToken,
};
pub use recording::{RecordingConfig, RecordingOrchestrator, RecordingSummary};
pub use session::{BridgeSession, SessionCloser};
