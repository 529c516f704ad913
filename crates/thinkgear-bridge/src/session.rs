//! # Bridge Session
//!
//! Owns the TCP connection to the ThinkGear Connector.
//!
//! ## Handshake
//!
//! Right after connecting, the session sends a single [`FormatRequest`]
//! line switching the connector to JSON. The connector never replies, so
//! completion is observed, not acknowledged. The [`HandshakeStrategy`]
//! decides how:
//!
//! - `DiscardUntilValid` (default): drop lines until one decodes as a
//!   packet. That packet is kept and returned by the next
//!   [`read_one`](BridgeSession::read_one).
//! - `SettleDelay`: wait a fixed delay and trust whatever follows.
//! - `SkipFirstLine`: wait for the first line containing `{` and drop it
//!   as a fragment torn by the format switch.
//!
//! The first and last strategies are bounded by the handshake timeout.
//!
//! ## Closing
//!
//! [`SessionCloser`] is a cloneable handle that may be used from any task.
//! Closing wakes a blocked `read_one` with [`BridgeError::ConnectionClosed`],
//! and every later read fails the same way. The socket itself is released
//! when the session is dropped or [`shutdown`](BridgeSession::shutdown).

use std::net::SocketAddr;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, LineDecoder};
use crate::config::{BridgeConfig, HandshakeStrategy};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{FormatRequest, Packet};

/// Cloneable handle that closes a [`BridgeSession`] from another task.
#[derive(Debug, Clone, Default)]
pub struct SessionCloser {
    token: CancellationToken,
}

impl SessionCloser {
    /// Close the session. Idempotent.
    pub fn close(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Closing bridge session");
        }
        self.token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }
}

/// A connected, handshaken session with the ThinkGear Connector.
pub struct BridgeSession {
    lines: FramedRead<OwnedReadHalf, LineDecoder>,
    writer: OwnedWriteHalf,
    closer: SessionCloser,
    /// Packet that completed the handshake, not yet handed out.
    pending: Option<Packet>,
    peer: SocketAddr,
}

impl BridgeSession {
    /// Connect to the connector and run the handshake.
    ///
    /// # Errors
    /// - [`BridgeError::ConnectionFailed`] if the socket cannot be opened
    ///   or the format request cannot be written.
    /// - [`BridgeError::HandshakeTimeout`] if no valid packet arrives in time.
    /// - [`BridgeError::ConnectionClosed`] if the connector hangs up mid-handshake.
    pub async fn connect(config: &BridgeConfig) -> BridgeResult<Self> {
        let addr = config.addr();
        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| BridgeError::ConnectionFailed {
                addr: addr.clone(),
                reason: format!("timed out after {}s", config.connect_timeout_secs),
            })?
            .map_err(|e| BridgeError::ConnectionFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let peer = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to disable Nagle on bridge socket");
        }
        tracing::info!(%peer, "Connected to ThinkGear Connector");

        let (reader, writer) = stream.into_split();
        let mut session = Self {
            lines: FramedRead::new(reader, LineDecoder::new()),
            writer,
            closer: SessionCloser::default(),
            pending: None,
            peer,
        };

        session
            .send_format_request(FormatRequest::json(config.enable_raw_output))
            .await
            .map_err(|e| BridgeError::ConnectionFailed {
                addr: addr.clone(),
                reason: format!("format request failed: {e}"),
            })?;
        session.await_handshake(config).await?;

        Ok(session)
    }

    async fn send_format_request(&mut self, request: FormatRequest) -> std::io::Result<()> {
        let wire = request.to_wire();
        tracing::debug!(request = %wire, "Sending format request");
        self.writer.write_all(wire.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn await_handshake(&mut self, config: &BridgeConfig) -> BridgeResult<()> {
        let strategy = config.handshake.strategy;

        if strategy == HandshakeStrategy::SettleDelay {
            let delay = config.handshake.settle_delay();
            tokio::select! {
                () = self.closer.closed() => return Err(BridgeError::closed("session closed")),
                () = tokio::time::sleep(delay) => {}
            }
            tracing::info!(?strategy, delay_ms = config.handshake.settle_delay_ms, "Handshake settled");
            return Ok(());
        }

        let handshake = async {
            let mut discarded = 0_usize;
            loop {
                let line = self.next_line().await?;
                match strategy {
                    HandshakeStrategy::SkipFirstLine => {
                        if line.contains('{') {
                            tracing::debug!(discarded, "Dropped first JSON fragment");
                            return Ok::<usize, BridgeError>(discarded + 1);
                        }
                    }
                    _ => match codec::decode(&line) {
                        Ok(packet) => {
                            self.pending = Some(packet);
                            return Ok(discarded);
                        }
                        Err(e) => tracing::debug!(error = %e, "Discarding pre-handshake line"),
                    },
                }
                discarded += 1;
            }
        };

        let discarded = match config.handshake.timeout() {
            Some(limit) => tokio::time::timeout(limit, handshake).await.map_err(|_| {
                BridgeError::HandshakeTimeout {
                    seconds: config.handshake.timeout_secs,
                }
            })??,
            None => handshake.await?,
        };

        tracing::info!(?strategy, discarded, "Handshake complete");
        Ok(())
    }

    /// Wait for the next line and decode it.
    ///
    /// # Errors
    /// - [`BridgeError::Decode`] if the line is not a valid packet. The
    ///   session stays usable.
    /// - [`BridgeError::ConnectionClosed`] on end of stream, socket failure,
    ///   or after [`close`](Self::close).
    pub async fn read_one(&mut self) -> BridgeResult<Packet> {
        if self.closer.is_closed() {
            return Err(BridgeError::closed("session closed"));
        }
        if let Some(packet) = self.pending.take() {
            return Ok(packet);
        }

        let line = self.next_line().await?;
        tracing::trace!(raw = %line, "Received line");
        codec::decode(&line)
    }

    async fn next_line(&mut self) -> BridgeResult<String> {
        tokio::select! {
            biased;
            () = self.closer.token.cancelled() => Err(BridgeError::closed("session closed")),
            next = self.lines.next() => match next {
                Some(Ok(line)) => Ok(line),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Bridge socket read failed");
                    self.closer.close();
                    Err(BridgeError::closed(format!("read failed: {e}")))
                }
                None => {
                    tracing::info!("ThinkGear Connector stream ended");
                    self.closer.close();
                    Err(BridgeError::closed("end of stream"))
                }
            },
        }
    }

    /// Handle for closing this session from another task.
    #[must_use]
    pub fn closer(&self) -> SessionCloser {
        self.closer.clone()
    }

    /// Close the session. Idempotent; safe while a read is in flight elsewhere.
    pub fn close(&self) {
        self.closer.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Close the session and shut down the write half of the socket.
    pub async fn shutdown(mut self) {
        self.close();
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(error = %e, "Bridge socket shutdown failed");
        }
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("peer", &self.peer)
            .field("closed", &self.closer.is_closed())
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}
