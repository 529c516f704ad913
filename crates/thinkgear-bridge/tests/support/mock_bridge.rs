#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use thinkgear_bridge::BridgeConfig;
use tracing_subscriber::EnvFilter;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(3);

pub const STATUS_LINE: &str = r#"{"poorSignalLevel":200,"status":"scanning"}"#;
pub const PROCESSED_LINE: &str = r#"{"eSense":{"attention":53,"meditation":61},"eegPower":{"delta":1,"theta":2,"lowAlpha":3,"highAlpha":4,"lowBeta":5,"highBeta":6,"lowGamma":7,"highGamma":8},"poorSignalLevel":0}"#;
pub const BLINK_LINE: &str = r#"{"blinkStrength":72}"#;

pub fn raw_line(value: i16) -> String {
    format!(r#"{{"rawEeg":{value}}}"#)
}

enum ConnectionCommand {
    SendBytes(Vec<u8>),
    ForceClose,
}

pub struct MockConnection {
    index: usize,
    received_rx: mpsc::Receiver<Vec<u8>>,
    received: Vec<u8>,
    command_tx: mpsc::Sender<ConnectionCommand>,
}

impl MockConnection {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Everything the client wrote until it formed one complete JSON value.
    pub async fn recv_handshake(&mut self) -> Vec<u8> {
        loop {
            if serde_json::from_slice::<Value>(&self.received).is_ok() {
                return std::mem::take(&mut self.received);
            }
            let chunk = timeout(STEP_TIMEOUT, self.received_rx.recv())
                .await
                .expect("timed out waiting for format request")
                .expect("mock connection closed before format request");
            self.received.extend_from_slice(&chunk);
        }
    }

    pub async fn recv_handshake_json(&mut self) -> Value {
        let bytes = self.recv_handshake().await;
        serde_json::from_slice(&bytes).expect("format request is not JSON")
    }

    pub async fn send_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.command_tx
            .send(ConnectionCommand::SendBytes(bytes.into()))
            .await
            .expect("failed to send command to mock connection");
    }

    /// Send one line terminated the way the connector does it (`\r`).
    pub async fn send_line(&self, line: &str) {
        self.send_bytes(format!("{line}\r")).await;
    }

    pub async fn send_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batch = String::new();
        for line in lines {
            batch.push_str(line.as_ref());
            batch.push('\r');
        }
        self.send_bytes(batch).await;
    }

    pub async fn force_close(&self) {
        let _ = self.command_tx.send(ConnectionCommand::ForceClose).await;
    }

    /// Wait until the client side of the socket is closed.
    pub async fn wait_client_closed(&mut self) -> bool {
        loop {
            match timeout(STEP_TIMEOUT, self.received_rx.recv()).await {
                Ok(Some(_)) => {}
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

pub struct MockBridgeServer {
    addr: SocketAddr,
    connection_rx: mpsc::Receiver<MockConnection>,
    server_task: JoinHandle<()>,
}

/// Route library logs to the test harness. `RUST_LOG` picks the level.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

impl MockBridgeServer {
    pub async fn start() -> std::io::Result<Self> {
        init_test_logging();
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let (connection_tx, connection_rx) = mpsc::channel(16);

        let server_task = tokio::spawn(async move {
            let mut next_index = 0;
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };

                let connection_tx = connection_tx.clone();
                let index = next_index;
                next_index += 1;

                tokio::spawn(async move {
                    let (mut read_half, mut write_half) = stream.into_split();
                    let (received_tx, received_rx) = mpsc::channel(64);
                    let (command_tx, mut command_rx) = mpsc::channel(64);

                    let connection = MockConnection {
                        index,
                        received_rx,
                        received: Vec::new(),
                        command_tx,
                    };
                    if connection_tx.send(connection).await.is_err() {
                        return;
                    }

                    let mut buf = [0_u8; 1024];
                    loop {
                        tokio::select! {
                            maybe_command = command_rx.recv() => {
                                match maybe_command {
                                    Some(ConnectionCommand::SendBytes(bytes)) => {
                                        if write_half.write_all(&bytes).await.is_err() {
                                            break;
                                        }
                                    }
                                    Some(ConnectionCommand::ForceClose) | None => break,
                                }
                            }
                            read = read_half.read(&mut buf) => {
                                match read {
                                    Ok(0) | Err(_) => break,
                                    Ok(n) => {
                                        let _ = received_tx.send(buf[..n].to_vec()).await;
                                    }
                                }
                            }
                        }
                    }
                });
            }
        });

        Ok(Self {
            addr,
            connection_rx,
            server_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new(self.addr.ip().to_string(), self.addr.port());
        config.connect_timeout_secs = 2;
        config.handshake.timeout_secs = 2;
        config
    }

    pub async fn accept_connection(&mut self) -> MockConnection {
        timeout(STEP_TIMEOUT, self.connection_rx.recv())
            .await
            .expect("timed out waiting for client connection")
            .expect("mock server connection channel closed")
    }

    /// Accept a client, read its format request, and send one status line
    /// so a discard-until-valid handshake completes.
    pub async fn accept_handshaken(&mut self) -> MockConnection {
        let mut connection = self.accept_connection().await;
        connection.recv_handshake().await;
        connection.send_line(STATUS_LINE).await;
        connection
    }
}

impl Drop for MockBridgeServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

pub async fn start_server_or_skip(test_name: &str) -> Option<MockBridgeServer> {
    match MockBridgeServer::start().await {
        Ok(server) => Some(server),
        Err(err) => {
            eprintln!("Skipping {test_name}: unable to start mock server: {err}");
            None
        }
    }
}
