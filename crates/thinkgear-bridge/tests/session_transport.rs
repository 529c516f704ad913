mod support;

use std::time::Duration;

use thinkgear_bridge::protocol::{RawData, StatusReport};
use thinkgear_bridge::{
    BridgeConfig, BridgeError, BridgeResult, BridgeSession, HandshakeStrategy, Packet,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use support::mock_bridge::{
    BLINK_LINE, STATUS_LINE, STEP_TIMEOUT, raw_line, start_server_or_skip,
};

fn spawn_connect(config: BridgeConfig) -> JoinHandle<BridgeResult<BridgeSession>> {
    tokio::spawn(async move { BridgeSession::connect(&config).await })
}

fn raw(value: i16) -> Packet {
    Packet::Raw(RawData { raw_eeg: value })
}

#[tokio::test]
async fn connect_sends_exact_format_request() {
    let Some(mut server) = start_server_or_skip("connect_sends_exact_format_request").await else {
        return;
    };
    let connecting = spawn_connect(server.config());

    let mut connection = server.accept_connection().await;
    let handshake = connection.recv_handshake().await;
    connection.send_line(STATUS_LINE).await;
    let session = connecting.await.unwrap().unwrap();

    assert_eq!(handshake, br#"{"enableRawOutput": true, "format": "Json"}"#);
    assert!(!handshake.ends_with(b"\n"));
    assert!(!session.is_closed());
}

#[tokio::test]
async fn connect_without_raw_output_requests_it_off() {
    let Some(mut server) = start_server_or_skip("connect_without_raw_output_requests_it_off").await
    else {
        return;
    };
    let mut config = server.config();
    config.enable_raw_output = false;
    let connecting = spawn_connect(config);

    let mut connection = server.accept_connection().await;
    let request = connection.recv_handshake_json().await;
    connection.send_line(STATUS_LINE).await;
    connecting.await.unwrap().unwrap();

    assert_eq!(request["enableRawOutput"], false);
    assert_eq!(request["format"], "Json");
}

#[tokio::test]
async fn discard_until_valid_skips_noise_and_keeps_first_packet() {
    let Some(mut server) =
        start_server_or_skip("discard_until_valid_skips_noise_and_keeps_first_packet").await
    else {
        return;
    };
    let connecting = spawn_connect(server.config());

    let mut connection = server.accept_connection().await;
    connection.recv_handshake().await;
    connection.send_bytes(vec![0xAA, 0xAA, 0x20, 0x02, 0xC8, b'\r']).await;
    connection.send_lines([r#"ignal":0,"rawEeg"#, STATUS_LINE]).await;
    connection.send_line(&raw_line(-12)).await;

    let mut session = connecting.await.unwrap().unwrap();
    let first = session.read_one().await.unwrap();
    assert_eq!(
        first,
        Packet::Status(StatusReport {
            poor_signal_level: 200,
            status: "scanning".into(),
        })
    );
    assert_eq!(session.read_one().await.unwrap(), raw(-12));
}

#[tokio::test]
async fn decode_error_leaves_session_usable() {
    let Some(mut server) = start_server_or_skip("decode_error_leaves_session_usable").await else {
        return;
    };
    let connecting = spawn_connect(server.config());
    let connection = server.accept_handshaken().await;
    let mut session = connecting.await.unwrap().unwrap();
    assert!(matches!(session.read_one().await.unwrap(), Packet::Status(_)));

    connection
        .send_lines([r#"{"rawEeg": "loud"}"#, "not json", BLINK_LINE])
        .await;

    assert!(session.read_one().await.unwrap_err().is_decode_error());
    assert!(session.read_one().await.unwrap_err().is_decode_error());
    assert!(matches!(session.read_one().await.unwrap(), Packet::Blink(_)));
}

#[tokio::test]
async fn close_wakes_blocked_read_and_is_idempotent() {
    let Some(mut server) = start_server_or_skip("close_wakes_blocked_read_and_is_idempotent").await
    else {
        return;
    };
    let connecting = spawn_connect(server.config());
    let _connection = server.accept_handshaken().await;
    let mut session = connecting.await.unwrap().unwrap();
    session.read_one().await.unwrap();

    let closer = session.closer();
    let blocked = tokio::spawn(async move {
        let result = session.read_one().await;
        (result, session)
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let closer = closer.clone();
            tokio::spawn(async move { closer.close() })
        })
        .collect();
    for handle in closers {
        handle.await.unwrap();
    }

    let (result, session) = timeout(STEP_TIMEOUT, blocked).await.unwrap().unwrap();
    assert!(matches!(result, Err(BridgeError::ConnectionClosed { .. })));
    assert!(session.is_closed());

    session.close();
    closer.close();
    assert!(closer.is_closed());
}

#[tokio::test]
async fn reads_after_close_fail_with_connection_closed() {
    let Some(mut server) =
        start_server_or_skip("reads_after_close_fail_with_connection_closed").await
    else {
        return;
    };
    let connecting = spawn_connect(server.config());
    let connection = server.accept_handshaken().await;
    let mut session = connecting.await.unwrap().unwrap();
    connection.send_line(&raw_line(1)).await;

    session.close();
    for _ in 0..2 {
        let err = session.read_one().await.unwrap_err();
        assert!(err.is_connection_error(), "{err}");
    }
}

#[tokio::test]
async fn remote_hangup_ends_the_stream() {
    let Some(mut server) = start_server_or_skip("remote_hangup_ends_the_stream").await else {
        return;
    };
    let connecting = spawn_connect(server.config());
    let connection = server.accept_handshaken().await;
    let mut session = connecting.await.unwrap().unwrap();

    connection.send_line(&raw_line(3)).await;
    connection.force_close().await;

    assert!(matches!(session.read_one().await.unwrap(), Packet::Status(_)));
    assert_eq!(session.read_one().await.unwrap(), raw(3));
    let err = timeout(STEP_TIMEOUT, session.read_one())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionClosed { .. }));
    assert!(session.is_closed());
}

#[tokio::test]
async fn connection_refused_is_connection_failed() {
    let listener = match std::net::TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Skipping connection_refused_is_connection_failed: {err}");
            return;
        }
    };
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = BridgeConfig::new("127.0.0.1", port);
    let err = BridgeSession::connect(&config).await.unwrap_err();
    match err {
        BridgeError::ConnectionFailed { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{port}")),
        other => panic!("expected ConnectionFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_bridge_times_out_handshake() {
    let Some(mut server) = start_server_or_skip("silent_bridge_times_out_handshake").await else {
        return;
    };
    let mut config = server.config();
    config.handshake.timeout_secs = 1;
    let connecting = spawn_connect(config);

    let mut connection = server.accept_connection().await;
    connection.recv_handshake().await;
    connection.send_line("still binary").await;

    let err = timeout(STEP_TIMEOUT, connecting)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BridgeError::HandshakeTimeout { seconds: 1 }));
}

#[tokio::test]
async fn settle_delay_trusts_lines_after_the_delay() {
    let Some(mut server) = start_server_or_skip("settle_delay_trusts_lines_after_the_delay").await
    else {
        return;
    };
    let mut config = server.config();
    config.handshake.strategy = HandshakeStrategy::SettleDelay;
    config.handshake.settle_delay_ms = 100;
    let connecting = spawn_connect(config);

    let mut connection = server.accept_connection().await;
    connection.recv_handshake().await;
    let mut session = connecting.await.unwrap().unwrap();

    connection.send_line(&raw_line(9)).await;
    assert_eq!(session.read_one().await.unwrap(), raw(9));
}

#[tokio::test]
async fn skip_first_line_drops_torn_fragment() {
    let Some(mut server) = start_server_or_skip("skip_first_line_drops_torn_fragment").await else {
        return;
    };
    let mut config = server.config();
    config.handshake.strategy = HandshakeStrategy::SkipFirstLine;
    let connecting = spawn_connect(config);

    let mut connection = server.accept_connection().await;
    connection.recv_handshake().await;
    connection
        .send_lines([r#"{"poorSignalLev"#, raw_line(4).as_str()])
        .await;

    let mut session = connecting.await.unwrap().unwrap();
    assert_eq!(session.read_one().await.unwrap(), raw(4));
}

#[tokio::test]
async fn shutdown_releases_the_socket() {
    let Some(mut server) = start_server_or_skip("shutdown_releases_the_socket").await else {
        return;
    };
    let connecting = spawn_connect(server.config());
    let mut connection = server.accept_handshaken().await;
    let session = connecting.await.unwrap().unwrap();

    session.shutdown().await;
    assert!(connection.wait_client_closed().await);
}
