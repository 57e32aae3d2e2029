//! Acceptance tests for the control adapter: a real server, a real socket,
//! and an engine task applying commands the same way the runner does.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use mergefall::adapter::protocol::{create_ack, create_error, create_hello, ErrorCode};
use mergefall::adapter::server::{build_observation, run_server, ServerConfig};
use mergefall::adapter::{ClientCommand, InboundCommand, InboundPayload, OutboundMessage};
use mergefall::core::{GameState, QueueError};

type JsonLines = tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>;

async fn read_json_line(lines: &mut JsonLines) -> serde_json::Value {
    let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .expect("timeout waiting for line")
        .expect("io error")
        .expect("expected line");
    serde_json::from_str(&line).expect("invalid json")
}

async fn spawn_server(
    cmd_capacity: usize,
) -> (
    SocketAddr,
    mpsc::Receiver<InboundCommand>,
    mpsc::UnboundedSender<OutboundMessage>,
) {
    let config = ServerConfig {
        port: 0,
        ..ServerConfig::default()
    };
    let (cmd_tx, cmd_rx) = mpsc::channel::<InboundCommand>(cmd_capacity);
    let (out_tx, out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ready_tx, ready_rx) = oneshot::channel();

    tokio::spawn(async move {
        let _ = run_server(config, cmd_tx, out_rx, Some(ready_tx)).await;
    });

    let addr = tokio::time::timeout(Duration::from_secs(2), ready_rx)
        .await
        .unwrap()
        .unwrap();

    (addr, cmd_rx, out_tx)
}

/// Apply commands exactly the way the headless runner does.
async fn engine_task(
    mut cmd_rx: mpsc::Receiver<InboundCommand>,
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
) {
    let mut game = GameState::new();
    let mut obs_seq: u64 = 100;

    while let Some(inbound) = cmd_rx.recv().await {
        match inbound.payload {
            InboundPayload::SnapshotRequest => {
                obs_seq += 1;
                let _ = out_tx.send(OutboundMessage::ToClientObservation {
                    client_id: inbound.client_id,
                    obs: build_observation(&game.snapshot(), obs_seq),
                });
            }
            InboundPayload::Command(command) => {
                let result = match command {
                    ClientCommand::Enqueue(block) => match game.enqueue(block) {
                        Ok(()) => Ok(()),
                        Err(e @ QueueError::QueueFull) => Err((ErrorCode::QueueFull, e.message())),
                        Err(e) => Err((ErrorCode::InvalidCommand, e.message())),
                    },
                    ClientCommand::Place { block, column } => {
                        match game.place_block(block, column) {
                            Ok(_) => Ok(()),
                            Err(e) => Err((ErrorCode::ColumnFull, e.message())),
                        }
                    }
                    ClientCommand::Discard(block) => {
                        let _ = game.discard(&block);
                        Ok(())
                    }
                    ClientCommand::Restart => {
                        game.restart();
                        Ok(())
                    }
                };

                match result {
                    Ok(()) => {
                        let _ = out_tx.send(OutboundMessage::ToClientAck {
                            client_id: inbound.client_id,
                            ack: create_ack(inbound.seq),
                        });
                        obs_seq += 1;
                        let _ = out_tx.send(OutboundMessage::BroadcastObservation {
                            obs: build_observation(&game.snapshot(), obs_seq),
                        });
                    }
                    Err((code, message)) => {
                        let _ = out_tx.send(OutboundMessage::ToClientError {
                            client_id: inbound.client_id,
                            err: create_error(inbound.seq, code, message),
                        });
                    }
                }
            }
        }
    }
}

async fn connect(addr: SocketAddr) -> (tokio::net::tcp::OwnedWriteHalf, JsonLines) {
    let socket = TcpStream::connect(addr).await.expect("connect");
    let (read_half, write_half) = socket.into_split();
    (write_half, BufReader::new(read_half).lines())
}

async fn send_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) {
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
}

#[tokio::test]
async fn test_controller_round_trip_with_merge() {
    let (addr, cmd_rx, out_tx) = spawn_server(8).await;
    tokio::spawn(engine_task(cmd_rx, out_tx));

    let (mut writer, mut lines) = connect(addr).await;

    let hello = serde_json::to_string(&create_hello(1, "acceptance", "1.0.0")).unwrap();
    send_line(&mut writer, &hello).await;

    let welcome = read_json_line(&mut lines).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["role"], "controller");

    // Streaming hello yields the initial observation of an empty session.
    let obs = read_json_line(&mut lines).await;
    assert_eq!(obs["type"], "observation");
    assert_eq!(obs["score"], 0);
    assert_eq!(obs["board"]["cells"][4][0], 0);

    // Enqueue then place a 2 in column 0.
    send_line(
        &mut writer,
        r#"{"type":"command","seq":2,"ts":0,"op":"enqueue","block":2}"#,
    )
    .await;
    let ack = read_json_line(&mut lines).await;
    assert_eq!(ack["type"], "ack");
    let obs = read_json_line(&mut lines).await;
    assert_eq!(obs["pending"], serde_json::json!([2]));

    send_line(
        &mut writer,
        r#"{"type":"command","seq":3,"ts":0,"op":"place","block":2,"column":0}"#,
    )
    .await;
    let ack = read_json_line(&mut lines).await;
    assert_eq!(ack["type"], "ack");
    let obs = read_json_line(&mut lines).await;
    assert_eq!(obs["board"]["cells"][4][0], 2);
    assert_eq!(obs["score"], 2);
    assert_eq!(obs["pending"], serde_json::json!([]));

    // A second 2 beside the first merges into a 4 in the drop column.
    send_line(
        &mut writer,
        r#"{"type":"command","seq":4,"ts":0,"op":"enqueue","block":2}"#,
    )
    .await;
    read_json_line(&mut lines).await; // ack
    read_json_line(&mut lines).await; // observation

    send_line(
        &mut writer,
        r#"{"type":"command","seq":5,"ts":0,"op":"place","block":2,"column":1}"#,
    )
    .await;
    read_json_line(&mut lines).await; // ack
    let obs = read_json_line(&mut lines).await;
    assert_eq!(obs["board"]["cells"][4][0], 0);
    assert_eq!(obs["board"]["cells"][4][1], 4);
    assert_eq!(obs["score"], 4);
    assert_eq!(obs["high_score"], 4);
    assert_eq!(obs["last_event"]["merges"], 1);
}

#[tokio::test]
async fn test_game_rule_failures_surface_as_protocol_errors() {
    let (addr, cmd_rx, out_tx) = spawn_server(8).await;
    tokio::spawn(engine_task(cmd_rx, out_tx));

    let (mut writer, mut lines) = connect(addr).await;

    let hello = serde_json::to_string(&create_hello(1, "acceptance", "1.0.0")).unwrap();
    send_line(&mut writer, &hello).await;
    read_json_line(&mut lines).await; // welcome
    read_json_line(&mut lines).await; // initial observation

    // Fill column 0 with non-matching values.
    let mut seq = 2;
    for value in [2, 4, 8, 16, 32] {
        let cmd = format!(
            r#"{{"type":"command","seq":{},"ts":0,"op":"place","block":{},"column":0}}"#,
            seq, value
        );
        send_line(&mut writer, &cmd).await;
        read_json_line(&mut lines).await; // ack
        read_json_line(&mut lines).await; // observation
        seq += 1;
    }

    // Sixth drop: column_full, and no observation follows (state unchanged).
    send_line(
        &mut writer,
        r#"{"type":"command","seq":7,"ts":0,"op":"place","block":64,"column":0}"#,
    )
    .await;
    let err = read_json_line(&mut lines).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "column_full");

    // Queue three blocks, then overflow: queue_full.
    let mut seq = 8;
    for _ in 0..3 {
        let cmd = format!(
            r#"{{"type":"command","seq":{},"ts":0,"op":"enqueue","block":2}}"#,
            seq
        );
        send_line(&mut writer, &cmd).await;
        read_json_line(&mut lines).await; // ack
        read_json_line(&mut lines).await; // observation
        seq += 1;
    }
    send_line(
        &mut writer,
        r#"{"type":"command","seq":11,"ts":0,"op":"enqueue","block":2}"#,
    )
    .await;
    let err = read_json_line(&mut lines).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "queue_full");

    // Restart clears the board but keeps the high score.
    send_line(
        &mut writer,
        r#"{"type":"command","seq":12,"ts":0,"op":"restart"}"#,
    )
    .await;
    read_json_line(&mut lines).await; // ack
    let obs = read_json_line(&mut lines).await;
    assert_eq!(obs["score"], 0);
    assert_eq!(obs["high_score"], 62);
    assert_eq!(obs["episode_id"], 1);
}

#[tokio::test]
async fn test_second_client_is_observer_and_cannot_command() {
    let (addr, cmd_rx, out_tx) = spawn_server(8).await;
    tokio::spawn(engine_task(cmd_rx, out_tx));

    let (mut ctrl_writer, mut ctrl_lines) = connect(addr).await;
    let hello = serde_json::to_string(&create_hello(1, "controller", "1.0.0")).unwrap();
    send_line(&mut ctrl_writer, &hello).await;
    let welcome = read_json_line(&mut ctrl_lines).await;
    assert_eq!(welcome["role"], "controller");

    let (mut obs_writer, mut obs_lines) = connect(addr).await;
    let hello = serde_json::to_string(&create_hello(1, "watcher", "1.0.0")).unwrap();
    send_line(&mut obs_writer, &hello).await;
    let welcome = read_json_line(&mut obs_lines).await;
    assert_eq!(welcome["role"], "observer");
    read_json_line(&mut obs_lines).await; // initial observation

    send_line(
        &mut obs_writer,
        r#"{"type":"command","seq":2,"ts":0,"op":"enqueue","block":2}"#,
    )
    .await;
    let err = read_json_line(&mut obs_lines).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "not_controller");
}

#[tokio::test]
async fn test_command_before_hello_is_rejected() {
    let (addr, _cmd_rx, _out_tx) = spawn_server(8).await;

    let (mut writer, mut lines) = connect(addr).await;
    send_line(
        &mut writer,
        r#"{"type":"command","seq":1,"ts":0,"op":"restart"}"#,
    )
    .await;

    let err = read_json_line(&mut lines).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "handshake_required");
}

#[tokio::test]
async fn test_stale_seq_is_rejected() {
    let (addr, cmd_rx, out_tx) = spawn_server(8).await;
    tokio::spawn(engine_task(cmd_rx, out_tx));

    let (mut writer, mut lines) = connect(addr).await;
    let hello = serde_json::to_string(&create_hello(5, "acceptance", "1.0.0")).unwrap();
    send_line(&mut writer, &hello).await;
    read_json_line(&mut lines).await; // welcome
    read_json_line(&mut lines).await; // initial observation

    // seq must be strictly increasing; replaying seq 5 fails.
    send_line(
        &mut writer,
        r#"{"type":"command","seq":5,"ts":0,"op":"restart"}"#,
    )
    .await;
    let err = read_json_line(&mut lines).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "invalid_command");
}
