//! TCP server for the control adapter
//!
//! Handles incoming connections and manages client lifecycle.
//! Uses tokio for async networking.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::adapter::protocol::*;
use crate::adapter::runtime::{ClientCommand, InboundCommand, InboundPayload, OutboundMessage};
use crate::core::GameSnapshot;
use crate::types::{PendingBlock, BOARD_COLS, BOARD_ROWS};

/// Stable 64-bit FNV-1a hasher for deterministic `state_hash`.
///
/// We avoid `DefaultHasher` here since its output is not guaranteed stable
/// across Rust versions/platforms.
#[derive(Debug, Clone)]
struct Fnv1aHasher {
    state: u64,
}

impl Fnv1aHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state ^= b as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }

    fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    fn finish(&self) -> u64 {
        self.state
    }
}

/// Best-effort `seq` extraction from a line that failed full parsing, so the
/// resulting error can still be correlated by the client.
fn extract_seq_best_effort(s: &str) -> Option<u64> {
    let start = s.find("\"seq\"")?;
    let after_key = &s[start + 5..];
    let colon = after_key.find(':')?;
    let rest = after_key[colon + 1..].trim_start();
    let mut end = 0usize;
    for b in rest.as_bytes() {
        if b.is_ascii_digit() {
            end += 1;
        } else {
            break;
        }
    }
    if end == 0 {
        return None;
    }
    rest[..end].parse::<u64>().ok()
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub protocol_version: String,
    pub max_pending_commands: usize,
    pub log_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
            protocol_version: "1.0.0".to_string(),
            max_pending_commands: 10,
            log_path: None,
        }
    }
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        use std::env;

        let host = env::var("MERGEFALL_AI_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("MERGEFALL_AI_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7878);

        let max_pending_commands = env::var("MERGEFALL_AI_MAX_PENDING")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let log_path = env::var("MERGEFALL_AI_LOG_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .and_then(|s| if s.is_empty() { None } else { Some(s) });

        Self {
            host,
            port,
            protocol_version: "1.0.0".to_string(),
            max_pending_commands,
            log_path,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid socket address")
    }
}

/// Shared server state
pub struct ServerState {
    config: ServerConfig,
    clients: Arc<RwLock<Vec<ClientHandle>>>,
    controller: Arc<RwLock<Option<usize>>>, // Client id
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            clients: Arc::new(RwLock::new(Vec::new())),
            controller: Arc::new(RwLock::new(None)),
        }
    }

    /// Check if the adapter is disabled via environment
    pub fn is_disabled() -> bool {
        std::env::var("MERGEFALL_AI_DISABLED")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false)
    }
}

async fn is_handshaken(state: &Arc<ServerState>, client_id: usize) -> bool {
    let clients = state.clients.read().await;
    clients
        .iter()
        .find(|c| c.id == client_id)
        .map(|c| c.handshaken)
        .unwrap_or(false)
}

async fn check_and_update_seq(state: &Arc<ServerState>, client_id: usize, seq: u64) -> bool {
    let mut clients = state.clients.write().await;
    let Some(client) = clients.iter_mut().find(|c| c.id == client_id) else {
        return true;
    };

    match client.last_seq {
        None => {
            client.last_seq = Some(seq);
            true
        }
        Some(prev) => {
            if seq <= prev {
                false
            } else {
                client.last_seq = Some(seq);
                true
            }
        }
    }
}

/// Handle to a connected client
pub struct ClientHandle {
    pub id: usize,
    pub addr: SocketAddr,
    pub is_controller: bool,
    pub stream_observations: bool,
    pub handshaken: bool,
    pub last_seq: Option<u64>,
    pub tx: mpsc::UnboundedSender<ClientOutbound>, // Channel to send messages to client
}

#[derive(Debug, Clone)]
pub enum ClientOutbound {
    Line(String),
    Ack(AckMessage),
    Error(ErrorMessage),
    Welcome(WelcomeMessage),
    Observation(ObservationMessage),
}

#[derive(Debug, Clone)]
enum WireRecord {
    Bytes(Vec<u8>),
    Welcome(WelcomeMessage),
    Ack(AckMessage),
    Error(ErrorMessage),
    Observation(ObservationMessage),
}

/// Map a validated protocol command onto the game-loop payload.
///
/// Everything that could trip a core assert (missing block, out-of-range
/// column) is rejected here so remote input never reaches the engine raw.
fn map_command(cmd: &CommandMessage) -> Result<ClientCommand, (ErrorCode, String)> {
    match cmd.op {
        CommandOp::Enqueue => {
            let block = cmd.block.ok_or_else(|| {
                (ErrorCode::InvalidCommand, "enqueue requires a block".to_string())
            })?;
            Ok(ClientCommand::Enqueue(block.0))
        }
        CommandOp::Place => {
            let block = cmd.block.ok_or_else(|| {
                (ErrorCode::InvalidCommand, "place requires a block".to_string())
            })?;
            let column = cmd.column.ok_or_else(|| {
                (ErrorCode::InvalidCommand, "place requires a column".to_string())
            })?;
            if (column as usize) >= BOARD_COLS {
                return Err((
                    ErrorCode::InvalidCommand,
                    format!("column {} out of range 0..{}", column, BOARD_COLS - 1),
                ));
            }
            Ok(ClientCommand::Place {
                block: block.0,
                column: column as usize,
            })
        }
        CommandOp::Discard => {
            let block = cmd.block.ok_or_else(|| {
                (ErrorCode::InvalidCommand, "discard requires a block".to_string())
            })?;
            Ok(ClientCommand::Discard(block.0))
        }
        CommandOp::Restart => Ok(ClientCommand::Restart),
    }
}

/// Build an observation message from a session snapshot.
///
/// The state hash covers everything a client can see, so two identical
/// hashes always mean identical observable state.
pub fn build_observation(snapshot: &GameSnapshot, seq: u64) -> ObservationMessage {
    let mut hasher = Fnv1aHasher::new();
    for row in 0..BOARD_ROWS {
        for col in 0..BOARD_COLS {
            hasher.write_u32(snapshot.board[row][col]);
        }
    }
    for slot in &snapshot.pending {
        match slot {
            Some(PendingBlock::Numeric(value)) => hasher.write_u32(*value),
            Some(PendingBlock::Miss) => hasher.write(&[0xff]),
            None => hasher.write(&[0x00]),
        }
    }
    hasher.write_u32(snapshot.episode_id);
    hasher.write_u32(snapshot.drop_id);
    hasher.write_u32(snapshot.score);
    hasher.write_u32(snapshot.high_score);

    let mut pending = PendingList::default();
    for block in snapshot.pending.iter().flatten() {
        // Capacity matches the snapshot's slot count.
        let _ = pending.0.try_push(BlockTag(*block));
    }

    ObservationMessage {
        msg_type: ObservationType::Observation,
        seq,
        ts: current_timestamp_ms(),
        episode_id: snapshot.episode_id,
        drop_id: snapshot.drop_id,
        board: BoardSnapshot {
            rows: BOARD_ROWS as u8,
            cols: BOARD_COLS as u8,
            cells: snapshot.board,
        },
        pending,
        score: snapshot.score,
        high_score: snapshot.high_score,
        last_event: snapshot.last_event.map(LastEvent::from),
        state_hash: StateHash(hasher.finish()),
    }
}

/// Start the TCP server
pub async fn run_server(
    config: ServerConfig,
    command_tx: mpsc::Sender<InboundCommand>,
    mut out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
) -> anyhow::Result<()> {
    let wire_log_tx: Option<mpsc::UnboundedSender<WireRecord>> =
        if let Some(path) = config.log_path.clone() {
            let (tx, mut rx) = mpsc::unbounded_channel::<WireRecord>();
            tokio::spawn(async move {
                use tokio::fs::OpenOptions;

                let mut file = match OpenOptions::new().create(true).append(true).open(&path).await
                {
                    Ok(f) => f,
                    Err(_) => return,
                };

                let mut buf: Vec<u8> = Vec::with_capacity(4096);

                while let Some(rec) = rx.recv().await {
                    buf.clear();
                    let ok = match rec {
                        WireRecord::Bytes(b) => file.write_all(&b).await.is_ok(),
                        WireRecord::Welcome(v) => serde_json::to_writer(&mut buf, &v).is_ok()
                            && file.write_all(&buf).await.is_ok(),
                        WireRecord::Ack(v) => serde_json::to_writer(&mut buf, &v).is_ok()
                            && file.write_all(&buf).await.is_ok(),
                        WireRecord::Error(v) => serde_json::to_writer(&mut buf, &v).is_ok()
                            && file.write_all(&buf).await.is_ok(),
                        WireRecord::Observation(v) => serde_json::to_writer(&mut buf, &v).is_ok()
                            && file.write_all(&buf).await.is_ok(),
                    };
                    if !ok || file.write_all(b"\n").await.is_err() {
                        break;
                    }
                }

                let _ = file.flush().await;
            });
            Some(tx)
        } else {
            None
        };

    let addr = config.socket_addr();
    let listener = TcpListener::bind(&addr).await?;
    let bound = listener.local_addr()?;
    println!("[Adapter] TCP server listening on {}", bound);
    if let Some(tx) = ready_tx {
        let _ = tx.send(bound);
    }

    let state = Arc::new(ServerState::new(config));
    let mut client_id_counter = 0usize;

    // Outbound dispatcher.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                match msg {
                    OutboundMessage::ToClient { client_id, line } => {
                        let clients = state.clients.read().await;
                        if let Some(c) = clients.iter().find(|c| c.id == client_id) {
                            let _ = c.tx.send(ClientOutbound::Line(line));
                        }
                    }
                    OutboundMessage::Broadcast { line } => {
                        let clients = state.clients.read().await;
                        for c in clients.iter() {
                            if c.stream_observations {
                                let _ = c.tx.send(ClientOutbound::Line(line.clone()));
                            }
                        }
                    }
                    OutboundMessage::ToClientObservation { client_id, obs } => {
                        let clients = state.clients.read().await;
                        if let Some(c) = clients.iter().find(|c| c.id == client_id) {
                            let _ = c.tx.send(ClientOutbound::Observation(obs));
                        }
                    }
                    OutboundMessage::BroadcastObservation { obs } => {
                        let clients = state.clients.read().await;
                        for c in clients.iter() {
                            if c.stream_observations {
                                let _ = c.tx.send(ClientOutbound::Observation(obs.clone()));
                            }
                        }
                    }
                    OutboundMessage::ToClientAck { client_id, ack } => {
                        let clients = state.clients.read().await;
                        if let Some(c) = clients.iter().find(|c| c.id == client_id) {
                            let _ = c.tx.send(ClientOutbound::Ack(ack));
                        }
                    }
                    OutboundMessage::ToClientError { client_id, err } => {
                        let clients = state.clients.read().await;
                        if let Some(c) = clients.iter().find(|c| c.id == client_id) {
                            let _ = c.tx.send(ClientOutbound::Error(err));
                        }
                    }
                }
            }
        });
    }

    // Accept incoming connections
    loop {
        let (socket, addr) = listener.accept().await?;
        client_id_counter += 1;
        let client_id = client_id_counter;

        println!("[Adapter] Client {} connected from {}", client_id, addr);

        let state_clone = Arc::clone(&state);
        let command_tx = command_tx.clone();
        let wire_log_tx = wire_log_tx.clone();

        // Spawn task to handle this client
        tokio::spawn(async move {
            if let Err(e) =
                handle_client(socket, addr, client_id, state_clone.clone(), command_tx, wire_log_tx)
                    .await
            {
                eprintln!("[Adapter] Client {} error: {}", client_id, e);
            }
            disconnect_client(&state_clone, client_id).await;
            println!("[Adapter] Client {} disconnected", client_id);
        });
    }
}

/// Remove a client from the registry, releasing controller status if held.
async fn disconnect_client(state: &Arc<ServerState>, client_id: usize) {
    {
        let mut clients = state.clients.write().await;
        clients.retain(|c| c.id != client_id);
    }
    let mut controller = state.controller.write().await;
    if *controller == Some(client_id) {
        *controller = None;
        println!("[Adapter] Controller slot released by client {}", client_id);
    }
}

/// Handle a single client connection
async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    client_id: usize,
    state: Arc<ServerState>,
    command_tx: mpsc::Sender<InboundCommand>,
    wire_log_tx: Option<mpsc::UnboundedSender<WireRecord>>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = tokio::io::split(socket);
    let mut reader = BufReader::new(reader);

    // Channel to send messages to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientOutbound>();

    // Add client to list
    let client_handle = ClientHandle {
        id: client_id,
        addr,
        is_controller: false,
        stream_observations: false,
        handshaken: false,
        last_seq: None,
        tx: tx.clone(),
    };

    {
        let mut clients = state.clients.write().await;
        clients.push(client_handle);
    }

    let wire_log_tx_out = wire_log_tx.clone();

    // Spawn task to write messages to client
    let write_task = tokio::spawn(async move {
        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        while let Some(msg) = rx.recv().await {
            match msg {
                ClientOutbound::Line(line) => {
                    let bytes = line.into_bytes();
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                    if let Some(tx) = wire_log_tx_out.as_ref() {
                        let _ = tx.send(WireRecord::Bytes(bytes));
                    }
                }
                ClientOutbound::Ack(ack) => {
                    buf.clear();
                    if serde_json::to_writer(&mut buf, &ack).is_err() {
                        continue;
                    }
                    if writer.write_all(&buf).await.is_err() {
                        break;
                    }
                    if let Some(tx) = wire_log_tx_out.as_ref() {
                        let _ = tx.send(WireRecord::Ack(ack));
                    }
                }
                ClientOutbound::Error(err) => {
                    buf.clear();
                    if serde_json::to_writer(&mut buf, &err).is_err() {
                        continue;
                    }
                    if writer.write_all(&buf).await.is_err() {
                        break;
                    }
                    if let Some(tx) = wire_log_tx_out.as_ref() {
                        let _ = tx.send(WireRecord::Error(err));
                    }
                }
                ClientOutbound::Welcome(welcome) => {
                    buf.clear();
                    if serde_json::to_writer(&mut buf, &welcome).is_err() {
                        continue;
                    }
                    if writer.write_all(&buf).await.is_err() {
                        break;
                    }
                    if let Some(tx) = wire_log_tx_out.as_ref() {
                        let _ = tx.send(WireRecord::Welcome(welcome));
                    }
                }
                ClientOutbound::Observation(obs) => {
                    buf.clear();
                    if serde_json::to_writer(&mut buf, &obs).is_err() {
                        continue;
                    }
                    if writer.write_all(&buf).await.is_err() {
                        break;
                    }
                    if let Some(tx) = wire_log_tx_out.as_ref() {
                        let _ = tx.send(WireRecord::Observation(obs));
                    }
                }
            }

            if writer.write_all(b"\n").await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            // Client disconnected
            break;
        }

        let raw_line = line.trim_end_matches(|c| c == '\n' || c == '\r');
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(tx) = wire_log_tx.as_ref() {
            let _ = tx.send(WireRecord::Bytes(raw_line.as_bytes().to_vec()));
        }

        // Parse the message
        match parse_message(trimmed) {
            Ok(ParsedMessage::Hello(hello)) => {
                // Sequencing: enforce monotonic seq per sender.
                if is_handshaken(&state, client_id).await
                    && !check_and_update_seq(&state, client_id, hello.seq).await
                {
                    let error = create_error(
                        hello.seq,
                        ErrorCode::InvalidCommand,
                        "seq must be strictly increasing",
                    );
                    let _ = tx.send(ClientOutbound::Error(error));
                    continue;
                }

                // Validate protocol version
                if !hello.protocol_version.starts_with("1.") {
                    let error = create_error(
                        hello.seq,
                        ErrorCode::ProtocolMismatch,
                        &format!("Protocol version {} not supported", hello.protocol_version),
                    );
                    let _ = tx.send(ClientOutbound::Error(error));
                    break;
                }

                // Mark client as handshaken.
                {
                    let mut clients = state.clients.write().await;
                    if let Some(client) = clients.iter_mut().find(|c| c.id == client_id) {
                        client.handshaken = true;
                        client.last_seq = Some(hello.seq);
                        client.stream_observations = hello.requested.stream_observations;
                    }
                }

                // First hello takes the controller slot, unless the client
                // explicitly asked to observe.
                let wants_observer = hello.requested.role == Some(RequestedRole::Observer);
                let assigned_role;
                let controller_id;
                {
                    let mut controller = state.controller.write().await;
                    if controller.is_none() && !wants_observer {
                        *controller = Some(client_id);
                        let mut clients = state.clients.write().await;
                        if let Some(client) = clients.iter_mut().find(|c| c.id == client_id) {
                            client.is_controller = true;
                        }
                        println!("[Adapter] Client {} is now controller", client_id);
                        assigned_role = AssignedRole::Controller;
                    } else {
                        assigned_role = AssignedRole::Observer;
                    }
                    controller_id = controller.map(|id| id as u64);
                }

                let welcome = create_welcome(
                    hello.seq,
                    &state.config.protocol_version,
                    client_id as u64,
                    assigned_role,
                    controller_id,
                );
                let _ = tx.send(ClientOutbound::Welcome(welcome));

                // Request an immediate snapshot for streaming clients.
                if hello.requested.stream_observations {
                    let _ = command_tx.try_send(InboundCommand {
                        client_id,
                        seq: hello.seq,
                        payload: InboundPayload::SnapshotRequest,
                    });
                }
            }

            Ok(ParsedMessage::Command(cmd)) => {
                // Handshake required.
                if !is_handshaken(&state, client_id).await {
                    let error = create_error(
                        cmd.seq,
                        ErrorCode::HandshakeRequired,
                        "Send hello before command",
                    );
                    let _ = tx.send(ClientOutbound::Error(error));
                    continue;
                }

                // Sequencing: enforce monotonic seq per sender.
                if !check_and_update_seq(&state, client_id, cmd.seq).await {
                    let error = create_error(
                        cmd.seq,
                        ErrorCode::InvalidCommand,
                        "seq must be strictly increasing",
                    );
                    let _ = tx.send(ClientOutbound::Error(error));
                    continue;
                }

                // Check if client is controller
                let is_controller = {
                    let clients = state.clients.read().await;
                    clients
                        .iter()
                        .find(|c| c.id == client_id)
                        .map(|c| c.is_controller)
                        .unwrap_or(false)
                };

                if !is_controller {
                    let error = create_error(
                        cmd.seq,
                        ErrorCode::NotController,
                        "Only controller may send commands",
                    );
                    let _ = tx.send(ClientOutbound::Error(error));
                    continue;
                }

                // Map into a validated game-loop command.
                let mapped = match map_command(&cmd) {
                    Ok(c) => c,
                    Err((code, message)) => {
                        let error = create_error(cmd.seq, code, &message);
                        let _ = tx.send(ClientOutbound::Error(error));
                        continue;
                    }
                };

                // Backpressure: bounded queue.
                match command_tx.try_send(InboundCommand {
                    client_id,
                    seq: cmd.seq,
                    payload: InboundPayload::Command(mapped),
                }) {
                    Ok(()) => {
                        // Ack is sent by the game loop after the command is applied.
                    }
                    Err(_) => {
                        let error =
                            create_error(cmd.seq, ErrorCode::Backpressure, "Command queue is full");
                        let _ = tx.send(ClientOutbound::Error(error));
                    }
                }
            }

            Ok(ParsedMessage::Control(ctrl)) => {
                // Handshake required.
                if !is_handshaken(&state, client_id).await {
                    let error = create_error(
                        ctrl.seq,
                        ErrorCode::HandshakeRequired,
                        "Send hello before control",
                    );
                    let _ = tx.send(ClientOutbound::Error(error));
                    continue;
                }

                // Sequencing: enforce monotonic seq per sender.
                if !check_and_update_seq(&state, client_id, ctrl.seq).await {
                    let error = create_error(
                        ctrl.seq,
                        ErrorCode::InvalidCommand,
                        "seq must be strictly increasing",
                    );
                    let _ = tx.send(ClientOutbound::Error(error));
                    continue;
                }

                match ctrl.action {
                    ControlAction::Claim => {
                        let mut controller = state.controller.write().await;
                        if controller.is_none() {
                            *controller = Some(client_id);
                            let mut clients = state.clients.write().await;
                            if let Some(client) = clients.iter_mut().find(|c| c.id == client_id) {
                                client.is_controller = true;
                            }
                            println!("[Adapter] Client {} claimed controller", client_id);
                            let ack = create_ack(ctrl.seq);
                            let _ = tx.send(ClientOutbound::Ack(ack));
                        } else {
                            let error = create_error(
                                ctrl.seq,
                                ErrorCode::ControllerActive,
                                "Another client is controller",
                            );
                            let _ = tx.send(ClientOutbound::Error(error));
                        }
                    }
                    ControlAction::Release => {
                        let mut controller = state.controller.write().await;
                        if *controller == Some(client_id) {
                            *controller = None;
                            let mut clients = state.clients.write().await;
                            if let Some(client) = clients.iter_mut().find(|c| c.id == client_id) {
                                client.is_controller = false;
                            }
                            println!("[Adapter] Client {} released controller", client_id);
                            let ack = create_ack(ctrl.seq);
                            let _ = tx.send(ClientOutbound::Ack(ack));
                        } else {
                            let error = create_error(
                                ctrl.seq,
                                ErrorCode::NotController,
                                "Controller status not held",
                            );
                            let _ = tx.send(ClientOutbound::Error(error));
                        }
                    }
                }
            }

            Ok(ParsedMessage::Unknown(unknown)) => {
                let error = create_error(
                    unknown.seq,
                    ErrorCode::InvalidCommand,
                    "Unknown message type",
                );
                let _ = tx.send(ClientOutbound::Error(error));
            }

            Err(e) => {
                let seq = extract_seq_best_effort(trimmed).unwrap_or(0);
                let error = create_error(
                    seq,
                    ErrorCode::InvalidCommand,
                    &format!("Malformed message: {}", e),
                );
                let _ = tx.send(ClientOutbound::Error(error));
            }
        }
    }

    drop(tx);
    let _ = write_task.await;

    Ok(())
}
