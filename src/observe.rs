//! Observer mode - attach to a running engine and print observations.
//!
//! Connects as a read-only observer with streaming enabled and writes one
//! status line per observation to stdout. Uses a blocking socket on a reader
//! thread so the printing loop stays a plain sync loop.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Result};

use crate::adapter::protocol::{
    create_hello, ErrorMessage, ObservationMessage, RequestedRole, WelcomeMessage,
};
use crate::types::{PendingBlock, BOARD_ROWS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserveConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub enum ObserveEvent {
    Welcome,
    Observation(ObservationMessage),
    Error(String),
    Closed,
}

/// Parse `observe [--host H] [--port P]` from the CLI arguments.
/// Returns None when the first argument is not `observe`.
pub fn parse_observe_args(args: &[String]) -> Result<Option<ObserveConfig>> {
    if args.is_empty() || args[0] != "observe" {
        return Ok(None);
    }

    let mut host = String::from("127.0.0.1");
    let mut port: u16 = 7878;
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| anyhow!("observe: missing value for --host"))?;
                host = v.clone();
            }
            "--port" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| anyhow!("observe: missing value for --port"))?;
                port = v
                    .parse::<u16>()
                    .map_err(|_| anyhow!("observe: invalid --port value: {}", v))?;
            }
            other => {
                return Err(anyhow!("observe: unknown argument: {}", other));
            }
        }
        i += 1;
    }

    Ok(Some(ObserveConfig { host, port }))
}

/// Connect to the engine and stream events into a channel.
pub fn connect_observer(config: &ObserveConfig) -> Result<mpsc::Receiver<ObserveEvent>> {
    let mut stream = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
        anyhow!(
            "observe: connect {}:{} failed: {}",
            config.host,
            config.port,
            e
        )
    })?;
    stream
        .set_nodelay(true)
        .map_err(|e| anyhow!("observe: set_nodelay failed: {}", e))?;

    let mut hello = create_hello(1, "mergefall-observe", "1.0.0");
    hello.requested.stream_observations = true;
    hello.requested.role = Some(RequestedRole::Observer);
    let line = serde_json::to_string(&hello)?;
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let (tx, rx) = mpsc::channel::<ObserveEvent>();
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    let _ = tx.send(ObserveEvent::Error(format!("observe: read error: {}", e)));
                    let _ = tx.send(ObserveEvent::Closed);
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Some(event) = parse_server_line(&line) {
                let _ = tx.send(event);
            }
        }
        let _ = tx.send(ObserveEvent::Closed);
    });

    Ok(rx)
}

/// Classify one server line into an observe event
fn parse_server_line(line: &str) -> Option<ObserveEvent> {
    if let Ok(obs) = serde_json::from_str::<ObservationMessage>(line) {
        return Some(ObserveEvent::Observation(obs));
    }
    if serde_json::from_str::<WelcomeMessage>(line).is_ok() {
        return Some(ObserveEvent::Welcome);
    }
    if let Ok(err) = serde_json::from_str::<ErrorMessage>(line) {
        return Some(ObserveEvent::Error(format!(
            "observe: server error: {}",
            err.message
        )));
    }
    None
}

/// One-line summary of an observation
pub fn format_status(obs: &ObservationMessage) -> String {
    let pending: Vec<String> = obs
        .pending
        .0
        .iter()
        .map(|tag| match tag.0 {
            PendingBlock::Numeric(value) => value.to_string(),
            PendingBlock::Miss => "miss".to_string(),
        })
        .collect();

    let rows: Vec<String> = (0..BOARD_ROWS)
        .map(|row| {
            let cells: Vec<String> = obs.board.cells[row]
                .iter()
                .map(|&v| if v == 0 { ".".to_string() } else { v.to_string() })
                .collect();
            cells.join(" ")
        })
        .collect();

    format!(
        "EP {} DROP {} SCORE {} HIGH {} PENDING [{}] | {}",
        obs.episode_id,
        obs.drop_id,
        obs.score,
        obs.high_score,
        pending.join(","),
        rows.join(" / "),
    )
}

/// Run observe mode until the connection closes.
pub fn run(config: &ObserveConfig) -> Result<()> {
    let rx = connect_observer(config)?;
    println!("[Observe] Connected to {}:{}", config.host, config.port);

    loop {
        match rx.recv() {
            Ok(ObserveEvent::Welcome) => {
                println!("[Observe] Handshake complete");
            }
            Ok(ObserveEvent::Observation(obs)) => {
                println!("{}", format_status(&obs));
            }
            Ok(ObserveEvent::Error(message)) => {
                eprintln!("[Observe] {}", message);
            }
            Ok(ObserveEvent::Closed) | Err(_) => {
                println!("[Observe] Connection closed");
                return Ok(());
            }
        }
    }
}
