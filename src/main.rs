//! Headless engine runner (default binary).
//!
//! Hosts one game session behind the TCP control adapter: drains inbound
//! commands at a fixed tick, applies them to the engine, and answers with
//! acks, protocol errors, and observation broadcasts.
//!
//! `mergefall observe [--host H] [--port P]` attaches to a running engine
//! as a read-only observer instead.

use std::thread;
use std::time::Duration;

use anyhow::Result;

use mergefall::adapter::protocol::{create_ack, create_error, ErrorCode};
use mergefall::adapter::server::build_observation;
use mergefall::adapter::{Adapter, ClientCommand, InboundPayload, OutboundMessage};
use mergefall::core::{GameState, QueueError};
use mergefall::observe;
use mergefall::types::TICK_MS;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(config) = observe::parse_observe_args(&args)? {
        return observe::run(&config);
    }

    run()
}

fn run() -> Result<()> {
    let Some(mut adapter) = Adapter::start_from_env() else {
        println!("[Engine] Remote control disabled via MERGEFALL_AI_DISABLED; nothing to host");
        return Ok(());
    };

    let mut game = GameState::new();
    let mut obs_seq: u64 = 0;
    let tick = Duration::from_millis(TICK_MS);

    loop {
        // Drain all pending commands; each runs to completion before the
        // next is applied, so core operations stay serialized.
        while let Some(inbound) = adapter.try_recv() {
            match inbound.payload {
                InboundPayload::SnapshotRequest => {
                    obs_seq += 1;
                    adapter.send(OutboundMessage::ToClientObservation {
                        client_id: inbound.client_id,
                        obs: build_observation(&game.snapshot(), obs_seq),
                    });
                }
                InboundPayload::Command(ref command) => {
                    match apply_command(&mut game, command) {
                        Ok(()) => {
                            adapter.send(OutboundMessage::ToClientAck {
                                client_id: inbound.client_id,
                                ack: create_ack(inbound.seq),
                            });
                            obs_seq += 1;
                            adapter.send(OutboundMessage::BroadcastObservation {
                                obs: build_observation(&game.snapshot(), obs_seq),
                            });
                        }
                        Err((code, message)) => {
                            adapter.send(OutboundMessage::ToClientError {
                                client_id: inbound.client_id,
                                err: create_error(inbound.seq, code, message),
                            });
                        }
                    }
                }
            }
        }

        thread::sleep(tick);
    }
}

/// Apply one validated command to the session.
///
/// Game-rule failures come back as protocol error codes; the command layer
/// already filtered out contract violations.
fn apply_command(
    game: &mut GameState,
    command: &ClientCommand,
) -> Result<(), (ErrorCode, &'static str)> {
    match command {
        ClientCommand::Enqueue(block) => match game.enqueue(*block) {
            Ok(()) => Ok(()),
            Err(e @ QueueError::QueueFull) => Err((ErrorCode::QueueFull, e.message())),
            Err(e) => Err((ErrorCode::InvalidCommand, e.message())),
        },
        ClientCommand::Place { block, column } => match game.place_block(*block, *column) {
            Ok(_) => Ok(()),
            Err(e) => Err((ErrorCode::ColumnFull, e.message())),
        },
        ClientCommand::Discard(block) => {
            // Removing an absent block is a no-op for remote callers.
            let _ = game.discard(block);
            Ok(())
        }
        ClientCommand::Restart => {
            game.restart();
            Ok(())
        }
    }
}
