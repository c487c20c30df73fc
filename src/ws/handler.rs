//! WebSocket connection lifecycle and action dispatch

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::GameError;
use crate::session::directory::SettingsUpdate;
use crate::util::rate_limit::ActionRateLimiter;
use crate::ws::hub::announce;
use crate::ws::protocol::{ClientMsg, RoundResult, ServerMsg, PROTOCOL_VERSION};

/// Direct replies queued per connection before the socket backpressures
const REPLY_BUFFER: usize = 16;

/// WebSocket upgrade handler for `/ws/:code`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let code = code.trim().to_uppercase();
    ws.on_upgrade(move |socket| handle_socket(socket, code, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, code: String, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before reading the snapshot so nothing committed in
    // between is missed; buffered events flush right after the initial
    // frame and each carries a full snapshot anyway.
    let hub_rx = state.hub.subscribe(&code);
    info!(
        code = %code,
        subscribers = state.hub.subscriber_count(&code),
        "New WebSocket connection"
    );

    match state.directory.game_state(&code) {
        Ok(snapshot) => {
            let initial = ServerMsg::GameState {
                version: PROTOCOL_VERSION,
                data: snapshot,
            };
            if let Err(e) = send_msg(&mut ws_sink, &initial).await {
                error!(code = %code, error = %e, "Failed to send initial state");
                drop(hub_rx);
                state.hub.unsubscribe(&code);
                return;
            }
        }
        Err(e) => {
            warn!(code = %code, error = %e, "WebSocket opened for unknown game");
            let _ = send_msg(&mut ws_sink, &ServerMsg::error("Game not found")).await;
            drop(hub_rx);
            state.hub.unsubscribe(&code);
            return;
        }
    }

    run_session(&code, &state, ws_sink, ws_stream, hub_rx).await;

    // run_session waits out the writer task, so the hub receiver is
    // already dropped and the channel can be reclaimed
    state.hub.unsubscribe(&code);

    info!(code = %code, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    code: &str,
    state: &AppState,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut hub_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = ActionRateLimiter::new();

    // Direct replies (error envelopes) bypass the hub so only the
    // offending connection sees them
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMsg>(REPLY_BUFFER);

    // Writer task: hub broadcasts and direct replies -> WebSocket
    let writer_code = code.to_string();
    let writer_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = hub_rx.recv() => match event {
                    Ok(msg) => {
                        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                            debug!(code = %writer_code, error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            code = %writer_code,
                            skipped = n,
                            "Client lagged, skipping {} events", n
                        );
                        // Continue - the next snapshot catches them up
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(code = %writer_code, "Broadcast channel closed");
                        break;
                    }
                },
                reply = reply_rx.recv() => match reply {
                    Some(msg) => {
                        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                            debug!(code = %writer_code, error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    // Reader loop: WebSocket -> action dispatch
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_action() {
                    warn!(code = %code, "Rate limited action message");
                    continue;
                }

                let reply = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(action) => match apply_action(state, code, action) {
                        Ok(()) => None,
                        Err(e) => {
                            warn!(code = %code, error = %e, "Action failed");
                            Some(ServerMsg::error(e.to_string()))
                        }
                    },
                    Err(e) => {
                        warn!(code = %code, error = %e, "Unparseable client message");
                        Some(ServerMsg::error(format!("Unrecognized message: {}", e)))
                    }
                };

                if let Some(msg) = reply {
                    if reply_tx.send(msg).await.is_err() {
                        debug!(code = %code, "Reply channel closed");
                        break;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(code = %code, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(code = %code, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(code = %code, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Stop the writer and wait for it so its hub receiver is dropped
    // before the caller unsubscribes
    writer_handle.abort();
    let _ = writer_handle.await;
}

/// Dispatch one inbound action: run it through the directory, then
/// announce the matching event with a fresh snapshot. Errors go back to
/// the caller for a direct reply; nothing is broadcast on failure.
fn apply_action(state: &AppState, code: &str, action: ClientMsg) -> Result<(), GameError> {
    let directory = &state.directory;
    let hub = &state.hub;

    match action {
        ClientMsg::JoinGame {
            player_name,
            session_token,
        } => {
            directory.join_game(code, &player_name, session_token)?;
            announce(directory, hub, code, |data| ServerMsg::PlayerJoined {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::AddPlayer {
            player_name,
            team_id,
        } => {
            directory.host_add_player(code, &player_name, team_id)?;
            announce(directory, hub, code, |data| ServerMsg::TeamUpdated {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::AssignPlayer { player_id, team_id } => {
            directory.assign_player_to_team(code, player_id, team_id)?;
            announce(directory, hub, code, |data| ServerMsg::TeamUpdated {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::UpdateTeam {
            team_id,
            name,
            color,
        } => {
            directory.update_team(code, team_id, name, color)?;
            announce(directory, hub, code, |data| ServerMsg::TeamUpdated {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::UpdateSettings {
            total_rounds,
            max_time_per_turn,
            settings,
            category_ids,
        } => {
            let update = SettingsUpdate {
                total_rounds,
                max_time_per_turn,
                settings,
                category_ids,
            };
            directory.update_game_settings(code, update)?;
            announce(directory, hub, code, |data| ServerMsg::SettingsUpdated {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::StartGame => {
            directory.start_game(code)?;
            announce(directory, hub, code, |data| ServerMsg::GameStarted {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::SelectActor {
            round_id,
            player_id,
        } => {
            require_same_game(state, code, round_id)?;
            directory.select_actor(round_id, player_id)?;
            announce(directory, hub, code, |data| ServerMsg::RoundUpdated {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::SelectCategory {
            round_id,
            category_id,
        } => {
            require_same_game(state, code, round_id)?;
            directory.select_category(round_id, category_id)?;
            announce(directory, hub, code, |data| ServerMsg::RoundUpdated {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::ActorReady { round_id } => {
            require_same_game(state, code, round_id)?;
            directory.actor_ready(round_id)?;
            announce(directory, hub, code, |data| ServerMsg::ActorReady {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::StartTimer { round_id } => {
            require_same_game(state, code, round_id)?;
            directory.start_timer(round_id)?;
            announce(directory, hub, code, |data| ServerMsg::TimerStarted {
                version: PROTOCOL_VERSION,
                data,
            });
        }

        ClientMsg::CorrectGuess { round_id } => {
            require_same_game(state, code, round_id)?;
            let guess = directory.correct_guess(round_id)?;
            let result = RoundResult::guessed(guess.time_taken, guess.points, guess.team_score);
            announce(directory, hub, code, |data| ServerMsg::RoundEnded {
                version: PROTOCOL_VERSION,
                data,
                result,
            });
        }

        ClientMsg::Timeout { round_id } => {
            require_same_game(state, code, round_id)?;
            directory.timeout_round(round_id)?;
            let result = RoundResult::timeout();
            announce(directory, hub, code, |data| ServerMsg::RoundEnded {
                version: PROTOCOL_VERSION,
                data,
                result,
            });
        }

        ClientMsg::SkipRound { round_id } => {
            require_same_game(state, code, round_id)?;
            let view = directory.skip_round(round_id)?;
            let result = RoundResult::skipped(view.time_taken_seconds);
            announce(directory, hub, code, |data| ServerMsg::RoundEnded {
                version: PROTOCOL_VERSION,
                data,
                result,
            });
        }

        ClientMsg::NextRound => {
            let outcome = directory.advance_round(code)?;
            if outcome.finished {
                announce(directory, hub, code, |data| ServerMsg::GameFinished {
                    version: PROTOCOL_VERSION,
                    data,
                });
            } else {
                announce(directory, hub, code, |data| ServerMsg::RoundUpdated {
                    version: PROTOCOL_VERSION,
                    data,
                });
            }
        }
    }

    Ok(())
}

/// Round-scoped actions must reference a round of this connection's game
fn require_same_game(state: &AppState, code: &str, round_id: Uuid) -> Result<(), GameError> {
    match state.directory.round_game_code(round_id) {
        Some(owner) if owner == code => Ok(()),
        Some(_) => Err(GameError::Validation(
            "Round belongs to a different game".to_string(),
        )),
        None => Err(GameError::not_found("Round")),
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
