//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, Stream, StreamExt,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Command, IntentUpdate, MatchHandle, ParticipantId};
use crate::http::auth::{verify_jwt, AuthError, JoinClaims};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Capacity of the per-participant channel for directed messages
const DIRECT_CHANNEL_CAPACITY: usize = 16;

/// How long a fresh connection has to send its join message
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id: ParticipantId = Uuid::new_v4();
    debug!(connection_id = %connection_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let handshake = join_handshake(&mut ws_stream, &state.config.jwt_secret, JOIN_TIMEOUT);
    let claims = match handshake.await {
        Ok(claims) => claims,
        Err(e) => {
            error!(connection_id = %connection_id, error = %e, "Join handshake failed");
            let rejected = ServerMsg::Rejected {
                reason: e.to_string(),
            };
            let _ = send_msg(&mut ws_sink, &rejected).await;
            let _ = ws_sink.close().await;
            return;
        }
    };

    info!(
        participant_id = %connection_id,
        employee_id = %claims.employee_id,
        "WebSocket authenticated"
    );

    let (direct_tx, direct_rx) = mpsc::channel(DIRECT_CHANNEL_CAPACITY);
    // Subscribe before joining so the first snapshot after the join is not missed
    let snapshot_rx = state.game.subscribe();

    let join = Command::Join {
        id: connection_id,
        display_name: claims.display_name().to_string(),
        direct: direct_tx,
    };
    if !state.game.send(join).await {
        error!(participant_id = %connection_id, "Match loop is not running");
        return;
    }

    run_session(
        connection_id,
        &state.game,
        ws_sink,
        ws_stream,
        direct_rx,
        snapshot_rx,
    )
    .await;

    state.game.send(Command::Leave { id: connection_id }).await;

    info!(participant_id = %connection_id, "WebSocket connection closed");
}

/// Wait for the join message, giving up after `deadline`
async fn join_handshake<S, E>(
    ws_stream: &mut S,
    secret: &str,
    deadline: Duration,
) -> Result<JoinClaims, JoinError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    timeout(deadline, await_join(ws_stream, secret))
        .await
        .map_err(|_| JoinError::Timeout)?
}

/// Wait for the first text frame and verify its join token
async fn await_join<S, E>(ws_stream: &mut S, secret: &str) -> Result<JoinClaims, JoinError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                return match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Join { token }) => Ok(verify_jwt(&token, secret)?),
                    Ok(_) | Err(_) => Err(JoinError::ExpectedJoin),
                };
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Binary(_)) => return Err(JoinError::ExpectedJoin),
            Ok(Message::Close(_)) | Err(_) => break,
        }
    }
    Err(JoinError::Closed)
}

/// Run the WebSocket session with read/write split
async fn run_session(
    participant_id: ParticipantId,
    game: &MatchHandle,
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer task: directed messages and broadcasts -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => {
                        debug!(participant_id = %participant_id, "Direct channel closed");
                        break;
                    }
                },
                received = snapshot_rx.recv() => match received {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            participant_id = %participant_id,
                            lagged_count = n,
                            "Client lagged, skipping {} messages", n
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(participant_id = %participant_id, "Snapshot channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(participant_id = %participant_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> match loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(participant_id = %participant_id, "Rate limited input message");
                    continue;
                }

                let command = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => match into_command(participant_id, client_msg) {
                        Some(command) => command,
                        None => {
                            warn!(participant_id = %participant_id, "Ignoring repeated join");
                            continue;
                        }
                    },
                    Err(e) => {
                        warn!(participant_id = %participant_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                if !game.send(command).await {
                    debug!(participant_id = %participant_id, "Command channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(participant_id = %participant_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(participant_id = %participant_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant_id = %participant_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Map a client message from a joined participant to a match command
fn into_command(id: ParticipantId, msg: ClientMsg) -> Option<Command> {
    match msg {
        ClientMsg::Join { .. } => None,
        ClientMsg::SetIntent {
            forward,
            backward,
            left,
            right,
            facing,
        } => Some(Command::SetIntent {
            id,
            intent: IntentUpdate {
                forward,
                backward,
                left,
                right,
                facing,
            },
        }),
        ClientMsg::RequestThrow { direction } => Some(Command::RequestThrow { id, direction }),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

/// Why a connection never made it into the arena
#[derive(Debug, thiserror::Error)]
enum JoinError {
    #[error("Expected a join message first")]
    ExpectedJoin,

    #[error("Connection closed before joining")]
    Closed,

    #[error("Timed out waiting for join")]
    Timeout,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use glam::Vec3;
    use std::convert::Infallible;

    #[test]
    fn client_messages_map_to_commands() {
        let id = Uuid::new_v4();

        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"set_intent","forward":1,"left":"yes","facing":0.5}"#,
        )
        .unwrap();
        match into_command(id, msg) {
            Some(Command::SetIntent { id: cmd_id, intent }) => {
                assert_eq!(cmd_id, id);
                assert_eq!(
                    intent,
                    IntentUpdate {
                        forward: true,
                        left: true,
                        facing: Some(0.5),
                        ..Default::default()
                    }
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"request_throw","direction":[1,0,0]}"#).unwrap();
        assert!(matches!(
            into_command(id, msg),
            Some(Command::RequestThrow { direction: Some(d), .. }) if d == Vec3::X
        ));
    }

    #[test]
    fn repeated_join_is_not_forwarded() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"join","token":"t"}"#).unwrap();
        assert!(into_command(Uuid::new_v4(), msg).is_none());
    }

    fn frames(texts: &[&str]) -> impl Stream<Item = Result<Message, Infallible>> + Unpin {
        let frames: Vec<_> = texts
            .iter()
            .map(|text| Ok(Message::Text(text.to_string())))
            .collect();
        stream::iter(frames)
    }

    #[tokio::test]
    async fn handshake_requires_join_first() {
        let mut ws_stream = frames(&[r#"{"type":"request_throw"}"#]);
        let result = join_handshake(&mut ws_stream, "secret", JOIN_TIMEOUT).await;
        assert!(matches!(result, Err(JoinError::ExpectedJoin)));
    }

    #[tokio::test]
    async fn handshake_rejects_bad_token() {
        let mut ws_stream = frames(&[r#"{"type":"join","token":"not.a.token"}"#]);
        let result = join_handshake(&mut ws_stream, "secret", JOIN_TIMEOUT).await;
        assert!(matches!(result, Err(JoinError::Auth(_))));
    }

    #[tokio::test]
    async fn handshake_reports_early_close() {
        let mut ws_stream = frames(&[]);
        let result = join_handshake(&mut ws_stream, "secret", JOIN_TIMEOUT).await;
        assert!(matches!(result, Err(JoinError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_times_out() {
        let mut ws_stream = stream::pending::<Result<Message, Infallible>>();
        let result = join_handshake(&mut ws_stream, "secret", JOIN_TIMEOUT).await;
        assert!(matches!(result, Err(JoinError::Timeout)));

        let rejected = ServerMsg::Rejected {
            reason: JoinError::Timeout.to_string(),
        };
        let json = serde_json::to_value(rejected).unwrap();
        assert_eq!(json["type"], "rejected");
        assert_eq!(json["reason"], "Timed out waiting for join");
    }

    #[test]
    fn auth_failures_surface_as_rejection_reason() {
        let e = JoinError::from(AuthError::TokenExpired);
        assert_eq!(e.to_string(), "Token expired");
    }
}
