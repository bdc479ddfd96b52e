// Copyright 2025 Caseboard (https://github.com/caseboard)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! WebSocket endpoints for the caseboard and alert streams.
//!
//! Each connection forwards its fan-out channel to the socket. Socket
//! writes are bounded by the fan-out send timeout; a connection that
//! cannot accept a frame in time is closed, which tears the subscriber
//! down. Ping/pong keepalive detects dead peers.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::AppState;
use crate::state::fanout::StreamMessage;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_GRACE: Duration = Duration::from_secs(60);

pub async fn ws_caseboard(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        // Subscribing through the store queues the initial snapshot
        // atomically with the mutation stream.
        let (id, rx) = state.graph.subscribe_caseboard();
        stream_to_socket(socket, rx, &state, "caseboard").await;
        state.fanout.unsubscribe_caseboard(id);
        info!("Caseboard subscriber {id} disconnected");
    })
}

pub async fn ws_alerts(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let (id, rx) = state.fanout.register_alerts();
        stream_to_socket(socket, rx, &state, "alert").await;
        state.fanout.unsubscribe_alerts(id);
        info!("Alert subscriber {id} disconnected");
    })
}

async fn stream_to_socket(
    socket: WebSocket,
    mut rx: mpsc::Receiver<StreamMessage>,
    state: &AppState,
    stream: &str,
) {
    let send_timeout = state.config.engine.fanout_send_timeout();
    let (mut sender, mut receiver) = socket.split();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if last_pong.elapsed() > PONG_GRACE {
                    warn!("Unresponsive {stream} subscriber, closing connection");
                    break;
                }
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sender.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring client message on {stream} stream");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket receive error on {stream} stream: {e}");
                        break;
                    }
                }
            }

            event = rx.recv() => {
                let Some(message) = event else {
                    // The fan-out dropped this subscriber (slow or gone).
                    break;
                };
                let frame = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialise {stream} frame: {e}");
                        continue;
                    }
                };
                match tokio::time::timeout(send_timeout, sender.send(Message::Text(frame))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => break,
                    Err(_) => {
                        warn!("Dropping {stream} subscriber: send exceeded {send_timeout:?}");
                        break;
                    }
                }
            }
        }
    }
}
