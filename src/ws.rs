// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Websocket transport of the room signaling channel.
//!
//! One task per connected participant: it bridges the socket to the
//! [`RoomHub`], forwards outbound events and feeds inbound payloads into
//! the relay. The room is taken from the upgrade path `/ws/{room_id}`.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::{net::TcpListener, net::TcpStream, sync::watch};
use tt::tungstenite::{
    handshake::server::{Request, Response},
    Message,
};

use crate::rooms::RoomHub;

/// Accept websocket connections until shutdown is signalled.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<RoomHub>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let local = listener
        .local_addr()
        .context("failed to get websocket listen address")?;
    debug!("room signaling listens on ws://{local}/ws/{{room_id}}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = accepted.context("failed to accept connection")?;
                trace!("new signaling connection from {remote}");

                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(stream, hub).await {
                        debug!("signaling connection from {remote} ended: {error:#}");
                    }
                });
            }
            result = shutdown.changed() => {
                result.context("shutdown channel closed")?;
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, hub: Arc<RoomHub>) -> Result<()> {
    let mut path = String::new();
    let websocket = tt::accept_hdr_async(stream, |request: &Request, response: Response| {
        path = request.uri().path().to_owned();
        Ok(response)
    })
    .await
    .context("websocket handshake failed")?;

    let Some(room_id) = path.strip_prefix("/ws/").filter(|room| !room.is_empty()) else {
        anyhow::bail!("unsupported signaling path '{path}'");
    };
    let room_id = room_id.to_owned();

    let (outbound, mut events) = RoomHub::channel();
    let participant_id = hub.join(&room_id, outbound);

    let (mut sink, mut source) = websocket.split();

    let result: Result<()> = async {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        // the hub evicted us
                        break;
                    };
                    let text = serde_json::to_string(&event)
                        .context("failed to serialize room event")?;
                    sink.send(Message::Text(text))
                        .await
                        .context("failed to send room event")?;
                }
                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            hub.heartbeat(&participant_id);
                            relay_payload(&hub, &participant_id, text.as_bytes());
                        }
                        Some(Ok(Message::Binary(data))) => {
                            hub.heartbeat(&participant_id);
                            relay_payload(&hub, &participant_id, &data);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            hub.heartbeat(&participant_id);
                            sink.send(Message::Pong(data))
                                .await
                                .context("failed to answer ping")?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            hub.heartbeat(&participant_id);
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(Message::Frame(_))) => unreachable!("raw frame on read"),
                        Some(Err(error)) => {
                            return Err(error).context("websocket receive failed");
                        }
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    hub.leave(&participant_id);
    debug!("participant {participant_id} disconnected from room '{room_id}'");

    result
}

fn relay_payload(hub: &RoomHub, participant_id: &crate::rooms::ParticipantId, raw: &[u8]) {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(payload)) => hub.relay(participant_id, payload),
        Ok(other) => warn!("ignoring non-object payload from {participant_id}: {other}"),
        Err(error) => warn!("ignoring unparsable payload from {participant_id}: {error}"),
    }
}
