// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Room membership and message relay.
//!
//! The hub keeps one registry of rooms per process. Each participant is a
//! send-capable handle onto one bidirectional connection; the transport
//! behind that handle lives in [`crate::ws`]. Delivery is at-most-once: a
//! full queue drops the message, a closed queue evicts the participant.

use log::{debug, trace, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fmt::Display,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// How many outgoing messages one participant may have in flight.
const OUTBOUND_QUEUE: usize = 64;

/// Server-issued identifier of one connected participant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the hub sends to a participant.
///
/// The closed set of server-originated kinds plus relayed client payloads,
/// which stay opaque and are re-serialized with `sender_id` attached.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    AssignId {
        id: ParticipantId,
    },
    ExistingParticipants {
        participant_ids: Vec<ParticipantId>,
    },
    NewParticipant {
        participant_id: ParticipantId,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
    },
    #[serde(untagged)]
    Relay(Map<String, Value>),
}

#[derive(Debug)]
struct Participant {
    outbound: mpsc::Sender<RoomEvent>,
    last_seen: Instant,
}

#[derive(Debug, Default)]
struct Room {
    participants: HashMap<ParticipantId, Participant>,
}

#[derive(Debug, Default)]
struct HubState {
    rooms: HashMap<String, Room>,
    /// Room of each connected participant; participants never migrate.
    index: HashMap<ParticipantId, String>,
}

/// Per-process room registry and relay.
#[derive(Debug, Default)]
pub struct RoomHub {
    state: Mutex<HubState>,
}

impl RoomHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue capacity for [`RoomHub::channel`].
    #[must_use]
    pub fn queue_capacity() -> usize {
        OUTBOUND_QUEUE
    }

    /// Create an outbound queue pair suitable for [`RoomHub::join`].
    #[must_use]
    pub fn channel() -> (mpsc::Sender<RoomEvent>, mpsc::Receiver<RoomEvent>) {
        mpsc::channel(OUTBOUND_QUEUE)
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// The new participant receives its id and the list of everyone else;
    /// the rest of the room is told about the newcomer.
    pub fn join(&self, room_id: &str, outbound: mpsc::Sender<RoomEvent>) -> ParticipantId {
        let id = ParticipantId::generate();

        let (joiner, existing, others) = {
            let mut state = self.state.lock();
            let room = state.rooms.entry(room_id.to_owned()).or_default();

            let existing: Vec<ParticipantId> = room.participants.keys().copied().collect();
            let others: Vec<(ParticipantId, mpsc::Sender<RoomEvent>)> = room
                .participants
                .iter()
                .map(|(id, participant)| (*id, participant.outbound.clone()))
                .collect();

            room.participants.insert(
                id,
                Participant {
                    outbound: outbound.clone(),
                    last_seen: Instant::now(),
                },
            );
            state.index.insert(id, room_id.to_owned());

            (outbound, existing, others)
        };

        debug!("participant {id} joined room '{room_id}'");

        let mut lost = Vec::new();
        if !deliver(&joiner, &id, RoomEvent::AssignId { id }) {
            lost.push(id);
        }
        if !deliver(
            &joiner,
            &id,
            RoomEvent::ExistingParticipants {
                participant_ids: existing,
            },
        ) {
            lost.push(id);
        }
        for (other_id, sender) in others {
            if !deliver(&sender, &other_id, RoomEvent::NewParticipant { participant_id: id }) {
                lost.push(other_id);
            }
        }
        self.evict(lost);

        id
    }

    /// Remove a participant; drops the room once it is empty.
    pub fn leave(&self, participant_id: &ParticipantId) {
        let remaining = {
            let mut state = self.state.lock();
            let Some(room_id) = state.index.remove(participant_id) else {
                return;
            };
            let Some(room) = state.rooms.get_mut(&room_id) else {
                return;
            };
            room.participants.remove(participant_id);

            let remaining: Vec<(ParticipantId, mpsc::Sender<RoomEvent>)> = room
                .participants
                .iter()
                .map(|(id, participant)| (*id, participant.outbound.clone()))
                .collect();

            if room.participants.is_empty() {
                state.rooms.remove(&room_id);
                debug!("room '{room_id}' is empty and gets removed");
            }

            remaining
        };

        debug!("participant {participant_id} left");

        let mut lost = Vec::new();
        for (id, sender) in remaining {
            let event = RoomEvent::ParticipantLeft {
                participant_id: *participant_id,
            };
            if !deliver(&sender, &id, event) {
                lost.push(id);
            }
        }
        self.evict(lost);
    }

    /// Relay a client payload.
    ///
    /// The presence of a `target_id` field selects unicast: the payload
    /// goes to exactly that participant, or nowhere at all when the value
    /// does not name a room member. A payload that never mentions a
    /// target goes to every room member except the sender. `sender_id` is
    /// always set by the server, overwriting whatever the client put
    /// there.
    pub fn relay(&self, sender_id: &ParticipantId, mut payload: Map<String, Value>) {
        let unicast = payload.contains_key("target_id");
        let target = payload
            .get("target_id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .map(ParticipantId);

        let receivers = {
            let state = self.state.lock();
            let Some(room_id) = state.index.get(sender_id) else {
                warn!("relay from unknown participant {sender_id}");
                return;
            };
            let Some(room) = state.rooms.get(room_id) else {
                return;
            };

            if unicast {
                // a malformed or unknown target must never fan out; the
                // payload was meant for one participant
                target
                    .and_then(|target| {
                        room.participants
                            .get(&target)
                            .map(|participant| vec![(target, participant.outbound.clone())])
                    })
                    .unwrap_or_default()
            } else {
                room.participants
                    .iter()
                    .filter(|(id, _)| *id != sender_id)
                    .map(|(id, participant)| (*id, participant.outbound.clone()))
                    .collect()
            }
        };

        payload.insert("sender_id".to_owned(), Value::String(sender_id.to_string()));

        let mut lost = Vec::new();
        for (id, sender) in receivers {
            if !deliver(&sender, &id, RoomEvent::Relay(payload.clone())) {
                lost.push(id);
            }
        }
        self.evict(lost);
    }

    /// Record inbound activity of a participant.
    pub fn heartbeat(&self, participant_id: &ParticipantId) {
        let mut state = self.state.lock();
        let Some(room_id) = state.index.get(participant_id).cloned() else {
            return;
        };
        if let Some(participant) = state
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.participants.get_mut(participant_id))
        {
            participant.last_seen = Instant::now();
        }
    }

    /// Force-leave every participant that has been silent longer than
    /// `ttl`. Returns the evicted ids.
    pub fn sweep_idle(&self, ttl: Duration) -> Vec<ParticipantId> {
        let now = Instant::now();
        let idle: Vec<ParticipantId> = {
            let state = self.state.lock();
            state
                .rooms
                .values()
                .flat_map(|room| room.participants.iter())
                .filter(|(_, participant)| now.duration_since(participant.last_seen) >= ttl)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in &idle {
            warn!("participant {id} timed out and gets disconnected");
            self.leave(id);
        }

        idle
    }

    /// Does the room currently exist (i.e. is non-empty)?
    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.state.lock().rooms.contains_key(room_id)
    }

    /// Number of participants in a room, 0 when the room does not exist.
    #[must_use]
    pub fn participant_count(&self, room_id: &str) -> usize {
        self.state
            .lock()
            .rooms
            .get(room_id)
            .map_or(0, |room| room.participants.len())
    }

    fn evict(&self, lost: Vec<ParticipantId>) {
        for id in lost {
            debug!("participant {id} is gone, cleaning up");
            self.leave(&id);
        }
    }
}

/// Returns `false` when the participant's connection is gone for good.
fn deliver(sender: &mpsc::Sender<RoomEvent>, id: &ParticipantId, event: RoomEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            // at-most-once: a slow consumer loses the message, not the
            // connection
            trace!("queue of participant {id} is full, dropping {event:?}");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Periodically disconnect participants that stopped answering.
pub fn spawn_keepalive(
    hub: Arc<RoomHub>,
    ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ttl);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    hub.sweep_idle(ttl);
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
