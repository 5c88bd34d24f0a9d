//! # Real-Time Broadcaster
//!
//! Registry of live WebSocket sessions, owned by [`crate::state::AppState`] for
//! the lifetime of the server and handed to the dispatcher.
//!
//! - Connecting subscribes a session; it gets an id and a bounded event queue
//! - Sessions can join rooms keyed by user id so a user's other devices can be
//!   addressed together
//! - Publishing walks a snapshot of the sessions taken under the registry lock
//!   and hands each one the event in order
//!
//! Delivery is at-most-once. A session whose queue is full or already closed
//! misses the event; there is no backlog or replay for late joiners.
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{
    RwLock,
    mpsc::{self, Receiver, Sender, error::TrySendError},
};
use tracing::{debug, info, warn};

pub type SessionId = u64;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub user_id: String,
    pub user_name: String,
    pub lat: f64,
    pub lng: f64,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPayload {
    pub user_id: String,
    pub sos_id: String,
}

/// Server → client frames: `{ "event": "sos:alert", "data": { .. } }`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "sos:alert")]
    Alert(AlertPayload),

    #[serde(rename = "sos:resolved")]
    Resolved(ResolvedPayload),
}

/// Client → server frames.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join")]
    Join(String),
}

struct Session {
    sender: Sender<ServerEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Session>,
    rooms: HashMap<String, HashSet<SessionId>>,
}

pub struct Broadcaster {
    registry: RwLock<Registry>,
    next_session_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            next_session_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub async fn connect(&self) -> (SessionId, Receiver<ServerEvent>) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);

        self.registry.write().await.sessions.insert(
            session_id,
            Session {
                sender,
                rooms: HashSet::new(),
            },
        );

        info!("User connected: {session_id}");
        (session_id, receiver)
    }

    /// False if the session is already gone.
    pub async fn join_room(&self, session_id: SessionId, room: &str) -> bool {
        let mut registry = self.registry.write().await;

        let Some(session) = registry.sessions.get_mut(&session_id) else {
            return false;
        };
        session.rooms.insert(room.to_string());

        registry
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(session_id);

        info!("Session {session_id} joined room {room}");
        true
    }

    pub async fn disconnect(&self, session_id: SessionId) {
        let mut registry = self.registry.write().await;

        let Some(session) = registry.sessions.remove(&session_id) else {
            return;
        };

        for room in session.rooms {
            if let Some(members) = registry.rooms.get_mut(&room) {
                members.remove(&session_id);
                if members.is_empty() {
                    registry.rooms.remove(&room);
                }
            }
        }

        info!("User disconnected: {session_id}");
    }

    pub async fn broadcast_alert(&self, payload: AlertPayload) -> usize {
        info!("SOS triggered by user {}", payload.user_id);
        self.publish(ServerEvent::Alert(payload)).await
    }

    pub async fn broadcast_resolved(&self, payload: ResolvedPayload) -> usize {
        info!("SOS resolved by {}", payload.user_id);
        self.publish(ServerEvent::Resolved(payload)).await
    }

    /// Every connected session. Returns how many sessions accepted the event.
    pub async fn publish(&self, event: ServerEvent) -> usize {
        let registry = self.registry.read().await;

        registry
            .sessions
            .iter()
            .filter(|(session_id, session)| deliver(**session_id, &session.sender, &event))
            .count()
    }

    pub async fn publish_to_room(&self, room: &str, event: ServerEvent) -> usize {
        let registry = self.registry.read().await;

        let Some(members) = registry.rooms.get(room) else {
            return 0;
        };

        members
            .iter()
            .filter_map(|session_id| {
                registry
                    .sessions
                    .get(session_id)
                    .map(|session| (session_id, session))
            })
            .filter(|(session_id, session)| deliver(**session_id, &session.sender, &event))
            .count()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    pub async fn room_size(&self, room: &str) -> usize {
        let registry = self.registry.read().await;
        registry.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Drops every session; their receivers see the channel close.
    pub async fn shutdown(&self) {
        let mut registry = self.registry.write().await;
        let count = registry.sessions.len();

        registry.sessions.clear();
        registry.rooms.clear();

        info!("Closed {count} realtime sessions");
    }
}

fn deliver(session_id: SessionId, sender: &Sender<ServerEvent>, event: &ServerEvent) -> bool {
    match sender.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Session {session_id} is lagging, dropping event");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Session {session_id} already closed");
            false
        }
    }
}
