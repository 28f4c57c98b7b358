//! Typing indicators with a server-side idle timeout.
//!
//! Each (room, user) typing session holds a generation counter. Refreshing a
//! session bumps the generation and spawns a fresh sleeper; a sleeper that
//! wakes to a stale generation does nothing, so only the latest refresh can
//! emit the automatic stop.

use crate::models::RoomKey;
use crate::state::AppState;
use crate::websocket::events::ServerEvent;
use crate::websocket::ConnectionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct TypingTracker {
    idle: Duration,
    // generations are globally unique so a sleeper from a torn-down session
    // can never match a later one
    next_generation: Arc<AtomicU64>,
    active: Arc<Mutex<HashMap<(RoomKey, Uuid), u64>>>,
}

impl TypingTracker {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            next_generation: Arc::new(AtomicU64::new(1)),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handle a typing flag from the client. Starts emit one event and arm
    /// the idle timer; repeated starts only refresh the timer.
    pub async fn set_typing(
        &self,
        state: &AppState,
        origin: ConnectionId,
        room: RoomKey,
        user_id: Uuid,
        partner_id: Option<Uuid>,
        is_typing: bool,
    ) {
        if !is_typing {
            self.stop(state, Some(origin), room, user_id, partner_id).await;
            return;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let started = {
            let mut active = self.active.lock().await;
            active.insert((room, user_id), generation).is_none()
        };

        if started {
            Self::emit(state, room, user_id, partner_id, true, Some(origin)).await;
        }

        let tracker = self.clone();
        let state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.idle).await;
            let expired = {
                let mut active = tracker.active.lock().await;
                match active.get(&(room, user_id)) {
                    Some(current) if *current == generation => {
                        active.remove(&(room, user_id));
                        true
                    }
                    _ => false,
                }
            };
            if expired {
                tracing::debug!(user_id = %user_id, room = %room, "typing session expired");
                Self::emit(&state, room, user_id, partner_id, false, Some(origin)).await;
            }
        });
    }

    /// Sending a message implicitly ends the typing session.
    pub async fn clear_on_send(
        &self,
        state: &AppState,
        room: RoomKey,
        user_id: Uuid,
        partner_id: Option<Uuid>,
    ) {
        self.stop(state, None, room, user_id, partner_id).await;
    }

    async fn stop(
        &self,
        state: &AppState,
        origin: Option<ConnectionId>,
        room: RoomKey,
        user_id: Uuid,
        partner_id: Option<Uuid>,
    ) {
        let was_active = self.active.lock().await.remove(&(room, user_id)).is_some();
        if was_active {
            Self::emit(state, room, user_id, partner_id, false, origin).await;
        }
    }

    /// 1:1 indicators go straight to the partner's connections; group
    /// indicators fan out through the room, skipping the origin.
    async fn emit(
        state: &AppState,
        room: RoomKey,
        user_id: Uuid,
        partner_id: Option<Uuid>,
        is_typing: bool,
        exclude: Option<ConnectionId>,
    ) {
        let event = ServerEvent::UserTyping {
            room,
            user_id,
            is_typing,
        };
        let payload = event.payload();
        match (room, partner_id) {
            (RoomKey::Conversation(_), Some(partner)) => {
                state.registry.send_to_user(partner, &payload).await;
            }
            _ => {
                state
                    .rooms
                    .broadcast(&state.registry, room, &payload, exclude)
                    .await;
            }
        }
    }
}
