//! Reaction bookkeeping: read-modify-write of the reactions column plus a
//! room-wide broadcast of the resulting map.

use crate::error::{AppError, AppResult};
use crate::models::{ReactionMap, RoomKey};
use crate::state::AppState;
use crate::storage::SqlParam;
use crate::websocket::events::ServerEvent;
use uuid::Uuid;

pub struct ReactionService;

impl ReactionService {
    pub async fn add(
        state: &AppState,
        room: RoomKey,
        message_id: Uuid,
        user_id: Uuid,
        display_name: Option<String>,
        emoji: String,
    ) {
        let name = display_name.unwrap_or_default();
        let outcome = Self::mutate(state, message_id, |map| {
            map.set(&emoji, user_id, &name);
        })
        .await;
        Self::finish(state, room, message_id, outcome).await;
    }

    pub async fn remove(
        state: &AppState,
        room: RoomKey,
        message_id: Uuid,
        user_id: Uuid,
        emoji: Option<String>,
    ) {
        let outcome = Self::mutate(state, message_id, |map| {
            map.remove(user_id, emoji.as_deref());
        })
        .await;
        Self::finish(state, room, message_id, outcome).await;
    }

    /// Load the current map, apply the mutation, write it back. The whole
    /// map is broadcast afterwards so every client converges on the same
    /// state regardless of the order their local edits raced in.
    async fn mutate(
        state: &AppState,
        message_id: Uuid,
        apply: impl FnOnce(&mut ReactionMap),
    ) -> AppResult<ReactionMap> {
        let rows = state
            .storage
            .execute(
                "SELECT reactions FROM messages WHERE id = $1 AND revoked = FALSE",
                &[SqlParam::from(message_id)],
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| AppError::NotFound(format!("message {message_id}")))?;

        let mut map = row
            .json("reactions")
            .cloned()
            .map(ReactionMap::from_value)
            .unwrap_or_default();
        apply(&mut map);

        state
            .storage
            .execute(
                "UPDATE messages SET reactions = $2 WHERE id = $1",
                &[SqlParam::from(message_id), SqlParam::Json(map.as_value())],
            )
            .await?;
        Ok(map)
    }

    async fn finish(
        state: &AppState,
        room: RoomKey,
        message_id: Uuid,
        outcome: AppResult<ReactionMap>,
    ) {
        match outcome {
            Ok(reactions) => {
                let event = ServerEvent::MessageReacted {
                    message_id,
                    reactions,
                };
                // everyone in the room, origin included, gets the
                // authoritative map
                state
                    .rooms
                    .broadcast(&state.registry, room, &event.payload(), None)
                    .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, message_id = %message_id, "reaction update failed");
            }
        }
    }
}
