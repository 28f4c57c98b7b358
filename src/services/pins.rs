//! Pinned messages. A message carries at most one pin row; re-pinning
//! overwrites who pinned it and when.

use crate::models::{Message, RoomKey};
use crate::state::AppState;
use crate::storage::SqlParam;
use crate::websocket::events::ServerEvent;
use chrono::Utc;
use uuid::Uuid;

pub struct PinService;

impl PinService {
    /// Pin a message and broadcast the full message body so clients can
    /// render the pin banner without a follow-up fetch.
    pub async fn pin(state: &AppState, room: RoomKey, message_id: Uuid, user_id: Uuid) {
        let message = match Self::load_message(state, room, message_id).await {
            Some(message) => message,
            None => {
                tracing::warn!(message_id = %message_id, "pin target not found");
                return;
            }
        };

        let (conversation_id, group_id) = match room {
            RoomKey::Conversation(id) => (Some(id), None),
            RoomKey::Group(id) => (None, Some(id)),
        };
        let result = state
            .storage
            .execute(
                "INSERT INTO pinned_messages \
                 (message_id, conversation_id, group_id, pinned_by, pinned_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (message_id) \
                 DO UPDATE SET pinned_by = EXCLUDED.pinned_by, pinned_at = EXCLUDED.pinned_at",
                &[
                    SqlParam::from(message_id),
                    SqlParam::from(conversation_id),
                    SqlParam::from(group_id),
                    SqlParam::from(user_id),
                    SqlParam::from(Utc::now()),
                ],
            )
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, message_id = %message_id, "failed to persist pin");
            return;
        }

        let event = ServerEvent::MessagePinned {
            message,
            pinned_by: user_id,
        };
        state
            .rooms
            .broadcast(&state.registry, room, &event.payload(), None)
            .await;
    }

    /// Remove a pin. Unpinning something that is not pinned is a no-op and
    /// nothing is broadcast.
    pub async fn unpin(state: &AppState, room: RoomKey, message_id: Uuid, user_id: Uuid) {
        let rows = match state
            .storage
            .execute(
                "DELETE FROM pinned_messages WHERE message_id = $1 RETURNING message_id",
                &[SqlParam::from(message_id)],
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, message_id = %message_id, "failed to remove pin");
                return;
            }
        };
        if rows.is_empty() {
            tracing::debug!(message_id = %message_id, user_id = %user_id, "unpin of unpinned message ignored");
            return;
        }

        let event = ServerEvent::MessageUnpinned { room, message_id };
        state
            .rooms
            .broadcast(&state.registry, room, &event.payload(), None)
            .await;
    }

    async fn load_message(state: &AppState, room: RoomKey, message_id: Uuid) -> Option<Message> {
        let rows = state
            .storage
            .execute(
                "SELECT id, sender_id, sender_name, content, message_type, reply_to, \
                        revoked, edited_at, reactions, is_forwarded, created_at \
                 FROM messages WHERE id = $1",
                &[SqlParam::from(message_id)],
            )
            .await;
        match rows {
            Ok(rows) => rows.first().and_then(|row| Message::from_row(room, row)),
            Err(e) => {
                tracing::warn!(error = %e, message_id = %message_id, "failed to load pin target");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Row;
    use crate::testing;
    use serde_json::json;

    fn message_row(message_id: Uuid, sender: Uuid) -> Row {
        Row::from_json(json!({
            "id": message_id,
            "sender_id": sender,
            "sender_name": "Anna",
            "content": "pin me",
            "message_type": "text",
            "revoked": false,
            "reactions": {},
            "is_forwarded": false,
            "created_at": "2026-08-29T08:00:00Z",
        }))
    }

    #[tokio::test]
    async fn pin_upserts_and_broadcasts_the_full_message() {
        let (state, storage, _push) = testing::state();
        let room = RoomKey::Group(Uuid::new_v4());
        let (origin, mut origin_rx) = testing::connect(&state).await;
        let (member, mut member_rx) = testing::connect(&state).await;
        state.rooms.join(origin, room).await;
        state.rooms.join(member, room).await;

        let message_id = Uuid::new_v4();
        let pinner = Uuid::new_v4();
        storage.push_rows(vec![message_row(message_id, Uuid::new_v4())]);

        PinService::pin(&state, room, message_id, pinner).await;

        let evt = testing::next_event(&mut member_rx);
        assert_eq!(evt["type"], "message-pinned");
        assert_eq!(evt["pinned_by"], json!(pinner));
        assert_eq!(evt["message"]["content"], "pin me");
        assert_eq!(evt["message"]["group_id"], json!(room.id()));
        assert_eq!(testing::next_event(&mut origin_rx)["type"], "message-pinned");

        let upsert = &storage.calls_matching("INSERT INTO pinned_messages")[0];
        assert!(upsert.query.contains("ON CONFLICT (message_id)"));
    }

    #[tokio::test]
    async fn pin_of_missing_message_is_dropped() {
        let (state, storage, _push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (origin, mut rx) = testing::connect(&state).await;
        state.rooms.join(origin, room).await;

        storage.push_rows(vec![]);
        PinService::pin(&state, room, Uuid::new_v4(), Uuid::new_v4()).await;

        assert!(rx.try_recv().is_err());
        assert!(storage.calls_matching("INSERT INTO pinned_messages").is_empty());
    }

    #[tokio::test]
    async fn unpin_broadcasts_only_when_a_pin_existed() {
        let (state, storage, _push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (origin, mut rx) = testing::connect(&state).await;
        state.rooms.join(origin, room).await;

        let message_id = Uuid::new_v4();
        storage.push_rows(vec![Row::from_json(json!({ "message_id": message_id }))]);
        PinService::unpin(&state, room, message_id, Uuid::new_v4()).await;

        let evt = testing::next_event(&mut rx);
        assert_eq!(evt["type"], "message-unpinned");
        assert_eq!(evt["message_id"], json!(message_id));

        // second unpin deletes nothing and stays silent
        storage.push_rows(vec![]);
        PinService::unpin(&state, room, message_id, Uuid::new_v4()).await;
        assert!(rx.try_recv().is_err());
    }
}
