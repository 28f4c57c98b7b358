//! Send-message pipeline: validate, persist, fan out, push, acknowledge.

use crate::error::AppResult;
use crate::models::{Message, MessageType, ReactionMap, RoomKey};
use crate::state::AppState;
use crate::storage::SqlParam;
use crate::websocket::events::{SendMessage, ServerEvent};
use crate::websocket::ConnectionId;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

/// Hard cut for push bodies, counted in characters; longer text gets a
/// literal "..." suffix with no word-boundary awareness.
pub const PUSH_BODY_MAX: usize = 100;

pub(crate) const PUSH_BODY_IMAGE: &str = "\u{1f4f7} Sent a photo";
const PUSH_BODY_STICKER: &str = "\u{1f60a} Sent a sticker";
const PUSH_BODY_VIDEO: &str = "\u{1f3a5} Sent a video";

pub struct MessageRouter;

impl MessageRouter {
    pub async fn send(state: &AppState, origin: ConnectionId, request: SendMessage) {
        let Some(room) = RoomKey::resolve(request.conversation_id, request.group_id) else {
            tracing::warn!(sender_id = %request.sender_id, "send-message without a resolvable room key");
            return;
        };
        if request.message_type == MessageType::Text && request.message.trim().is_empty() {
            tracing::warn!(sender_id = %request.sender_id, "dropping empty text message");
            return;
        }

        // Sending always ends the sender's typing session.
        state
            .typing
            .clear_on_send(state, room, request.sender_id, request.receiver_id)
            .await;

        let message = match Self::persist(state, room, &request).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, sender_id = %request.sender_id, room = %room, "message persist failed");
                let event = ServerEvent::MessageError {
                    temp_id: request.temp_id.clone(),
                    error: "failed to persist message".to_string(),
                };
                state.registry.send_to(origin, &event.payload()).await;
                return;
            }
        };

        let received = ServerEvent::MessageReceived {
            message: message.clone(),
        };
        state
            .rooms
            .broadcast(&state.registry, room, &received.payload(), Some(origin))
            .await;

        // the ack goes out before the push leg so a slow gateway never
        // delays the sender's reconciliation
        let ack = ServerEvent::MessageSent {
            temp_id: request.temp_id.clone(),
            message_id: message.id,
            created_at: message.created_at,
        };
        state.registry.send_to(origin, &ack.payload()).await;

        if let (RoomKey::Conversation(_), Some(receiver_id)) = (room, request.receiver_id) {
            Self::push_if_offline(state, &request, &message, receiver_id).await;
        }
    }

    async fn persist(
        state: &AppState,
        room: RoomKey,
        request: &SendMessage,
    ) -> AppResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            room,
            sender_id: request.sender_id,
            sender_name: request.sender_name.clone(),
            content: request.message.clone(),
            message_type: request.message_type,
            reply_to: request.reply_to.clone(),
            revoked: false,
            edited_at: None,
            reactions: ReactionMap::new(),
            is_forwarded: false,
            created_at: Utc::now(),
        };

        let reply_to = message
            .reply_to
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok())
            .map(SqlParam::Json)
            .unwrap_or(SqlParam::Null);

        state
            .storage
            .execute(
                "INSERT INTO messages \
                 (id, conversation_id, group_id, sender_id, sender_name, content, \
                  message_type, reply_to, reactions, is_forwarded, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    SqlParam::from(message.id),
                    SqlParam::from(request.conversation_id),
                    SqlParam::from(request.group_id),
                    SqlParam::from(message.sender_id),
                    SqlParam::from(message.sender_name.clone()),
                    SqlParam::from(message.content.clone()),
                    SqlParam::from(message.message_type.as_str()),
                    reply_to,
                    SqlParam::Json(message.reactions.as_value()),
                    SqlParam::from(false),
                    SqlParam::from(message.created_at),
                ],
            )
            .await?;

        Ok(message)
    }

    /// Offline gating happens as close as possible to the dispatch point; a
    /// recipient reconnecting in between costs one redundant push at worst.
    async fn push_if_offline(
        state: &AppState,
        request: &SendMessage,
        message: &Message,
        receiver_id: Uuid,
    ) {
        if state.registry.is_online(receiver_id).await {
            return;
        }
        let body = Self::push_summary(request.message_type, &request.message);
        let data = json!({
            "message_id": message.id,
            "conversation_id": message.room.id(),
            "sender_id": message.sender_id,
        });
        match state
            .push
            .deliver(&[receiver_id], &request.sender_name, &body, data)
            .await
        {
            Ok(tickets) => {
                tracing::debug!(receiver_id = %receiver_id, tickets = tickets.len(), "offline push dispatched")
            }
            Err(e) => {
                tracing::warn!(error = %e, receiver_id = %receiver_id, "offline push failed")
            }
        }
    }

    /// Type-specific push body; non-media types fall through to the raw text.
    pub(crate) fn push_summary(message_type: MessageType, text: &str) -> String {
        match message_type {
            MessageType::Image => PUSH_BODY_IMAGE.to_string(),
            MessageType::Sticker => PUSH_BODY_STICKER.to_string(),
            MessageType::Video => PUSH_BODY_VIDEO.to_string(),
            _ => Self::truncate_body(text),
        }
    }

    fn truncate_body(text: &str) -> String {
        if text.chars().count() <= PUSH_BODY_MAX {
            return text.to_string();
        }
        let mut cut: String = text.chars().take(PUSH_BODY_MAX).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::ReplyRef;
    use crate::testing;

    fn request(room: RoomKey, receiver: Option<Uuid>) -> SendMessage {
        let (conversation_id, group_id) = match room {
            RoomKey::Conversation(id) => (Some(id), None),
            RoomKey::Group(id) => (None, Some(id)),
        };
        SendMessage {
            conversation_id,
            group_id,
            sender_id: Uuid::new_v4(),
            sender_name: "Anna".to_string(),
            receiver_id: receiver,
            message: "hello there".to_string(),
            message_type: MessageType::Text,
            temp_id: "tmp-42".to_string(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn delivers_to_room_and_acks_sender() {
        let (state, storage, _push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (sender, mut sender_rx) = testing::connect(&state).await;
        let (member, mut member_rx) = testing::connect(&state).await;
        state.rooms.join(sender, room).await;
        state.rooms.join(member, room).await;

        let req = request(room, None);
        MessageRouter::send(&state, sender, req.clone()).await;

        let received = testing::next_event(&mut member_rx);
        assert_eq!(received["type"], "message-received");
        assert_eq!(received["message"]["content"], "hello there");

        let ack = testing::next_event(&mut sender_rx);
        assert_eq!(ack["type"], "message-sent");
        assert_eq!(ack["temp_id"], "tmp-42");
        assert!(ack.get("message_id").is_some());
        // the sender got no echo of the message itself
        assert!(sender_rx.try_recv().is_err());

        assert_eq!(storage.calls_matching("INSERT INTO messages").len(), 1);
    }

    #[tokio::test]
    async fn persist_failure_surfaces_error_to_sender_only() {
        let (state, storage, push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (sender, mut sender_rx) = testing::connect(&state).await;
        let (member, mut member_rx) = testing::connect(&state).await;
        state.rooms.join(sender, room).await;
        state.rooms.join(member, room).await;

        storage.push_error(AppError::Database("insert failed".into()));
        MessageRouter::send(&state, sender, request(room, Some(Uuid::new_v4()))).await;

        let err = testing::next_event(&mut sender_rx);
        assert_eq!(err["type"], "message-error");
        assert_eq!(err["temp_id"], "tmp-42");
        assert!(sender_rx.try_recv().is_err()); // no ack either
        assert!(member_rx.try_recv().is_err()); // nothing broadcast
        assert!(push.deliveries().is_empty());
    }

    #[tokio::test]
    async fn offline_recipient_gets_exactly_one_push_with_literal_text() {
        let (state, _storage, push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (sender, _rx) = testing::connect(&state).await;
        let receiver = Uuid::new_v4();

        MessageRouter::send(&state, sender, request(room, Some(receiver))).await;

        let deliveries = push.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].user_ids, vec![receiver]);
        assert_eq!(deliveries[0].title, "Anna");
        assert_eq!(deliveries[0].body, "hello there");
    }

    #[tokio::test]
    async fn ack_is_not_gated_on_the_push_leg() {
        let (state, _storage, push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (sender, mut sender_rx) = testing::connect(&state).await;

        push.fail_next();
        MessageRouter::send(&state, sender, request(room, Some(Uuid::new_v4()))).await;

        let ack = testing::next_event(&mut sender_rx);
        assert_eq!(ack["type"], "message-sent");
        assert!(push.deliveries().is_empty());
    }

    #[tokio::test]
    async fn online_recipient_gets_no_push() {
        let (state, _storage, push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (sender, _rx) = testing::connect(&state).await;
        let receiver = Uuid::new_v4();
        let (receiver_conn, _receiver_rx) = testing::connect(&state).await;
        state.registry.bind(receiver_conn, receiver).await;

        MessageRouter::send(&state, sender, request(room, Some(receiver))).await;

        assert!(push.deliveries().is_empty());
    }

    #[tokio::test]
    async fn image_push_uses_type_summary() {
        let (state, _storage, push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (sender, _rx) = testing::connect(&state).await;
        let mut req = request(room, Some(Uuid::new_v4()));
        req.message_type = MessageType::Image;
        req.message = "https://cdn.example/img.jpg".to_string();

        MessageRouter::send(&state, sender, req).await;

        assert_eq!(push.deliveries()[0].body, PUSH_BODY_IMAGE);
    }

    #[tokio::test]
    async fn empty_text_is_dropped_without_side_effects() {
        let (state, storage, _push) = testing::state();
        let room = RoomKey::Conversation(Uuid::new_v4());
        let (sender, mut rx) = testing::connect(&state).await;
        let mut req = request(room, None);
        req.message = "   ".to_string();

        MessageRouter::send(&state, sender, req).await;

        assert!(rx.try_recv().is_err());
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn reply_reference_is_persisted() {
        let (state, storage, _push) = testing::state();
        let room = RoomKey::Group(Uuid::new_v4());
        let (sender, _rx) = testing::connect(&state).await;
        let mut req = request(room, None);
        req.reply_to = Some(ReplyRef {
            message_id: Uuid::new_v4(),
            excerpt: "original text".to_string(),
        });

        MessageRouter::send(&state, sender, req).await;

        let call = &storage.calls_matching("INSERT INTO messages")[0];
        let reply = call.params[7].as_json().expect("reply_to bound as json");
        assert_eq!(reply["excerpt"], "original text");
    }

    #[test]
    fn body_truncation_is_a_hard_cut() {
        let long = "a".repeat(150);
        let summary = MessageRouter::push_summary(MessageType::Text, &long);
        assert_eq!(summary.chars().count(), PUSH_BODY_MAX + 3);
        assert!(summary.ends_with("..."));

        let exact = "b".repeat(PUSH_BODY_MAX);
        assert_eq!(MessageRouter::push_summary(MessageType::Text, &exact), exact);
    }
}
