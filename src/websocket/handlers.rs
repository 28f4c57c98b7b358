//! Inbound event dispatch. Frames are parsed and fanned out to the service
//! that owns each event family; anything malformed is logged and dropped so
//! one bad frame never tears down the socket.

use crate::models::RoomKey;
use crate::services::forwarding::ForwardingService;
use crate::services::message_router::MessageRouter;
use crate::services::pins::PinService;
use crate::services::presence::PresenceService;
use crate::services::reactions::ReactionService;
use crate::services::receipts::ReceiptService;
use crate::services::revocation::RevocationService;
use crate::state::AppState;
use crate::websocket::events::ClientEvent;
use crate::websocket::ConnectionId;

pub async fn handle_event(state: &AppState, connection_id: ConnectionId, raw: &str) {
    let event: ClientEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, connection_id = %connection_id, "unparseable client frame");
            return;
        }
    };

    match event {
        ClientEvent::AnnounceOnline { user_id } => {
            PresenceService::announce_online(state, connection_id, user_id).await;
        }
        ClientEvent::AnnounceOffline { user_id } => {
            PresenceService::announce_offline(state, connection_id, user_id).await;
        }
        ClientEvent::QueryUserStatus { user_id } => {
            PresenceService::query_status(state, connection_id, user_id).await;
        }
        ClientEvent::SetTyping {
            conversation_id,
            group_id,
            partner_id,
            user_id,
            is_typing,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "set-typing without a room key");
                return;
            };
            state
                .typing
                .set_typing(state, connection_id, room, user_id, partner_id, is_typing)
                .await;
        }
        ClientEvent::JoinRoom {
            conversation_id,
            group_id,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "join-room without a room key");
                return;
            };
            state.rooms.join(connection_id, room).await;
        }
        ClientEvent::LeaveRoom {
            conversation_id,
            group_id,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "leave-room without a room key");
                return;
            };
            state.rooms.leave(connection_id, room).await;
        }
        ClientEvent::MarkSeen {
            message_id,
            conversation_id,
            group_id,
            user_id,
            partner_id,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "mark-seen without a room key");
                return;
            };
            ReceiptService::mark_seen(state, connection_id, room, message_id, user_id, partner_id)
                .await;
        }
        ClientEvent::QueryMessageReaders {
            group_id,
            message_ids,
            user_id,
        } => {
            ReceiptService::query_readers(state, connection_id, group_id, message_ids, user_id)
                .await;
        }
        ClientEvent::RevokeMessage {
            conversation_id,
            group_id,
            message_id,
            user_id,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "revoke-message without a room key");
                return;
            };
            RevocationService::revoke(state, room, message_id, user_id).await;
        }
        ClientEvent::AddReaction {
            message_id,
            conversation_id,
            group_id,
            user_id,
            display_name,
            emoji,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "add-reaction without a room key");
                return;
            };
            ReactionService::add(state, room, message_id, user_id, display_name, emoji).await;
        }
        ClientEvent::RemoveReaction {
            message_id,
            conversation_id,
            group_id,
            user_id,
            emoji,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "remove-reaction without a room key");
                return;
            };
            ReactionService::remove(state, room, message_id, user_id, emoji).await;
        }
        ClientEvent::PinMessage {
            conversation_id,
            group_id,
            message_id,
            user_id,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "pin-message without a room key");
                return;
            };
            PinService::pin(state, room, message_id, user_id).await;
        }
        ClientEvent::UnpinMessage {
            conversation_id,
            group_id,
            message_id,
            user_id,
        } => {
            let Some(room) = RoomKey::resolve(conversation_id, group_id) else {
                tracing::warn!(connection_id = %connection_id, "unpin-message without a room key");
                return;
            };
            PinService::unpin(state, room, message_id, user_id).await;
        }
        ClientEvent::SendMessage(request) => {
            MessageRouter::send(state, connection_id, request).await;
        }
        ClientEvent::ForwardMessage {
            original_message,
            target_conversation_ids,
            target_group_ids,
            sender_id,
            sender_name,
        } => {
            ForwardingService::forward(
                state,
                connection_id,
                original_message,
                target_conversation_ids,
                target_group_ids,
                sender_id,
                sender_name,
            )
            .await;
        }
    }
}

/// Transport-level teardown for a closed socket.
pub async fn handle_disconnect(state: &AppState, connection_id: ConnectionId) {
    PresenceService::handle_disconnect(state, connection_id).await;
}
