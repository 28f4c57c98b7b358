use crate::models::{Message, MessageType, ReactionMap, ReplyRef, RoomKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound events, client to server. The `type` tag carries the event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "announce-online")]
    AnnounceOnline { user_id: Uuid },

    #[serde(rename = "announce-offline")]
    AnnounceOffline { user_id: Uuid },

    #[serde(rename = "query-user-status")]
    QueryUserStatus { user_id: Uuid },

    #[serde(rename = "set-typing")]
    SetTyping {
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        #[serde(default)]
        partner_id: Option<Uuid>,
        user_id: Uuid,
        is_typing: bool,
    },

    #[serde(rename = "join-room")]
    JoinRoom {
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
    },

    #[serde(rename = "leave-room")]
    LeaveRoom {
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
    },

    #[serde(rename = "mark-seen")]
    MarkSeen {
        message_id: Uuid,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        user_id: Uuid,
        #[serde(default)]
        partner_id: Option<Uuid>,
    },

    /// Group read-receipt batch: who has seen each of these messages.
    #[serde(rename = "query-message-readers")]
    QueryMessageReaders {
        group_id: Uuid,
        message_ids: Vec<Uuid>,
        user_id: Uuid,
    },

    #[serde(rename = "revoke-message")]
    RevokeMessage {
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        message_id: Uuid,
        user_id: Uuid,
    },

    #[serde(rename = "add-reaction")]
    AddReaction {
        message_id: Uuid,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        user_id: Uuid,
        #[serde(default)]
        display_name: Option<String>,
        emoji: String,
    },

    /// Without an emoji this is a generic un-react: the user is stripped
    /// from every bucket on the message.
    #[serde(rename = "remove-reaction")]
    RemoveReaction {
        message_id: Uuid,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        user_id: Uuid,
        #[serde(default)]
        emoji: Option<String>,
    },

    #[serde(rename = "pin-message")]
    PinMessage {
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        message_id: Uuid,
        user_id: Uuid,
    },

    #[serde(rename = "unpin-message")]
    UnpinMessage {
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        message_id: Uuid,
        user_id: Uuid,
    },

    #[serde(rename = "send-message")]
    SendMessage(SendMessage),

    #[serde(rename = "forward-message")]
    ForwardMessage {
        original_message: Message,
        #[serde(default)]
        target_conversation_ids: Vec<Uuid>,
        #[serde(default)]
        target_group_ids: Vec<Uuid>,
        sender_id: Uuid,
        #[serde(default)]
        sender_name: Option<String>,
    },
}

/// Payload of a `send-message` event. The client supplies a `temp_id` so the
/// sent ack can be correlated with its optimistic local copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    pub sender_id: Uuid,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub receiver_id: Option<Uuid>,
    pub message: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub temp_id: String,
    #[serde(default)]
    pub reply_to: Option<ReplyRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenReader {
    pub user_id: Uuid,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderEntry {
    pub message_id: Uuid,
    pub readers: Vec<SeenReader>,
}

/// Per-target outcome inside a forward batch report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardOutcome {
    #[serde(flatten)]
    pub room: RoomKey,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outbound events, server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "user-status-changed")]
    UserStatusChanged {
        user_id: Uuid,
        status: PresenceStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },

    #[serde(rename = "user-typing")]
    UserTyping {
        #[serde(flatten)]
        room: RoomKey,
        user_id: Uuid,
        is_typing: bool,
    },

    #[serde(rename = "message-seen-ack")]
    MessageSeenAck {
        message_id: Uuid,
        reader_id: Uuid,
        seen_at: DateTime<Utc>,
    },

    #[serde(rename = "message-readers")]
    MessageReaders {
        group_id: Uuid,
        entries: Vec<ReaderEntry>,
    },

    #[serde(rename = "message-revoked")]
    MessageRevoked {
        #[serde(flatten)]
        room: RoomKey,
        message_id: Uuid,
    },

    #[serde(rename = "message-reacted")]
    MessageReacted {
        message_id: Uuid,
        reactions: ReactionMap,
    },

    #[serde(rename = "message-pinned")]
    MessagePinned {
        message: Message,
        pinned_by: Uuid,
    },

    #[serde(rename = "message-unpinned")]
    MessageUnpinned {
        #[serde(flatten)]
        room: RoomKey,
        message_id: Uuid,
    },

    #[serde(rename = "message-received")]
    MessageReceived { message: Message },

    /// Forwarded copies arrive under their own event name so REST-inserted
    /// messages are not double-counted by realtime clients.
    #[serde(rename = "forwarded-message-received")]
    ForwardedMessageReceived { message: Message },

    #[serde(rename = "message-sent")]
    MessageSent {
        temp_id: String,
        message_id: Uuid,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "message-error")]
    MessageError { temp_id: String, error: String },

    #[serde(rename = "forward-success")]
    ForwardSuccess {
        results: Vec<ForwardOutcome>,
        count: usize,
    },

    #[serde(rename = "forward-error")]
    ForwardError { error: String },
}

impl ServerEvent {
    /// Wire payload for this event. Serialization of these enums only fails
    /// on pathological payloads; that case is logged and an empty object is
    /// sent rather than tearing down the connection.
    pub fn payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize server event");
            "{}".to_string()
        })
    }
}
