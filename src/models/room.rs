use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broadcast-room key: every conversation or group maps to exactly one room.
///
/// Callers resolve the two optional wire fields into this enum once, at the
/// protocol boundary; everything past that point carries the tagged key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKey {
    #[serde(rename = "conversation_id")]
    Conversation(Uuid),
    #[serde(rename = "group_id")]
    Group(Uuid),
}

impl RoomKey {
    /// Resolve a room key from the wire payload. Exactly one of the two ids
    /// must be set; anything else is unresolvable.
    pub fn resolve(conversation_id: Option<Uuid>, group_id: Option<Uuid>) -> Option<Self> {
        match (conversation_id, group_id) {
            (Some(id), None) => Some(RoomKey::Conversation(id)),
            (None, Some(id)) => Some(RoomKey::Group(id)),
            _ => None,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            RoomKey::Conversation(id) | RoomKey::Group(id) => *id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, RoomKey::Group(_))
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKey::Conversation(id) => write!(f, "conversation:{id}"),
            RoomKey::Group(id) => write!(f, "group:{id}"),
        }
    }
}
