use crate::models::room::RoomKey;
use crate::storage::Row;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Sticker,
    File,
    Location,
    System,
    CallMissed,
    CallEnded,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Sticker => "sticker",
            MessageType::File => "file",
            MessageType::Location => "location",
            MessageType::System => "system",
            MessageType::CallMissed => "call_missed",
            MessageType::CallEnded => "call_ended",
        }
    }

    pub fn from_str(s: &str) -> Self {
        serde_json::from_value(Value::String(s.to_string())).unwrap_or_default()
    }
}

/// Reference to a quoted message: id plus a short excerpt for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: Uuid,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reactor {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Emoji -> ordered reactor list, serialized as a JSON object column.
///
/// Insertion order is preserved end to end (serde_json is built with
/// `preserve_order`); the order in which emoji buckets appear is user-visible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionMap(Map<String, Value>);

impl ReactionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set the user's active reaction. A user holds at most one reaction per
    /// message, so they are stripped from every existing bucket first.
    pub fn set(&mut self, emoji: &str, user_id: Uuid, display_name: &str) {
        self.remove(user_id, None);
        let reactor = json!(Reactor {
            user_id,
            display_name: display_name.to_string(),
        });
        match self.0.get_mut(emoji) {
            Some(Value::Array(bucket)) => bucket.push(reactor),
            _ => {
                self.0.insert(emoji.to_string(), Value::Array(vec![reactor]));
            }
        }
    }

    /// Remove the user's reaction. With an emoji, only that bucket is
    /// touched; without one, the user is stripped from every bucket.
    pub fn remove(&mut self, user_id: Uuid, emoji: Option<&str>) {
        let user = user_id.to_string();
        let strip = |bucket: &mut Value| {
            if let Value::Array(reactors) = bucket {
                reactors.retain(|r| r.get("user_id").and_then(Value::as_str) != Some(user.as_str()));
            }
        };
        match emoji {
            Some(e) => {
                if let Some(bucket) = self.0.get_mut(e) {
                    strip(bucket);
                }
            }
            None => {
                for bucket in self.0.values_mut() {
                    strip(bucket);
                }
            }
        }
        self.0
            .retain(|_, bucket| !matches!(bucket, Value::Array(b) if b.is_empty()));
    }

    pub fn has(&self, emoji: &str, user_id: Uuid) -> bool {
        let user = user_id.to_string();
        self.0
            .get(emoji)
            .and_then(Value::as_array)
            .map(|bucket| {
                bucket
                    .iter()
                    .any(|r| r.get("user_id").and_then(Value::as_str) == Some(user.as_str()))
            })
            .unwrap_or(false)
    }

    pub fn emojis(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// Persisted message as the core reads and broadcasts it. The row schema is
/// owned by the storage collaborator; this mirrors the columns the core uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(flatten)]
    pub room: RoomKey,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reactions: ReactionMap,
    #[serde(default)]
    pub is_forwarded: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Rebuild a message from a storage row. Returns None if the row is
    /// missing any required column.
    pub fn from_row(room: RoomKey, row: &Row) -> Option<Self> {
        Some(Self {
            id: row.uuid("id")?,
            room,
            sender_id: row.uuid("sender_id")?,
            sender_name: row.text("sender_name").unwrap_or_default().to_string(),
            content: row.text("content").unwrap_or_default().to_string(),
            message_type: row
                .text("message_type")
                .map(MessageType::from_str)
                .unwrap_or_default(),
            reply_to: row
                .json("reply_to")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            revoked: row.bool("revoked").unwrap_or(false),
            edited_at: row.timestamp("edited_at"),
            reactions: row
                .json("reactions")
                .cloned()
                .map(ReactionMap::from_value)
                .unwrap_or_default(),
            is_forwarded: row.bool("is_forwarded").unwrap_or(false),
            created_at: row.timestamp("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn one_active_reaction_per_user() {
        let u = user();
        let mut map = ReactionMap::new();
        map.set("\u{2764}\u{fe0f}", u, "Anna");
        map.set("\u{1f44d}", u, "Anna");

        assert!(!map.has("\u{2764}\u{fe0f}", u));
        assert!(map.has("\u{1f44d}", u));
        assert_eq!(map.emojis(), vec!["\u{1f44d}"]);
    }

    #[test]
    fn remove_without_emoji_strips_everywhere() {
        let (a, b) = (user(), user());
        let mut map = ReactionMap::new();
        map.set("\u{1f602}", a, "Anna");
        map.set("\u{1f602}", b, "Ben");
        map.remove(a, None);

        assert!(!map.has("\u{1f602}", a));
        assert!(map.has("\u{1f602}", b));
    }

    #[test]
    fn empty_buckets_are_dropped() {
        let u = user();
        let mut map = ReactionMap::new();
        map.set("\u{1f389}", u, "Anna");
        map.remove(u, Some("\u{1f389}"));
        assert!(map.is_empty());
    }

    #[test]
    fn bucket_order_is_insertion_order() {
        let mut map = ReactionMap::new();
        map.set("\u{1f44d}", user(), "Anna");
        map.set("\u{2764}\u{fe0f}", user(), "Ben");
        map.set("\u{1f602}", user(), "Cleo");
        assert_eq!(
            map.emojis(),
            vec!["\u{1f44d}", "\u{2764}\u{fe0f}", "\u{1f602}"]
        );

        let round_trip: ReactionMap =
            serde_json::from_str(&serde_json::to_string(&map).unwrap()).unwrap();
        assert_eq!(round_trip.emojis(), map.emojis());
    }

    #[test]
    fn message_type_wire_names() {
        assert_eq!(MessageType::CallMissed.as_str(), "call_missed");
        assert_eq!(MessageType::from_str("sticker"), MessageType::Sticker);
        // Unknown types degrade to text rather than failing the row.
        assert_eq!(MessageType::from_str("hologram"), MessageType::Text);
    }
}
