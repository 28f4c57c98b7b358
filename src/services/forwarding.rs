//! Message forwarding: materialize an independent copy of a message in each
//! target room. Targets are processed best-effort; one failed copy never
//! blocks the rest, and the origin gets a per-target report at the end.

use crate::error::AppResult;
use crate::models::{Message, ReactionMap, RoomKey};
use crate::services::message_router::MessageRouter;
use crate::state::AppState;
use crate::storage::SqlParam;
use crate::websocket::events::{ForwardOutcome, ServerEvent};
use crate::websocket::ConnectionId;
use chrono::Utc;
use uuid::Uuid;

pub struct ForwardingService;

impl ForwardingService {
    pub async fn forward(
        state: &AppState,
        origin: ConnectionId,
        original: Message,
        target_conversation_ids: Vec<Uuid>,
        target_group_ids: Vec<Uuid>,
        sender_id: Uuid,
        sender_name: Option<String>,
    ) {
        let targets: Vec<RoomKey> = target_conversation_ids
            .into_iter()
            .map(RoomKey::Conversation)
            .chain(target_group_ids.into_iter().map(RoomKey::Group))
            .collect();
        if targets.is_empty() {
            let event = ServerEvent::ForwardError {
                error: "no forward targets".to_string(),
            };
            state.registry.send_to(origin, &event.payload()).await;
            return;
        }

        let sender_name = sender_name.unwrap_or_default();
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            match Self::forward_one(state, origin, &original, target, sender_id, &sender_name)
                .await
            {
                Ok(message_id) => results.push(ForwardOutcome {
                    room: target,
                    ok: true,
                    message_id: Some(message_id),
                    error: None,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, room = %target, "forward target failed");
                    results.push(ForwardOutcome {
                        room: target,
                        ok: false,
                        message_id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let count = results.iter().filter(|r| r.ok).count();
        let event = ServerEvent::ForwardSuccess { results, count };
        state.registry.send_to(origin, &event.payload()).await;
    }

    /// A forwarded copy is a brand-new message owned by the forwarder; it
    /// keeps the content and type of the original but none of its reactions,
    /// reply context, or receipts.
    async fn forward_one(
        state: &AppState,
        origin: ConnectionId,
        original: &Message,
        target: RoomKey,
        sender_id: Uuid,
        sender_name: &str,
    ) -> AppResult<Uuid> {
        // media without a caption gets the type summary as its visible text
        let content = if original.content.trim().is_empty() {
            MessageRouter::push_summary(original.message_type, &original.content)
        } else {
            original.content.clone()
        };
        let copy = Message {
            id: Uuid::new_v4(),
            room: target,
            sender_id,
            sender_name: sender_name.to_string(),
            content,
            message_type: original.message_type,
            reply_to: None,
            revoked: false,
            edited_at: None,
            reactions: ReactionMap::new(),
            is_forwarded: true,
            created_at: Utc::now(),
        };

        let (conversation_id, group_id) = match target {
            RoomKey::Conversation(id) => (Some(id), None),
            RoomKey::Group(id) => (None, Some(id)),
        };
        state
            .storage
            .execute(
                "INSERT INTO messages \
                 (id, conversation_id, group_id, sender_id, sender_name, content, \
                  message_type, reply_to, reactions, is_forwarded, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    SqlParam::from(copy.id),
                    SqlParam::from(conversation_id),
                    SqlParam::from(group_id),
                    SqlParam::from(copy.sender_id),
                    SqlParam::from(copy.sender_name.clone()),
                    SqlParam::from(copy.content.clone()),
                    SqlParam::from(copy.message_type.as_str()),
                    SqlParam::Null,
                    SqlParam::Json(copy.reactions.as_value()),
                    SqlParam::from(true),
                    SqlParam::from(copy.created_at),
                ],
            )
            .await?;

        Self::touch_last_message(state, target, &copy).await;

        let event = ServerEvent::ForwardedMessageReceived {
            message: copy.clone(),
        };
        state
            .rooms
            .broadcast(&state.registry, target, &event.payload(), Some(origin))
            .await;

        Ok(copy.id)
    }

    /// Conversation and group lists sort by their latest message; keep the
    /// pointer current. Failure here is cosmetic and only logged.
    async fn touch_last_message(state: &AppState, target: RoomKey, copy: &Message) {
        let query = match target {
            RoomKey::Conversation(_) => {
                "UPDATE conversations SET last_message_id = $2, last_message_at = $3 WHERE id = $1"
            }
            RoomKey::Group(_) => {
                "UPDATE groups SET last_message_id = $2, last_message_at = $3 WHERE id = $1"
            }
        };
        let result = state
            .storage
            .execute(
                query,
                &[
                    SqlParam::from(target.id()),
                    SqlParam::from(copy.id),
                    SqlParam::from(copy.created_at),
                ],
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, room = %target, "failed to update last-message pointer");
        }
    }
}
