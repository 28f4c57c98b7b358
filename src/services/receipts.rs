//! Read receipts: seen marks and group reader queries.

use crate::models::RoomKey;
use crate::state::AppState;
use crate::storage::SqlParam;
use crate::websocket::events::{ReaderEntry, SeenReader, ServerEvent};
use crate::websocket::ConnectionId;
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

pub struct ReceiptService;

impl ReceiptService {
    /// Record that `user_id` has seen a message and tell the other side.
    /// The write is idempotent, so replays from a reconnecting client keep
    /// the original seen_at. The ack still goes out when the write fails;
    /// receipts are a realtime hint, not a ledger.
    pub async fn mark_seen(
        state: &AppState,
        origin: ConnectionId,
        room: RoomKey,
        message_id: Uuid,
        user_id: Uuid,
        partner_id: Option<Uuid>,
    ) {
        let seen_at = Utc::now();
        let result = state
            .storage
            .execute(
                "INSERT INTO message_reads (message_id, user_id, seen_at) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (message_id, user_id) DO NOTHING",
                &[
                    SqlParam::from(message_id),
                    SqlParam::from(user_id),
                    SqlParam::from(seen_at),
                ],
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, message_id = %message_id, "failed to persist read receipt");
        }

        let event = ServerEvent::MessageSeenAck {
            message_id,
            reader_id: user_id,
            seen_at,
        };
        let payload = event.payload();
        match (room, partner_id) {
            (RoomKey::Conversation(_), Some(partner)) => {
                state.registry.send_to_user(partner, &payload).await;
            }
            _ => {
                state
                    .rooms
                    .broadcast(&state.registry, room, &payload, Some(origin))
                    .await;
            }
        }
    }

    /// Answer a batch reader query for a group. The reply keeps the order of
    /// the requested ids and lists an empty reader set for unseen messages;
    /// the requester's own reads are omitted.
    pub async fn query_readers(
        state: &AppState,
        requester: ConnectionId,
        group_id: Uuid,
        message_ids: Vec<Uuid>,
        user_id: Uuid,
    ) {
        let rows = match state
            .storage
            .execute(
                "SELECT message_id, user_id, seen_at FROM message_reads \
                 WHERE message_id = ANY($1) AND user_id <> $2 \
                 ORDER BY seen_at ASC",
                &[
                    SqlParam::UuidArray(message_ids.clone()),
                    SqlParam::from(user_id),
                ],
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, group_id = %group_id, "reader query failed");
                return;
            }
        };

        let mut readers: HashMap<Uuid, Vec<SeenReader>> = HashMap::new();
        for row in &rows {
            let (Some(message_id), Some(reader_id), Some(seen_at)) = (
                row.uuid("message_id"),
                row.uuid("user_id"),
                row.timestamp("seen_at"),
            ) else {
                continue;
            };
            readers.entry(message_id).or_default().push(SeenReader {
                user_id: reader_id,
                seen_at,
            });
        }

        let entries = message_ids
            .into_iter()
            .map(|message_id| ReaderEntry {
                message_id,
                readers: readers.remove(&message_id).unwrap_or_default(),
            })
            .collect();

        let event = ServerEvent::MessageReaders { group_id, entries };
        state.registry.send_to(requester, &event.payload()).await;
    }
}
