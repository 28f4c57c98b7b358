//! Online-presence tracking and broadcast.
//!
//! Presence is best-effort: a failed last-seen write is logged and the
//! status broadcast still goes out. Peers are every distinct user sharing at
//! least one conversation with the subject.

use crate::state::AppState;
use crate::storage::SqlParam;
use crate::websocket::events::{PresenceStatus, ServerEvent};
use crate::websocket::ConnectionId;
use chrono::Utc;
use uuid::Uuid;

pub struct PresenceService;

impl PresenceService {
    /// Bind the calling connection and broadcast the online transition.
    /// Re-announcing from an already-bound connection is harmless; peers just
    /// see a refreshed status event. Announcing a different identity on the
    /// same connection releases the old one, and if that drained its live set
    /// the old user goes offline here.
    pub async fn announce_online(state: &AppState, connection_id: ConnectionId, user_id: Uuid) {
        if let Some(previous) = state.registry.bind(connection_id, user_id).await {
            let last_seen = Utc::now();
            Self::persist_status(state, previous, PresenceStatus::Offline).await;
            Self::broadcast_status(state, previous, PresenceStatus::Offline, Some(last_seen))
                .await;
        }
        Self::persist_status(state, user_id, PresenceStatus::Online).await;
        Self::broadcast_status(state, user_id, PresenceStatus::Online, None).await;
    }

    /// Unbind the calling connection; only the last connection draining the
    /// live set turns the user offline.
    pub async fn announce_offline(state: &AppState, connection_id: ConnectionId, user_id: Uuid) {
        let drained = state.registry.unbind(connection_id, user_id).await;
        if !drained {
            return;
        }
        let last_seen = Utc::now();
        Self::persist_status(state, user_id, PresenceStatus::Offline).await;
        Self::broadcast_status(state, user_id, PresenceStatus::Offline, Some(last_seen)).await;
    }

    /// Transport-level disconnect: clean up everything the connection held.
    pub async fn handle_disconnect(state: &AppState, connection_id: ConnectionId) {
        if let Some(user_id) = state.registry.user_for(connection_id).await {
            Self::announce_offline(state, connection_id, user_id).await;
        }
        state.rooms.leave_all(connection_id).await;
        state.registry.deregister(connection_id).await;
    }

    /// Direct status query, answered to the requester only. Used when a chat
    /// screen opens and cannot wait for the next broadcast.
    pub async fn query_status(state: &AppState, requester: ConnectionId, target_user_id: Uuid) {
        let online = state.registry.is_online(target_user_id).await;
        let (status, last_seen) = if online {
            (PresenceStatus::Online, None)
        } else {
            (PresenceStatus::Offline, Self::stored_last_seen(state, target_user_id).await)
        };
        let event = ServerEvent::UserStatusChanged {
            user_id: target_user_id,
            status,
            last_seen,
        };
        state.registry.send_to(requester, &event.payload()).await;
    }

    async fn persist_status(state: &AppState, user_id: Uuid, status: PresenceStatus) {
        let status_text = match status {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        };
        let result = state
            .storage
            .execute(
                "UPDATE users SET status = $2, last_seen = $3 WHERE id = $1",
                &[
                    SqlParam::from(user_id),
                    SqlParam::from(status_text),
                    SqlParam::from(Utc::now()),
                ],
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, user_id = %user_id, "failed to persist presence, broadcasting anyway");
        }
    }

    async fn stored_last_seen(
        state: &AppState,
        user_id: Uuid,
    ) -> Option<chrono::DateTime<Utc>> {
        match state
            .storage
            .execute(
                "SELECT last_seen FROM users WHERE id = $1",
                &[SqlParam::from(user_id)],
            )
            .await
        {
            Ok(rows) => rows.first().and_then(|r| r.timestamp("last_seen")),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "failed to read last_seen");
                None
            }
        }
    }

    async fn broadcast_status(
        state: &AppState,
        user_id: Uuid,
        status: PresenceStatus,
        last_seen: Option<chrono::DateTime<Utc>>,
    ) {
        let event = ServerEvent::UserStatusChanged {
            user_id,
            status,
            last_seen,
        };
        let payload = event.payload();
        for peer in Self::peer_ids(state, user_id).await {
            state.registry.send_to_user(peer, &payload).await;
        }
    }

    /// Distinct counterpart identities across all of the user's
    /// conversations. Storage failure degrades to an empty peer set.
    async fn peer_ids(state: &AppState, user_id: Uuid) -> Vec<Uuid> {
        let result = state
            .storage
            .execute(
                "SELECT DISTINCT m2.user_id AS user_id \
                 FROM conversation_members m1 \
                 JOIN conversation_members m2 ON m2.conversation_id = m1.conversation_id \
                 WHERE m1.user_id = $1 AND m2.user_id <> $1",
                &[SqlParam::from(user_id)],
            )
            .await;
        match result {
            Ok(rows) => rows.iter().filter_map(|r| r.uuid("user_id")).collect(),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "failed to enumerate peers");
                Vec::new()
            }
        }
    }
}
