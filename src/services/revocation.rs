//! Message revocation. Only the sender may revoke, the content is blanked in
//! place, and the broadcast fires at most once per message no matter how many
//! times the client retries.

use crate::error::{AppError, AppResult};
use crate::models::RoomKey;
use crate::state::AppState;
use crate::storage::SqlParam;
use crate::websocket::events::ServerEvent;
use uuid::Uuid;

pub struct RevocationService;

impl RevocationService {
    pub async fn revoke(
        state: &AppState,
        room: RoomKey,
        message_id: Uuid,
        user_id: Uuid,
    ) {
        match Self::try_revoke(state, message_id, user_id).await {
            Ok(()) => {
                let event = ServerEvent::MessageRevoked { room, message_id };
                state
                    .rooms
                    .broadcast(&state.registry, room, &event.payload(), None)
                    .await;
            }
            Err(AppError::AlreadyRevoked(_)) => {
                tracing::debug!(message_id = %message_id, "revoke replay ignored");
            }
            Err(e) => {
                // covers both "no such message" and "not the sender"; the
                // requester learns nothing either way
                tracing::warn!(error = %e, message_id = %message_id, user_id = %user_id, "revoke rejected");
            }
        }
    }

    /// Guarded update: the WHERE clause enforces ownership and first-revoke
    /// in one statement, so concurrent revokes race safely in the database.
    /// The type degrades to text along with the content, so a revoked image
    /// or sticker row never reads back as media.
    async fn try_revoke(state: &AppState, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let rows = state
            .storage
            .execute(
                "UPDATE messages SET revoked = TRUE, content = '', message_type = 'text' \
                 WHERE id = $1 AND sender_id = $2 AND revoked = FALSE \
                 RETURNING id",
                &[SqlParam::from(message_id), SqlParam::from(user_id)],
            )
            .await?;
        if !rows.is_empty() {
            return Ok(());
        }

        let check = state
            .storage
            .execute(
                "SELECT revoked FROM messages WHERE id = $1 AND sender_id = $2",
                &[SqlParam::from(message_id), SqlParam::from(user_id)],
            )
            .await?;
        match check.first() {
            Some(row) if row.bool("revoked").unwrap_or(false) => {
                Err(AppError::AlreadyRevoked(message_id))
            }
            Some(_) => Err(AppError::BadRequest("revoke update had no effect".into())),
            None => Err(AppError::NotFound(format!(
                "message {message_id} owned by {user_id}"
            ))),
        }
    }
}
