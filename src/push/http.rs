use crate::error::{AppError, AppResult};
use crate::push::{PushProvider, PushTicket};
use crate::storage::{SqlParam, Storage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Gateway batches are capped; larger recipient sets are chunked.
const PUSH_CHUNK_SIZE: usize = 100;
const MAX_TOKEN_LEN: usize = 4096;

/// Push provider talking to an HTTP push gateway.
///
/// Looks up device tokens for the recipients, drops malformed tokens with a
/// rejected ticket, and POSTs the remainder in chunks of [`PUSH_CHUNK_SIZE`].
pub struct HttpPushProvider {
    http: reqwest::Client,
    endpoint: String,
    storage: Arc<dyn Storage>,
}

impl HttpPushProvider {
    pub fn new(endpoint: String, storage: Arc<dyn Storage>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            storage,
        }
    }

    /// A usable device token is non-empty, bounded, and free of whitespace.
    fn token_is_valid(token: &str) -> bool {
        !token.is_empty()
            && token.len() <= MAX_TOKEN_LEN
            && !token.chars().any(char::is_whitespace)
    }

    fn chunks(tokens: &[(Uuid, String)]) -> Vec<&[(Uuid, String)]> {
        tokens.chunks(PUSH_CHUNK_SIZE).collect()
    }

    async fn fetch_tokens(&self, user_ids: &[Uuid]) -> AppResult<Vec<(Uuid, String)>> {
        let rows = self
            .storage
            .execute(
                "SELECT user_id, token FROM push_tokens WHERE user_id = ANY($1)",
                &[SqlParam::from(user_ids.to_vec())],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| Some((r.uuid("user_id")?, r.text("token")?.to_string())))
            .collect())
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn deliver(
        &self,
        user_ids: &[Uuid],
        title: &str,
        body: &str,
        data: Value,
    ) -> AppResult<Vec<PushTicket>> {
        let tokens = self.fetch_tokens(user_ids).await?;
        let mut tickets = Vec::with_capacity(tokens.len());

        let (valid, invalid): (Vec<_>, Vec<_>) = tokens
            .into_iter()
            .partition(|(_, token)| Self::token_is_valid(token));

        for (user_id, token) in invalid {
            tracing::debug!(user_id = %user_id, "skipping malformed push token");
            tickets.push(PushTicket {
                user_id,
                token,
                accepted: false,
                error: Some("invalid push token".to_string()),
            });
        }

        for chunk in Self::chunks(&valid) {
            let payload = json!({
                "to": chunk.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>(),
                "title": title,
                "body": body,
                "data": data,
            });
            let outcome = self
                .http
                .post(&self.endpoint)
                .json(&payload)
                .send()
                .await
                .map_err(|e| AppError::Push(e.to_string()))
                .and_then(|resp| {
                    resp.error_for_status()
                        .map(|_| ())
                        .map_err(|e| AppError::Push(e.to_string()))
                });

            let error = outcome.err().map(|e| e.to_string());
            if let Some(err) = &error {
                tracing::warn!(error = %err, recipients = chunk.len(), "push chunk failed");
            }
            for (user_id, token) in chunk {
                tickets.push(PushTicket {
                    user_id: *user_id,
                    token: token.clone(),
                    accepted: error.is_none(),
                    error: error.clone(),
                });
            }
        }

        Ok(tickets)
    }
}
