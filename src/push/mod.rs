//! Push collaborator interface.
//!
//! The router hands a (title, body, data) payload to this trait when a 1:1
//! recipient has no live connection. Delivery is best-effort; the provider
//! reports one ticket per device token it attempted.

use crate::error::AppResult;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

pub mod http;

#[cfg(test)]
pub mod mock;

#[derive(Debug, Clone, PartialEq)]
pub struct PushTicket {
    pub user_id: Uuid,
    pub token: String,
    pub accepted: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn deliver(
        &self,
        user_ids: &[Uuid],
        title: &str,
        body: &str,
        data: Value,
    ) -> AppResult<Vec<PushTicket>>;
}
