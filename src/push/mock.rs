//! Recording push double used by router tests.

use crate::error::{AppError, AppResult};
use crate::push::{PushProvider, PushTicket};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RecordedPush {
    pub user_ids: Vec<Uuid>,
    pub title: String,
    pub body: String,
    pub data: Value,
}

#[derive(Default)]
pub struct MockPush {
    deliveries: Mutex<Vec<RecordedPush>>,
    fail_next: Mutex<bool>,
}

impl MockPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn deliveries(&self) -> Vec<RecordedPush> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushProvider for MockPush {
    async fn deliver(
        &self,
        user_ids: &[Uuid],
        title: &str,
        body: &str,
        data: Value,
    ) -> AppResult<Vec<PushTicket>> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(AppError::Push("gateway unavailable".into()));
        }
        self.deliveries.lock().unwrap().push(RecordedPush {
            user_ids: user_ids.to_vec(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        });
        Ok(user_ids
            .iter()
            .map(|id| PushTicket {
                user_id: *id,
                token: format!("mock-token-{id}"),
                accepted: true,
                error: None,
            })
            .collect())
    }
}
