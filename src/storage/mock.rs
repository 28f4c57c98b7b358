//! Recording storage double used by service tests.

use crate::error::{AppError, AppResult};
use crate::storage::{Row, SqlParam, Storage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub query: String,
    pub params: Vec<SqlParam>,
}

/// Canned-response storage: queue results with `push_rows`/`push_error`; a
/// call with nothing queued answers with an empty row set.
#[derive(Default)]
pub struct MockStorage {
    responses: Mutex<VecDeque<AppResult<Vec<Row>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(Ok(rows));
    }

    pub fn push_error(&self, error: AppError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.query.contains(needle))
            .collect()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn execute(&self, query: &str, params: &[SqlParam]) -> AppResult<Vec<Row>> {
        self.calls.lock().unwrap().push(RecordedCall {
            query: query.to_string(),
            params: params.to_vec(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
