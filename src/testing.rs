//! Shared helpers for in-crate service tests.

use crate::config::Config;
use crate::push::mock::MockPush;
use crate::state::AppState;
use crate::storage::mock::MockStorage;
use crate::websocket::ConnectionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

pub fn config() -> Config {
    Config {
        port: 0,
        database_url: "postgres://test".to_string(),
        push_endpoint: "http://push-gateway.test/v1/send".to_string(),
        typing_idle: Duration::from_millis(2000),
        heartbeat_interval: Duration::from_secs(5),
        client_timeout: Duration::from_secs(30),
    }
}

/// Fresh AppState wired to recording doubles.
pub fn state() -> (AppState, Arc<MockStorage>, Arc<MockPush>) {
    let storage = MockStorage::new();
    let push = MockPush::new();
    let state = AppState::new(storage.clone(), push.clone(), Arc::new(config()));
    (state, storage, push)
}

/// Register a fake connection and hand back its outbound receiver.
pub async fn connect(state: &AppState) -> (ConnectionId, UnboundedReceiver<String>) {
    let connection_id = ConnectionId::new();
    let (tx, rx) = unbounded_channel();
    state.registry.register(connection_id, tx).await;
    (connection_id, rx)
}

/// Pop the next outbound event as parsed JSON; panics if none is queued.
pub fn next_event(rx: &mut UnboundedReceiver<String>) -> serde_json::Value {
    let raw = rx.try_recv().expect("expected an outbound event");
    serde_json::from_str(&raw).expect("outbound event is valid JSON")
}

/// Drain every queued outbound event.
pub fn drain_events(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        events.push(serde_json::from_str(&raw).expect("outbound event is valid JSON"));
    }
    events
}
