use crate::{
    config::Config,
    push::PushProvider,
    services::typing::TypingTracker,
    storage::Storage,
    websocket::{ConnectionRegistry, RoomManager},
};
use std::sync::Arc;

/// Shared handles passed to every event handler. The registry and room
/// tables are the only mutable shared state in the process; both are mutated
/// solely through their own operations.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub rooms: RoomManager,
    pub typing: TypingTracker,
    pub storage: Arc<dyn Storage>,
    pub push: Arc<dyn PushProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        push: Arc<dyn PushProvider>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomManager::new(),
            typing: TypingTracker::new(config.typing_idle),
            storage,
            push,
            config,
        }
    }
}
