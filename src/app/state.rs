//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::lobby::{LobbyHandle, LobbyService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobby: LobbyHandle,
}

impl AppState {
    /// Spawn the lobby task and wrap its handle. Must run inside a tokio runtime.
    pub fn new(config: Config) -> Self {
        let lobby = LobbyService::spawn(&config);
        Self::with_lobby(config, lobby)
    }

    pub fn with_lobby(config: Config, lobby: LobbyHandle) -> Self {
        Self {
            config: Arc::new(config),
            lobby,
        }
    }
}
