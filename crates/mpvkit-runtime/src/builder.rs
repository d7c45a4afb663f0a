//! Player Builder API
//!
//! Collects configuration and early log handlers, then brings a handle up in
//! the order the engine requires: options, event loop, log subscription,
//! initialisation.

use crate::event_loop;
use crate::player::{Player, Shared};
use crate::registry::LogHandler;
use mpvkit_core::{DecodePolicy, Engine, LogLevel, MpvError, MpvResult, OptionValue, PlayerConfig};
use std::sync::Arc;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Player Builder
// ----------------------------------------------------------------------------

/// Builder for `Player` handles
#[derive(Default)]
pub struct PlayerBuilder {
    config: PlayerConfig,
    log_handlers: Vec<LogHandler>,
}

impl PlayerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set an engine option applied before initialisation
    pub fn with_option<N: Into<String>, V: Into<OptionValue>>(mut self, name: N, value: V) -> Self {
        self.config = self.config.with_option(name, value);
        self
    }

    /// Set a positional flag (`<flag>=yes`)
    pub fn with_flag<F: Into<String>>(mut self, flag: F) -> Self {
        self.config = self.config.with_flag(flag);
        self
    }

    pub fn with_log_level<L: Into<String>>(mut self, level: L) -> Self {
        self.config = self.config.with_log_level(level);
        self
    }

    /// Install a log handler before the engine starts, so early messages are
    /// not missed
    pub fn with_log_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(LogLevel, &str, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.log_handlers.push(Arc::new(handler));
        self
    }

    /// Re-emit engine log messages through `tracing`
    pub fn forward_engine_logs(mut self, enabled: bool) -> Self {
        self.config.forward_engine_logs = enabled;
        self
    }

    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.config = self.config.with_decode_policy(policy);
        self
    }

    /// Configure `engine`, start the event loop and initialise the engine
    pub fn build(self, engine: Arc<dyn Engine>) -> MpvResult<Player> {
        self.config.validate()?;
        info!(client = %engine.client_name(), "Building player");

        for (name, value) in self.config.engine_options() {
            debug!(option = %name, "Applying engine option");
            if let Err(code) = engine.set_option(&name, &value) {
                engine.destroy();
                return Err(MpvError::Init {
                    option: Some(name),
                    code,
                });
            }
        }

        let wants_logs = self.config.log_level.is_some()
            || self.config.forward_engine_logs
            || !self.log_handlers.is_empty();
        let shared = Arc::new(Shared::new(engine.clone(), self.config));
        for handler in self.log_handlers {
            shared.registry.insert_log_handler(handler);
        }

        let event_thread = match event_loop::spawn(shared.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                engine.destroy();
                return Err(err);
            }
        };
        // From here on, dropping the handle tears everything down
        let player = Player::from_parts(shared, event_thread);

        if wants_logs {
            player.shared.request_log_messages()?;
        }
        player
            .shared
            .engine
            .initialize()
            .map_err(|code| MpvError::Init { option: None, code })?;

        info!(client = %player.client_name(), "Player started successfully");
        Ok(player)
    }
}
