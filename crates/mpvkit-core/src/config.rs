//! Centralized Configuration Management
//!
//! `PlayerConfig` gathers everything a handle needs before the engine is
//! initialised: engine options, positional flags, log forwarding, decoding policy
//! and event loop tuning. It is serde-derived so it can be loaded from TOML.

use crate::codec::DecodePolicy;
use crate::errors::{MpvError, MpvResult};
use crate::node::Node;
use crate::types::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ----------------------------------------------------------------------------
// Option Values
// ----------------------------------------------------------------------------

/// Value of an engine option as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<OptionValue>),
}

impl OptionValue {
    /// Engine form of the value. Booleans are spelled `yes`/`no`.
    pub fn to_node(&self) -> Node {
        match self {
            OptionValue::Bool(b) => Node::string(if *b { "yes" } else { "no" }),
            OptionValue::Int(i) => Node::Int64(*i),
            OptionValue::Float(f) => Node::Double(*f),
            OptionValue::Str(s) => Node::string(s),
            OptionValue::List(items) => Node::Array(items.iter().map(OptionValue::to_node).collect()),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

impl From<f64> for OptionValue {
    fn from(f: f64) -> Self {
        OptionValue::Float(f)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Str(s)
    }
}

// ----------------------------------------------------------------------------
// Event Loop Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Name of the event loop thread
    pub thread_name: String,
    /// Upper bound for a single blocking `wait_event` call
    pub wait_timeout_ms: u64,
    /// Callback failures kept when nobody claims them
    pub max_callback_errors: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            thread_name: "mpv-event-loop".to_string(),
            wait_timeout_ms: 1000,
            max_callback_errors: 64,
        }
    }
}

impl EventLoopConfig {
    pub fn testing() -> Self {
        Self {
            wait_timeout_ms: 50,
            max_callback_errors: 16,
            ..Self::default()
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Player Configuration
// ----------------------------------------------------------------------------

/// Configuration applied when a player handle is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Engine options, applied before initialisation. Underscores in names are
    /// turned into hyphens.
    pub options: BTreeMap<String, OptionValue>,
    /// Positional flags, each applied as `<flag>=yes`
    pub flags: Vec<String>,
    /// Engine log level to request (`"info"`, `"debug"`, `"terminal-default"`...)
    pub log_level: Option<String>,
    /// Re-emit engine log messages through `tracing`
    pub forward_engine_logs: bool,
    /// Policy used by plain `get_property`
    pub decode_policy: DecodePolicy,
    /// Timeout for waits and commands that do not specify one
    pub default_timeout_ms: Option<u64>,
    pub event_loop: EventLoopConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            options: BTreeMap::new(),
            flags: Vec::new(),
            log_level: None,
            forward_engine_logs: false,
            decode_policy: DecodePolicy::Lenient,
            default_timeout_ms: None,
            event_loop: EventLoopConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Configuration for test suites: short waits, engine logs forwarded
    pub fn testing() -> Self {
        Self {
            log_level: Some("debug".to_string()),
            forward_engine_logs: true,
            default_timeout_ms: Some(5000),
            event_loop: EventLoopConfig::testing(),
            ..Self::default()
        }
    }

    /// No audio or video output
    pub fn headless() -> Self {
        Self::default()
            .with_option("vo", "null")
            .with_option("ao", "null")
    }

    pub fn with_option<N: Into<String>, V: Into<OptionValue>>(mut self, name: N, value: V) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_flag<F: Into<String>>(mut self, flag: F) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn with_log_level<L: Into<String>>(mut self, level: L) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Options in the order they are handed to the engine: named options, then
    /// positional flags
    pub fn engine_options(&self) -> Vec<(String, Node)> {
        let named = self
            .options
            .iter()
            .map(|(name, value)| (name.replace('_', "-"), value.to_node()));
        let flags = self
            .flags
            .iter()
            .map(|flag| (flag.replace('_', "-"), Node::string("yes")));
        named.chain(flags).collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> MpvResult<()> {
        if let Some(level) = &self.log_level {
            LogLevel::parse_request(level).map_err(MpvError::config)?;
        }
        if self.options.keys().any(|name| name.is_empty()) {
            return Err(MpvError::config("Option names cannot be empty"));
        }
        if self.flags.iter().any(|flag| flag.is_empty()) {
            return Err(MpvError::config("Flags cannot be empty"));
        }
        if self.event_loop.thread_name.is_empty() {
            return Err(MpvError::config("Event loop thread name cannot be empty"));
        }
        if self.event_loop.wait_timeout_ms == 0 {
            return Err(MpvError::config("Event loop wait timeout cannot be zero"));
        }
        if self.event_loop.max_callback_errors == 0 {
            return Err(MpvError::config("Callback error capacity cannot be zero"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> MpvResult<Self> {
        let config: PlayerConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_options_convert_names_and_flags() {
        let config = PlayerConfig::default()
            .with_option("input_default_bindings", true)
            .with_option("volume", 50i64)
            .with_flag("fs");
        let options = config.engine_options();
        assert_eq!(
            options,
            vec![
                ("input-default-bindings".to_string(), Node::string("yes")),
                ("volume".to_string(), Node::Int64(50)),
                ("fs".to_string(), Node::string("yes")),
            ]
        );
    }

    #[test]
    fn test_presets_validate() {
        assert!(PlayerConfig::default().validate().is_ok());
        assert!(PlayerConfig::testing().validate().is_ok());
        assert!(PlayerConfig::headless().validate().is_ok());
        assert_eq!(
            PlayerConfig::headless().options.get("vo"),
            Some(&OptionValue::from("null"))
        );
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = PlayerConfig::default().with_log_level("chatty");
        assert!(matches!(config.validate(), Err(MpvError::Config { .. })));
    }
}
