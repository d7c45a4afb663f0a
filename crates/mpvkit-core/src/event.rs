//! Event model
//!
//! Events arrive from the engine as `RawEvent` (payloads still in node form) and
//! are decoded once on the event loop thread before dispatch.

use crate::codec::{decode_lenient, decode_property_lenient, Value};
use crate::node::Node;
use crate::types::{EndFileReason, ErrorCode, EventKind, LogLevel};

/// Event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventData<V = Value> {
    None,
    Property { name: String, value: V },
    LogMessage { prefix: String, level: LogLevel, text: String },
    CommandReply { result: V },
    ClientMessage { args: Vec<String> },
    EndFile {
        reason: EndFileReason,
        error: ErrorCode,
        playlist_entry_id: i64,
    },
    StartFile { playlist_entry_id: i64 },
    Hook { name: String, id: u64 },
}

/// One event drained from the engine queue
#[derive(Debug, Clone, PartialEq)]
pub struct Event<V = Value> {
    pub kind: EventKind,
    pub error: ErrorCode,
    /// Observation id for property changes, reply id for command replies
    pub reply_userdata: u64,
    pub data: EventData<V>,
}

/// Event as produced by an `Engine`
pub type RawEvent = Event<Node>;

impl<V> Event<V> {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            error: ErrorCode::Success,
            reply_userdata: 0,
            data: EventData::None,
        }
    }

    pub fn with_error(mut self, error: ErrorCode) -> Self {
        self.error = error;
        self
    }

    pub fn with_userdata(mut self, id: u64) -> Self {
        self.reply_userdata = id;
        self
    }

    pub fn with_data(mut self, data: EventData<V>) -> Self {
        self.data = data;
        self
    }

    /// Placeholder returned by `wait_event` on timeout or wakeup
    pub fn none() -> Self {
        Self::new(EventKind::None)
    }

    pub fn is_none(&self) -> bool {
        self.kind == EventKind::None
    }

    pub fn property_change(id: u64, name: &str, value: V) -> Self {
        Self::new(EventKind::PropertyChange)
            .with_userdata(id)
            .with_data(EventData::Property {
                name: name.to_string(),
                value,
            })
    }

    pub fn log_message(prefix: &str, level: LogLevel, text: &str) -> Self {
        Self::new(EventKind::LogMessage).with_data(EventData::LogMessage {
            prefix: prefix.to_string(),
            level,
            text: text.to_string(),
        })
    }

    pub fn client_message<S: AsRef<str>>(args: &[S]) -> Self {
        Self::new(EventKind::ClientMessage).with_data(EventData::ClientMessage {
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        })
    }

    pub fn end_file(reason: EndFileReason, error: ErrorCode, playlist_entry_id: i64) -> Self {
        Self::new(EventKind::EndFile).with_data(EventData::EndFile {
            reason,
            error,
            playlist_entry_id,
        })
    }

    /// Name of the changed property, for property-change events
    pub fn property_name(&self) -> Option<&str> {
        match &self.data {
            EventData::Property { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn property_value(&self) -> Option<&V> {
        match &self.data {
            EventData::Property { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn client_args(&self) -> Option<&[String]> {
        match &self.data {
            EventData::ClientMessage { args } => Some(args),
            _ => None,
        }
    }
}

impl RawEvent {
    /// Decode payload nodes into host values
    pub fn decode(self) -> Event {
        let data = match self.data {
            EventData::None => EventData::None,
            EventData::Property { name, value } => EventData::Property {
                value: decode_property_lenient(&name, &value),
                name,
            },
            EventData::LogMessage {
                prefix,
                level,
                text,
            } => EventData::LogMessage {
                prefix,
                level,
                text,
            },
            EventData::CommandReply { result } => EventData::CommandReply {
                result: decode_lenient(&result),
            },
            EventData::ClientMessage { args } => EventData::ClientMessage { args },
            EventData::EndFile {
                reason,
                error,
                playlist_entry_id,
            } => EventData::EndFile {
                reason,
                error,
                playlist_entry_id,
            },
            EventData::StartFile { playlist_entry_id } => {
                EventData::StartFile { playlist_entry_id }
            }
            EventData::Hook { name, id } => EventData::Hook { name, id },
        };
        Event {
            kind: self.kind,
            error: self.error,
            reply_userdata: self.reply_userdata,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_property_change() {
        let raw = RawEvent::property_change(7, "vid", Node::string("auto"));
        let event = raw.decode();
        assert_eq!(event.kind, EventKind::PropertyChange);
        assert_eq!(event.reply_userdata, 7);
        assert_eq!(event.property_name(), Some("vid"));
        assert_eq!(event.property_value(), Some(&Value::from("auto")));

        let pause = RawEvent::property_change(1, "pause", Node::string("yes")).decode();
        assert_eq!(pause.property_value(), Some(&Value::Flag(true)));
    }

    #[test]
    fn test_end_file_payload_survives_decode() {
        let event = RawEvent::end_file(EndFileReason::Error, ErrorCode::LoadingFailed, 1).decode();
        assert_eq!(
            event.data,
            EventData::EndFile {
                reason: EndFileReason::Error,
                error: ErrorCode::LoadingFailed,
                playlist_entry_id: 1,
            }
        );
    }
}
