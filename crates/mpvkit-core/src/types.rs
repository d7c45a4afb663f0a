//! Engine Enumerations
//!
//! Numeric vocabularies shared with the engine's client API: error codes, value
//! formats, event kinds, end-file reasons and log levels. Numeric values match the
//! engine so they can cross the FFI boundary unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ----------------------------------------------------------------------------
// Error Codes
// ----------------------------------------------------------------------------

/// Status code returned by engine calls and carried by events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    EventQueueFull = -1,
    NoMem = -2,
    Uninitialized = -3,
    InvalidParameter = -4,
    OptionNotFound = -5,
    OptionFormat = -6,
    OptionError = -7,
    PropertyNotFound = -8,
    PropertyFormat = -9,
    PropertyUnavailable = -10,
    PropertyError = -11,
    Command = -12,
    LoadingFailed = -13,
    AoInitFailed = -14,
    VoInitFailed = -15,
    NothingToPlay = -16,
    UnknownFormat = -17,
    Unsupported = -18,
    NotImplemented = -19,
    Generic = -20,
}

impl ErrorCode {
    /// Map a raw engine status to an error code. Positive values count as success.
    pub fn from_raw(code: i32) -> Self {
        match code {
            c if c >= 0 => ErrorCode::Success,
            -1 => ErrorCode::EventQueueFull,
            -2 => ErrorCode::NoMem,
            -3 => ErrorCode::Uninitialized,
            -4 => ErrorCode::InvalidParameter,
            -5 => ErrorCode::OptionNotFound,
            -6 => ErrorCode::OptionFormat,
            -7 => ErrorCode::OptionError,
            -8 => ErrorCode::PropertyNotFound,
            -9 => ErrorCode::PropertyFormat,
            -10 => ErrorCode::PropertyUnavailable,
            -11 => ErrorCode::PropertyError,
            -12 => ErrorCode::Command,
            -13 => ErrorCode::LoadingFailed,
            -14 => ErrorCode::AoInitFailed,
            -15 => ErrorCode::VoInitFailed,
            -16 => ErrorCode::NothingToPlay,
            -17 => ErrorCode::UnknownFormat,
            -18 => ErrorCode::Unsupported,
            -19 => ErrorCode::NotImplemented,
            _ => ErrorCode::Generic,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    /// Convert a raw status into `Ok(())` or the failing code
    pub fn check(code: i32) -> Result<(), ErrorCode> {
        match ErrorCode::from_raw(code) {
            ErrorCode::Success => Ok(()),
            err => Err(err),
        }
    }

    /// Human readable description, worded like the engine's own error strings
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::EventQueueFull => "event queue full",
            ErrorCode::NoMem => "memory allocation failed",
            ErrorCode::Uninitialized => "core not uninitialized",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::OptionNotFound => "option not found",
            ErrorCode::OptionFormat => "unsupported format for accessing option",
            ErrorCode::OptionError => "error setting option",
            ErrorCode::PropertyNotFound => "property not found",
            ErrorCode::PropertyFormat => "unsupported format for accessing property",
            ErrorCode::PropertyUnavailable => "property unavailable",
            ErrorCode::PropertyError => "error accessing property",
            ErrorCode::Command => "error running command",
            ErrorCode::LoadingFailed => "loading failed",
            ErrorCode::AoInitFailed => "audio output initialization failed",
            ErrorCode::VoInitFailed => "video output initialization failed",
            ErrorCode::NothingToPlay => "no audio or video data played",
            ErrorCode::UnknownFormat => "unrecognized file format",
            ErrorCode::Unsupported => "not supported",
            ErrorCode::NotImplemented => "operation not implemented",
            ErrorCode::Generic => "something happened",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_raw())
    }
}

// ----------------------------------------------------------------------------
// Value Formats
// ----------------------------------------------------------------------------

/// Wire format requested from or handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Format {
    None = 0,
    String = 1,
    OsdString = 2,
    Flag = 3,
    Int64 = 4,
    Double = 5,
    Node = 6,
    NodeArray = 7,
    NodeMap = 8,
    ByteArray = 9,
}

impl Format {
    pub fn from_raw(format: i32) -> Self {
        match format {
            1 => Format::String,
            2 => Format::OsdString,
            3 => Format::Flag,
            4 => Format::Int64,
            5 => Format::Double,
            6 => Format::Node,
            7 => Format::NodeArray,
            8 => Format::NodeMap,
            9 => Format::ByteArray,
            _ => Format::None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

// ----------------------------------------------------------------------------
// Event Kinds
// ----------------------------------------------------------------------------

/// Kind of an event produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum EventKind {
    None = 0,
    Shutdown = 1,
    LogMessage = 2,
    GetPropertyReply = 3,
    SetPropertyReply = 4,
    CommandReply = 5,
    StartFile = 6,
    EndFile = 7,
    FileLoaded = 8,
    Idle = 11,
    Tick = 14,
    ClientMessage = 16,
    VideoReconfig = 17,
    AudioReconfig = 18,
    Seek = 20,
    PlaybackRestart = 21,
    PropertyChange = 22,
    QueueOverflow = 24,
    Hook = 25,
}

impl EventKind {
    /// Every kind a caller can wait for or filter on
    pub const ALL: [EventKind; 18] = [
        EventKind::Shutdown,
        EventKind::LogMessage,
        EventKind::GetPropertyReply,
        EventKind::SetPropertyReply,
        EventKind::CommandReply,
        EventKind::StartFile,
        EventKind::EndFile,
        EventKind::FileLoaded,
        EventKind::Idle,
        EventKind::Tick,
        EventKind::ClientMessage,
        EventKind::VideoReconfig,
        EventKind::AudioReconfig,
        EventKind::Seek,
        EventKind::PlaybackRestart,
        EventKind::PropertyChange,
        EventKind::QueueOverflow,
        EventKind::Hook,
    ];

    pub fn from_raw(id: i32) -> Self {
        match id {
            1 => EventKind::Shutdown,
            2 => EventKind::LogMessage,
            3 => EventKind::GetPropertyReply,
            4 => EventKind::SetPropertyReply,
            5 => EventKind::CommandReply,
            6 => EventKind::StartFile,
            7 => EventKind::EndFile,
            8 => EventKind::FileLoaded,
            11 => EventKind::Idle,
            14 => EventKind::Tick,
            16 => EventKind::ClientMessage,
            17 => EventKind::VideoReconfig,
            18 => EventKind::AudioReconfig,
            20 => EventKind::Seek,
            21 => EventKind::PlaybackRestart,
            22 => EventKind::PropertyChange,
            24 => EventKind::QueueOverflow,
            25 => EventKind::Hook,
            _ => EventKind::None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Engine name of the event kind (hyphen form)
    pub fn name(self) -> &'static str {
        match self {
            EventKind::None => "none",
            EventKind::Shutdown => "shutdown",
            EventKind::LogMessage => "log-message",
            EventKind::GetPropertyReply => "get-property-reply",
            EventKind::SetPropertyReply => "set-property-reply",
            EventKind::CommandReply => "command-reply",
            EventKind::StartFile => "start-file",
            EventKind::EndFile => "end-file",
            EventKind::FileLoaded => "file-loaded",
            EventKind::Idle => "idle",
            EventKind::Tick => "tick",
            EventKind::ClientMessage => "client-message",
            EventKind::VideoReconfig => "video-reconfig",
            EventKind::AudioReconfig => "audio-reconfig",
            EventKind::Seek => "seek",
            EventKind::PlaybackRestart => "playback-restart",
            EventKind::PropertyChange => "property-change",
            EventKind::QueueOverflow => "event-queue-overflow",
            EventKind::Hook => "hook",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    /// Accepts both `end-file` and `end_file`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('_', "-");
        if wanted == "none" {
            return Ok(EventKind::None);
        }
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown event kind: {}", s))
    }
}

// ----------------------------------------------------------------------------
// End-file Reasons
// ----------------------------------------------------------------------------

/// Why playback of an entry ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum EndFileReason {
    Eof = 0,
    Stop = 2,
    Quit = 3,
    Error = 4,
    Redirect = 5,
}

impl EndFileReason {
    pub fn from_raw(reason: i32) -> Self {
        match reason {
            2 => EndFileReason::Stop,
            3 => EndFileReason::Quit,
            4 => EndFileReason::Error,
            5 => EndFileReason::Redirect,
            _ => EndFileReason::Eof,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

// ----------------------------------------------------------------------------
// Engine Log Levels
// ----------------------------------------------------------------------------

/// Verbosity levels of engine log messages, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Status,
    V,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Status => "status",
            LogLevel::V => "v",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse a level as accepted by the log-message request.
    ///
    /// `terminal-default` maps to `Status`; `no` yields `None`.
    pub fn parse_request(level: &str) -> Result<Option<LogLevel>, String> {
        match level {
            "no" => Ok(None),
            "terminal-default" => Ok(Some(LogLevel::Status)),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fatal" => Ok(LogLevel::Fatal),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "status" => Ok(LogLevel::Status),
            "v" => Ok(LogLevel::V),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
