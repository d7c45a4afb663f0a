//! Deterministic in-memory engine
//!
//! `FakeEngine` implements the `Engine` seam with a property store, a bounded
//! event queue and a small command set. Loading media is instantaneous: every
//! event a load produces is queued before the command returns, so tests drive
//! playback through scoped waits instead of sleeps.

use crate::media::{parse_section, FakeMedia, SectionBinding, FAKE_MEDIA_MAGIC};
use mpvkit_core::{
    properties::{self, PropertyKind},
    Engine, EngineResult, EndFileReason, ErrorCode, EventData, EventKind, Format, LogLevel, Node,
    RawEvent, StreamOpener,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Queue capacity used unless a test asks for a smaller one
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Options accepted even though they are not properties in the type table
const EXTRA_OPTIONS: &[&str] = &[
    "vo",
    "ao",
    "idle",
    "input-default-bindings",
    "input-vo-keyboard",
    "osc",
    "ytdl",
    "config",
    "terminal",
    "msg-level",
    "keep-open",
    "force-window",
];

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

struct Observer {
    id: u64,
    key: String,
    name: String,
}

struct FakeState {
    initialized: bool,
    destroyed: bool,
    shutdown: bool,
    queue: VecDeque<RawEvent>,
    overflowed: bool,
    wakeup: bool,
    hold_replies: bool,
    held_replies: Vec<RawEvent>,
    properties: BTreeMap<String, Node>,
    observers: Vec<Observer>,
    log_level: Option<LogLevel>,
    media: HashMap<String, FakeMedia>,
    subtitle_files: HashMap<String, Vec<String>>,
    protocols: HashMap<String, StreamOpener>,
    sections: HashMap<String, Vec<SectionBinding>>,
    enabled_sections: Vec<String>,
    playing: Option<i64>,
    next_entry_id: i64,
    next_sid: i64,
    journal: Vec<Vec<String>>,
}

impl FakeState {
    fn new() -> Self {
        let mut properties = BTreeMap::new();
        let defaults = [
            ("pause", Node::Flag(false)),
            ("core-idle", Node::Flag(true)),
            ("idle-active", Node::Flag(true)),
            ("vid", Node::string("auto")),
            ("aid", Node::string("auto")),
            ("sid", Node::string("auto")),
            ("volume", Node::Double(100.0)),
            ("speed", Node::Double(1.0)),
            ("mute", Node::Flag(false)),
            ("fullscreen", Node::Flag(false)),
            ("loop-file", Node::string("no")),
            ("loop-playlist", Node::string("no")),
            ("osd-level", Node::Int64(1)),
            ("cursor-autohide", Node::Int64(1000)),
            ("cursor-autohide-fs-only", Node::Flag(false)),
            ("deinterlace", Node::Flag(false)),
            ("hwdec", Node::string("no")),
            ("alang", Node::Array(Vec::new())),
            ("slang", Node::Array(Vec::new())),
            ("playlist-count", Node::Int64(0)),
            ("sub-delay", Node::Double(0.0)),
        ];
        for (name, value) in defaults {
            properties.insert(name.to_string(), value);
        }
        for option in EXTRA_OPTIONS {
            properties.insert(option.to_string(), Node::string(""));
        }

        Self {
            initialized: false,
            destroyed: false,
            shutdown: false,
            queue: VecDeque::new(),
            overflowed: false,
            wakeup: false,
            hold_replies: false,
            held_replies: Vec::new(),
            properties,
            observers: Vec::new(),
            log_level: None,
            media: HashMap::new(),
            subtitle_files: HashMap::new(),
            protocols: HashMap::new(),
            sections: HashMap::new(),
            enabled_sections: Vec::new(),
            playing: None,
            next_entry_id: 1,
            next_sid: 1,
            journal: Vec::new(),
        }
    }

    fn is_known(&self, key: &str) -> bool {
        self.properties.contains_key(key)
            || properties::lookup(key).is_some()
            || key.starts_with("user-data/")
    }

    /// Queue an event unless the queue is at capacity
    fn push(&mut self, event: RawEvent, capacity: usize) {
        if self.queue.len() >= capacity {
            self.overflowed = true;
        } else {
            self.queue.push_back(event);
        }
    }

    fn log(&mut self, level: LogLevel, prefix: &str, text: &str, capacity: usize) {
        if matches!(self.log_level, Some(min) if level <= min) {
            self.push(RawEvent::log_message(prefix, level, text), capacity);
        }
    }

    /// Store a value and notify every observer of the property when it changed
    fn store(&mut self, key: &str, value: Node, capacity: usize) {
        if self.properties.get(key) == Some(&value) {
            return;
        }
        self.properties.insert(key.to_string(), value.clone());
        self.notify(key, value, capacity);
    }

    fn unset(&mut self, key: &str, capacity: usize) {
        if self.properties.remove(key).is_some() {
            self.notify(key, Node::None, capacity);
        }
    }

    fn notify(&mut self, key: &str, value: Node, capacity: usize) {
        let events: Vec<RawEvent> = self
            .observers
            .iter()
            .filter(|o| o.key == key)
            .map(|o| RawEvent::property_change(o.id, &o.name, value.clone()))
            .collect();
        for event in events {
            self.push(event, capacity);
        }
    }

    fn current(&self, key: &str) -> Option<Node> {
        match key {
            "property-list" => Some(Node::Array(
                properties::all().map(|d| Node::string(d.name)).collect(),
            )),
            "option-list" => {
                let mut names: Vec<&str> = properties::all()
                    .filter(|d| d.access.writable)
                    .map(|d| d.name)
                    .collect();
                names.extend_from_slice(EXTRA_OPTIONS);
                Some(Node::Array(names.into_iter().map(Node::string).collect()))
            }
            _ => self.properties.get(key).cloned(),
        }
    }

    fn is_looping(&self) -> bool {
        ["loop-file", "loop-playlist"].iter().any(|key| {
            matches!(self.properties.get(*key), Some(Node::String(v)) if v.as_slice() == b"inf")
                || self.properties.get(*key) == Some(&Node::Flag(true))
        })
    }
}

// ----------------------------------------------------------------------------
// Fake Engine
// ----------------------------------------------------------------------------

/// In-memory engine with scripted media
pub struct FakeEngine {
    client_name: String,
    capacity: usize,
    state: Mutex<FakeState>,
    ready: Condvar,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            client_name: "mpvkit".to_string(),
            capacity: DEFAULT_QUEUE_CAPACITY,
            state: Mutex::new(FakeState::new()),
            ready: Condvar::new(),
        }
    }

    /// Limit the event queue so overflow can be provoked
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_client_name<N: Into<String>>(mut self, name: N) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_media<U: Into<String>>(self, url: U, media: FakeMedia) -> Self {
        self.add_media(url, media);
        self
    }

    pub fn add_media<U: Into<String>>(&self, url: U, media: FakeMedia) {
        self.lock().media.insert(url.into(), media);
    }

    /// Register a subtitle file usable with `sub-add`
    pub fn add_subtitle_file<U: Into<String>, S: Into<String>>(&self, url: U, lines: Vec<S>) {
        let lines = lines.into_iter().map(Into::into).collect();
        self.lock().subtitle_files.insert(url.into(), lines);
    }

    /// Overwrite a property from the engine side, emitting change events
    pub fn inject_property(&self, name: &str, value: Node) {
        let key = Self::key(name);
        self.lock().store(&key, value, self.capacity);
        self.ready.notify_all();
    }

    /// Queue an arbitrary event, bypassing the capacity check
    pub fn push_event(&self, event: RawEvent) {
        self.lock().queue.push_back(event);
        self.ready.notify_all();
    }

    /// Keep asynchronous command replies back until `release_replies`
    pub fn hold_replies(&self) {
        self.lock().hold_replies = true;
    }

    /// Queue every held reply and stop holding new ones
    pub fn release_replies(&self) {
        let mut state = self.lock();
        state.hold_replies = false;
        let held = std::mem::take(&mut state.held_replies);
        state.queue.extend(held);
        drop(state);
        self.ready.notify_all();
    }

    /// Every command executed so far, in order
    pub fn executed_commands(&self) -> Vec<Vec<String>> {
        self.lock().journal.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    pub fn queued_events(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn enabled_sections(&self) -> Vec<String> {
        self.lock().enabled_sections.clone()
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store key for a property path, resolving aliases
    fn key(name: &str) -> String {
        let canonical = properties::canonical_name(name);
        match canonical.as_str() {
            "audio" => "aid".to_string(),
            "video" => "vid".to_string(),
            "sub" => "sid".to_string(),
            "fs" => "fullscreen".to_string(),
            "loop" => "loop-playlist".to_string(),
            "length" => "duration".to_string(),
            _ => canonical,
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn run_command(&self, argv: &[String]) -> EngineResult<Node> {
        let name = match argv.first() {
            Some(name) if !name.is_empty() => name.replace('_', "-"),
            _ => return Err(ErrorCode::InvalidParameter),
        };
        {
            let mut state = self.lock();
            if state.destroyed {
                return Err(ErrorCode::Uninitialized);
            }
            state.journal.push(argv.to_vec());
        }
        debug!(command = ?argv, "Fake engine command");

        let arg = |i: usize| argv.get(i).map(String::as_str);
        let result = match name.as_str() {
            "loadfile" => self.loadfile(arg(1).ok_or(ErrorCode::InvalidParameter)?, arg(2)),
            "stop" => {
                let mut state = self.lock();
                if let Some(entry) = state.playing {
                    self.finish_entry(&mut state, EndFileReason::Stop, ErrorCode::Success, entry);
                }
                Ok(Node::None)
            }
            "quit" => {
                let mut state = self.lock();
                state.shutdown = true;
                state.queue.push_back(RawEvent::new(EventKind::Shutdown));
                Ok(Node::None)
            }
            "seek" => {
                let target = arg(1)
                    .and_then(|t| t.parse::<f64>().ok())
                    .ok_or(ErrorCode::InvalidParameter)?;
                let mut state = self.lock();
                if state.playing.is_none() {
                    return Err(ErrorCode::Command);
                }
                state.push(RawEvent::new(EventKind::Seek), self.capacity);
                state.store("time-pos", Node::Double(target.max(0.0)), self.capacity);
                state.push(RawEvent::new(EventKind::PlaybackRestart), self.capacity);
                Ok(Node::None)
            }
            "playlist-clear" => {
                let mut state = self.lock();
                let remaining = i64::from(state.playing.is_some());
                state.store("playlist-count", Node::Int64(remaining), self.capacity);
                Ok(Node::None)
            }
            "sub-add" => self.sub_add(arg(1).ok_or(ErrorCode::InvalidParameter)?),
            "show-text" => Ok(Node::None),
            "print-text" => {
                let text = argv[1..].join(" ");
                self.lock().log(LogLevel::Info, "cplayer", &text, self.capacity);
                Ok(Node::None)
            }
            "expand-text" => {
                let text = arg(1).ok_or(ErrorCode::InvalidParameter)?;
                Ok(Node::string(self.expand_text(text)))
            }
            "script-message" => {
                let event = RawEvent::client_message(&argv[1..]);
                self.lock().push(event, self.capacity);
                Ok(Node::None)
            }
            "script-message-to" => {
                if arg(1) == Some(self.client_name.as_str()) {
                    let event = RawEvent::client_message(&argv[2..]);
                    self.lock().push(event, self.capacity);
                }
                Ok(Node::None)
            }
            "keypress" => self.keypress(arg(1).ok_or(ErrorCode::InvalidParameter)?),
            "define-section" => {
                let section = arg(1).ok_or(ErrorCode::InvalidParameter)?;
                let bindings = parse_section(arg(2).unwrap_or(""));
                self.lock().sections.insert(section.to_string(), bindings);
                Ok(Node::None)
            }
            "enable-section" => {
                let section = arg(1).ok_or(ErrorCode::InvalidParameter)?.to_string();
                let mut state = self.lock();
                state.enabled_sections.retain(|s| *s != section);
                state.enabled_sections.push(section);
                Ok(Node::None)
            }
            "disable-section" => {
                let section = arg(1).ok_or(ErrorCode::InvalidParameter)?;
                self.lock().enabled_sections.retain(|s| s != section);
                Ok(Node::None)
            }
            "set" => {
                let property = arg(1).ok_or(ErrorCode::InvalidParameter)?;
                let value = arg(2).ok_or(ErrorCode::InvalidParameter)?;
                self.set_property(property, &Node::string(value))
                    .map(|_| Node::None)
            }
            "cycle" => {
                let key = Self::key(arg(1).ok_or(ErrorCode::InvalidParameter)?);
                let mut state = self.lock();
                match state.properties.get(&key).cloned() {
                    Some(Node::Flag(b)) => {
                        state.store(&key, Node::Flag(!b), self.capacity);
                        Ok(Node::None)
                    }
                    _ => Err(ErrorCode::Command),
                }
            }
            _ => Err(ErrorCode::Command),
        };
        self.ready.notify_all();
        result
    }

    fn loadfile(&self, url: &str, mode: Option<&str>) -> EngineResult<Node> {
        if mode == Some("append") {
            let mut state = self.lock();
            if state.playing.is_some() {
                let count = state
                    .properties
                    .get("playlist-count")
                    .and_then(Node::as_i64)
                    .unwrap_or(0);
                state.store("playlist-count", Node::Int64(count + 1), self.capacity);
                return Ok(Node::None);
            }
        }

        let outcome = self.resolve(url);
        let capacity = self.capacity;
        let mut state = self.lock();
        if let Some(previous) = state.playing {
            self.finish_entry(&mut state, EndFileReason::Stop, ErrorCode::Success, previous);
        }

        let entry = state.next_entry_id;
        state.next_entry_id += 1;
        state.store("playlist-count", Node::Int64(1), capacity);
        state.push(
            RawEvent::new(EventKind::StartFile)
                .with_data(EventData::StartFile { playlist_entry_id: entry }),
            capacity,
        );

        let video_disabled = matches!(state.properties.get("vid"), Some(Node::String(v)) if v.as_slice() == b"no");
        let media = match outcome {
            Ok(media) if !media.has_audio && (video_disabled || !media.has_video) => {
                Err(ErrorCode::NothingToPlay)
            }
            other => other,
        };

        match media {
            Err(code) => {
                debug!(url, error = %code, "Fake engine failed to load");
                state.log(LogLevel::Error, "cplayer", &format!("Failed to open {}.", url), capacity);
                self.finish_entry(&mut state, EndFileReason::Error, code, entry);
            }
            Ok(media) => {
                let filename = url.rsplit('/').next().unwrap_or(url).to_string();
                let title = media.title.clone().unwrap_or_else(|| filename.clone());
                state.log(LogLevel::Info, "cplayer", &format!("Playing: {}", url), capacity);
                state.store("path", Node::string(url), capacity);
                state.store("filename", Node::string(filename), capacity);
                state.store("media-title", Node::string(title), capacity);
                state.store("duration", Node::Double(media.duration), capacity);
                state.store("time-pos", Node::Double(0.0), capacity);
                state.store("idle-active", Node::Flag(false), capacity);
                state.push(RawEvent::new(EventKind::FileLoaded), capacity);

                if media.has_video && !video_disabled && state.properties.get("vid") == Some(&Node::string("auto")) {
                    state.store("vid", Node::Int64(1), capacity);
                }
                if media.has_audio && state.properties.get("aid") == Some(&Node::string("auto")) {
                    state.store("aid", Node::Int64(1), capacity);
                }
                state.store("core-idle", Node::Flag(false), capacity);
                state.push(RawEvent::new(EventKind::PlaybackRestart), capacity);

                for line in &media.subtitles {
                    state.store("sub-text", Node::string(line), capacity);
                }
                if !media.subtitles.is_empty() {
                    state.store("sub-text", Node::string(""), capacity);
                }

                if state.is_looping() {
                    state.playing = Some(entry);
                } else {
                    state.store("time-pos", Node::Double(media.duration), capacity);
                    self.finish_entry(&mut state, EndFileReason::Eof, ErrorCode::Success, entry);
                }
            }
        }

        Ok(Node::Map(vec![(
            "playlist_entry_id".to_string(),
            Node::Int64(entry),
        )]))
    }

    fn finish_entry(
        &self,
        state: &mut FakeState,
        reason: EndFileReason,
        error: ErrorCode,
        entry: i64,
    ) {
        let capacity = self.capacity;
        state.playing = None;
        state.store("core-idle", Node::Flag(true), capacity);
        state.push(RawEvent::end_file(reason, error, entry), capacity);
        for key in ["path", "filename", "media-title", "duration", "time-pos", "sub-text"] {
            state.unset(key, capacity);
        }
        state.store("idle-active", Node::Flag(true), capacity);
        state.push(RawEvent::new(EventKind::Idle), capacity);
    }

    /// Work out what a URL contains. Stream openers run without the state lock.
    fn resolve(&self, url: &str) -> Result<FakeMedia, ErrorCode> {
        let opener = {
            let state = self.lock();
            if let Some(media) = state.media.get(url) {
                return Ok(media.clone());
            }
            let protocol = url.split_once("://").map(|(proto, _)| proto);
            match protocol.and_then(|p| state.protocols.get(p)) {
                Some(opener) => opener.clone(),
                None => return Err(ErrorCode::LoadingFailed),
            }
        };

        let mut stream = opener(url).map_err(|_| ErrorCode::LoadingFailed)?;
        let _ = stream.seek(0);
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        while data.len() < FAKE_MEDIA_MAGIC.len() {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
            }
        }
        stream.close();

        if data.starts_with(FAKE_MEDIA_MAGIC) {
            Ok(FakeMedia::default())
        } else {
            Err(ErrorCode::UnknownFormat)
        }
    }

    fn sub_add(&self, url: &str) -> EngineResult<Node> {
        let capacity = self.capacity;
        let mut state = self.lock();
        if state.playing.is_none() {
            return Err(ErrorCode::Command);
        }
        let lines = state
            .subtitle_files
            .get(url)
            .cloned()
            .ok_or(ErrorCode::Command)?;
        let sid = state.next_sid;
        state.next_sid += 1;
        state.store("sid", Node::Int64(sid), capacity);
        for line in &lines {
            state.store("sub-text", Node::string(line), capacity);
        }
        Ok(Node::None)
    }

    fn keypress(&self, key: &str) -> EngineResult<Node> {
        let binding = {
            let state = self.lock();
            state.enabled_sections.iter().rev().find_map(|section| {
                state
                    .sections
                    .get(section)?
                    .iter()
                    .find(|b| b.key == key)
                    .cloned()
            })
        };
        let Some(binding) = binding else {
            return Ok(Node::None);
        };

        if binding.command[0] == "script-binding" {
            let target = binding.command.get(1).map(String::as_str).unwrap_or("");
            if let Some((client, name)) = target.split_once('/') {
                if client == self.client_name {
                    let key_char = if key.chars().count() == 1 { key } else { "" };
                    let event = RawEvent::client_message(&["key-binding", name, "p-", key, key_char]);
                    self.lock().push(event, self.capacity);
                }
            }
            Ok(Node::None)
        } else {
            self.run_command(&binding.command)
        }
    }

    fn expand_text(&self, text: &str) -> String {
        let state = self.lock();
        let mut out = String::new();
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            match rest[start..].find('}') {
                Some(end) => {
                    let name = &rest[start + 2..start + end];
                    if let Some(node) = state.current(&Self::key(name)) {
                        out.push_str(&String::from_utf8_lossy(&render(&node, true)));
                    }
                    rest = &rest[start + end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

// ----------------------------------------------------------------------------
// Value Helpers
// ----------------------------------------------------------------------------

/// Text rendering used for string and OSD reads
fn render(node: &Node, osd: bool) -> Vec<u8> {
    match node {
        Node::None => Vec::new(),
        Node::String(b) | Node::ByteArray(b) => b.clone(),
        Node::Flag(b) => if *b { b"yes".to_vec() } else { b"no".to_vec() },
        Node::Int64(i) => i.to_string().into_bytes(),
        Node::Double(d) if osd => format!("{:.2}", d).into_bytes(),
        Node::Double(d) => format!("{:.6}", d).into_bytes(),
        Node::Array(items) => {
            let sep: &[u8] = if osd { b", " } else { b"," };
            items
                .iter()
                .map(|n| render(n, osd))
                .collect::<Vec<_>>()
                .join(sep)
        }
        Node::Map(entries) => entries
            .iter()
            .map(|(k, v)| {
                let mut entry = format!("{}=", k).into_bytes();
                entry.extend(render(v, osd));
                entry
            })
            .collect::<Vec<_>>()
            .join(&b","[..]),
    }
}

/// Convert an incoming value to the stored representation of `key`
fn coerce(key: &str, value: &Node) -> EngineResult<Node> {
    let text = value.as_bytes();
    match properties::kind_of(key) {
        Some(PropertyKind::Flag) => match (value, text) {
            (Node::Flag(b), _) => Ok(Node::Flag(*b)),
            (_, Some(b"yes")) => Ok(Node::Flag(true)),
            (_, Some(b"no")) => Ok(Node::Flag(false)),
            (_, Some(b"auto")) => Ok(value.clone()),
            _ => Err(ErrorCode::PropertyFormat),
        },
        Some(PropertyKind::Integer) => match value {
            Node::Int64(i) => Ok(Node::Int64(*i)),
            Node::Double(d) if d.is_finite() && d.fract() == 0.0 => Ok(Node::Int64(*d as i64)),
            Node::String(s) => {
                let s = std::str::from_utf8(s).map_err(|_| ErrorCode::PropertyFormat)?;
                match s.parse::<i64>() {
                    Ok(i) => Ok(Node::Int64(i)),
                    Err(_) if matches!(s, "auto" | "no" | "yes" | "inf" | "always") => {
                        Ok(value.clone())
                    }
                    Err(_) => Err(ErrorCode::PropertyFormat),
                }
            }
            _ => Err(ErrorCode::PropertyFormat),
        },
        Some(PropertyKind::Float) => match value {
            Node::Int64(i) => Ok(Node::Double(*i as f64)),
            Node::Double(d) => Ok(Node::Double(*d)),
            Node::String(s) => std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .map(Node::Double)
                .ok_or(ErrorCode::PropertyFormat),
            _ => Err(ErrorCode::PropertyFormat),
        },
        Some(PropertyKind::String) | Some(PropertyKind::Bytes) => match value {
            Node::Array(_) | Node::Map(_) => Err(ErrorCode::PropertyFormat),
            other => Ok(Node::String(render(other, false))),
        },
        Some(PropertyKind::CommaList) => match value {
            Node::Array(items) if items.iter().all(|i| i.as_bytes().is_some()) => {
                Ok(Node::Array(items.clone()))
            }
            Node::String(s) if s.is_empty() => Ok(Node::Array(Vec::new())),
            Node::String(s) => Ok(Node::Array(
                s.split(|c| *c == b',').map(|p| Node::String(p.to_vec())).collect(),
            )),
            _ => Err(ErrorCode::PropertyFormat),
        },
        Some(PropertyKind::Node) | None => Ok(value.clone()),
    }
}

/// Convert a stored value to the format a reader asked for
fn convert(node: Node, format: Format) -> EngineResult<Node> {
    match format {
        Format::String => Ok(Node::String(render(&node, false))),
        Format::OsdString => Ok(Node::String(render(&node, true))),
        Format::Flag => match node {
            Node::Flag(b) => Ok(Node::Flag(b)),
            _ => Err(ErrorCode::PropertyFormat),
        },
        Format::Int64 => match node {
            Node::Int64(i) => Ok(Node::Int64(i)),
            _ => Err(ErrorCode::PropertyFormat),
        },
        Format::Double => match node {
            Node::Double(d) => Ok(Node::Double(d)),
            Node::Int64(i) => Ok(Node::Double(i as f64)),
            _ => Err(ErrorCode::PropertyFormat),
        },
        _ => Ok(node),
    }
}

/// Positional arguments of a command node; map commands list `name` first
fn positional_args(args: &Node) -> Vec<String> {
    match args {
        Node::Map(entries) => {
            let mut argv: Vec<String> = args.get("name").and_then(Node::as_text).into_iter().collect();
            argv.extend(
                entries
                    .iter()
                    .filter(|(k, _)| k != "name")
                    .map(|(_, v)| String::from_utf8_lossy(&render(v, false)).into_owned()),
            );
            argv
        }
        other => other.command_args(),
    }
}

// ----------------------------------------------------------------------------
// Engine Implementation
// ----------------------------------------------------------------------------

impl Engine for FakeEngine {
    fn client_name(&self) -> String {
        self.client_name.clone()
    }

    fn set_option(&self, name: &str, value: &Node) -> EngineResult<()> {
        let key = Self::key(name);
        let mut state = self.lock();
        if state.destroyed {
            return Err(ErrorCode::Uninitialized);
        }
        if !state.is_known(&key) || key.starts_with("user-data/") {
            return Err(ErrorCode::OptionNotFound);
        }
        let value = coerce(&key, value).map_err(|_| ErrorCode::OptionFormat)?;
        state.store(&key, value, self.capacity);
        Ok(())
    }

    fn initialize(&self) -> EngineResult<()> {
        let mut state = self.lock();
        if state.initialized || state.destroyed {
            return Err(ErrorCode::InvalidParameter);
        }
        state.initialized = true;
        state.log(LogLevel::V, "cplayer", "fake engine initialized", self.capacity);
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn get_property(&self, name: &str, format: Format) -> EngineResult<Node> {
        let key = Self::key(name);
        let state = self.lock();
        match state.current(&key) {
            Some(node) => convert(node, format),
            None if state.is_known(&key) && !key.starts_with("user-data/") => {
                Err(ErrorCode::PropertyUnavailable)
            }
            None => Err(ErrorCode::PropertyNotFound),
        }
    }

    fn set_property(&self, name: &str, value: &Node) -> EngineResult<()> {
        let key = Self::key(name);
        let mut state = self.lock();
        if state.destroyed {
            return Err(ErrorCode::Uninitialized);
        }
        if !state.is_known(&key) {
            return Err(ErrorCode::PropertyNotFound);
        }
        if matches!(properties::lookup(&key), Some(d) if !d.access.writable) {
            return Err(ErrorCode::PropertyError);
        }
        let value = coerce(&key, value)?;
        state.store(&key, value, self.capacity);
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn command(&self, args: &Node) -> EngineResult<Node> {
        self.run_command(&positional_args(args))
    }

    fn command_async(&self, reply_id: u64, args: &Node) -> EngineResult<()> {
        let argv = positional_args(args);
        if argv.first().map_or(true, String::is_empty) {
            return Err(ErrorCode::InvalidParameter);
        }
        {
            let state = self.lock();
            if state.destroyed {
                return Err(ErrorCode::Uninitialized);
            }
            if state.queue.len() >= self.capacity {
                return Err(ErrorCode::EventQueueFull);
            }
        }

        let reply = match self.run_command(&argv) {
            Ok(result) => RawEvent::new(EventKind::CommandReply)
                .with_data(EventData::CommandReply { result }),
            Err(code) => RawEvent::new(EventKind::CommandReply)
                .with_error(code)
                .with_data(EventData::CommandReply { result: Node::None }),
        };
        let reply = reply.with_userdata(reply_id);
        let mut state = self.lock();
        if state.hold_replies {
            state.held_replies.push(reply);
        } else {
            state.queue.push_back(reply);
        }
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn observe_property(&self, id: u64, name: &str) -> EngineResult<()> {
        let key = Self::key(name);
        let mut state = self.lock();
        if state.destroyed {
            return Err(ErrorCode::Uninitialized);
        }
        let initial = state.current(&key).unwrap_or(Node::None);
        state.observers.push(Observer {
            id,
            key,
            name: name.to_string(),
        });
        state.push(RawEvent::property_change(id, name, initial), self.capacity);
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    fn unobserve_property(&self, id: u64) -> EngineResult<()> {
        let mut state = self.lock();
        let before = state.observers.len();
        state.observers.retain(|o| o.id != id);
        if state.observers.len() == before {
            return Err(ErrorCode::InvalidParameter);
        }
        Ok(())
    }

    fn request_log_messages(&self, level: &str) -> EngineResult<()> {
        let level = LogLevel::parse_request(level).map_err(|_| ErrorCode::InvalidParameter)?;
        self.lock().log_level = level;
        Ok(())
    }

    fn wait_event(&self, timeout: Option<Duration>) -> RawEvent {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if let Some(event) = state.queue.pop_front() {
                return event;
            }
            if state.overflowed {
                state.overflowed = false;
                return RawEvent::new(EventKind::QueueOverflow);
            }
            if state.shutdown {
                return RawEvent::new(EventKind::Shutdown);
            }
            if state.wakeup {
                state.wakeup = false;
                return RawEvent::none();
            }
            if state.destroyed {
                return RawEvent::none();
            }
            state = match deadline {
                None => self
                    .ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return RawEvent::none();
                    }
                    self.ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn wakeup(&self) {
        self.lock().wakeup = true;
        self.ready.notify_all();
    }

    fn add_stream_protocol(&self, protocol: &str, opener: StreamOpener) -> EngineResult<()> {
        let mut state = self.lock();
        if state.protocols.contains_key(protocol) {
            return Err(ErrorCode::InvalidParameter);
        }
        state.protocols.insert(protocol.to_string(), opener);
        Ok(())
    }

    fn destroy(&self) {
        let mut state = self.lock();
        state.destroyed = true;
        state.queue.clear();
        state.observers.clear();
        state.protocols.clear();
        drop(state);
        self.ready.notify_all();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mpvkit_core::MediaStream;
    use std::io;
    use std::sync::Arc;

    fn drain(engine: &FakeEngine) -> Vec<RawEvent> {
        let mut events = Vec::new();
        loop {
            let event = engine.wait_event(Some(Duration::ZERO));
            if event.is_none() {
                return events;
            }
            events.push(event);
        }
    }

    fn kinds(events: &[RawEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_unknown_option_rejected() {
        let engine = FakeEngine::new();
        assert_eq!(
            engine.set_option("this-option-does-not-exist", &Node::Int64(23)),
            Err(ErrorCode::OptionNotFound)
        );
        assert!(engine.set_option("osd_level", &Node::Int64(0)).is_ok());
        assert_eq!(engine.get_property("osd-level", Format::Node), Ok(Node::Int64(0)));
    }

    #[test]
    fn test_observe_emits_initial_value_and_changes() {
        let engine = FakeEngine::new();
        engine.observe_property(4, "mute").unwrap();
        engine.set_property("mute", &Node::Flag(true)).unwrap();
        engine.set_property("mute", &Node::Flag(true)).unwrap();

        let events = drain(&engine);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].property_value(), Some(&Node::Flag(false)));
        assert_eq!(events[1].property_value(), Some(&Node::Flag(true)));
        assert!(events.iter().all(|e| e.reply_userdata == 4));
    }

    #[test]
    fn test_loadfile_event_sequence() {
        let engine = FakeEngine::new().with_media("clip.mkv", FakeMedia::video());
        engine.initialize().unwrap();
        engine.command(&Node::command(&["loadfile", "clip.mkv"])).unwrap();

        let events = drain(&engine);
        assert_eq!(
            kinds(&events),
            vec![
                EventKind::StartFile,
                EventKind::FileLoaded,
                EventKind::PlaybackRestart,
                EventKind::EndFile,
                EventKind::Idle,
            ]
        );
        assert_eq!(engine.get_property("vid", Format::Node), Ok(Node::Int64(1)));
    }

    #[test]
    fn test_unknown_media_fails_loading() {
        let engine = FakeEngine::new();
        engine.command(&Node::command(&["loadfile", "missing.mkv"])).unwrap();
        let end = drain(&engine)
            .into_iter()
            .find(|e| e.kind == EventKind::EndFile)
            .unwrap();
        assert!(matches!(
            end.data,
            EventData::EndFile { reason: EndFileReason::Error, error: ErrorCode::LoadingFailed, .. }
        ));
    }

    struct Empty;

    impl MediaStream for Empty {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_empty_stream_is_unknown_format() {
        let engine = FakeEngine::new();
        let opener: StreamOpener =
            Arc::new(|_uri: &str| -> Result<Box<dyn MediaStream>, ErrorCode> { Ok(Box::new(Empty)) });
        engine.add_stream_protocol("empty", opener).unwrap();
        engine.command(&Node::command(&["loadfile", "empty://x"])).unwrap();
        let end = drain(&engine)
            .into_iter()
            .find(|e| e.kind == EventKind::EndFile)
            .unwrap();
        assert!(matches!(
            end.data,
            EventData::EndFile { error: ErrorCode::UnknownFormat, .. }
        ));
    }

    #[test]
    fn test_command_async_rejects_when_queue_full() {
        let engine = FakeEngine::new().with_queue_capacity(2);
        let cmd = Node::command(&["script-message", "flood"]);
        assert!(engine.command_async(1, &cmd).is_ok());
        assert_eq!(engine.command_async(2, &cmd), Err(ErrorCode::EventQueueFull));
    }

    #[test]
    fn test_osd_rendering_and_expand_text() {
        let engine = FakeEngine::new();
        engine.set_property("slang", &Node::string("de,en")).unwrap();
        assert_eq!(
            engine.get_property("slang", Format::OsdString),
            Ok(Node::string("de, en"))
        );
        let expanded = engine
            .command(&Node::command(&["expand-text", "vol=${volume}"]))
            .unwrap();
        assert_eq!(expanded, Node::string("vol=100.00"));
    }
}
