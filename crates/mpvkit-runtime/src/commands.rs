//! Command/Reply Correlator
//!
//! Asynchronous commands are tagged with a reply id drawn from a per-handle
//! counter. The pending entry is stored before the engine sees the command, so
//! a reply that arrives immediately still finds it. The event loop resolves the
//! entry's promise when the matching command-reply event is dispatched.

use crate::player::{Player, Shared};
use crate::promise::Promise;
use dashmap::DashMap;
use mpvkit_core::{codec, ErrorCode, MpvError, MpvResult, Node, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

/// Called on the event loop thread with the outcome of an async command,
/// before its future resolves. An `Err` fails the future.
pub type ReplyCallback = Box<dyn FnOnce(&MpvResult<Value>) -> anyhow::Result<()> + Send>;

// ----------------------------------------------------------------------------
// Pending Replies
// ----------------------------------------------------------------------------

pub(crate) struct PendingReply {
    pub command: Vec<String>,
    pub promise: Arc<Promise<MpvResult<Value>>>,
    callback: Mutex<Option<ReplyCallback>>,
}

impl PendingReply {
    fn new(command: Vec<String>, promise: Arc<Promise<MpvResult<Value>>>, callback: Option<ReplyCallback>) -> Self {
        Self {
            command,
            promise,
            callback: Mutex::new(callback),
        }
    }

    pub(crate) fn take_callback(&self) -> Option<ReplyCallback> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

pub(crate) struct ReplyTable {
    pending: DashMap<u64, PendingReply>,
}

impl ReplyTable {
    pub(crate) fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    fn insert(&self, id: u64, reply: PendingReply) {
        self.pending.insert(id, reply);
    }

    pub(crate) fn take(&self, id: u64) -> Option<PendingReply> {
        self.pending.remove(&id).map(|(_, reply)| reply)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Resolve and drop every pending reply. Returns how many were failed.
    pub(crate) fn fail_all(&self, err: MpvError) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.take(id))
            .filter(|reply| reply.promise.resolve(Err(err.clone())))
            .count()
    }
}

// ----------------------------------------------------------------------------
// Command Future
// ----------------------------------------------------------------------------

/// Outcome of an asynchronous command
///
/// Block on it with `wait`/`wait_timeout` or `.await` it from async code.
pub struct CommandFuture {
    id: u64,
    promise: Arc<Promise<MpvResult<Value>>>,
    shared: Weak<Shared>,
}

impl CommandFuture {
    /// Reply id the command was submitted with
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.promise.is_resolved()
    }

    /// Block until the reply arrives or the player shuts down
    pub fn wait(self) -> MpvResult<Value> {
        self.promise.wait(None).unwrap_or(Err(MpvError::Shutdown))
    }

    /// Block for at most `timeout`. On timeout the pending entry is dropped and
    /// a late reply is ignored.
    pub fn wait_timeout(self, timeout: Duration) -> MpvResult<Value> {
        if let Some(outcome) = self.promise.wait(Some(timeout)) {
            return outcome;
        }
        match self.shared.upgrade() {
            Some(shared) if shared.is_alive() => {
                shared.replies.take(self.id);
                Err(MpvError::timeout(timeout))
            }
            _ => Err(MpvError::Shutdown),
        }
    }
}

impl Future for CommandFuture {
    type Output = MpvResult<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.promise
            .poll_take(cx)
            .map(|outcome| outcome.unwrap_or(Err(MpvError::Shutdown)))
    }
}

// ----------------------------------------------------------------------------
// Player API
// ----------------------------------------------------------------------------

fn argv<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter().map(|a| a.as_ref().to_string()).collect()
}

impl Player {
    fn submit(
        &self,
        node: Node,
        command: Vec<String>,
        callback: Option<ReplyCallback>,
    ) -> MpvResult<CommandFuture> {
        let shared = &self.shared;
        shared.ensure_live()?;
        if command.first().map_or(true, String::is_empty) {
            return Err(MpvError::command(&command, ErrorCode::InvalidParameter));
        }

        let id = shared.next_reply_id();
        let promise = Arc::new(Promise::new());
        shared
            .replies
            .insert(id, PendingReply::new(command.clone(), promise.clone(), callback));
        if !shared.is_alive() {
            shared.replies.take(id);
            return Err(MpvError::Shutdown);
        }

        if let Err(code) = shared.engine.command_async(id, &node) {
            shared.replies.take(id);
            return Err(match code {
                ErrorCode::EventQueueFull => {
                    shared.stats.record_overflow_rejection();
                    MpvError::EventOverflow
                }
                code => MpvError::Command { command, code },
            });
        }
        debug!(id, command = ?command, "Submitted async command");

        Ok(CommandFuture {
            id,
            promise,
            shared: Arc::downgrade(shared),
        })
    }

    /// Queue a command and return a future for its reply
    pub fn command_async<S: AsRef<str>>(&self, args: &[S]) -> MpvResult<CommandFuture> {
        self.submit(Node::command(args), argv(args), None)
    }

    /// Queue a command and call `callback` with its outcome on the event loop
    /// thread
    pub fn command_async_with<S, F>(&self, args: &[S], callback: F) -> MpvResult<CommandFuture>
    where
        S: AsRef<str>,
        F: FnOnce(&MpvResult<Value>) -> anyhow::Result<()> + Send + 'static,
    {
        self.submit(Node::command(args), argv(args), Some(Box::new(callback)))
    }

    /// Queue a command given as a node: an argument array or a map with named
    /// arguments (`name` holds the command)
    pub fn command_node_async(&self, node: Node) -> MpvResult<CommandFuture> {
        let command = node_argv(&node);
        self.submit(node, command, None)
    }

    /// Run a command synchronously and return its result
    pub fn command<S: AsRef<str>>(&self, args: &[S]) -> MpvResult<Value> {
        self.run(Node::command(args), argv(args))
    }

    /// Synchronous `command_node_async`
    pub fn command_node(&self, node: Node) -> MpvResult<Value> {
        let command = node_argv(&node);
        self.run(node, command)
    }

    /// Run a command asynchronously and wait at most `timeout` for its reply
    pub fn command_timeout<S: AsRef<str>>(&self, args: &[S], timeout: Duration) -> MpvResult<Value> {
        self.command_async(args)?.wait_timeout(timeout)
    }

    fn run(&self, node: Node, command: Vec<String>) -> MpvResult<Value> {
        self.shared.ensure_live()?;
        if command.first().map_or(true, String::is_empty) {
            return Err(MpvError::command(&command, ErrorCode::InvalidParameter));
        }
        match self.shared.engine.command(&node) {
            Ok(result) => Ok(codec::decode_lenient(&result)),
            Err(ErrorCode::EventQueueFull) => Err(MpvError::EventOverflow),
            Err(code) => Err(MpvError::Command { command, code }),
        }
    }

    /// Number of async commands still waiting for a reply
    pub fn pending_replies(&self) -> usize {
        self.shared.replies.len()
    }

    // ------------------------------------------------------------------------
    // Convenience Commands
    // ------------------------------------------------------------------------

    /// Load `url`. `mode` is `replace` (default), `append` or `append-play`;
    /// `options` are per-file options applied while the entry plays.
    pub fn loadfile(&self, url: &str, mode: Option<&str>, options: &[(&str, &str)]) -> MpvResult<Value> {
        let mut args = vec!["loadfile".to_string(), url.to_string()];
        if mode.is_some() || !options.is_empty() {
            args.push(mode.unwrap_or("replace").to_string());
        }
        if !options.is_empty() {
            let joined = options
                .iter()
                .map(|(k, v)| format!("{}={}", k.replace('_', "-"), v))
                .collect::<Vec<_>>()
                .join(",");
            args.push(joined);
        }
        self.command(&args)
    }

    /// Replace the playlist with `url` and start playing it
    pub fn play(&self, url: &str) -> MpvResult<()> {
        self.loadfile(url, None, &[]).map(|_| ())
    }

    pub fn stop(&self) -> MpvResult<()> {
        self.command(&["stop"]).map(|_| ())
    }

    /// Ask the engine to shut down; the handle stays usable until `terminate`
    pub fn quit(&self, code: Option<i32>) -> MpvResult<()> {
        let result = match code {
            Some(code) => self.command(&["quit".to_string(), code.to_string()]),
            None => self.command(&["quit"]),
        };
        result.map(|_| ())
    }

    /// Seek by `amount`. `reference` is `relative` (default), `absolute` or
    /// `absolute-percent`; `precision` is `default-precise`, `exact` or
    /// `keyframes`.
    pub fn seek(&self, amount: f64, reference: Option<&str>, precision: Option<&str>) -> MpvResult<()> {
        let mut args = vec!["seek".to_string(), amount.to_string(), reference.unwrap_or("relative").to_string()];
        if let Some(precision) = precision {
            args.push(precision.to_string());
        }
        self.command(&args).map(|_| ())
    }

    pub fn playlist_clear(&self) -> MpvResult<()> {
        self.command(&["playlist-clear"]).map(|_| ())
    }

    /// Add an external subtitle file
    pub fn sub_add(&self, url: &str) -> MpvResult<()> {
        self.command(&["sub-add", url]).map(|_| ())
    }

    pub fn show_text(&self, text: &str, duration_ms: Option<u64>) -> MpvResult<()> {
        let result = match duration_ms {
            Some(ms) => self.command(&["show-text".to_string(), text.to_string(), ms.to_string()]),
            None => self.command(&["show-text", text]),
        };
        result.map(|_| ())
    }

    /// Print `text` through the engine's log
    pub fn print_text(&self, text: &str) -> MpvResult<()> {
        self.command(&["print-text", text]).map(|_| ())
    }

    /// Expand `${property}` references the way OSD messages do
    pub fn expand_text(&self, text: &str) -> MpvResult<String> {
        match self.command(&["expand-text", text])? {
            Value::Str(s) => Ok(s),
            Value::Bytes(b) => Ok(String::from_utf8_lossy(&b).into_owned()),
            other => Err(MpvError::format_error(
                "expand-text",
                format!("unexpected result {:?}", other),
            )),
        }
    }

    /// Broadcast a client message to every client, including this one
    pub fn script_message<S: AsRef<str>>(&self, args: &[S]) -> MpvResult<()> {
        let mut command = vec!["script-message".to_string()];
        command.extend(argv(args));
        self.command(&command).map(|_| ())
    }

    /// Send a client message to one named client
    pub fn script_message_to<S: AsRef<str>>(&self, target: &str, args: &[S]) -> MpvResult<()> {
        let mut command = vec!["script-message-to".to_string(), target.to_string()];
        command.extend(argv(args));
        self.command(&command).map(|_| ())
    }

    /// Simulate a key press
    pub fn keypress(&self, key: &str) -> MpvResult<()> {
        self.command(&["keypress", key]).map(|_| ())
    }
}

/// Human-readable argument list of a command node, for error reports
fn node_argv(node: &Node) -> Vec<String> {
    match node {
        Node::Map(_) => node
            .get("name")
            .and_then(Node::as_text)
            .into_iter()
            .collect(),
        other => other.command_args(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_all_resolves_every_pending_reply() {
        let table = ReplyTable::new();
        let promises: Vec<_> = (1..=3)
            .map(|id| {
                let promise = Arc::new(Promise::new());
                table.insert(id, PendingReply::new(vec!["stop".to_string()], promise.clone(), None));
                promise
            })
            .collect();

        assert_eq!(table.fail_all(MpvError::Shutdown), 3);
        assert_eq!(table.len(), 0);
        for promise in promises {
            assert!(matches!(
                promise.wait(Some(Duration::ZERO)),
                Some(Err(MpvError::Shutdown))
            ));
        }
    }

    #[test]
    fn test_node_argv_for_named_arguments() {
        let node = Node::Map(vec![
            ("name".to_string(), Node::string("loadfile")),
            ("url".to_string(), Node::string("clip.mkv")),
        ]);
        assert_eq!(node_argv(&node), vec!["loadfile".to_string()]);
        assert_eq!(
            node_argv(&Node::command(&["seek", "10"])),
            vec!["seek".to_string(), "10".to_string()]
        );
    }
}
