//! Player Handle
//!
//! `Player` owns one engine instance together with its event loop thread and
//! every per-handle table (listeners, pending replies, waiters, key bindings,
//! stream protocols). State shared with the event loop lives in `Shared`; the
//! handle itself only adds the join handle of the loop thread.
//!
//! A handle is LIVE from construction until `terminate()` (or drop), after which
//! every operation fails with `MpvError::Shutdown`.

use crate::builder::PlayerBuilder;
use crate::commands::ReplyTable;
use crate::event_loop::LoopState;
use crate::key_bindings::KeyBindingTable;
use crate::registry::Registry;
use crate::streams::StreamTable;
use crate::wait::WaiterTable;
use mpvkit_core::{
    codec, properties, DecodePolicy, DispatchSnapshot, DispatchStats, Engine, ErrorCode, Format,
    MpvError, MpvResult, Node, PlayerConfig, Value,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// State reachable from both calling threads and the event loop thread
pub(crate) struct Shared {
    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) config: PlayerConfig,
    pub(crate) client_name: String,
    pub(crate) registry: Registry,
    pub(crate) replies: ReplyTable,
    pub(crate) waiters: WaiterTable,
    pub(crate) key_bindings: KeyBindingTable,
    pub(crate) streams: StreamTable,
    pub(crate) stats: DispatchStats,
    terminated: AtomicBool,
    /// Set once the engine reported shutdown on its own (e.g. after `quit`)
    core_shutdown: AtomicBool,
    destroyed: AtomicBool,
    loop_state: AtomicU8,
    loop_done: Mutex<bool>,
    loop_done_cond: Condvar,
    event_thread: OnceLock<ThreadId>,
    errors: Mutex<VecDeque<MpvError>>,
    next_observation_id: AtomicU64,
    next_reply_id: AtomicU64,
}

impl Shared {
    pub(crate) fn new(engine: Arc<dyn Engine>, config: PlayerConfig) -> Self {
        let client_name = engine.client_name();
        Self {
            engine,
            config,
            client_name,
            registry: Registry::new(),
            replies: ReplyTable::new(),
            waiters: WaiterTable::new(),
            key_bindings: KeyBindingTable::new(),
            streams: StreamTable::new(),
            stats: DispatchStats::new(),
            terminated: AtomicBool::new(false),
            core_shutdown: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            loop_state: AtomicU8::new(LoopState::Starting as u8),
            loop_done: Mutex::new(false),
            loop_done_cond: Condvar::new(),
            event_thread: OnceLock::new(),
            errors: Mutex::new(VecDeque::new()),
            next_observation_id: AtomicU64::new(1),
            next_reply_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// False once the handle was terminated or the engine shut itself down
    pub(crate) fn is_alive(&self) -> bool {
        !self.is_terminated() && !self.core_shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_live(&self) -> MpvResult<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(MpvError::Shutdown)
        }
    }

    /// Keep a registration made after `ensure_live` only while the handle is
    /// still live. Termination may have cleared the tables in between; then
    /// `undo` removes the entry and the call fails with `Shutdown`.
    pub(crate) fn admit<T>(&self, value: T, undo: impl FnOnce()) -> MpvResult<T> {
        if self.is_alive() {
            Ok(value)
        } else {
            undo();
            Err(MpvError::Shutdown)
        }
    }

    pub(crate) fn mark_core_shutdown(&self) {
        self.core_shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn next_observation_id(&self) -> u64 {
        self.next_observation_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_reply_id(&self) -> u64 {
        self.next_reply_id.fetch_add(1, Ordering::Relaxed)
    }

    // Event loop bookkeeping ------------------------------------------------

    pub(crate) fn loop_state(&self) -> LoopState {
        LoopState::from_raw(self.loop_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_loop_state(&self, state: LoopState) {
        self.loop_state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn register_event_thread(&self) {
        let _ = self.event_thread.set(thread::current().id());
    }

    pub(crate) fn is_event_thread(&self) -> bool {
        self.event_thread.get() == Some(&thread::current().id())
    }

    pub(crate) fn mark_loop_done(&self) {
        *lock(&self.loop_done) = true;
        self.loop_done_cond.notify_all();
    }

    fn wait_loop_done(&self) {
        let mut done = lock(&self.loop_done);
        while !*done {
            done = self
                .loop_done_cond
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    // Errors ----------------------------------------------------------------

    /// Keep a callback failure nobody claimed. The oldest entry is dropped once
    /// the list is full.
    pub(crate) fn push_error(&self, err: MpvError) {
        let mut errors = lock(&self.errors);
        if errors.len() >= self.config.event_loop.max_callback_errors {
            errors.pop_front();
        }
        errors.push_back(err);
    }

    /// Resolve everything still waiting on the event loop with `Shutdown`
    pub(crate) fn fail_pending(&self) {
        let replies = self.replies.fail_all(MpvError::Shutdown);
        let waiters = self.waiters.fail_all(MpvError::Shutdown);
        if replies + waiters > 0 {
            debug!(replies, waiters, "Failed pending operations with shutdown");
        }
    }

    pub(crate) fn request_log_messages(&self) -> MpvResult<()> {
        let level = self.config.log_level.as_deref().unwrap_or("terminal-default");
        self.engine
            .request_log_messages(level)
            .map_err(MpvError::from_code)
    }
}

// ----------------------------------------------------------------------------
// Player Handle
// ----------------------------------------------------------------------------

/// Handle to one engine instance
pub struct Player {
    pub(crate) shared: Arc<Shared>,
    event_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Create a handle with `config`. See `PlayerBuilder` for log handlers.
    pub fn new(engine: Arc<dyn Engine>, config: PlayerConfig) -> MpvResult<Self> {
        PlayerBuilder::new().with_config(config).build(engine)
    }

    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::new()
    }

    pub(crate) fn from_parts(shared: Arc<Shared>, event_thread: JoinHandle<()>) -> Self {
        Self {
            shared,
            event_thread: Mutex::new(Some(event_thread)),
        }
    }

    pub fn client_name(&self) -> &str {
        &self.shared.client_name
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.is_terminated()
    }

    /// False once terminated or after the engine shut itself down
    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    pub fn loop_state(&self) -> LoopState {
        self.shared.loop_state()
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.shared.stats.snapshot()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Stop the event loop, fail everything pending with `Shutdown` and destroy
    /// the engine. Idempotent. Called from the event loop thread (inside a
    /// callback) this only asks the engine to quit.
    pub fn terminate(&self) {
        let shared = &self.shared;
        if shared.is_event_thread() {
            if shared.is_alive() {
                debug!("Terminate requested on the event thread, sending quit");
                if let Err(code) = shared.engine.command(&Node::command(&["quit"])) {
                    warn!(error = %code, "Quit from the event thread failed");
                }
            }
            return;
        }

        let first = !shared.terminated.swap(true, Ordering::AcqRel);
        if first {
            info!(client = %shared.client_name, "Terminating player");
            if shared.loop_state() == LoopState::Running {
                shared.set_loop_state(LoopState::Stopping);
            }
            shared.engine.wakeup();
        }

        let handle = lock(&self.event_thread).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Event loop thread panicked");
            }
            shared.set_loop_state(LoopState::Stopped);
        }

        shared.fail_pending();
        if first {
            shared.registry.clear();
            shared.key_bindings.clear();
            shared.streams.clear();
        }
        if !shared.destroyed.swap(true, Ordering::AcqRel) {
            shared.engine.destroy();
            info!("Player terminated");
        }
    }

    /// Block until the event loop thread exits, then report the first callback
    /// failure it collected
    pub fn join_event_loop(&self) -> MpvResult<()> {
        if self.shared.is_event_thread() {
            return Err(MpvError::Engine {
                code: ErrorCode::InvalidParameter,
            });
        }
        self.shared.wait_loop_done();
        let handle = lock(&self.event_thread).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Event loop thread panicked");
            }
        }
        match lock(&self.shared.errors).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drain collected callback failures without blocking
    pub fn take_callback_errors(&self) -> Vec<MpvError> {
        lock(&self.shared.errors).drain(..).collect()
    }

    // ------------------------------------------------------------------------
    // Property Access
    // ------------------------------------------------------------------------

    /// Read a property using the configured decode policy
    pub fn get_property(&self, name: &str) -> MpvResult<Value> {
        self.get_property_with(name, self.shared.config.decode_policy)
    }

    pub fn get_property_with(&self, name: &str, policy: DecodePolicy) -> MpvResult<Value> {
        self.shared.ensure_live()?;
        let node = self
            .shared
            .engine
            .get_property(&properties::engine_name(name), Format::Node)
            .map_err(|code| MpvError::for_property(name, code))?;
        codec::decode_property(name, &node, policy)
    }

    /// Read the OSD rendering of a property
    pub fn get_property_osd(&self, name: &str) -> MpvResult<String> {
        self.shared.ensure_live()?;
        let node = self
            .shared
            .engine
            .get_property(&properties::engine_name(name), Format::OsdString)
            .map_err(|code| MpvError::for_property(name, code))?;
        codec::decode_osd(name, &node)
    }

    pub fn set_property<V: Into<Value>>(&self, name: &str, value: V) -> MpvResult<()> {
        self.shared.ensure_live()?;
        let node = codec::encode_property(name, &value.into())?;
        self.shared
            .engine
            .set_property(&properties::engine_name(name), &node)
            .map_err(|code| MpvError::for_property(name, code))
    }

    /// Read an option through the `options/` property path
    pub fn get_option(&self, name: &str) -> MpvResult<Value> {
        self.get_property(&format!("options/{}", name))
    }

    pub fn set_option<V: Into<Value>>(&self, name: &str, value: V) -> MpvResult<()> {
        self.set_property(&format!("options/{}", name), value)
    }

    /// Every property name the engine knows
    pub fn property_list(&self) -> MpvResult<Vec<String>> {
        self.get_property("property-list").map(string_list)
    }

    pub fn option_list(&self) -> MpvResult<Vec<String>> {
        self.get_property("option-list").map(string_list)
    }

    /// Reads that keep every string as bytes
    pub fn raw(&self) -> PropertyView<'_> {
        PropertyView {
            player: self,
            policy: DecodePolicy::Raw,
        }
    }

    /// Reads that fail on invalid UTF-8
    pub fn strict(&self) -> PropertyView<'_> {
        PropertyView {
            player: self,
            policy: DecodePolicy::Strict,
        }
    }

    pub fn lenient(&self) -> PropertyView<'_> {
        PropertyView {
            player: self,
            policy: DecodePolicy::Lenient,
        }
    }

    pub fn osd(&self) -> OsdView<'_> {
        OsdView { player: self }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::List(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Str(s) => Some(s),
                Value::Bytes(b) => Some(String::from_utf8_lossy(&b).into_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ----------------------------------------------------------------------------
// Decoding Views
// ----------------------------------------------------------------------------

/// Property reads under a fixed decode policy
#[derive(Clone, Copy)]
pub struct PropertyView<'a> {
    player: &'a Player,
    policy: DecodePolicy,
}

impl PropertyView<'_> {
    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    pub fn get(&self, name: &str) -> MpvResult<Value> {
        self.player.get_property_with(name, self.policy)
    }
}

/// OSD-string property reads
#[derive(Clone, Copy)]
pub struct OsdView<'a> {
    player: &'a Player,
}

impl OsdView<'_> {
    pub fn get(&self, name: &str) -> MpvResult<String> {
        self.player.get_property_osd(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EventCallback;
    use mpvkit_harness::FakeEngine;

    fn noop() -> EventCallback {
        Arc::new(|_: &mpvkit_core::Event| Ok(()))
    }

    #[test]
    fn test_registration_racing_termination_is_undone() {
        let shared = Shared::new(Arc::new(FakeEngine::new()), PlayerConfig::testing());
        let id = shared.registry.insert_event_callback(None, noop());
        assert_eq!(shared.admit(id, || {}).unwrap(), id);

        // Termination lands between the liveness check and the insert
        shared.terminated.store(true, Ordering::Release);
        let late = shared.registry.insert_event_callback(None, noop());
        let result = shared.admit(late, || {
            shared.registry.remove_event_callback(late);
        });

        assert!(matches!(result, Err(MpvError::Shutdown)));
        assert!(!shared.registry.remove_event_callback(late));
        assert!(shared.registry.remove_event_callback(id));
    }
}
