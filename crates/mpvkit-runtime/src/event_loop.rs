//! Event Loop Thread
//!
//! A dedicated, named OS thread drains the engine queue with a bounded blocking
//! wait and dispatches each event in a fixed order:
//!
//! 1. property observer registered under the event's observation id
//! 2. log handlers (and optional forwarding to `tracing`)
//! 3. command-reply correlation
//! 4. client-message handlers, including key bindings
//! 5. generic event callbacks, filtered by kind
//! 6. one-shot waiters
//!
//! Events are dispatched one at a time in arrival order. When a stop is
//! requested the events already queued are drained before the loop exits.
//! Listener failures (`Err` or panic) never stop the loop; they are routed to
//! the interested waiters or kept in the handle's error list.

use crate::key_bindings::{KeyEvent, KEY_BINDING_MESSAGE};
use crate::player::Shared;
use mpvkit_core::{Event, EventData, EventKind, LogLevel, MpvError, MpvResult, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

// ----------------------------------------------------------------------------
// Loop State
// ----------------------------------------------------------------------------

/// Upper bound on events dispatched after a stop request. A playing engine
/// can keep producing events while the loop drains.
const DRAIN_LIMIT: usize = 10_000;

/// Lifecycle of the event loop thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoopState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LoopState {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            0 => LoopState::Starting,
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }
}

/// Marks the loop as finished even when the thread unwinds
struct DoneGuard<'a>(&'a Shared);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.set_loop_state(LoopState::Stopped);
        self.0.mark_loop_done();
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `f`, turning a panic into an error
pub(crate) fn catch_callback<F>(what: &str, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "{} panicked: {}",
            what,
            panic_message(payload.as_ref())
        )),
    }
}

// ----------------------------------------------------------------------------
// Event Loop
// ----------------------------------------------------------------------------

/// Start the event loop thread for `shared`
pub(crate) fn spawn(shared: Arc<Shared>) -> MpvResult<JoinHandle<()>> {
    let name = shared.config.event_loop.thread_name.clone();
    thread::Builder::new()
        .name(name)
        .spawn(move || EventLoop { shared }.run())
        .map_err(|e| MpvError::config(format!("failed to spawn event loop thread: {}", e)))
}

struct EventLoop {
    shared: Arc<Shared>,
}

impl EventLoop {
    fn run(self) {
        let shared = &*self.shared;
        let _done = DoneGuard(shared);
        shared.register_event_thread();
        if !shared.is_terminated() {
            shared.set_loop_state(LoopState::Running);
        }
        info!(client = %shared.client_name, "Event loop started");

        let timeout = shared.config.event_loop.wait_timeout();
        let mut engine_live = true;
        while engine_live && !shared.is_terminated() {
            let raw = shared.engine.wait_event(Some(timeout));
            if raw.is_none() {
                continue;
            }
            engine_live = self.process(&raw.decode());
        }

        shared.set_loop_state(LoopState::Stopping);
        if engine_live {
            self.drain();
        }
        shared.fail_pending();
        info!(
            dispatched = shared.stats.events_dispatched(),
            failures = shared.stats.callback_failures(),
            "Event loop stopped"
        );
    }

    /// Dispatch one event. Returns false once the engine reported shutdown.
    fn process(&self, event: &Event) -> bool {
        if event.kind == EventKind::Shutdown {
            self.shared.mark_core_shutdown();
            self.dispatch(event);
            debug!("Engine reported shutdown");
            return false;
        }
        self.dispatch(event);
        true
    }

    /// Dispatch the events queued before a stop request
    fn drain(&self) {
        let mut drained = 0_usize;
        while drained < DRAIN_LIMIT {
            let raw = self.shared.engine.wait_event(Some(Duration::ZERO));
            if raw.is_none() {
                break;
            }
            drained += 1;
            if !self.process(&raw.decode()) {
                break;
            }
        }
        if drained >= DRAIN_LIMIT {
            warn!(drained, "Engine kept producing events, stopped draining");
        } else if drained > 0 {
            debug!(drained, "Drained queued events before stopping");
        }
    }

    fn dispatch(&self, event: &Event) {
        let shared = &*self.shared;
        shared.stats.record_received(event.kind);
        trace!(kind = %event.kind, id = event.reply_userdata, "Dispatching event");

        match event.kind {
            EventKind::PropertyChange => self.notify_observer(event),
            EventKind::LogMessage => self.deliver_log(event),
            EventKind::CommandReply => self.resolve_reply(event),
            EventKind::ClientMessage => self.route_client_message(event),
            EventKind::QueueOverflow => {
                warn!("Engine event queue overflowed, events were dropped")
            }
            _ => {}
        }

        for entry in shared.registry.event_callbacks_for(event.kind) {
            if entry.active.load(Ordering::Acquire) {
                self.invoke("event callback", || (entry.callback)(event));
            }
        }

        shared.waiters.dispatch(event, &shared.stats);
        shared.stats.record_dispatched();
    }

    /// Run one listener and route its failure
    fn invoke<F>(&self, what: &str, f: F)
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        if let Err(err) = catch_callback(what, f) {
            self.report_failure(what, err);
        }
    }

    fn report_failure(&self, what: &str, err: anyhow::Error) {
        let shared = &*self.shared;
        shared.stats.record_callback_failure();
        let err = MpvError::callback(err);
        if shared.waiters.route_error(&err) {
            debug!(listener = what, error = %err, "Callback failure delivered to waiters");
        } else {
            error!(listener = what, error = %err, "Callback failed");
            shared.push_error(err);
        }
    }

    // Dispatch stages -------------------------------------------------------

    fn notify_observer(&self, event: &Event) {
        let Some(entry) = self.shared.registry.observer(event.reply_userdata) else {
            return;
        };
        let Some(value) = event.property_value() else {
            return;
        };
        if entry.active.load(Ordering::Acquire) {
            self.invoke("property observer", || (entry.callback)(&entry.name, value));
        }
    }

    fn deliver_log(&self, event: &Event) {
        let EventData::LogMessage {
            prefix,
            level,
            text,
        } = &event.data
        else {
            return;
        };
        let text = text.trim_end_matches('\n');
        if self.shared.config.forward_engine_logs {
            forward_log(*level, prefix, text);
        }
        for entry in self.shared.registry.log_handlers() {
            if entry.active.load(Ordering::Acquire) {
                self.invoke("log handler", || (entry.handler)(*level, prefix, text));
            }
        }
    }

    fn resolve_reply(&self, event: &Event) {
        let shared = &*self.shared;
        let Some(pending) = shared.replies.take(event.reply_userdata) else {
            debug!(id = event.reply_userdata, "Command reply without a pending entry");
            return;
        };

        let callback = pending.take_callback();
        let outcome = if event.error.is_success() {
            Ok(match &event.data {
                EventData::CommandReply { result } => result.clone(),
                _ => Value::None,
            })
        } else {
            Err(MpvError::Command {
                command: pending.command,
                code: event.error,
            })
        };

        // A failing reply callback fails the reply itself
        let outcome = match callback {
            Some(callback) => match catch_callback("reply callback", || callback(&outcome)) {
                Ok(()) => outcome,
                Err(err) => {
                    shared.stats.record_callback_failure();
                    warn!(id = event.reply_userdata, error = %err, "Reply callback failed");
                    Err(MpvError::callback(err))
                }
            },
            None => outcome,
        };

        pending.promise.resolve(outcome);
        shared.stats.record_reply_resolved();
    }

    fn route_client_message(&self, event: &Event) {
        let Some((target, rest)) = event.client_args().and_then(<[String]>::split_first) else {
            return;
        };

        if target == KEY_BINDING_MESSAGE {
            let Some((section, key_args)) = rest.split_first() else {
                return;
            };
            let Some(entry) = self.shared.key_bindings.handler(section) else {
                debug!(section = %section, "Key binding message for an unknown section");
                return;
            };
            if entry.active.load(Ordering::Acquire) {
                let key = KeyEvent::from_args(key_args);
                self.invoke("key binding", || (entry.handler)(&key));
            }
            return;
        }

        match self.shared.registry.message_handler(target) {
            Some(entry) if entry.active.load(Ordering::Acquire) => {
                self.invoke("message handler", || (entry.handler)(rest));
            }
            _ => debug!(target = %target, "Client message without a handler"),
        }
    }
}

/// Re-emit an engine log line through `tracing` at the matching level
fn forward_log(level: LogLevel, prefix: &str, text: &str) {
    match level {
        LogLevel::Fatal | LogLevel::Error => error!(target: "mpv", prefix, "{}", text),
        LogLevel::Warn => warn!(target: "mpv", prefix, "{}", text),
        LogLevel::Info | LogLevel::Status => info!(target: "mpv", prefix, "{}", text),
        LogLevel::V | LogLevel::Debug => debug!(target: "mpv", prefix, "{}", text),
        LogLevel::Trace => trace!(target: "mpv", prefix, "{}", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_state_raw_mapping() {
        for state in [
            LoopState::Starting,
            LoopState::Running,
            LoopState::Stopping,
            LoopState::Stopped,
        ] {
            assert_eq!(LoopState::from_raw(state as u8), state);
        }
    }

    #[test]
    fn test_catch_callback_converts_panics() {
        let err = catch_callback("observer", || panic!("boom")).unwrap_err();
        assert_eq!(err.to_string(), "observer panicked: boom");
        assert!(catch_callback("observer", || Ok(())).is_ok());
    }
}
