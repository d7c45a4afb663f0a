//! Synchronous Wait Bridge
//!
//! Lets a calling thread block until an event or property condition observed
//! on the event loop thread holds. Each wait registers a one-shot waiter whose
//! predicate is evaluated during dispatch; the first match resolves the
//! waiter's promise with the event.
//!
//! The `prepare_and_wait_*` forms register the waiter *before* running the
//! triggering action, so an event produced synchronously by the action cannot
//! be missed.

use crate::event_loop::panic_message;
use crate::player::Player;
use crate::promise::Promise;
use mpvkit_core::{
    properties, DispatchStats, Event, EventKind, MpvError, MpvResult, Value,
};
use smallvec::SmallVec;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

type Matcher = Box<dyn Fn(&Event) -> bool + Send + Sync>;

// ----------------------------------------------------------------------------
// Wait Options
// ----------------------------------------------------------------------------

/// Tuning of a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// `None` uses the player's default timeout, which may itself be unbounded
    pub timeout: Option<Duration>,
    /// Resolve with listener failures that happen while waiting
    pub catch_errors: bool,
    /// Property waits: accept the current value, not only a later change
    pub level_sensitive: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            catch_errors: true,
            level_sensitive: true,
        }
    }
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn catch_errors(mut self, enabled: bool) -> Self {
        self.catch_errors = enabled;
        self
    }

    pub fn level_sensitive(mut self, enabled: bool) -> Self {
        self.level_sensitive = enabled;
        self
    }
}

// ----------------------------------------------------------------------------
// Waiter Table
// ----------------------------------------------------------------------------

pub(crate) struct Waiter {
    id: u64,
    matches: Matcher,
    catch_errors: bool,
    promise: Promise<MpvResult<Event>>,
}

pub(crate) struct WaiterTable {
    waiters: Mutex<Vec<Arc<Waiter>>>,
    next_id: AtomicU64,
}

impl WaiterTable {
    pub(crate) fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Waiter>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, matches: Matcher, catch_errors: bool) -> Arc<Waiter> {
        let waiter = Arc::new(Waiter {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            matches,
            catch_errors,
            promise: Promise::new(),
        });
        self.lock().push(waiter.clone());
        waiter
    }

    fn remove(&self, id: u64) {
        self.lock().retain(|w| w.id != id);
    }

    fn snapshot(&self) -> SmallVec<[Arc<Waiter>; 4]> {
        self.lock().iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Offer an event to every waiter and resolve the ones that match
    pub(crate) fn dispatch(&self, event: &Event, stats: &DispatchStats) {
        for waiter in self.snapshot() {
            if waiter.promise.is_resolved() {
                continue;
            }
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| (waiter.matches)(event))) {
                Ok(false) => continue,
                Ok(true) => Ok(event.clone()),
                Err(payload) => Err(MpvError::callback(anyhow::anyhow!(
                    "wait condition panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };
            if waiter.promise.resolve(outcome) {
                stats.record_waiter_resolved();
            }
            self.remove(waiter.id);
        }
    }

    /// Hand a listener failure to every waiter that catches errors. Returns
    /// whether anyone took it.
    pub(crate) fn route_error(&self, err: &MpvError) -> bool {
        let mut claimed = false;
        for waiter in self.snapshot().iter().filter(|w| w.catch_errors) {
            if waiter.promise.resolve(Err(err.clone())) {
                claimed = true;
            }
            self.remove(waiter.id);
        }
        claimed
    }

    /// Resolve and drop every waiter. Returns how many were failed.
    pub(crate) fn fail_all(&self, err: MpvError) -> usize {
        let waiters: Vec<_> = self.lock().drain(..).collect();
        waiters
            .iter()
            .filter(|w| w.promise.resolve(Err(err.clone())))
            .count()
    }
}

// ----------------------------------------------------------------------------
// Player API
// ----------------------------------------------------------------------------

fn truthy(value: &Value) -> bool {
    value.is_truthy()
}

impl Player {
    fn effective_timeout(&self, options: &WaitOptions) -> Option<Duration> {
        options.timeout.or_else(|| self.shared.config.default_timeout())
    }

    fn register_waiter(&self, matches: Matcher, catch_errors: bool) -> MpvResult<Arc<Waiter>> {
        self.shared.ensure_live()?;
        let waiter = self.shared.waiters.insert(matches, catch_errors);
        let id = waiter.id;
        self.shared.admit(waiter, || self.shared.waiters.remove(id))
    }

    /// Block on a registered waiter. Shutdown wins over timeout.
    fn await_waiter(&self, waiter: &Waiter, timeout: Option<Duration>) -> MpvResult<Event> {
        let outcome = waiter.promise.wait(timeout);
        self.shared.waiters.remove(waiter.id);
        match outcome {
            Some(result) => result,
            None if !self.shared.is_alive() => Err(MpvError::Shutdown),
            None => Err(MpvError::timeout(timeout.unwrap_or_default())),
        }
    }

    // Events ----------------------------------------------------------------

    /// Wait for the next event of one of `kinds`
    pub fn wait_for_event(&self, kinds: &[EventKind], timeout: Option<Duration>) -> MpvResult<Event> {
        let options = WaitOptions {
            timeout,
            ..WaitOptions::default()
        };
        self.wait_for_event_with(kinds, |_| true, options)
    }

    /// Wait for an event of one of `kinds` that satisfies `cond`
    pub fn wait_for_event_with<C>(&self, kinds: &[EventKind], cond: C, options: WaitOptions) -> MpvResult<Event>
    where
        C: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.prepare_and_wait_for_event_with(kinds, cond, options, || Ok(()))
    }

    /// Run `action` and wait for the next event of one of `kinds` it causes
    pub fn prepare_and_wait_for_event<A>(&self, kinds: &[EventKind], action: A) -> MpvResult<Event>
    where
        A: FnOnce() -> MpvResult<()>,
    {
        self.prepare_and_wait_for_event_with(kinds, |_| true, WaitOptions::default(), action)
    }

    pub fn prepare_and_wait_for_event_with<C, A>(
        &self,
        kinds: &[EventKind],
        cond: C,
        options: WaitOptions,
        action: A,
    ) -> MpvResult<Event>
    where
        C: Fn(&Event) -> bool + Send + Sync + 'static,
        A: FnOnce() -> MpvResult<()>,
    {
        let kinds: SmallVec<[EventKind; 4]> = kinds.iter().copied().collect();
        let matches: Matcher = Box::new(move |event: &Event| {
            (kinds.is_empty() || kinds.contains(&event.kind)) && cond(event)
        });
        let waiter = self.register_waiter(matches, options.catch_errors)?;
        if let Err(err) = action() {
            self.shared.waiters.remove(waiter.id);
            return Err(err);
        }
        self.await_waiter(&waiter, self.effective_timeout(&options))
    }

    // Properties ------------------------------------------------------------

    /// Wait until `name` becomes truthy
    pub fn wait_for_property(&self, name: &str, timeout: Option<Duration>) -> MpvResult<Value> {
        let options = WaitOptions {
            timeout,
            ..WaitOptions::default()
        };
        self.wait_for_property_with(name, truthy, options)
    }

    /// Wait until `cond` holds for the value of `name`
    pub fn wait_for_property_with<C>(&self, name: &str, cond: C, options: WaitOptions) -> MpvResult<Value>
    where
        C: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.prepare_and_wait_for_property_with(name, cond, options, || Ok(()))
    }

    /// Run `action` and wait until `name` becomes truthy
    pub fn prepare_and_wait_for_property<A>(&self, name: &str, action: A) -> MpvResult<Value>
    where
        A: FnOnce() -> MpvResult<()>,
    {
        self.prepare_and_wait_for_property_with(name, truthy, WaitOptions::default(), action)
    }

    /// Observe `name`, run `action`, then wait for `cond` to hold.
    ///
    /// Level-sensitive waits are satisfied by the value at the time of the
    /// call; edge-triggered ones ignore the initial report and need a change.
    pub fn prepare_and_wait_for_property_with<C, A>(
        &self,
        name: &str,
        cond: C,
        options: WaitOptions,
        action: A,
    ) -> MpvResult<Value>
    where
        C: Fn(&Value) -> bool + Send + Sync + 'static,
        A: FnOnce() -> MpvResult<()>,
    {
        let shared = &self.shared;
        shared.ensure_live()?;
        let id = shared.next_observation_id();
        let cond = Arc::new(cond);
        let skip_initial = !options.level_sensitive;
        let seen_initial = AtomicBool::new(false);

        let matcher_cond = cond.clone();
        let matches: Matcher = Box::new(move |event: &Event| {
            if event.kind != EventKind::PropertyChange || event.reply_userdata != id {
                return false;
            }
            if skip_initial && !seen_initial.swap(true, Ordering::AcqRel) {
                return false;
            }
            event.property_value().map_or(false, |value| (*matcher_cond)(value))
        });
        let waiter = self.register_waiter(matches, options.catch_errors)?;

        let engine_name = properties::engine_name(name);
        if let Err(code) = shared.engine.observe_property(id, &engine_name) {
            shared.waiters.remove(waiter.id);
            return Err(MpvError::for_property(name, code));
        }

        let result = self.finish_property_wait(name, &waiter, &*cond, options, action);

        shared.waiters.remove(waiter.id);
        if shared.is_alive() {
            if let Err(code) = shared.engine.unobserve_property(id) {
                debug!(id, error = %code, "Failed to drop wait observation");
            }
        }
        result
    }

    fn finish_property_wait<A>(
        &self,
        name: &str,
        waiter: &Waiter,
        cond: &(dyn Fn(&Value) -> bool + Send + Sync),
        options: WaitOptions,
        action: A,
    ) -> MpvResult<Value>
    where
        A: FnOnce() -> MpvResult<()>,
    {
        action()?;
        if options.level_sensitive {
            // Unavailable right now is fine; keep waiting for a change
            if let Ok(current) = self.get_property(name) {
                if cond(&current) {
                    return Ok(current);
                }
            }
        }
        let event = self.await_waiter(waiter, self.effective_timeout(&options))?;
        Ok(event.property_value().cloned().unwrap_or(Value::None))
    }

    // Convenience -----------------------------------------------------------

    /// Wait until playback is running: not idle and not paused
    pub fn wait_until_playing(&self, timeout: Option<Duration>) -> MpvResult<()> {
        let options = WaitOptions {
            timeout,
            ..WaitOptions::default()
        };
        self.wait_for_property_with("core-idle", |idle| idle.as_bool() == Some(false), options)
            .map(|_| ())
    }

    pub fn wait_until_paused(&self, timeout: Option<Duration>) -> MpvResult<()> {
        let options = WaitOptions {
            timeout,
            ..WaitOptions::default()
        };
        self.wait_for_property_with("core-idle", |idle| idle.as_bool() == Some(true), options)
            .map(|_| ())
    }

    /// Wait for the current entry to end and return its end-file event
    pub fn wait_for_playback(&self, timeout: Option<Duration>) -> MpvResult<Event> {
        self.wait_for_event(&[EventKind::EndFile], timeout)
    }

    /// Wait until the engine shuts down. Succeeds if the handle is already gone.
    pub fn wait_for_shutdown(&self, timeout: Option<Duration>) -> MpvResult<()> {
        if !self.shared.is_alive() {
            return Ok(());
        }
        match self.wait_for_event(&[EventKind::Shutdown], timeout) {
            Ok(_) | Err(MpvError::Shutdown) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Number of registered one-shot waiters
    pub fn pending_waiters(&self) -> usize {
        self.shared.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(matcher: Matcher, catch_errors: bool) -> (WaiterTable, Arc<Waiter>) {
        let table = WaiterTable::new();
        let waiter = table.insert(matcher, catch_errors);
        (table, waiter)
    }

    #[test]
    fn test_dispatch_resolves_matching_waiter_once() {
        let stats = DispatchStats::new();
        let (table, waiter) = table_with(Box::new(|e: &Event| e.kind == EventKind::Idle), true);

        table.dispatch(&Event::new(EventKind::Seek), &stats);
        assert_eq!(table.len(), 1);
        table.dispatch(&Event::new(EventKind::Idle), &stats);
        assert_eq!(table.len(), 0);

        let event = waiter.promise.wait(Some(Duration::ZERO)).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Idle);
        assert_eq!(stats.snapshot().waiters_resolved, 1);
    }

    #[test]
    fn test_panicking_condition_fails_the_waiter() {
        let stats = DispatchStats::new();
        let (table, waiter) = table_with(Box::new(|_: &Event| -> bool { panic!("bad predicate") }), false);
        table.dispatch(&Event::new(EventKind::Idle), &stats);
        let err = waiter.promise.wait(Some(Duration::ZERO)).unwrap().unwrap_err();
        assert!(matches!(err, MpvError::Callback(_)));
    }

    #[test]
    fn test_route_error_only_reaches_catching_waiters() {
        let table = WaiterTable::new();
        let catching = table.insert(Box::new(|_: &Event| false), true);
        let ignoring = table.insert(Box::new(|_: &Event| false), false);

        let err = MpvError::callback(anyhow::anyhow!("observer failed"));
        assert!(table.route_error(&err));
        assert!(catching.promise.is_resolved());
        assert!(!ignoring.promise.is_resolved());
        assert_eq!(table.len(), 1);

        assert_eq!(table.fail_all(MpvError::Shutdown), 1);
        assert!(matches!(
            ignoring.promise.wait(Some(Duration::ZERO)),
            Some(Err(MpvError::Shutdown))
        ));
    }
}
