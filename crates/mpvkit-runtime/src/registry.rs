//! Observer Registry
//!
//! Listener tables owned by a player handle: property observers keyed by
//! observation id, generic event callbacks, log handlers and client-message
//! handlers. Every listener carries an `active` flag; the event loop works on
//! snapshots and re-checks the flag right before each invocation, so listeners
//! may unregister themselves (or each other) from inside a callback.

use crate::player::{Player, Shared};
use dashmap::DashMap;
use mpvkit_core::{properties, Event, EventKind, LogLevel, MpvError, MpvResult, Value};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

/// Correlation id of one property observation
pub type ObservationId = u64;

/// Id of a registered event callback or log handler
pub type ListenerId = u64;

pub type PropertyCallback = Arc<dyn Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync>;
pub type EventCallback = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;
pub type LogHandler = Arc<dyn Fn(LogLevel, &str, &str) -> anyhow::Result<()> + Send + Sync>;
pub type MessageHandler = Arc<dyn Fn(&[String]) -> anyhow::Result<()> + Send + Sync>;

pub(crate) type KindFilter = SmallVec<[EventKind; 4]>;

// ----------------------------------------------------------------------------
// Listener Entries
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct ObserverEntry {
    /// Name as given at registration; passed back to the callback
    pub name: String,
    pub callback: PropertyCallback,
    pub active: Arc<AtomicBool>,
}

#[derive(Clone)]
pub(crate) struct EventCallbackEntry {
    pub id: ListenerId,
    /// `None` receives every kind
    pub kinds: Option<KindFilter>,
    pub callback: EventCallback,
    pub active: Arc<AtomicBool>,
}

impl EventCallbackEntry {
    pub(crate) fn wants(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

#[derive(Clone)]
pub(crate) struct LogHandlerEntry {
    pub id: ListenerId,
    pub handler: LogHandler,
    pub active: Arc<AtomicBool>,
}

#[derive(Clone)]
pub(crate) struct MessageEntry {
    pub handler: MessageHandler,
    pub active: Arc<AtomicBool>,
}

fn same_callback(a: &PropertyCallback, b: &PropertyCallback) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Per-handle listener tables
pub(crate) struct Registry {
    observers: DashMap<ObservationId, ObserverEntry>,
    event_callbacks: Mutex<Vec<EventCallbackEntry>>,
    log_handlers: Mutex<Vec<LogHandlerEntry>>,
    message_handlers: DashMap<String, MessageEntry>,
    next_listener_id: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            observers: DashMap::new(),
            event_callbacks: Mutex::new(Vec::new()),
            log_handlers: Mutex::new(Vec::new()),
            message_handlers: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
        }
    }

    fn next_listener_id(&self) -> ListenerId {
        self.next_listener_id.fetch_add(1, Ordering::Relaxed)
    }

    // Property observers ----------------------------------------------------

    pub(crate) fn insert_observer(&self, id: ObservationId, name: &str, callback: PropertyCallback) {
        self.observers.insert(
            id,
            ObserverEntry {
                name: name.to_string(),
                callback,
                active: Arc::new(AtomicBool::new(true)),
            },
        );
    }

    /// Clone of the observer entry; no table lock is held afterwards
    pub(crate) fn observer(&self, id: ObservationId) -> Option<ObserverEntry> {
        self.observers.get(&id).map(|entry| entry.value().clone())
    }

    pub(crate) fn remove_observer(&self, id: ObservationId) -> bool {
        match self.observers.remove(&id) {
            Some((_, entry)) => {
                entry.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Ids observing `name`, optionally restricted to one callback
    pub(crate) fn observer_ids(
        &self,
        name: &str,
        callback: Option<&PropertyCallback>,
    ) -> Vec<ObservationId> {
        let wanted = properties::engine_name(name);
        self.observers
            .iter()
            .filter(|entry| properties::engine_name(&entry.name) == wanted)
            .filter(|entry| callback.map_or(true, |cb| same_callback(cb, &entry.callback)))
            .map(|entry| *entry.key())
            .collect()
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // Event callbacks -------------------------------------------------------

    pub(crate) fn insert_event_callback(
        &self,
        kinds: Option<KindFilter>,
        callback: EventCallback,
    ) -> ListenerId {
        let id = self.next_listener_id();
        lock(&self.event_callbacks).push(EventCallbackEntry {
            id,
            kinds,
            callback,
            active: Arc::new(AtomicBool::new(true)),
        });
        id
    }

    pub(crate) fn remove_event_callback(&self, id: ListenerId) -> bool {
        let mut callbacks = lock(&self.event_callbacks);
        match callbacks.iter().position(|entry| entry.id == id) {
            Some(index) => {
                callbacks.remove(index).active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub(crate) fn event_callbacks_for(&self, kind: EventKind) -> SmallVec<[EventCallbackEntry; 8]> {
        lock(&self.event_callbacks)
            .iter()
            .filter(|entry| entry.wants(kind))
            .cloned()
            .collect()
    }

    // Log handlers ----------------------------------------------------------

    pub(crate) fn insert_log_handler(&self, handler: LogHandler) -> ListenerId {
        let id = self.next_listener_id();
        lock(&self.log_handlers).push(LogHandlerEntry {
            id,
            handler,
            active: Arc::new(AtomicBool::new(true)),
        });
        id
    }

    pub(crate) fn remove_log_handler(&self, id: ListenerId) -> bool {
        let mut handlers = lock(&self.log_handlers);
        match handlers.iter().position(|entry| entry.id == id) {
            Some(index) => {
                handlers.remove(index).active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub(crate) fn log_handlers(&self) -> SmallVec<[LogHandlerEntry; 4]> {
        lock(&self.log_handlers).iter().cloned().collect()
    }

    // Message handlers ------------------------------------------------------

    /// Install a handler, replacing any previous one for `target`
    pub(crate) fn insert_message_handler(&self, target: &str, handler: MessageHandler) {
        let entry = MessageEntry {
            handler,
            active: Arc::new(AtomicBool::new(true)),
        };
        if let Some(previous) = self.message_handlers.insert(target.to_string(), entry) {
            previous.active.store(false, Ordering::Release);
        }
    }

    pub(crate) fn remove_message_handler(&self, target: &str) -> bool {
        match self.message_handlers.remove(target) {
            Some((_, entry)) => {
                entry.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub(crate) fn message_handler(&self, target: &str) -> Option<MessageEntry> {
        self.message_handlers.get(target).map(|entry| entry.value().clone())
    }

    /// Deactivate and drop every listener
    pub(crate) fn clear(&self) {
        for entry in self.observers.iter() {
            entry.active.store(false, Ordering::Release);
        }
        self.observers.clear();
        for entry in lock(&self.event_callbacks).drain(..) {
            entry.active.store(false, Ordering::Release);
        }
        for entry in lock(&self.log_handlers).drain(..) {
            entry.active.store(false, Ordering::Release);
        }
        for entry in self.message_handlers.iter() {
            entry.active.store(false, Ordering::Release);
        }
        self.message_handlers.clear();
    }
}

// ----------------------------------------------------------------------------
// Owner Groups
// ----------------------------------------------------------------------------

/// Observations created together by `Player::property_observer`
pub struct ObserverGroup {
    shared: Weak<Shared>,
    ids: Vec<ObservationId>,
}

impl ObserverGroup {
    pub fn ids(&self) -> &[ObservationId] {
        &self.ids
    }

    /// Remove every observation of the group. A no-op once the player is gone.
    pub fn unobserve_all(&self) -> MpvResult<()> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };
        for id in &self.ids {
            shared.unobserve(*id)?;
        }
        Ok(())
    }
}

/// Event callback created by `Player::event_callback`
pub struct EventCallbackGroup {
    shared: Weak<Shared>,
    id: ListenerId,
}

impl EventCallbackGroup {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn unregister(&self) -> bool {
        self.shared
            .upgrade()
            .map_or(false, |shared| shared.registry.remove_event_callback(self.id))
    }
}

// ----------------------------------------------------------------------------
// Shared-state Operations
// ----------------------------------------------------------------------------

impl Shared {
    /// Drop one observation from the registry and the engine
    pub(crate) fn unobserve(&self, id: ObservationId) -> MpvResult<()> {
        if !self.registry.remove_observer(id) {
            return Ok(());
        }
        if self.is_terminated() {
            return Ok(());
        }
        if let Err(code) = self.engine.unobserve_property(id) {
            debug!(id, error = %code, "Engine rejected unobserve");
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Player API
// ----------------------------------------------------------------------------

impl Player {
    /// Call `callback(name, value)` whenever `name` changes. The engine reports
    /// the current value right after registration.
    pub fn observe_property<F>(&self, name: &str, callback: F) -> MpvResult<ObservationId>
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.observe_property_callback(name, Arc::new(callback))
    }

    /// `observe_property` with a shared callback, so it can later be passed to
    /// `unobserve_property`
    pub fn observe_property_callback(
        &self,
        name: &str,
        callback: PropertyCallback,
    ) -> MpvResult<ObservationId> {
        let shared = &self.shared;
        shared.ensure_live()?;
        let id = shared.next_observation_id();
        // Registered before the engine call so the initial report is never missed
        shared.registry.insert_observer(id, name, callback);
        if let Err(code) = shared
            .engine
            .observe_property(id, &properties::engine_name(name))
        {
            shared.registry.remove_observer(id);
            return Err(MpvError::for_property(name, code));
        }
        let id = shared.admit(id, || {
            shared.registry.remove_observer(id);
        })?;
        debug!(id, property = name, "Observing property");
        Ok(id)
    }

    /// Remove observations of `name`: the ones using `callback`, or all of them.
    /// Returns how many were removed.
    pub fn unobserve_property(
        &self,
        name: &str,
        callback: Option<&PropertyCallback>,
    ) -> MpvResult<usize> {
        self.shared.ensure_live()?;
        let ids = self.shared.registry.observer_ids(name, callback);
        for id in &ids {
            self.shared.unobserve(*id)?;
        }
        Ok(ids.len())
    }

    pub fn unobserve_id(&self, id: ObservationId) -> MpvResult<()> {
        self.shared.ensure_live()?;
        self.shared.unobserve(id)
    }

    /// Observe several properties with one callback and return the group
    pub fn property_observer<F>(&self, names: &[&str], callback: F) -> MpvResult<ObserverGroup>
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: PropertyCallback = Arc::new(callback);
        let mut group = ObserverGroup {
            shared: Arc::downgrade(&self.shared),
            ids: Vec::with_capacity(names.len()),
        };
        for name in names {
            match self.observe_property_callback(name, callback.clone()) {
                Ok(id) => group.ids.push(id),
                Err(err) => {
                    if let Err(cleanup) = group.unobserve_all() {
                        warn!(error = %cleanup, "Failed to roll back partial observer group");
                    }
                    return Err(err);
                }
            }
        }
        Ok(group)
    }

    pub fn observer_count(&self) -> usize {
        self.shared.registry.observer_count()
    }

    // Event callbacks -------------------------------------------------------

    /// Call `callback` for every event
    pub fn register_event_callback<F>(&self, callback: F) -> MpvResult<ListenerId>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let shared = &self.shared;
        shared.ensure_live()?;
        let id = shared.registry.insert_event_callback(None, Arc::new(callback));
        shared.admit(id, || {
            shared.registry.remove_event_callback(id);
        })
    }

    /// Call `callback` for events of the given kinds. An empty slice means all.
    pub fn event_callback<F>(&self, kinds: &[EventKind], callback: F) -> MpvResult<EventCallbackGroup>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let shared = &self.shared;
        shared.ensure_live()?;
        let filter = (!kinds.is_empty()).then(|| kinds.iter().copied().collect());
        let id = shared.registry.insert_event_callback(filter, Arc::new(callback));
        shared.admit((), || {
            shared.registry.remove_event_callback(id);
        })?;
        Ok(EventCallbackGroup {
            shared: Arc::downgrade(&self.shared),
            id,
        })
    }

    pub fn unregister_event_callback(&self, id: ListenerId) -> MpvResult<bool> {
        self.shared.ensure_live()?;
        Ok(self.shared.registry.remove_event_callback(id))
    }

    // Log handlers ----------------------------------------------------------

    /// Receive engine log messages as `(level, prefix, text)`
    pub fn register_log_handler<F>(&self, handler: F) -> MpvResult<ListenerId>
    where
        F: Fn(LogLevel, &str, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let shared = &self.shared;
        shared.ensure_live()?;
        let id = shared.registry.insert_log_handler(Arc::new(handler));
        shared.admit((), || {
            shared.registry.remove_log_handler(id);
        })?;
        shared.request_log_messages()?;
        Ok(id)
    }

    pub fn unregister_log_handler(&self, id: ListenerId) -> MpvResult<bool> {
        self.shared.ensure_live()?;
        Ok(self.shared.registry.remove_log_handler(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> PropertyCallback {
        Arc::new(|_: &str, _: &Value| Ok(()))
    }

    #[test]
    fn test_observer_lookup_by_name_and_callback() {
        let registry = Registry::new();
        let first = noop();
        let second = noop();
        registry.insert_observer(1, "time_pos", first.clone());
        registry.insert_observer(2, "time-pos", second.clone());
        registry.insert_observer(3, "pause", first.clone());

        let mut all = registry.observer_ids("time-pos", None);
        all.sort_unstable();
        assert_eq!(all, vec![1, 2]);
        assert_eq!(registry.observer_ids("time-pos", Some(&second)), vec![2]);
    }

    #[test]
    fn test_removal_clears_active_flag() {
        let registry = Registry::new();
        registry.insert_observer(9, "mute", noop());
        let entry = registry.observer(9).unwrap();
        assert!(entry.active.load(Ordering::Acquire));
        assert!(registry.remove_observer(9));
        assert!(!entry.active.load(Ordering::Acquire));
        assert!(!registry.remove_observer(9));
    }

    #[test]
    fn test_event_callback_filter() {
        let registry = Registry::new();
        let cb: EventCallback = Arc::new(|_: &Event| Ok(()));
        let all = registry.insert_event_callback(None, cb.clone());
        let only_idle = registry.insert_event_callback(Some([EventKind::Idle].into_iter().collect()), cb);

        let ids = |kind| {
            registry
                .event_callbacks_for(kind)
                .iter()
                .map(|e| e.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(EventKind::Idle), vec![all, only_idle]);
        assert_eq!(ids(EventKind::Seek), vec![all]);

        assert!(registry.remove_event_callback(all));
        assert_eq!(ids(EventKind::Seek), Vec::<ListenerId>::new());
    }

    #[test]
    fn test_message_handler_replacement_deactivates_previous() {
        let registry = Registry::new();
        let handler: MessageHandler = Arc::new(|_: &[String]| Ok(()));
        registry.insert_message_handler("foo", handler.clone());
        let first = registry.message_handler("foo").unwrap();
        registry.insert_message_handler("foo", handler);
        assert!(!first.active.load(Ordering::Acquire));
        assert!(registry.remove_message_handler("foo"));
        assert!(registry.message_handler("foo").is_none());
    }
}
