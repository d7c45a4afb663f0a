//! Dispatch statistics
//!
//! Lock-free counters updated by the event loop thread and readable from any
//! thread. `snapshot()` produces a serializable copy.

use crate::types::EventKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

const KIND_SLOTS: usize = 26;

/// Event loop counters
#[derive(Debug)]
pub struct DispatchStats {
    events_received: AtomicU64,
    events_dispatched: AtomicU64,
    per_kind: [AtomicU64; KIND_SLOTS],
    callback_failures: AtomicU64,
    overflow_rejections: AtomicU64,
    replies_resolved: AtomicU64,
    waiters_resolved: AtomicU64,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            per_kind: std::array::from_fn(|_| AtomicU64::new(0)),
            callback_failures: AtomicU64::new(0),
            overflow_rejections: AtomicU64::new(0),
            replies_resolved: AtomicU64::new(0),
            waiters_resolved: AtomicU64::new(0),
        }
    }

    /// Record an event drained from the engine queue
    pub fn record_received(&self, kind: EventKind) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        let slot = kind.as_raw() as usize;
        if slot < KIND_SLOTS {
            self.per_kind[slot].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an event that went through every dispatch stage
    pub fn record_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_rejection(&self) {
        self.overflow_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply_resolved(&self) {
        self.replies_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_waiter_resolved(&self) {
        self.waiters_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    pub fn overflow_rejections(&self) -> u64 {
        self.overflow_rejections.load(Ordering::Relaxed)
    }

    pub fn count_for(&self, kind: EventKind) -> u64 {
        self.per_kind
            .get(kind.as_raw() as usize)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        let per_kind = EventKind::ALL
            .iter()
            .map(|kind| (kind.name().to_string(), self.count_for(*kind)))
            .filter(|(_, count)| *count > 0)
            .collect();
        DispatchSnapshot {
            events_received: self.events_received(),
            events_dispatched: self.events_dispatched(),
            per_kind,
            callback_failures: self.callback_failures(),
            overflow_rejections: self.overflow_rejections(),
            replies_resolved: self.replies_resolved.load(Ordering::Relaxed),
            waiters_resolved: self.waiters_resolved.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `DispatchStats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub events_received: u64,
    pub events_dispatched: u64,
    pub per_kind: BTreeMap<String, u64>,
    pub callback_failures: u64,
    pub overflow_rejections: u64,
    pub replies_resolved: u64,
    pub waiters_resolved: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_kind_counts() {
        let stats = DispatchStats::new();
        stats.record_received(EventKind::PropertyChange);
        stats.record_received(EventKind::PropertyChange);
        stats.record_received(EventKind::Hook);
        stats.record_dispatched();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_received, 3);
        assert_eq!(snapshot.events_dispatched, 1);
        assert_eq!(snapshot.per_kind.get("property-change"), Some(&2));
        assert_eq!(snapshot.per_kind.get("hook"), Some(&1));
        assert!(!snapshot.per_kind.contains_key("seek"));
    }
}
