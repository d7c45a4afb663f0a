//! Single-resolution handoff cell
//!
//! A `Promise` is resolved at most once, usually by the event loop thread, and
//! consumed by a caller that either blocks on it or polls it from async code.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

struct Slot<T> {
    value: Option<T>,
    resolved: bool,
    waker: Option<Waker>,
}

pub(crate) struct Promise<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Promise<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                resolved: false,
                waker: None,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the value unless the promise is already resolved. Returns whether
    /// this call won.
    pub(crate) fn resolve(&self, value: T) -> bool {
        let waker = {
            let mut slot = self.lock();
            if slot.resolved {
                return false;
            }
            slot.resolved = true;
            slot.value = Some(value);
            slot.waker.take()
        };
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.lock().resolved
    }

    /// Block until resolved or until `timeout` elapses, then take the value.
    /// Returns `None` on timeout or when the value was already taken.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.lock();
        while !slot.resolved {
            slot = match deadline {
                None => self
                    .ready
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.ready
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        slot.value.take()
    }

    /// Async counterpart of `wait`: registers the waker while unresolved
    pub(crate) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut slot = self.lock();
        if slot.resolved {
            Poll::Ready(slot.value.take())
        } else {
            slot.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_resolution_wins() {
        let promise = Promise::new();
        assert!(promise.resolve(1));
        assert!(!promise.resolve(2));
        assert_eq!(promise.wait(Some(Duration::ZERO)), Some(1));
        assert_eq!(promise.wait(Some(Duration::ZERO)), None);
    }

    #[test]
    fn test_wait_times_out() {
        let promise: Promise<u8> = Promise::new();
        let started = Instant::now();
        assert_eq!(promise.wait(Some(Duration::from_millis(20))), None);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!promise.is_resolved());
    }

    #[test]
    fn test_cross_thread_resolution() {
        let promise = Arc::new(Promise::new());
        let resolver = {
            let promise = promise.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                promise.resolve("done");
            })
        };
        assert_eq!(promise.wait(None), Some("done"));
        resolver.join().unwrap();
    }
}
