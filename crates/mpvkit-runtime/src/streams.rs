//! Custom stream protocols
//!
//! User openers are kept in a per-handle table and installed with the engine
//! once per protocol name. The engine-side opener looks the protocol up at open
//! time, so unregistering only needs to drop the table entry: later opens fail
//! with `LoadingFailed`. Opener errors and panics, as well as panics inside the
//! returned stream, never cross into the engine.

use crate::event_loop::panic_message;
use crate::player::{Player, Shared};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use mpvkit_core::{ErrorCode, MediaStream, MpvError, MpvResult, StreamOpener};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// User opener: maps a full URI to a byte stream
pub type OpenFn = Arc<dyn Fn(&str) -> anyhow::Result<Box<dyn MediaStream>> + Send + Sync>;

// ----------------------------------------------------------------------------
// Protocol Table
// ----------------------------------------------------------------------------

#[derive(Clone)]
struct ProtocolEntry {
    registration: u64,
    open: OpenFn,
}

pub(crate) struct StreamTable {
    openers: Arc<DashMap<String, ProtocolEntry>>,
    /// Protocols already installed with the engine
    installed: DashSet<String>,
    next_registration: AtomicU64,
}

impl StreamTable {
    pub(crate) fn new() -> Self {
        Self {
            openers: Arc::new(DashMap::new()),
            installed: DashSet::new(),
            next_registration: AtomicU64::new(1),
        }
    }

    /// Remove `protocol` only while it still belongs to `registration`
    fn remove_registration(&self, protocol: &str, registration: u64) -> bool {
        self.openers
            .remove_if(protocol, |_, entry| entry.registration == registration)
            .is_some()
    }

    pub(crate) fn clear(&self) {
        self.openers.clear();
    }

    fn protocols(&self) -> Vec<String> {
        self.openers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Engine-facing opener for `protocol`. Holds the table, not the handle.
    fn engine_opener(&self, protocol: &str) -> StreamOpener {
        let openers = self.openers.clone();
        let protocol = protocol.to_string();
        Arc::new(move |uri: &str| {
            let open = openers.get(&protocol).map(|entry| entry.open.clone());
            let Some(open) = open else {
                debug!(protocol = %protocol, uri, "Stream protocol is no longer registered");
                return Err(ErrorCode::LoadingFailed);
            };
            match panic::catch_unwind(AssertUnwindSafe(|| open(uri))) {
                Ok(Ok(stream)) => Ok(Box::new(GuardedStream::new(stream, uri)) as Box<dyn MediaStream>),
                Ok(Err(err)) => {
                    warn!(protocol = %protocol, uri, error = %err, "Stream open failed");
                    Err(ErrorCode::LoadingFailed)
                }
                Err(payload) => {
                    warn!(
                        protocol = %protocol,
                        uri,
                        panic = %panic_message(payload.as_ref()),
                        "Stream opener panicked"
                    );
                    Err(ErrorCode::LoadingFailed)
                }
            }
        })
    }
}

fn is_valid_protocol(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

// ----------------------------------------------------------------------------
// Guarded Stream
// ----------------------------------------------------------------------------

/// Stream wrapper that turns panics in user code into I/O errors
struct GuardedStream {
    inner: Box<dyn MediaStream>,
    uri: String,
}

impl GuardedStream {
    fn new(inner: Box<dyn MediaStream>, uri: &str) -> Self {
        Self {
            inner,
            uri: uri.to_string(),
        }
    }

    fn guard<T>(&mut self, op: &str, f: impl FnOnce(&mut dyn MediaStream) -> io::Result<T>) -> io::Result<T> {
        let inner = &mut *self.inner;
        match panic::catch_unwind(AssertUnwindSafe(|| f(inner))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(uri = %self.uri, op, panic = %message, "Stream callback panicked");
                Err(io::Error::new(io::ErrorKind::Other, message))
            }
        }
    }
}

impl MediaStream for GuardedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.guard("read", |s| s.read(buf))
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.guard("seek", |s| s.seek(offset))
    }

    fn size(&mut self) -> Option<u64> {
        self.guard("size", |s| Ok(s.size())).ok().flatten()
    }

    fn close(&mut self) {
        let _ = self.guard("close", |s| {
            s.close();
            Ok(())
        });
    }
}

// ----------------------------------------------------------------------------
// Registration Handle
// ----------------------------------------------------------------------------

/// Keeps track of one registered protocol
pub struct StreamRegistration {
    shared: Weak<Shared>,
    protocol: String,
    registration: u64,
}

impl StreamRegistration {
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Drop the protocol. Returns false if it was already gone or the name was
    /// registered again since.
    pub fn unregister(&self) -> bool {
        self.shared.upgrade().map_or(false, |shared| {
            shared
                .streams
                .remove_registration(&self.protocol, self.registration)
        })
    }
}

// ----------------------------------------------------------------------------
// Player API
// ----------------------------------------------------------------------------

impl Player {
    /// Serve `protocol://...` URLs with streams produced by `open`
    pub fn register_stream_protocol<F>(&self, protocol: &str, open: F) -> MpvResult<StreamRegistration>
    where
        F: Fn(&str) -> anyhow::Result<Box<dyn MediaStream>> + Send + Sync + 'static,
    {
        let shared = &self.shared;
        shared.ensure_live()?;
        if !is_valid_protocol(protocol) {
            return Err(MpvError::config(format!("invalid stream protocol name {:?}", protocol)));
        }

        let registration = shared.streams.next_registration.fetch_add(1, Ordering::Relaxed);
        match shared.streams.openers.entry(protocol.to_string()) {
            Entry::Occupied(_) => {
                return Err(MpvError::config(format!(
                    "stream protocol {:?} is already registered",
                    protocol
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(ProtocolEntry {
                    registration,
                    open: Arc::new(open),
                });
            }
        }

        if shared.streams.installed.insert(protocol.to_string()) {
            let opener = shared.streams.engine_opener(protocol);
            if let Err(code) = shared.engine.add_stream_protocol(protocol, opener) {
                shared.streams.installed.remove(protocol);
                shared.streams.remove_registration(protocol, registration);
                return Err(MpvError::from_code(code));
            }
        }
        shared.admit((), || {
            shared.streams.remove_registration(protocol, registration);
        })?;
        debug!(protocol, registration, "Stream protocol registered");

        Ok(StreamRegistration {
            shared: Arc::downgrade(shared),
            protocol: protocol.to_string(),
            registration,
        })
    }

    /// Drop `protocol`; later loads of its URLs fail with `LoadingFailed`
    pub fn unregister_stream_protocol(&self, protocol: &str) -> MpvResult<bool> {
        self.shared.ensure_live()?;
        Ok(self.shared.streams.openers.remove(protocol).is_some())
    }

    pub fn stream_protocols(&self) -> Vec<String> {
        self.shared.streams.protocols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpvkit_core::ReadSeekStream;
    use std::io::Cursor;

    struct Exploding;

    impl MediaStream for Exploding {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("read exploded")
        }
    }

    #[test]
    fn test_protocol_names() {
        assert!(is_valid_protocol("foo"));
        assert!(is_valid_protocol("my-proto+v2.1"));
        assert!(!is_valid_protocol(""));
        assert!(!is_valid_protocol("1abc"));
        assert!(!is_valid_protocol("foo://"));
    }

    #[test]
    fn test_engine_opener_maps_failures_to_loading_failed() {
        let table = StreamTable::new();
        let opener = table.engine_opener("foo");
        assert_eq!(opener("foo://x").err(), Some(ErrorCode::LoadingFailed));

        let failing: OpenFn = Arc::new(|_: &str| Err(anyhow::anyhow!("nope")));
        table.openers.insert("foo".to_string(), ProtocolEntry { registration: 1, open: failing });
        assert_eq!(opener("foo://x").err(), Some(ErrorCode::LoadingFailed));

        let panicking: OpenFn = Arc::new(|_: &str| panic!("opener exploded"));
        table.openers.insert("foo".to_string(), ProtocolEntry { registration: 2, open: panicking });
        assert_eq!(opener("foo://x").err(), Some(ErrorCode::LoadingFailed));
    }

    #[test]
    fn test_guarded_stream_passes_data_and_contains_panics() {
        let table = StreamTable::new();
        let working: OpenFn = Arc::new(|_: &str| {
            Ok(Box::new(ReadSeekStream::new(Cursor::new(b"data".to_vec()))) as Box<dyn MediaStream>)
        });
        table.openers.insert("ok".to_string(), ProtocolEntry { registration: 1, open: working });
        let mut stream = table.engine_opener("ok")("ok://x").ok().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);

        let mut guarded = GuardedStream::new(Box::new(Exploding), "boom://x");
        assert!(guarded.read(&mut buf).is_err());
    }

    #[test]
    fn test_stale_registration_keeps_newer_entry() {
        let table = StreamTable::new();
        let open: OpenFn = Arc::new(|_: &str| Err(anyhow::anyhow!("unused")));
        table.openers.insert("foo".to_string(), ProtocolEntry { registration: 7, open });

        assert!(!table.remove_registration("foo", 3));
        assert_eq!(table.protocols(), vec!["foo".to_string()]);
        assert!(table.remove_registration("foo", 7));
        assert!(table.protocols().is_empty());
    }
}
