//! Engine Trait Definition
//!
//! The media engine is opaque to the binding. Everything the handle needs from it
//! goes through `Engine`: options, properties, commands, observation registration
//! and the blocking event queue. Implementations live elsewhere (`LibMpv` in
//! `mpvkit-runtime` behind the `libmpv` feature, `FakeEngine` in `mpvkit-harness`).

use crate::event::RawEvent;
use crate::node::Node;
use crate::types::{ErrorCode, Format};
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub type EngineResult<T> = Result<T, ErrorCode>;

// ----------------------------------------------------------------------------
// Engine Trait
// ----------------------------------------------------------------------------

/// Client API of a media engine instance
///
/// All methods take `&self`: the engine is shared between calling threads and the
/// event loop thread, and synchronises internally the way the native client API
/// does. `wait_event` is only ever called from the event loop thread.
pub trait Engine: Send + Sync {
    /// Name the engine uses to address this client (`script-binding <client>/...`)
    fn client_name(&self) -> String;

    /// Set an option. Only valid before `initialize`.
    fn set_option(&self, name: &str, value: &Node) -> EngineResult<()>;

    fn initialize(&self) -> EngineResult<()>;

    /// Read a property in the requested format. `Format::OsdString` and
    /// `Format::String` yield `Node::String`; everything else yields a node tree.
    fn get_property(&self, name: &str, format: Format) -> EngineResult<Node>;

    fn set_property(&self, name: &str, value: &Node) -> EngineResult<()>;

    /// Run a command synchronously. `args` is an array of arguments or a map with
    /// named arguments.
    fn command(&self, args: &Node) -> EngineResult<Node>;

    /// Queue a command; completion arrives as a command-reply event carrying
    /// `reply_id` as its userdata.
    fn command_async(&self, reply_id: u64, args: &Node) -> EngineResult<()>;

    /// Start emitting property-change events for `name` tagged with `id`
    fn observe_property(&self, id: u64, name: &str) -> EngineResult<()>;

    fn unobserve_property(&self, id: u64) -> EngineResult<()>;

    /// Enable log-message events at `level` (`"no"` disables them)
    fn request_log_messages(&self, level: &str) -> EngineResult<()>;

    /// Block until the next event, `timeout` expiry or a `wakeup` call. The latter
    /// two return an event of kind `None`. `None` waits without limit.
    fn wait_event(&self, timeout: Option<Duration>) -> RawEvent;

    /// Interrupt a blocked `wait_event`
    fn wakeup(&self);

    /// Install a custom protocol handler consulted when a URL with the
    /// `protocol://` prefix is loaded
    fn add_stream_protocol(&self, protocol: &str, opener: StreamOpener) -> EngineResult<()>;

    /// Release the engine. No other method is called afterwards.
    fn destroy(&self);
}

// ----------------------------------------------------------------------------
// Stream Protocols
// ----------------------------------------------------------------------------

/// Byte source backing a custom protocol URL
pub trait MediaStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Seek to an absolute offset and return the new position
    fn seek(&mut self, _offset: u64) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "stream is not seekable"))
    }

    /// Total size in bytes, if known
    fn size(&mut self) -> Option<u64> {
        None
    }

    fn close(&mut self) {}
}

/// Opener registered with the engine for one protocol
pub type StreamOpener =
    Arc<dyn Fn(&str) -> Result<Box<dyn MediaStream>, ErrorCode> + Send + Sync>;
