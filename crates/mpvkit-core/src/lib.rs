//! mpvkit Core
//!
//! Foundational types for the mpvkit media-player binding: the engine value model,
//! the property codec and type table, the event model, the error taxonomy, player
//! configuration and the `Engine` seam that concrete engines implement.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod engine;
pub mod errors;
pub mod event;
pub mod monitoring;
pub mod node;
pub mod properties;
pub mod stream;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use codec::{
    decode, decode_lenient, decode_osd, decode_property, decode_property_lenient, encode,
    encode_property, DecodePolicy, Value,
};
pub use config::{EventLoopConfig, OptionValue, PlayerConfig};
pub use engine::{Engine, EngineResult, MediaStream, StreamOpener};
pub use errors::{MpvError, MpvResult};
pub use event::{Event, EventData, RawEvent};
pub use monitoring::{DispatchSnapshot, DispatchStats};
pub use node::Node;
pub use properties::{Access, PropertyDescriptor, PropertyKind};
pub use stream::{ChunkStream, ReadSeekStream};
pub use types::{EndFileReason, ErrorCode, EventKind, Format, LogLevel};
