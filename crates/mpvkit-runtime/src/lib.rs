//! mpvkit Runtime
//!
//! The synchronisation core of the mpvkit binding:
//! - `Player`: handle owning one engine instance and its event loop thread
//! - Observer registry for property observers, event callbacks, log and
//!   message handlers
//! - Wait bridge blocking calling threads until an event or property condition
//! - Command/reply correlation for asynchronous commands
//! - Key bindings and custom stream protocols
//!
//! Engines plug in through `mpvkit_core::Engine`. Enable the `libmpv` feature
//! for the native backend; tests use `mpvkit_harness::FakeEngine`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod builder;
pub mod commands;
pub mod event_loop;
pub mod key_bindings;
pub mod player;
pub mod registry;
pub mod streams;
pub mod wait;

mod promise;

cfg_if::cfg_if! {
    if #[cfg(feature = "libmpv")] {
        pub mod libmpv;
        pub use libmpv::LibMpv;
    }
}

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use builder::PlayerBuilder;
pub use commands::{CommandFuture, ReplyCallback};
pub use event_loop::LoopState;
pub use key_bindings::{
    is_valid_keydef, section_name, BindingMode, KeyAction, KeyBindingGroup, KeyEvent, KeyHandler,
};
pub use player::{OsdView, Player, PropertyView};
pub use registry::{
    EventCallback, EventCallbackGroup, ListenerId, LogHandler, MessageHandler, ObservationId,
    ObserverGroup, PropertyCallback,
};
pub use streams::{OpenFn, StreamRegistration};
pub use wait::WaitOptions;

// Re-export core types for convenience
pub use mpvkit_core::{
    ChunkStream, DecodePolicy, DispatchSnapshot, Engine, EndFileReason, ErrorCode, Event,
    EventData, EventKind, LogLevel, MediaStream, MpvError, MpvResult, Node, PlayerConfig,
    ReadSeekStream, Value,
};
