//! mpvkit Harness
//!
//! Provides `FakeEngine`, a deterministic in-memory implementation of the
//! `Engine` seam with scripted media, a bounded event queue and custom stream
//! loading, used by the runtime test suites.

pub mod engine;
pub mod media;

pub use engine::{FakeEngine, DEFAULT_QUEUE_CAPACITY};
pub use media::{FakeMedia, FAKE_MEDIA_MAGIC};
