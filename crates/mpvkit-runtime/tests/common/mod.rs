//! Shared helpers for the runtime integration tests

#![allow(dead_code)]

use mpvkit_harness::{FakeEngine, FakeMedia};
use mpvkit_runtime::{EventKind, Player, PlayerConfig, WaitOptions};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const CLIP: &str = "test://clip.mkv";
pub const SILENT_CLIP: &str = "test://silent.mkv";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn fake_engine() -> FakeEngine {
    FakeEngine::new()
        .with_media(CLIP, FakeMedia::video().with_title("Test Clip"))
        .with_media(SILENT_CLIP, FakeMedia::video_only())
}

/// Player over the default fake engine with test configuration
pub fn start() -> (Arc<FakeEngine>, Player) {
    start_with(fake_engine(), PlayerConfig::testing())
}

pub fn start_with(engine: FakeEngine, config: PlayerConfig) -> (Arc<FakeEngine>, Player) {
    init_tracing();
    let engine = Arc::new(engine);
    let player = Player::new(engine.clone(), config).unwrap();
    (engine, player)
}

const SYNC_MESSAGE: &str = "test-sync";

/// Returns once every event queued before this call has been dispatched.
/// Callback failures are left to the handle's error list.
pub fn sync(player: &Player) {
    player
        .prepare_and_wait_for_event_with(
            &[EventKind::ClientMessage],
            |event| event.client_args().map_or(false, |args| args.len() == 1 && args[0] == SYNC_MESSAGE),
            WaitOptions::new().catch_errors(false),
            || player.script_message(&[SYNC_MESSAGE]),
        )
        .unwrap();
}

/// Holds the event loop inside a callback until released
pub struct LoopBlocker {
    release: Sender<()>,
}

impl LoopBlocker {
    /// Park the event loop on a client message and wait until it is parked
    pub fn engage(player: &Player) -> Self {
        let (release, parked) = mpsc::channel::<()>();
        let (entered_tx, entered) = mpsc::channel::<()>();
        let parked = Mutex::new(parked);
        let entered_tx = Mutex::new(entered_tx);
        player
            .register_message_handler("test-block", move |_| {
                let _ = entered_tx.lock().unwrap().send(());
                let _ = parked.lock().unwrap().recv_timeout(Duration::from_secs(5));
                Ok(())
            })
            .unwrap();
        player.script_message(&["test-block"]).unwrap();
        wait_signal(&entered);
        Self { release }
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

fn wait_signal(rx: &Receiver<()>) {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("event loop did not reach the blocking handler");
}

/// Values recorded by a callback
#[derive(Clone, Default)]
pub struct Recorder<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().unwrap().push(item);
    }

    pub fn items(&self) -> Vec<T> {
        self.items.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}
