//! Basic Player Usage Example
//!
//! Drives a player over the in-memory engine: observe a property, play a
//! clip, wait for it to end and run an asynchronous command.

use mpvkit_harness::{FakeEngine, FakeMedia};
use mpvkit_runtime::{EndFileReason, EventData, EventKind, Player, PlayerConfig, Value};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let _ = tracing_subscriber::fmt::try_init();

    println!("mpvkit - Basic Usage Example");
    println!("============================");

    let engine = Arc::new(
        FakeEngine::new().with_media("demo://clip.mkv", FakeMedia::video().with_title("Demo Clip")),
    );
    let player = Player::builder()
        .with_config(PlayerConfig::headless())
        .with_log_level("info")
        .with_log_handler(|level, prefix, text| {
            println!("   [{}] {}: {}", level, prefix, text);
            Ok(())
        })
        .build(engine)?;

    println!("\n1. Observing the media title...");
    player.observe_property("media-title", |_, title| {
        if let Value::Str(title) = title {
            println!("   title is now {:?}", title);
        }
        Ok(())
    })?;

    println!("\n2. Playing a clip until it ends...");
    let event = player.prepare_and_wait_for_event(&[EventKind::EndFile], || {
        player.play("demo://clip.mkv")
    })?;
    if let EventData::EndFile { reason, .. } = event.data {
        assert_eq!(reason, EndFileReason::Eof);
        println!("   [OK] playback finished: {:?}", reason);
    }

    println!("\n3. Running an asynchronous command...");
    let volume = player
        .command_async(&["expand-text", "volume ${volume}"])?
        .wait_timeout(Duration::from_secs(1))?;
    println!("   [OK] {:?}", volume);

    player.terminate();
    println!("\nDone.");
    Ok(())
}
