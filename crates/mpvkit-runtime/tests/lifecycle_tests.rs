//! Handle lifecycle tests
//!
//! Construction with options, the running event loop, engine-initiated
//! shutdown and termination.

mod common;

use common::{fake_engine, init_tracing, start, start_with, Recorder};
use mpvkit_harness::FakeEngine;
use mpvkit_runtime::{ErrorCode, EventKind, LoopState, MpvError, Player, PlayerConfig, Value};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ----------------------------------------------------------------------------
// Construction
// ----------------------------------------------------------------------------

#[test]
fn test_player_initializes_engine() {
    let (engine, player) = start();

    assert!(engine.is_initialized());
    assert!(player.is_alive());
    assert!(!player.is_terminated());
    assert_eq!(player.client_name(), "mpvkit");
    assert!(matches!(
        player.loop_state(),
        LoopState::Starting | LoopState::Running
    ));
}

#[test]
fn test_unknown_option_fails_initialization() {
    init_tracing();
    let engine = Arc::new(FakeEngine::new());
    let config = PlayerConfig::testing().with_option("no_such_option", "x");

    match Player::new(engine.clone(), config) {
        Err(MpvError::Init { option, code }) => {
            assert_eq!(option.as_deref(), Some("no-such-option"));
            assert_eq!(code, ErrorCode::OptionNotFound);
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("unknown option was accepted"),
    }
    assert!(!engine.is_initialized());
    assert!(engine.is_destroyed());
}

#[test]
fn test_invalid_config_rejected_before_engine_use() {
    init_tracing();
    let engine = Arc::new(FakeEngine::new());
    let config = PlayerConfig::testing().with_log_level("chatty");

    assert!(matches!(
        Player::new(engine.clone(), config),
        Err(MpvError::Config { .. })
    ));
    assert!(!engine.is_initialized());
}

#[test]
fn test_flags_and_options_applied_before_init() {
    let config = PlayerConfig::testing()
        .with_flag("fs")
        .with_option("volume", 40_i64)
        .with_option("alang", "de,en");
    let (_engine, player) = start_with(fake_engine(), config);

    assert_eq!(player.get_property("fullscreen").unwrap(), Value::Flag(true));
    assert_eq!(player.get_property("volume").unwrap(), Value::Double(40.0));
    assert_eq!(
        player.get_property("alang").unwrap(),
        Value::from(vec!["de", "en"])
    );
}

#[test]
fn test_builder_with_client_name_from_engine() {
    init_tracing();
    let engine = Arc::new(fake_engine().with_client_name("viewer"));
    let player = Player::builder()
        .with_config(PlayerConfig::testing())
        .with_option("vo", "null")
        .build(engine)
        .unwrap();

    assert_eq!(player.client_name(), "viewer");
}

// ----------------------------------------------------------------------------
// Event Loop Thread
// ----------------------------------------------------------------------------

#[test]
fn test_callbacks_run_on_named_event_thread() {
    let (_engine, player) = start();
    let names = Recorder::new();
    let recorder = names.clone();
    player
        .observe_property("volume", move |_, _| {
            recorder.push(thread::current().name().map(str::to_string));
            Ok(())
        })
        .unwrap();

    common::sync(&player);
    assert_eq!(names.items(), vec![Some("mpv-event-loop".to_string())]);
    assert_eq!(player.loop_state(), LoopState::Running);
}

#[test]
fn test_stats_count_dispatched_events() {
    let (_engine, player) = start();
    common::sync(&player);
    common::sync(&player);

    let stats = player.stats();
    assert!(stats.events_dispatched >= 1);
    assert!(stats.per_kind.get(EventKind::ClientMessage.name()).copied().unwrap_or(0) >= 2);
}

// ----------------------------------------------------------------------------
// Shutdown and Termination
// ----------------------------------------------------------------------------

#[test]
fn test_terminate_is_idempotent() {
    let (engine, player) = start();

    player.terminate();
    player.terminate();

    assert!(engine.is_destroyed());
    assert!(player.is_terminated());
    assert!(!player.is_alive());
    assert_eq!(player.loop_state(), LoopState::Stopped);
}

#[test]
fn test_operations_after_terminate_fail_with_shutdown() {
    let (_engine, player) = start();
    player.terminate();

    assert!(matches!(player.get_property("volume"), Err(MpvError::Shutdown)));
    assert!(matches!(player.set_property("volume", 10.0), Err(MpvError::Shutdown)));
    assert!(matches!(player.command(&["stop"]), Err(MpvError::Shutdown)));
    assert!(matches!(player.command_async(&["stop"]), Err(MpvError::Shutdown)));
    assert!(matches!(
        player.observe_property("volume", |_, _| Ok(())),
        Err(MpvError::Shutdown)
    ));
    assert!(matches!(
        player.wait_for_event(&[EventKind::Idle], Some(Duration::from_millis(10))),
        Err(MpvError::Shutdown)
    ));
}

#[test]
fn test_terminate_drains_queued_events() {
    let (_engine, player) = start();
    let seen = Recorder::new();
    let recorder = seen.clone();
    player
        .observe_property("volume", move |_, value| {
            thread::sleep(Duration::from_millis(30));
            recorder.push(value.clone());
            Ok(())
        })
        .unwrap();

    for volume in [10.0, 20.0, 30.0, 40.0, 50.0] {
        player.set_property("volume", volume).unwrap();
    }
    let future = player.command_async(&["expand-text", "queued"]).unwrap();
    player.terminate();

    assert_eq!(
        seen.items(),
        vec![
            Value::Double(100.0),
            Value::Double(10.0),
            Value::Double(20.0),
            Value::Double(30.0),
            Value::Double(40.0),
            Value::Double(50.0),
        ]
    );
    assert_eq!(future.wait().unwrap(), Value::Str("queued".to_string()));
    assert_eq!(player.loop_state(), LoopState::Stopped);
}

#[test]
fn test_drop_terminates() {
    let (engine, player) = start();
    drop(player);
    assert!(engine.is_destroyed());
}

#[test]
fn test_quit_stops_event_loop() {
    let (_engine, player) = start();

    player.quit(None).unwrap();
    player.wait_for_shutdown(Some(Duration::from_secs(2))).unwrap();
    player.join_event_loop().unwrap();

    assert!(!player.is_alive());
    assert!(!player.is_terminated());
    assert!(matches!(player.command(&["stop"]), Err(MpvError::Shutdown)));
}

#[test]
fn test_join_event_loop_reports_unclaimed_callback_failure() {
    let (_engine, player) = start();
    player
        .observe_property("volume", |_, value| {
            if value.as_f64() == Some(50.0) {
                anyhow::bail!("volume too low");
            }
            Ok(())
        })
        .unwrap();

    player.set_property("volume", 50.0).unwrap();
    player.quit(None).unwrap();

    let err = player.join_event_loop().unwrap_err();
    assert!(matches!(err, MpvError::Callback(_)));
    assert!(err.to_string().contains("volume too low"));
}

#[test]
fn test_terminate_from_callback_requests_quit() {
    let (_engine, player) = start();
    let player = Arc::new(player);
    let weak = Arc::downgrade(&player);
    player
        .register_message_handler("shutdown-now", move |_| {
            if let Some(player) = weak.upgrade() {
                player.terminate();
            }
            Ok(())
        })
        .unwrap();

    let started = Instant::now();
    player.script_message(&["shutdown-now"]).unwrap();
    player.wait_for_shutdown(Some(Duration::from_secs(2))).unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!player.is_alive());

    player.terminate();
    assert!(player.is_terminated());
}
