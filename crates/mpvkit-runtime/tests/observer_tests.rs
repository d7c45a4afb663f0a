//! Observer registry tests
//!
//! Property observers, event callbacks and log handlers as seen from the
//! event loop thread, including listeners that remove themselves and listeners
//! that fail.

mod common;

use common::{start, sync, Recorder, CLIP};
use mpvkit_runtime::{
    Event, EventData, EventKind, LogLevel, MpvError, ObserverGroup, Player, PlayerConfig,
    PropertyCallback, Value, WaitOptions,
};
use std::sync::{Arc, Mutex};

// ----------------------------------------------------------------------------
// Property Observers
// ----------------------------------------------------------------------------

#[test]
fn test_observer_sees_initial_value_then_changes_in_order() {
    let (_engine, player) = start();
    let seen = Recorder::new();
    let recorder = seen.clone();
    player
        .observe_property("volume", move |name, value| {
            recorder.push((name.to_string(), value.clone()));
            Ok(())
        })
        .unwrap();

    player.set_property("volume", 50.0).unwrap();
    player.set_property("volume", 60.0).unwrap();
    sync(&player);

    let values: Vec<Value> = seen.items().into_iter().map(|(_, v)| v).collect();
    assert_eq!(
        values,
        vec![Value::Double(100.0), Value::Double(50.0), Value::Double(60.0)]
    );
    assert!(seen.items().iter().all(|(name, _)| name == "volume"));
}

#[test]
fn test_unchanged_write_is_not_reported() {
    let (_engine, player) = start();
    let seen = Recorder::new();
    let recorder = seen.clone();
    player
        .observe_property("mute", move |_, value| {
            recorder.push(value.clone());
            Ok(())
        })
        .unwrap();

    player.set_property("mute", false).unwrap();
    player.set_property("mute", true).unwrap();
    sync(&player);

    assert_eq!(seen.items(), vec![Value::Flag(false), Value::Flag(true)]);
}

#[test]
fn test_observer_group_unobserves_from_inside_callback() {
    let (engine, player) = start();
    let seen = Recorder::new();
    let slot: Arc<Mutex<Option<ObserverGroup>>> = Arc::new(Mutex::new(None));

    let recorder = seen.clone();
    let group_slot = slot.clone();
    let group = player
        .property_observer(&["volume"], move |_, value| {
            recorder.push(value.clone());
            if value.as_f64() == Some(50.0) {
                if let Some(group) = group_slot.lock().unwrap().as_ref() {
                    group.unobserve_all()?;
                }
            }
            Ok(())
        })
        .unwrap();
    *slot.lock().unwrap() = Some(group);

    player.set_property("volume", 50.0).unwrap();
    sync(&player);
    player.set_property("volume", 60.0).unwrap();
    sync(&player);

    assert_eq!(seen.items(), vec![Value::Double(100.0), Value::Double(50.0)]);
    assert!(player.take_callback_errors().is_empty());
    assert_eq!(player.observer_count(), 0);
    assert_eq!(engine.observer_count(), 0);
}

#[test]
fn test_group_observes_several_properties() {
    let (_engine, player) = start();
    let seen = Recorder::new();
    let recorder = seen.clone();
    let group = player
        .property_observer(&["pause", "mute"], move |name, _| {
            recorder.push(name.to_string());
            Ok(())
        })
        .unwrap();
    sync(&player);

    assert_eq!(group.ids().len(), 2);
    assert_eq!(seen.items(), vec!["pause".to_string(), "mute".to_string()]);

    group.unobserve_all().unwrap();
    assert_eq!(player.observer_count(), 0);
}

#[test]
fn test_unobserve_by_callback_then_by_name() {
    let (_engine, player) = start();
    let first: PropertyCallback = Arc::new(|_: &str, _: &Value| Ok(()));
    player.observe_property_callback("volume", first.clone()).unwrap();
    player.observe_property("volume", |_, _| Ok(())).unwrap();
    player.observe_property("pause", |_, _| Ok(())).unwrap();
    assert_eq!(player.observer_count(), 3);

    assert_eq!(player.unobserve_property("volume", Some(&first)).unwrap(), 1);
    assert_eq!(player.observer_count(), 2);
    assert_eq!(player.unobserve_property("volume", None).unwrap(), 1);
    assert_eq!(player.unobserve_property("volume", None).unwrap(), 0);
    assert_eq!(player.observer_count(), 1);
}

#[test]
fn test_unobserve_id_stops_delivery() {
    let (_engine, player) = start();
    let seen = Recorder::new();
    let recorder = seen.clone();
    let id = player
        .observe_property("speed", move |_, value| {
            recorder.push(value.clone());
            Ok(())
        })
        .unwrap();
    sync(&player);

    player.unobserve_id(id).unwrap();
    player.set_property("speed", 2.0).unwrap();
    sync(&player);

    assert_eq!(seen.items(), vec![Value::Double(1.0)]);
}

// ----------------------------------------------------------------------------
// Event Callbacks
// ----------------------------------------------------------------------------

#[test]
fn test_event_callback_filters_by_kind() {
    let (_engine, player) = start();
    let kinds = Recorder::new();
    let recorder = kinds.clone();
    let callback = player
        .event_callback(&[EventKind::FileLoaded, EventKind::EndFile], move |event| {
            recorder.push(event.kind);
            Ok(())
        })
        .unwrap();

    player.play(CLIP).unwrap();
    sync(&player);
    assert_eq!(kinds.items(), vec![EventKind::FileLoaded, EventKind::EndFile]);

    assert!(callback.unregister());
    assert!(!callback.unregister());
    player.play(CLIP).unwrap();
    sync(&player);
    assert_eq!(kinds.len(), 2);
}

#[test]
fn test_unfiltered_callback_sees_every_event() {
    let (_engine, player) = start();
    let count = Recorder::new();
    let recorder = count.clone();
    let id = player
        .register_event_callback(move |event| {
            recorder.push(event.kind);
            Ok(())
        })
        .unwrap();

    sync(&player);
    assert!(count.items().contains(&EventKind::ClientMessage));

    assert!(player.unregister_event_callback(id).unwrap());
    assert!(!player.unregister_event_callback(id).unwrap());
}

#[test]
fn test_callbacks_for_one_event_run_in_registration_order() {
    let (_engine, player) = start();
    let order = Recorder::new();
    for tag in ["first", "second", "third"] {
        let recorder = order.clone();
        player
            .event_callback(&[EventKind::ClientMessage], move |_| {
                recorder.push(tag);
                Ok(())
            })
            .unwrap();
    }

    sync(&player);
    assert_eq!(order.items(), vec!["first", "second", "third"]);
}

// ----------------------------------------------------------------------------
// Callback Failures
// ----------------------------------------------------------------------------

#[test]
fn test_failure_delivered_to_catching_waiter() {
    let (_engine, player) = start();
    player
        .observe_property("volume", |_, value| {
            if value.as_f64() == Some(50.0) {
                anyhow::bail!("rejected volume");
            }
            Ok(())
        })
        .unwrap();
    sync(&player);

    let result = player.prepare_and_wait_for_event(&[EventKind::Idle], || {
        player.set_property("volume", 50.0)
    });
    match result {
        Err(MpvError::Callback(err)) => assert!(err.to_string().contains("rejected volume")),
        other => panic!("unexpected result {other:?}"),
    }
    assert!(player.take_callback_errors().is_empty());
    assert!(player.stats().callback_failures >= 1);
}

#[test]
fn test_failure_kept_when_no_waiter_catches() {
    let (_engine, player) = start();
    player
        .observe_property("volume", |_, value| {
            if value.as_f64() == Some(50.0) {
                anyhow::bail!("rejected volume");
            }
            Ok(())
        })
        .unwrap();
    sync(&player);

    let options = WaitOptions::new().catch_errors(false);
    let event = player
        .prepare_and_wait_for_event_with(&[EventKind::ClientMessage], |_| true, options, || {
            player.set_property("volume", 50.0)?;
            player.script_message(&["after-failure"])
        })
        .unwrap();
    assert_eq!(event.client_args(), Some(&["after-failure".to_string()][..]));

    let errors = player.take_callback_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("rejected volume"));
    assert!(player.take_callback_errors().is_empty());
}

#[test]
fn test_panicking_callback_does_not_stop_the_loop() {
    let (_engine, player) = start();
    player
        .observe_property("pause", |_, value| -> anyhow::Result<()> {
            if value.as_bool() == Some(true) {
                panic!("observer exploded");
            }
            Ok(())
        })
        .unwrap();
    sync(&player);

    let result = player.prepare_and_wait_for_event(&[EventKind::Idle], || {
        player.set_property("pause", true)
    });
    match result {
        Err(MpvError::Callback(err)) => {
            let text = err.to_string();
            assert!(text.contains("panicked"));
            assert!(text.contains("observer exploded"));
        }
        other => panic!("unexpected result {other:?}"),
    }

    sync(&player);
    assert!(player.is_alive());
}

#[test]
fn test_kept_failures_are_bounded() {
    let (_engine, player) = start();
    let capacity = player.config().event_loop.max_callback_errors;
    player
        .register_message_handler("fail", |args| anyhow::bail!("failure {}", args.join(" ")))
        .unwrap();

    for i in 0..capacity + 3 {
        player.script_message(&["fail".to_string(), i.to_string()]).unwrap();
    }
    let options = WaitOptions::new().catch_errors(false);
    player
        .prepare_and_wait_for_event_with(
            &[EventKind::ClientMessage],
            |event| event.client_args().map_or(false, |args| args[0] == "done"),
            options,
            || player.script_message(&["done"]),
        )
        .unwrap();

    let errors = player.take_callback_errors();
    assert_eq!(errors.len(), capacity);
    assert!(errors[0].to_string().contains("failure 3"));
}

// ----------------------------------------------------------------------------
// Log Handlers
// ----------------------------------------------------------------------------

#[test]
fn test_log_handler_from_builder_receives_engine_messages() {
    common::init_tracing();
    let lines = Recorder::new();
    let recorder = lines.clone();
    let player = Player::builder()
        .with_config(PlayerConfig::testing())
        .with_log_level("info")
        .with_log_handler(move |level, prefix, text| {
            recorder.push((level, prefix.to_string(), text.to_string()));
            Ok(())
        })
        .build(Arc::new(common::fake_engine()))
        .unwrap();

    player
        .prepare_and_wait_for_event_with(
            &[EventKind::LogMessage],
            |event| is_log_text(event, "hello log"),
            WaitOptions::new(),
            || player.print_text("hello log"),
        )
        .unwrap();

    assert!(lines
        .items()
        .contains(&(LogLevel::Info, "cplayer".to_string(), "hello log".to_string())));
}

#[test]
fn test_registered_log_handler_can_be_removed() {
    let (_engine, player) = start();
    let lines = Recorder::new();
    let recorder = lines.clone();
    let id = player
        .register_log_handler(move |_, _, text| {
            recorder.push(text.to_string());
            Ok(())
        })
        .unwrap();

    player.print_text("first").unwrap();
    sync(&player);
    assert!(player.unregister_log_handler(id).unwrap());
    player.print_text("second").unwrap();
    sync(&player);

    let lines = lines.items();
    assert!(lines.contains(&"first".to_string()));
    assert!(!lines.contains(&"second".to_string()));
}

fn is_log_text(event: &Event, expected: &str) -> bool {
    matches!(&event.data, EventData::LogMessage { text, .. } if text.trim_end() == expected)
}
