//! Property access through a live handle
//!
//! Round trips under the declared types, comma lists, decode policies and the
//! mapping of engine failures onto the error taxonomy.

mod common;

use common::{start, start_with, CLIP};
use mpvkit_runtime::{DecodePolicy, ErrorCode, MpvError, Node, PlayerConfig, Value};

const INVALID_UTF8: &[u8] = b"\xff\xfe title";

// ----------------------------------------------------------------------------
// Round Trips
// ----------------------------------------------------------------------------

#[test]
fn test_writable_properties_round_trip() {
    let (_engine, player) = start();

    let cases: Vec<(&str, Value)> = vec![
        ("volume", Value::Double(42.5)),
        ("pause", Value::Flag(true)),
        ("speed", Value::Double(1.25)),
        ("osd-level", Value::Int(3)),
        ("hwdec", Value::Str("auto".to_string())),
        ("cursor-autohide", Value::Int(500)),
    ];
    for (name, value) in cases {
        player.set_property(name, value.clone()).unwrap();
        assert_eq!(player.get_property(name).unwrap(), value, "property {name}");
    }
}

#[test]
fn test_underscore_names_are_accepted() {
    let (_engine, player) = start();

    player.set_property("osd_level", 2_i64).unwrap();
    assert_eq!(player.get_property("osd-level").unwrap(), Value::Int(2));
    assert_eq!(player.get_property("core_idle").unwrap(), Value::Flag(true));
}

#[test]
fn test_flag_accepts_yes_no_strings() {
    let (_engine, player) = start();

    player.set_property("mute", "yes").unwrap();
    assert_eq!(player.get_property("mute").unwrap(), Value::Flag(true));
    player.set_property("mute", "no").unwrap();
    assert_eq!(player.get_property("mute").unwrap(), Value::Flag(false));
}

#[test]
fn test_comma_list_from_string_and_sequence() {
    let (_engine, player) = start();
    let expected = Value::from(vec!["de", "en"]);

    player.set_property("alang", "de,en").unwrap();
    assert_eq!(player.get_property("alang").unwrap(), expected);

    player.set_property("slang", vec!["de", "en"]).unwrap();
    assert_eq!(player.get_property("slang").unwrap(), expected);

    player.set_property("alang", "").unwrap();
    assert_eq!(player.get_property("alang").unwrap(), Value::List(Vec::new()));
}

#[test]
fn test_options_are_read_through_options_path() {
    let (_engine, player) = start();

    player.set_option("volume", 30.0).unwrap();
    assert_eq!(player.get_option("volume").unwrap(), Value::Double(30.0));
    assert_eq!(player.get_property("volume").unwrap(), Value::Double(30.0));
}

#[test]
fn test_property_and_option_lists() {
    let (_engine, player) = start();

    let properties = player.property_list().unwrap();
    assert!(properties.iter().any(|p| p == "volume"));
    assert!(properties.iter().any(|p| p == "core-idle"));

    let options = player.option_list().unwrap();
    assert!(options.iter().any(|o| o == "volume"));
    assert!(!options.iter().any(|o| o == "core-idle"));
}

// ----------------------------------------------------------------------------
// Decode Policies
// ----------------------------------------------------------------------------

#[test]
fn test_invalid_utf8_under_each_policy() {
    let (engine, player) = start();
    engine.inject_property("media-title", Node::String(INVALID_UTF8.to_vec()));

    assert!(matches!(
        player.strict().get("media-title"),
        Err(MpvError::Decode { .. })
    ));
    assert_eq!(
        player.raw().get("media-title").unwrap(),
        Value::Bytes(INVALID_UTF8.to_vec())
    );
    assert_eq!(
        player.lenient().get("media-title").unwrap(),
        Value::Bytes(INVALID_UTF8.to_vec())
    );
    assert!(matches!(
        player.osd().get("media-title"),
        Err(MpvError::Decode { .. })
    ));
}

#[test]
fn test_raw_policy_keeps_valid_strings_as_bytes() {
    let (_engine, player) = start();

    assert_eq!(player.raw().policy(), DecodePolicy::Raw);
    assert_eq!(
        player.raw().get("hwdec").unwrap(),
        Value::Bytes(b"no".to_vec())
    );
    assert_eq!(
        player.strict().get("hwdec").unwrap(),
        Value::Str("no".to_string())
    );
}

#[test]
fn test_configured_policy_applies_to_plain_reads() {
    let config = PlayerConfig::testing().with_decode_policy(DecodePolicy::Strict);
    let (engine, player) = start_with(common::fake_engine(), config);
    engine.inject_property("media-title", Node::String(INVALID_UTF8.to_vec()));

    assert!(matches!(
        player.get_property("media-title"),
        Err(MpvError::Decode { .. })
    ));
}

#[test]
fn test_osd_rendering() {
    let (_engine, player) = start();

    assert_eq!(player.osd().get("volume").unwrap(), "100.00");
    assert_eq!(player.get_property_osd("pause").unwrap(), "no");
}

#[test]
fn test_media_properties_while_playing() {
    let (_engine, player) = start();
    player.set_property("loop", "inf").unwrap();
    player.play(CLIP).unwrap();

    assert_eq!(
        player.get_property("media-title").unwrap(),
        Value::Str("Test Clip".to_string())
    );
    assert_eq!(
        player.get_property("filename").unwrap(),
        Value::Str("clip.mkv".to_string())
    );
    assert_eq!(player.get_property("duration").unwrap(), Value::Double(3.0));
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[test]
fn test_unknown_property_not_found() {
    let (_engine, player) = start();

    assert!(matches!(
        player.get_property("no-such-property"),
        Err(MpvError::PropertyNotFound { name, code: ErrorCode::PropertyNotFound })
            if name == "no-such-property"
    ));
    assert!(matches!(
        player.set_property("no-such-property", 1_i64),
        Err(MpvError::PropertyNotFound { .. })
    ));
}

#[test]
fn test_unavailable_without_media() {
    let (_engine, player) = start();

    assert!(matches!(
        player.get_property("duration"),
        Err(MpvError::PropertyUnavailable { code: ErrorCode::PropertyUnavailable, .. })
    ));
}

#[test]
fn test_read_only_property_rejects_writes() {
    let (_engine, player) = start();

    match player.set_property("core-idle", false) {
        Err(MpvError::PropertyError { name, code }) => {
            assert_eq!(name, "core-idle");
            assert_eq!(code, ErrorCode::PropertyError);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_wrong_shape_rejected_before_engine_call() {
    let (_engine, player) = start();

    assert!(matches!(
        player.set_property("pause", 3_i64),
        Err(MpvError::PropertyFormat { .. })
    ));
    assert!(matches!(
        player.set_property("volume", vec!["loud"]),
        Err(MpvError::PropertyFormat { .. })
    ));
    assert!(matches!(
        player.set_property("alang", vec![Value::Int(1)]),
        Err(MpvError::PropertyFormat { .. })
    ));
    assert_eq!(player.get_property("pause").unwrap(), Value::Flag(false));
    assert_eq!(player.get_property("volume").unwrap(), Value::Double(100.0));
}
