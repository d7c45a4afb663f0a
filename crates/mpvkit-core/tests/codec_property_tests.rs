//! Property-based tests for the property codec
//!
//! These tests verify the comma-list laws, the decoding policy hierarchy and
//! declared-type round trips over generated inputs.

use mpvkit_core::{
    codec::{decode, decode_property, encode_property},
    DecodePolicy, Node, Value,
};
use proptest::prelude::*;

/// Generate a list element that contains no delimiter
fn arb_element() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,12}").unwrap()
}

fn arb_elements() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_element(), 1..6)
}

/// Arbitrary byte strings, mostly invalid UTF-8
fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..32)
}

proptest! {
    #[test]
    fn test_comma_list_string_and_sequence_agree(elements in arb_elements()) {
        let joined = elements.join(",");
        let from_str = encode_property("alang", &Value::from(joined)).unwrap();
        let from_list = encode_property("alang", &Value::from(elements.clone())).unwrap();
        prop_assert_eq!(&from_str, &from_list);

        let read_back = decode_property("alang", &from_str, DecodePolicy::Lenient).unwrap();
        prop_assert_eq!(read_back, Value::from(elements));
    }

    #[test]
    fn test_comma_list_reads_always_yield_sequences(elements in arb_elements()) {
        // The engine may hand back either form of the same list
        let as_string = Node::string(elements.join(","));
        let decoded = decode_property("slang", &as_string, DecodePolicy::Lenient).unwrap();
        prop_assert_eq!(decoded.as_list().map(|l| l.len()), Some(elements.len()));
    }

    #[test]
    fn test_raw_and_lenient_never_fail(bytes in arb_bytes()) {
        let node = Node::String(bytes.clone());
        prop_assert_eq!(decode(&node, DecodePolicy::Raw).unwrap(), Value::Bytes(bytes.clone()));

        let lenient = decode(&node, DecodePolicy::Lenient).unwrap();
        match std::str::from_utf8(&bytes) {
            Ok(text) => prop_assert_eq!(lenient, Value::from(text)),
            Err(_) => {
                prop_assert_eq!(lenient, Value::Bytes(bytes.clone()));
                prop_assert!(decode(&node, DecodePolicy::Strict).is_err());
            }
        }
    }

    #[test]
    fn test_integer_round_trip(value in any::<i64>()) {
        let node = encode_property("volume-max", &Value::Int(value)).unwrap();
        prop_assert_eq!(decode_property("volume-max", &node, DecodePolicy::Strict).unwrap(), Value::Int(value));

        let node = encode_property("playlist-pos", &Value::Int(value)).unwrap();
        prop_assert_eq!(decode_property("playlist-pos", &node, DecodePolicy::Strict).unwrap(), Value::Int(value));
    }

    #[test]
    fn test_flag_round_trip(flag in any::<bool>()) {
        let node = encode_property("pause", &Value::Flag(flag)).unwrap();
        prop_assert_eq!(decode_property("pause", &node, DecodePolicy::Strict).unwrap(), Value::Flag(flag));
    }
}
