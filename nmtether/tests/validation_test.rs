//! Tests for input validation.
//!
//! These tests verify that malformed addresses are rejected before any D-Bus
//! traffic, and that service lists map to the expected profile.

use nmtether::{Capabilities, PeerAddress, Profile, TetherError, classify};

#[test]
fn test_address_canonical_form_is_stable() {
    let inputs = [
        "00:1a:7d:da:71:13",
        "00:1A:7D:DA:71:13",
        "c8:1F:e8:F0:51:57",
        "ff:ff:ff:ff:ff:ff",
        "00:00:00:00:00:00",
    ];

    for input in inputs {
        let once = PeerAddress::parse(input).unwrap().to_string();
        let twice = PeerAddress::parse(&once).unwrap().to_string();

        assert_eq!(once, twice, "canonical form of {input} changed");
        assert_eq!(once, input.to_uppercase());
    }
}

#[test]
fn test_invalid_addresses() {
    let invalid = [
        "",
        "00:1A:7D:DA:71",
        "00:1A:7D:DA:71:13:00",
        "0:1A:7D:DA:71:13",
        "000:1A:7D:DA:71:13",
        "00-1A-7D-DA-71-13",
        "00:1A:7D:DA:71:1G",
        " 00:1A:7D:DA:71:13",
        "00:1A:7D:DA:71:13\n",
        "00:1A:7D:DA:71:",
        "+0:1A:7D:DA:71:13",
    ];

    for input in invalid {
        let result = PeerAddress::parse(input);
        assert!(
            matches!(result, Err(TetherError::InvalidAddress(_))),
            "{input:?} should be rejected"
        );
    }
}

#[test]
fn test_classifier_is_total() {
    let cases: [(&[&str], Profile); 7] = [
        (&[], Profile::None),
        (&["NAP"], Profile::Pan),
        (&["DialupNetworking"], Profile::Dun),
        (&["NAP", "DialupNetworking"], Profile::Pan),
        (&["DialupNetworking", "AudioSink", "NAP"], Profile::Pan),
        (&["AudioSink", "HandsfreeAudioGateway"], Profile::None),
        (&["nap", "dialupnetworking"], Profile::None),
    ];

    for (services, expected) in cases {
        assert_eq!(classify(services), expected, "services: {services:?}");
    }
}

#[test]
fn test_classifier_accepts_uuids() {
    assert_eq!(
        classify(["00001116-0000-1000-8000-00805F9B34FB"]),
        Profile::Pan
    );
    assert_eq!(
        classify(["00001103-0000-1000-8000-00805f9b34fb"]),
        Profile::Dun
    );
}

#[test]
fn test_capability_bits() {
    let caps = Capabilities::from_services(["NAP", "DialupNetworking"]);
    assert_eq!(caps.bits(), 0x03);
    assert_eq!(Profile::from(Capabilities::DUN), Profile::Dun);
    assert_eq!(Profile::from(Capabilities::empty()), Profile::None);
}
