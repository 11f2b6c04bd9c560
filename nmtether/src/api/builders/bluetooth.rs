//! Bluetooth tethering connection builders.
//!
//! Builds the NetworkManager settings for the two tethering profiles:
//!
//! - PAN: a `bluetooth` connection of type `panu` with automatic IPv4.
//! - DUN: a `gsm` or `cdma` connection dialled over a serial tunnel, with
//!   `serial`, `ppp` and a `bluetooth` section of type `dun`.
//!
//! # Example
//!
//! ```rust
//! use nmtether::builders::build_pan_connection;
//! use nmtether::PeerAddress;
//!
//! let peer: PeerAddress = "00:1A:7D:DA:71:13".parse().unwrap();
//! let settings = build_pan_connection(&peer);
//! assert!(settings.contains_key("bluetooth"));
//! ```

use std::collections::HashMap;
use zvariant::Value;

use super::{ConnectionBuilder, ConnectionSettings};
use crate::api::models::{AccessMethod, StoredConnection, TechnologyFamily};
use crate::types::address::PeerAddress;
use crate::types::capability::Profile;
use crate::types::constants::{dial, serial};

/// Builds the `bluetooth` section binding a profile to a peer.
fn bluetooth_section(
    peer: &PeerAddress,
    kind: &'static str,
) -> HashMap<&'static str, Value<'static>> {
    let mut s = HashMap::new();
    s.insert("bdaddr", Value::from(peer.octets().to_vec()));
    s.insert("type", Value::from(kind));
    s
}

fn serial_section() -> HashMap<&'static str, Value<'static>> {
    let mut s = HashMap::new();
    s.insert("baud", Value::from(serial::BAUD));
    s.insert("bits", Value::from(serial::BITS));
    s.insert("parity", Value::from(serial::PARITY));
    s.insert("stopbits", Value::from(serial::STOPBITS));
    s
}

/// Builds the `gsm` or `cdma` section from the wizard's answers.
fn mobile_section(method: &AccessMethod) -> HashMap<&'static str, Value<'static>> {
    let mut s = HashMap::new();

    let number = match method.family {
        TechnologyFamily::Gsm => dial::GSM_NUMBER,
        TechnologyFamily::Cdma => dial::CDMA_NUMBER,
    };
    s.insert("number", Value::from(number));

    if let Some(username) = &method.username {
        s.insert("username", Value::from(username.clone()));
    }
    if let Some(password) = &method.password {
        s.insert("password", Value::from(password.clone()));
    }
    if method.family == TechnologyFamily::Gsm {
        if let Some(apn) = &method.gsm_apn {
            s.insert("apn", Value::from(apn.clone()));
        }
    }

    s
}

/// Builds a PAN (`panu`) connection for the given peer.
///
/// The connection is named `"<bdaddr> PANU"` and does not autoconnect.
pub fn build_pan_connection(peer: &PeerAddress) -> ConnectionSettings {
    ConnectionBuilder::new("bluetooth", format!("{peer} PANU"))
        .autoconnect(false)
        .with_section("bluetooth", bluetooth_section(peer, "panu"))
        .ipv4_auto()
        .build()
}

/// Builds a dial-up connection for the given peer from the wizard's answers.
pub fn build_dun_connection(peer: &PeerAddress, method: &AccessMethod) -> ConnectionSettings {
    let family = method.family;

    ConnectionBuilder::new(family.setting_name(), method.connection_name())
        .autoconnect(false)
        .with_section(family.setting_name(), mobile_section(method))
        .with_section("serial", serial_section())
        .with_section("ppp", HashMap::new())
        .with_section("bluetooth", bluetooth_section(peer, "dun"))
        .build()
}

/// Reads the identifying fields back out of a settings dictionary.
///
/// Used by stores that keep settings in memory, and by tests.
pub fn describe_connection(path: impl Into<String>, settings: &ConnectionSettings) -> StoredConnection {
    let id = settings
        .get("connection")
        .and_then(|c| c.get("id"))
        .and_then(value_as_str)
        .unwrap_or_default();

    let bluetooth = settings.get("bluetooth");
    let bdaddr = bluetooth
        .and_then(|b| b.get("bdaddr"))
        .and_then(value_as_address);
    let bluetooth_type = bluetooth.and_then(|b| b.get("type")).and_then(value_as_str);

    StoredConnection {
        path: path.into(),
        id,
        bdaddr,
        bluetooth_type,
    }
}

/// Extracts a string from a settings value.
pub(crate) fn value_as_str(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        _ => None,
    }
}

/// Extracts a Bluetooth address from a `bdaddr` byte array.
pub(crate) fn value_as_address(value: &Value<'_>) -> Option<PeerAddress> {
    let Value::Array(array) = value else {
        return None;
    };
    let bytes: Vec<u8> = array
        .iter()
        .filter_map(|v| match v {
            Value::U8(b) => Some(*b),
            _ => None,
        })
        .collect();
    let octets: [u8; 6] = bytes.try_into().ok()?;
    Some(PeerAddress::from_octets(octets))
}

/// Profile a stored connection was created for.
pub fn stored_profile(stored: &StoredConnection) -> Profile {
    stored
        .bluetooth_type
        .as_deref()
        .map(Profile::from_bluetooth_type)
        .unwrap_or_default()
}
