//! Bluetooth device address (BDADDR) parsing and formatting.
//!
//! Addresses are accepted in the usual `XX:XX:XX:XX:XX:XX` form, in either
//! case, and always printed in upper case the way BlueZ reports them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::api::models::TetherError;

/// Number of octets in a Bluetooth device address.
pub const ADDRESS_LEN: usize = 6;

/// A parsed, immutable Bluetooth device address.
///
/// # Example
///
/// ```rust
/// use nmtether::PeerAddress;
///
/// let addr: PeerAddress = "c8:1f:e8:f0:51:57".parse().unwrap();
/// assert_eq!(addr.to_string(), "C8:1F:E8:F0:51:57");
/// assert_eq!(addr.device_id(), "dev_C8_1F_E8_F0_51_57");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress([u8; ADDRESS_LEN]);

impl PeerAddress {
    /// Builds an address from raw octets.
    pub const fn from_octets(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }

    /// Parses the textual form of an address.
    ///
    /// Exactly six colon-separated, two-digit hexadecimal octets are accepted.
    /// Anything else is rejected with [`TetherError::InvalidAddress`].
    pub fn parse(text: &str) -> Result<Self, TetherError> {
        let invalid = || TetherError::InvalidAddress(text.to_string());

        let mut octets = [0u8; ADDRESS_LEN];
        let mut parts = text.split(':');

        for slot in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(octets))
    }

    /// Raw address octets, most significant first.
    ///
    /// This is the byte array NetworkManager expects in the `bdaddr` key
    /// of the `bluetooth` settings section.
    pub fn octets(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }

    /// Stable device identifier used by BlueZ in object paths.
    pub fn device_id(&self) -> String {
        format!("dev_{}", self.to_string().replace(':', "_"))
    }

    /// Full BlueZ object path of this device under the given adapter path.
    pub fn bluez_path(&self, adapter_path: &str) -> String {
        format!("{}/{}", adapter_path.trim_end_matches('/'), self.device_id())
    }
}

impl Display for PeerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for PeerAddress {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; ADDRESS_LEN]> for PeerAddress {
    fn from(octets: [u8; ADDRESS_LEN]) -> Self {
        Self(octets)
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_case() {
        let addr = PeerAddress::parse("c8:1F:e8:F0:51:57").unwrap();
        assert_eq!(addr.octets(), [0xC8, 0x1F, 0xE8, 0xF0, 0x51, 0x57]);
        assert_eq!(addr.to_string(), "C8:1F:E8:F0:51:57");
    }

    #[test]
    fn canonical_form_is_idempotent() {
        let inputs = [
            "00:1a:7d:da:71:13",
            "AA:BB:CC:DD:EE:FF",
            "00:00:00:00:00:00",
            "fF:0a:B1:c2:D3:e4",
        ];

        for input in inputs {
            let once = PeerAddress::parse(input).unwrap().to_string();
            let twice = PeerAddress::parse(&once).unwrap().to_string();
            assert_eq!(once, twice, "Failed for address: {}", input);
            assert_eq!(once, input.to_uppercase());
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        let bad = [
            "",
            "00:1A:7D:DA:71",
            "00:1A:7D:DA:71:13:00",
            "0:1A:7D:DA:71:13",
            "001A:7D:DA:71:13",
            "00-1A-7D-DA-71-13",
            "00:1A:7D:DA:71:1G",
            " 00:1A:7D:DA:71:13",
            "00:1A:7D:DA:71:13:",
            "+0:1A:7D:DA:71:13",
        ];

        for input in bad {
            assert!(
                matches!(PeerAddress::parse(input), Err(TetherError::InvalidAddress(_))),
                "Expected rejection for: {:?}",
                input
            );
        }
    }

    #[test]
    fn bluez_path_format() {
        let addr: PeerAddress = "00:1A:7D:DA:71:13".parse().unwrap();
        assert_eq!(addr.device_id(), "dev_00_1A_7D_DA_71_13");
        assert_eq!(
            addr.bluez_path("/org/bluez/hci0"),
            "/org/bluez/hci0/dev_00_1A_7D_DA_71_13"
        );
        assert_eq!(
            addr.bluez_path("/org/bluez/hci1/"),
            "/org/bluez/hci1/dev_00_1A_7D_DA_71_13"
        );
    }
}
