//! Classification of a peer's advertised services into a tethering profile.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::types::constants::service;

bitflags! {
    /// Networking capabilities advertised by a Bluetooth peer.
    ///
    /// Bit values match NetworkManager's `BtCapabilities` property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Dial-Up Networking.
        const DUN = 0x01;
        /// Network Access Point.
        const NAP = 0x02;
    }
}

impl Capabilities {
    /// Collects the networking capabilities out of a list of service identifiers.
    ///
    /// Both the short names reported by older BlueZ releases (`"NAP"`,
    /// `"DialupNetworking"`) and the full 128-bit service UUIDs are recognised.
    /// Unrelated services are ignored.
    pub fn from_services<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        services
            .into_iter()
            .fold(Self::empty(), |caps, s| caps | Self::from_service(s.as_ref()))
    }

    fn from_service(id: &str) -> Self {
        if id == service::NAP || id.eq_ignore_ascii_case(service::NAP_UUID) {
            Self::NAP
        } else if id == service::DUN || id.eq_ignore_ascii_case(service::DUN_UUID) {
            Self::DUN
        } else {
            Self::empty()
        }
    }
}

/// Tethering profile used to reach the network through a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Profile {
    /// The peer offers no usable networking service.
    #[default]
    None,
    /// Personal Area Networking through the peer's access point.
    Pan,
    /// Dial-up networking over a serial tunnel.
    Dun,
}

impl Profile {
    /// Value of the `type` key in NetworkManager's `bluetooth` settings section.
    ///
    /// Returns `None` for [`Profile::None`].
    pub fn bluetooth_type(self) -> Option<&'static str> {
        match self {
            Self::Pan => Some("panu"),
            Self::Dun => Some("dun"),
            Self::None => None,
        }
    }

    /// Maps a `bluetooth.type` settings value back to a profile.
    pub fn from_bluetooth_type(kind: &str) -> Self {
        match kind {
            "panu" => Self::Pan,
            "dun" => Self::Dun,
            _ => Self::None,
        }
    }

    /// Returns `true` unless the profile is [`Profile::None`].
    pub fn is_eligible(self) -> bool {
        self != Self::None
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Pan => write!(f, "PAN"),
            Self::Dun => write!(f, "DUN"),
        }
    }
}

impl From<Capabilities> for Profile {
    fn from(caps: Capabilities) -> Self {
        if caps.contains(Capabilities::NAP) {
            Self::Pan
        } else if caps.contains(Capabilities::DUN) {
            Self::Dun
        } else {
            Self::None
        }
    }
}

/// Picks the tethering profile for a set of advertised services.
///
/// PAN is preferred whenever the peer offers a network access point, even if
/// it also offers dial-up networking.
///
/// # Example
///
/// ```rust
/// use nmtether::{classify, Profile};
///
/// assert_eq!(classify(["NAP", "DialupNetworking"]), Profile::Pan);
/// assert_eq!(classify(["DialupNetworking"]), Profile::Dun);
/// assert_eq!(classify(["AudioSink"]), Profile::None);
/// ```
pub fn classify<I, S>(services: I) -> Profile
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Capabilities::from_services(services).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nap_wins_over_dun() {
        assert_eq!(classify(["DialupNetworking", "NAP"]), Profile::Pan);
        assert_eq!(classify(["NAP", "DialupNetworking"]), Profile::Pan);
    }

    #[test]
    fn dun_only() {
        assert_eq!(classify(["DialupNetworking", "HandsfreeAudioGateway"]), Profile::Dun);
    }

    #[test]
    fn nothing_usable() {
        let empty: [&str; 0] = [];
        assert_eq!(classify(empty), Profile::None);
        assert_eq!(classify(["AudioSource", "nap", "dialupnetworking"]), Profile::None);
    }

    #[test]
    fn accepts_service_uuids() {
        assert_eq!(
            classify(["00001103-0000-1000-8000-00805F9B34FB"]),
            Profile::Dun
        );
        assert_eq!(
            classify([
                "00001103-0000-1000-8000-00805f9b34fb",
                "00001116-0000-1000-8000-00805f9b34fb",
            ]),
            Profile::Pan
        );
    }

    #[test]
    fn capability_bits_match_networkmanager() {
        assert_eq!(Capabilities::DUN.bits(), 0x01);
        assert_eq!(Capabilities::NAP.bits(), 0x02);
        assert_eq!(Profile::from(Capabilities::from_bits_truncate(0x03)), Profile::Pan);
    }

    #[test]
    fn bluetooth_type_round_trip() {
        for profile in [Profile::Pan, Profile::Dun] {
            let kind = profile.bluetooth_type().unwrap();
            assert_eq!(Profile::from_bluetooth_type(kind), profile);
        }
        assert_eq!(Profile::None.bluetooth_type(), None);
        assert_eq!(Profile::from_bluetooth_type("nap"), Profile::None);
    }
}
