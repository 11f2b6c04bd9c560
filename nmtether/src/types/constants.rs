//! Constants for the BlueZ, ModemManager and NetworkManager D-Bus APIs.
//!
//! These correspond to the service names, numeric codes and default values
//! used while negotiating a tethered connection.

/// Service identifiers a peer may advertise.
pub mod service {
    pub const NAP: &str = "NAP";
    pub const DUN: &str = "DialupNetworking";
    pub const NAP_UUID: &str = "00001116-0000-1000-8000-00805f9b34fb";
    pub const DUN_UUID: &str = "00001103-0000-1000-8000-00805f9b34fb";
}

/// Well-known bus names and object paths.
pub mod bus {
    pub const BLUEZ_SERVICE: &str = "org.bluez";
    pub const BLUEZ_MANAGER_PATH: &str = "/";
    pub const MM_SERVICE: &str = "org.freedesktop.ModemManager";
    pub const MM_PATH: &str = "/org/freedesktop/ModemManager";
    pub const MM_MODEM_INTERFACE: &str = "org.freedesktop.ModemManager.Modem";
    pub const NM_SERVICE: &str = "org.freedesktop.NetworkManager";
    pub const NM_SETTINGS_PATH: &str = "/org/freedesktop/NetworkManager/Settings";
    pub const NM_SETTINGS_INTERFACE: &str = "org.freedesktop.NetworkManager.Settings";
    pub const NM_CONNECTION_INTERFACE: &str = "org.freedesktop.NetworkManager.Settings.Connection";
    pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
}

/// ModemManager `Type` property values.
pub mod modem_type {
    pub const GSM: u32 = 1;
    pub const CDMA: u32 = 2;
}

/// Role requested when opening the serial tunnel.
pub const DUN_ROLE: &str = "dun";

/// Name of the peer property that reports the link state.
pub const CONNECTED_PROPERTY: &str = "Connected";

/// Serial line settings for dial-up connections.
pub mod serial {
    pub const BAUD: u32 = 115_200;
    pub const BITS: u32 = 8;
    pub const PARITY: u8 = b'n';
    pub const STOPBITS: u32 = 1;
}

/// Numbers dialled by the modem to start a data session.
pub mod dial {
    pub const GSM_NUMBER: &str = "*99#";
    pub const CDMA_NUMBER: &str = "#777";
}

/// User-visible status messages.
pub mod status {
    pub const DETECTING: &str = "Detecting phone configuration...";
    pub const LOCATING: &str = "Looking for your phone...";
    pub const CONNECTING: &str = "Connecting to your phone...";
    pub const AWAITING_DETAILS: &str = "Waiting for your mobile broadband details...";
    pub const READY: &str = "Your phone is now ready to use!";
    pub const WIZARD_CANCELED: &str = "Mobile wizard was canceled";
}

/// Default timeouts for the negotiation.
pub mod timeouts {
    use std::time::Duration;

    /// Deadline covering the whole negotiation, up to the wizard (30 seconds).
    const NEGOTIATION_TIMEOUT_SECS: u64 = 30;

    /// Bound on the serial tunnel `Connect` call (20 seconds).
    const CONNECT_TIMEOUT_SECS: u64 = 20;

    /// How long a best-effort tunnel disconnect may take (5 seconds).
    const DISCONNECT_TIMEOUT_SECS: u64 = 5;

    /// Returns the negotiation deadline.
    pub fn negotiation_timeout() -> Duration {
        Duration::from_secs(NEGOTIATION_TIMEOUT_SECS)
    }

    /// Returns the tunnel connect timeout.
    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    /// Returns the disconnect grace period.
    pub fn disconnect_timeout() -> Duration {
        Duration::from_secs(DISCONNECT_TIMEOUT_SECS)
    }
}
