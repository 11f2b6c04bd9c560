//! ModemManager Proxy

use zbus::Result;
use zbus::proxy;
use zvariant::{ObjectPath, OwnedObjectPath};

/// Proxy for the ModemManager main object.
///
/// Modem properties are read through `org.freedesktop.DBus.Properties` on
/// each modem object rather than through a dedicated proxy.
#[proxy(
    interface = "org.freedesktop.ModemManager",
    default_service = "org.freedesktop.ModemManager",
    default_path = "/org/freedesktop/ModemManager"
)]
pub trait ModemManager {
    /// Object paths of the modems currently known.
    fn enumerate_devices(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Emitted when a modem is added.
    #[zbus(signal)]
    fn device_added(&self, device: ObjectPath<'_>) -> Result<()>;

    /// Emitted when a modem is removed.
    #[zbus(signal)]
    fn device_removed(&self, device: ObjectPath<'_>) -> Result<()>;
}
