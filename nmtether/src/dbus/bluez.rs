//! BlueZ proxies
//!
//! Proxies for the parts of the BlueZ 4 API needed to open a dial-up serial
//! tunnel to a phone.

use zbus::Result;
use zbus::proxy;
use zvariant::{OwnedObjectPath, Value};

/// Proxy for the BlueZ manager object.
///
/// # Example
///
/// ```ignore
/// use zbus::Connection;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Connection::system().await?;
/// let manager = BluezManagerProxy::new(&conn).await?;
/// let adapter = manager.default_adapter().await?;
/// println!("Default adapter: {}", adapter.as_str());
/// # Ok(())
/// # }
/// ```
#[proxy(
    interface = "org.bluez.Manager",
    default_service = "org.bluez",
    default_path = "/"
)]
pub trait BluezManager {
    /// Object path of the system's default adapter.
    fn default_adapter(&self) -> Result<OwnedObjectPath>;
}

/// Proxy for a local Bluetooth adapter.
#[proxy(interface = "org.bluez.Adapter", default_service = "org.bluez")]
pub trait BluezAdapter {
    /// Resolves a remote device by its `XX:XX:XX:XX:XX:XX` address.
    fn find_device(&self, address: &str) -> Result<OwnedObjectPath>;
}

/// Proxy for the serial port service of a remote device.
#[proxy(interface = "org.bluez.Serial", default_service = "org.bluez")]
pub trait BluezSerial {
    /// Opens a serial connection.
    ///
    /// `pattern` is a profile name such as `"dun"`. Returns the local TTY
    /// device, e.g. `/dev/rfcomm0`.
    fn connect(&self, pattern: &str) -> Result<String>;

    /// Closes a serial connection previously opened with `connect`.
    fn disconnect(&self, device: &str) -> Result<()>;
}

/// Proxy for a remote Bluetooth device.
#[proxy(interface = "org.bluez.Device", default_service = "org.bluez")]
pub trait BluezDevice {
    /// Emitted when one of the device's properties changes.
    #[zbus(signal)]
    fn property_changed(&self, name: &str, value: Value<'_>) -> Result<()>;
}
