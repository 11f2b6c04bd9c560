//! D-Bus proxy interfaces for BlueZ and ModemManager.
//!
//! Both services are spoken to through their legacy APIs: BlueZ 4 exposes
//! serial tunnels through `org.bluez.Serial`, and ModemManager 0.4 announces
//! modems with `DeviceAdded`/`DeviceRemoved` signals.

mod bluez;
mod modem_manager;

pub(crate) use bluez::{BluezAdapterProxy, BluezDeviceProxy, BluezManagerProxy, BluezSerialProxy};
pub(crate) use modem_manager::ModemManagerProxy;
