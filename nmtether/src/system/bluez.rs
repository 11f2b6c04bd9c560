//! Serial tunnels through BlueZ.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use futures::{FutureExt, select};
use futures_timer::Delay;
use log::{debug, warn};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use zbus::Connection;
use zvariant::{OwnedObjectPath, Value};

use crate::Result;
use crate::api::backend::{Adapter, AdapterRegistry, PropertyChange, PropertyValue, SerialPeer};
use crate::api::models::TetherError;
use crate::dbus::{BluezAdapterProxy, BluezDeviceProxy, BluezManagerProxy, BluezSerialProxy};
use crate::types::address::PeerAddress;
use crate::types::constants::bus;

/// The BlueZ adapter registry.
#[derive(Debug, Clone)]
pub struct BluezAdapters {
    conn: Connection,
}

impl BluezAdapters {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AdapterRegistry for BluezAdapters {
    async fn default_adapter(&self) -> Result<Box<dyn Adapter>> {
        let manager = BluezManagerProxy::builder(&self.conn)
            .destination(bus::BLUEZ_SERVICE)?
            .path(bus::BLUEZ_MANAGER_PATH)?
            .build()
            .await?;

        let path = manager.default_adapter().await?;
        debug!("Default Bluetooth adapter: {}", path.as_str());

        Ok(Box::new(BluezAdapter {
            conn: self.conn.clone(),
            path,
        }))
    }
}

struct BluezAdapter {
    conn: Connection,
    path: OwnedObjectPath,
}

#[async_trait]
impl Adapter for BluezAdapter {
    async fn find_peer(&self, address: &PeerAddress) -> Result<Arc<dyn SerialPeer>> {
        let adapter = BluezAdapterProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?;

        let path = adapter.find_device(&address.to_string()).await?;
        debug!("{address} is {}", path.as_str());

        Ok(Arc::new(BluezPeer {
            conn: self.conn.clone(),
            path,
        }))
    }
}

/// A remote device, seen through its `Serial` and `Device` interfaces.
struct BluezPeer {
    conn: Connection,
    path: OwnedObjectPath,
}

#[async_trait]
impl SerialPeer for BluezPeer {
    async fn connect(&self, role: &str, timeout: Duration) -> Result<String> {
        let serial = BluezSerialProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?;

        let mut timeout_delay = pin!(Delay::new(timeout).fuse());
        select! {
            reply = serial.connect(role).fuse() => Ok(reply?),
            _ = timeout_delay => {
                warn!("Serial.Connect on {} timed out after {timeout:?}", self.path.as_str());
                Err(TetherError::TunnelOpenFailed("timed out".into()))
            }
        }
    }

    async fn disconnect(&self, interface: &str) -> Result<()> {
        let serial = BluezSerialProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?;
        serial.disconnect(interface).await?;
        Ok(())
    }

    async fn property_changes(&self) -> Result<BoxStream<'static, PropertyChange>> {
        let device = BluezDeviceProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?;

        let stream = device.receive_property_changed().await?;
        debug!("Subscribed to PropertyChanged on {}", self.path.as_str());

        Ok(stream
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(PropertyChange {
                        name: args.name.to_string(),
                        value: property_value(&args.value),
                    }),
                    Err(e) => {
                        warn!("Failed to parse PropertyChanged signal args: {e}");
                        None
                    }
                }
            })
            .boxed())
    }
}

fn property_value(value: &Value<'_>) -> PropertyValue {
    match value {
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::Str(s) => PropertyValue::Str(s.to_string()),
        Value::Value(inner) => property_value(inner),
        _ => PropertyValue::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_values() {
        assert_eq!(property_value(&Value::from(false)), PropertyValue::Bool(false));
        assert_eq!(
            property_value(&Value::from("rfcomm0")),
            PropertyValue::Str("rfcomm0".into())
        );
        assert_eq!(
            property_value(&Value::Value(Box::new(Value::from(true)))),
            PropertyValue::Bool(true)
        );
        assert_eq!(property_value(&Value::from(7u32)), PropertyValue::Other);
    }
}
