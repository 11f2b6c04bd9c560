//! Modem discovery through ModemManager.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use zbus::Connection;
use zvariant::{OwnedValue, Value};

use crate::Result;
use crate::api::backend::{ModemEvent, ModemProperties, ModemRegistry};
use crate::dbus::ModemManagerProxy;
use crate::types::constants::bus;
use crate::util::utils::modem_properties_proxy;

/// The ModemManager modem registry.
#[derive(Debug, Clone)]
pub struct ModemManagerRegistry {
    conn: Connection,
}

impl ModemManagerRegistry {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn manager(&self) -> Result<ModemManagerProxy<'_>> {
        Ok(ModemManagerProxy::builder(&self.conn)
            .destination(bus::MM_SERVICE)?
            .path(bus::MM_PATH)?
            .build()
            .await?)
    }
}

#[async_trait]
impl ModemRegistry for ModemManagerRegistry {
    async fn device_events(&self) -> Result<BoxStream<'static, ModemEvent>> {
        let manager = self.manager().await?;

        let added = manager
            .receive_device_added()
            .await?
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(ModemEvent::Added(args.device.to_string())),
                    Err(e) => {
                        warn!("Failed to parse DeviceAdded signal args: {e}");
                        None
                    }
                }
            });
        let removed = manager
            .receive_device_removed()
            .await?
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(ModemEvent::Removed(args.device.to_string())),
                    Err(e) => {
                        warn!("Failed to parse DeviceRemoved signal args: {e}");
                        None
                    }
                }
            });

        debug!("Subscribed to ModemManager device signals");
        Ok(stream::select(added, removed).boxed())
    }

    async fn enumerate(&self) -> Result<Vec<String>> {
        let devices = self.manager().await?.enumerate_devices().await?;
        Ok(devices.into_iter().map(|p| p.to_string()).collect())
    }

    async fn properties(&self, path: &str) -> Result<ModemProperties> {
        let proxy = modem_properties_proxy(&self.conn, path).await?;
        let reply = proxy
            .call_method("GetAll", &(bus::MM_MODEM_INTERFACE,))
            .await?;
        let props: HashMap<String, OwnedValue> = reply.body().deserialize()?;

        Ok(modem_properties(&props))
    }
}

fn modem_properties(props: &HashMap<String, OwnedValue>) -> ModemProperties {
    let device = match props.get("Device").map(|v| &**v) {
        Some(Value::Str(s)) => Some(s.to_string()),
        _ => None,
    };
    let modem_type = match props.get("Type").map(|v| &**v) {
        Some(Value::U32(t)) => Some(*t),
        _ => None,
    };
    ModemProperties { device, modem_type }
}
