//! Connection profiles in NetworkManager's settings service.

use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue};

use crate::Result;
use crate::api::backend::ConnectionStore;
use crate::api::builders::bluetooth::{value_as_address, value_as_str};
use crate::api::builders::{ConnectionSettings, describe_connection};
use crate::api::models::StoredConnection;
use crate::util::utils::{connection_settings_proxy, settings_proxy};

/// Connection store backed by `org.freedesktop.NetworkManager.Settings`.
#[derive(Debug, Clone)]
pub struct NmSettingsStore {
    conn: Connection,
}

impl NmSettingsStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ConnectionStore for NmSettingsStore {
    async fn add(&self, settings: ConnectionSettings) -> Result<StoredConnection> {
        let mut stored = describe_connection(String::new(), &settings);

        let settings_api = settings_proxy(&self.conn).await?;
        debug!("Adding connection '{}' via Settings API", stored.id);
        let reply = settings_api
            .call_method("AddConnection", &(settings,))
            .await?;
        let path: OwnedObjectPath = reply.body().deserialize()?;

        stored.path = path.to_string();
        Ok(stored)
    }

    async fn list(&self) -> Result<Vec<StoredConnection>> {
        let settings_api = settings_proxy(&self.conn).await?;
        let reply = settings_api.call_method("ListConnections", &()).await?;
        let paths: Vec<OwnedObjectPath> = reply.body().deserialize()?;

        let mut stored = Vec::with_capacity(paths.len());
        for path in paths {
            let cproxy = connection_settings_proxy(&self.conn, path.clone()).await?;
            let msg = cproxy.call_method("GetSettings", &()).await?;
            let all: HashMap<String, HashMap<String, OwnedValue>> = msg.body().deserialize()?;
            stored.push(stored_connection(path.as_str(), &all));
        }

        Ok(stored)
    }

    async fn delete(&self, stored: &StoredConnection) -> Result<()> {
        let cproxy = connection_settings_proxy(&self.conn, stored.path.as_str()).await?;
        cproxy.call_method("Delete", &()).await?;
        debug!("Deleted connection: {}", stored.path);
        Ok(())
    }
}

/// Reads the identifying fields of a connection returned by `GetSettings`.
fn stored_connection(
    path: &str,
    all: &HashMap<String, HashMap<String, OwnedValue>>,
) -> StoredConnection {
    let id = all
        .get("connection")
        .and_then(|c| c.get("id"))
        .and_then(|v| value_as_str(v))
        .unwrap_or_default();

    let bluetooth = all.get("bluetooth");
    StoredConnection {
        path: path.to_string(),
        id,
        bdaddr: bluetooth
            .and_then(|b| b.get("bdaddr"))
            .and_then(|v| value_as_address(v)),
        bluetooth_type: bluetooth
            .and_then(|b| b.get("type"))
            .and_then(|v| value_as_str(v)),
    }
}
