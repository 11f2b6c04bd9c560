//! D-Bus helpers shared by the system backend.

use zbus::Connection;
use zvariant::OwnedObjectPath;

use crate::Result;
use crate::types::constants::bus;

/// Helper to create a D-Bus proxy for a given service, path and interface.
///
/// Used for calls that are made through `call_method` rather than a
/// generated proxy.
pub(crate) async fn bus_proxy<'a, P>(
    conn: &'a Connection,
    service: &'static str,
    path: P,
    interface: &'a str,
) -> Result<zbus::Proxy<'a>>
where
    P: TryInto<OwnedObjectPath>,
    P::Error: Into<zbus::Error>,
{
    let owned_path = path.try_into().map_err(Into::into)?;
    Ok(zbus::proxy::Builder::new(conn)
        .destination(service)?
        .path(owned_path)?
        .interface(interface)?
        .build()
        .await?)
}

/// Helper to create a NetworkManager Settings proxy.
///
/// Used to list and add saved connection profiles.
pub(crate) async fn settings_proxy(conn: &Connection) -> Result<zbus::Proxy<'_>> {
    bus_proxy(
        conn,
        bus::NM_SERVICE,
        bus::NM_SETTINGS_PATH,
        bus::NM_SETTINGS_INTERFACE,
    )
    .await
}

/// Helper to create a Settings.Connection proxy for one saved connection.
pub(crate) async fn connection_settings_proxy<'a, P>(
    conn: &'a Connection,
    connection_path: P,
) -> Result<zbus::Proxy<'a>>
where
    P: TryInto<OwnedObjectPath>,
    P::Error: Into<zbus::Error>,
{
    bus_proxy(
        conn,
        bus::NM_SERVICE,
        connection_path,
        bus::NM_CONNECTION_INTERFACE,
    )
    .await
}

/// Helper to create a `org.freedesktop.DBus.Properties` proxy for a modem.
pub(crate) async fn modem_properties_proxy<'a, P>(
    conn: &'a Connection,
    modem_path: P,
) -> Result<zbus::Proxy<'a>>
where
    P: TryInto<OwnedObjectPath>,
    P::Error: Into<zbus::Error>,
{
    bus_proxy(conn, bus::MM_SERVICE, modem_path, bus::PROPERTIES_INTERFACE).await
}

/// Macro to convert Result to Option with error logging.
/// Usage: `try_log!(result, "context message")`
#[macro_export]
macro_rules! try_log {
    ($result:expr, $context:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}: {:?}", $context, e);
                return None;
            }
        }
    };
}
